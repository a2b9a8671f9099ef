//! Recognizer-only strategy, used where encoded capture is unavailable.
//!
//! The on-device recognizer is the sole transcript source. Its errors end the
//! session through a [`FailureHook`]; stopping asks it to finish gracefully
//! and waits a short grace period for final results.

use crate::error::ClassifiedError;
use crate::recognizer::{
    RecognitionEvent, RecognitionHandle, RecognizerError, RecognizerOptions, SpeechRecognizer,
};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Called at most once when the recognizer fails mid-session.
pub type FailureHook = Box<dyn Fn(ClassifiedError) + Send + Sync>;

struct SoleState {
    transcript: String,
    live: bool,
    handle: Option<Box<dyn RecognitionHandle>>,
}

fn lock(state: &Mutex<SoleState>) -> MutexGuard<'_, SoleState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct RecognizerOnlyCapture {
    state: Arc<Mutex<SoleState>>,
    task: Option<JoinHandle<()>>,
}

impl RecognizerOnlyCapture {
    /// Start the recognizer. A synchronous start failure is returned
    /// classified; later failures go to `on_failure`.
    pub fn start(
        recognizer: &dyn SpeechRecognizer,
        options: &RecognizerOptions,
        on_failure: FailureHook,
    ) -> Result<Self, ClassifiedError> {
        let session = recognizer.start(options).map_err(|e| {
            log::warn!("Recorder: recognizer failed to start: {}", e);
            e.classify()
        })?;
        log::info!("Recorder: recognizing with {}", recognizer.name());

        let state = Arc::new(Mutex::new(SoleState {
            transcript: String::new(),
            live: true,
            handle: Some(session.handle),
        }));

        let task = tokio::spawn(consume(session.events, state.clone(), on_failure));

        Ok(Self {
            state,
            task: Some(task),
        })
    }

    pub fn transcript(&self) -> String {
        lock(&self.state).transcript.clone()
    }

    /// Ask the recognizer to finalize, wait up to `grace` for it to end, and
    /// return the trimmed transcript.
    pub async fn finish(mut self, grace: Duration) -> Result<String, ClassifiedError> {
        if let Some(handle) = lock(&self.state).handle.as_mut() {
            handle.stop();
        }

        if let Some(mut task) = self.task.take() {
            if tokio::time::timeout(grace, &mut task).await.is_err() {
                log::debug!("Recorder: recognizer did not end within {:?}", grace);
                task.abort();
            }
        }

        let transcript = {
            let mut state = lock(&self.state);
            state.live = false;
            if let Some(mut handle) = state.handle.take() {
                handle.abort();
            }
            std::mem::take(&mut state.transcript)
        };

        let transcript = transcript.trim();
        if transcript.is_empty() {
            Err(ClassifiedError::EmptyResult)
        } else {
            Ok(transcript.to_string())
        }
    }
}

impl Drop for RecognizerOnlyCapture {
    fn drop(&mut self) {
        {
            let mut state = lock(&self.state);
            state.live = false;
            if let Some(mut handle) = state.handle.take() {
                handle.abort();
            }
        }
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn consume(
    mut events: mpsc::UnboundedReceiver<RecognitionEvent>,
    state: Arc<Mutex<SoleState>>,
    on_failure: FailureHook,
) {
    while let Some(event) = events.recv().await {
        match event {
            RecognitionEvent::Final(text) => {
                let mut guard = lock(&state);
                if !guard.live {
                    return;
                }
                guard.transcript = text;
            }
            // Our own stop/abort, not a failure.
            RecognitionEvent::Error(RecognizerError::Aborted) => {}
            RecognitionEvent::Error(e) => {
                {
                    let mut guard = lock(&state);
                    if !guard.live {
                        return;
                    }
                    guard.live = false;
                }
                log::warn!("Recorder: recognizer failed: {}", e);
                on_failure(e.classify());
                return;
            }
            RecognitionEvent::End => return,
        }
    }
}
