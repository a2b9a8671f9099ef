//! Best-effort backup transcript for primary-strategy sessions.
//!
//! Runs the on-device recognizer for the whole recording. Each finalized
//! update overwrites the stored transcript. Recognizer failures are logged
//! and otherwise ignored; the transcript is only consulted when the remote
//! path fails.

use super::{RecognitionEvent, RecognitionHandle, RecognizerOptions, SpeechRecognizer};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// A session that ends sooner than this without a result counts against the
/// restart budget. Silence timeouts take several seconds and never do.
const QUICK_END: Duration = Duration::from_secs(1);

struct BackupState {
    transcript: String,
    /// Cleared when the controller leaves the recording state.
    live: bool,
    handle: Option<Box<dyn RecognitionHandle>>,
}

impl BackupState {
    fn release_handle(&mut self) {
        if let Some(mut handle) = self.handle.take() {
            handle.abort();
        }
    }
}

fn lock(state: &Mutex<BackupState>) -> MutexGuard<'_, BackupState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Handle to a running backup recognizer.
pub struct BackupRecognizer {
    state: Arc<Mutex<BackupState>>,
    task: Option<JoinHandle<()>>,
}

impl BackupRecognizer {
    /// Start recognizing. Never fails: a recognizer that cannot start simply
    /// leaves the transcript empty.
    pub fn start(
        recognizer: Arc<dyn SpeechRecognizer>,
        options: RecognizerOptions,
        max_restarts: u32,
    ) -> Self {
        let state = Arc::new(Mutex::new(BackupState {
            transcript: String::new(),
            live: true,
            handle: None,
        }));

        let events = match recognizer.start(&options) {
            Ok(session) => {
                lock(&state).handle = Some(session.handle);
                log::debug!("Backup recognizer: started ({})", recognizer.name());
                session.events
            }
            Err(e) => {
                log::debug!("Backup recognizer: failed to start: {}", e);
                return Self { state, task: None };
            }
        };

        let task = tokio::spawn(run_backup(
            recognizer,
            options,
            events,
            state.clone(),
            max_restarts,
        ));

        Self {
            state,
            task: Some(task),
        }
    }

    /// The latest finalized transcript.
    pub fn transcript(&self) -> String {
        lock(&self.state).transcript.clone()
    }

    /// Force the recognizer off and return what it heard.
    ///
    /// Updates that arrive afterwards are discarded.
    pub fn stop(mut self) -> String {
        self.shutdown()
    }

    fn shutdown(&mut self) -> String {
        let transcript = {
            let mut state = lock(&self.state);
            state.live = false;
            state.release_handle();
            std::mem::take(&mut state.transcript)
        };
        if let Some(task) = self.task.take() {
            task.abort();
        }
        transcript
    }
}

impl Drop for BackupRecognizer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn run_backup(
    recognizer: Arc<dyn SpeechRecognizer>,
    options: RecognizerOptions,
    mut events: mpsc::UnboundedReceiver<RecognitionEvent>,
    state: Arc<Mutex<BackupState>>,
    max_restarts: u32,
) {
    // Consecutive sessions that ended at once without hearing anything.
    let mut quick_ends = 0;
    let mut session_started = Instant::now();
    let mut heard = false;

    loop {
        match events.recv().await {
            Some(RecognitionEvent::Final(text)) => {
                let mut guard = lock(&state);
                if !guard.live {
                    break;
                }
                guard.transcript = text;
                heard = true;
            }
            Some(RecognitionEvent::Error(e)) => {
                log::debug!("Backup recognizer: ignoring error: {}", e);
            }
            Some(RecognitionEvent::End) | None => {
                // Platform recognizers end on their own after silence; keep
                // listening for as long as the recording lasts.
                let mut guard = lock(&state);
                if !guard.live {
                    break;
                }
                if heard || session_started.elapsed() >= QUICK_END {
                    quick_ends = 0;
                } else {
                    quick_ends += 1;
                }
                if quick_ends > max_restarts {
                    log::debug!("Backup recognizer: keeps ending immediately, giving up");
                    guard.handle = None;
                    break;
                }
                match recognizer.start(&options) {
                    Ok(session) => {
                        log::debug!("Backup recognizer: restarted");
                        guard.handle = Some(session.handle);
                        events = session.events;
                        session_started = Instant::now();
                        heard = false;
                    }
                    Err(e) => {
                        log::debug!("Backup recognizer: restart failed: {}", e);
                        guard.handle = None;
                        break;
                    }
                }
            }
        }
    }
}
