//! Caller interface for the embedding UI.
//!
//! [`VoiceRecorder`] wraps a [`SessionController`] with plain closures for
//! results, so a prompt composer only deals with text and classified errors.

use crate::config::RecorderConfig;
use crate::controller::{RecordingState, SessionController, SessionObserver, SessionStatus};
use crate::error::ClassifiedError;
use crate::platform::Platform;
use crate::stt::{self, SttError, TranscriptionClient, TranscriptionResult};
use std::sync::Arc;

/// Outcome callbacks supplied by the embedder.
pub struct RecorderCallbacks {
    pub on_transcription: Box<dyn Fn(String) + Send + Sync>,
    pub on_error: Box<dyn Fn(ClassifiedError) + Send + Sync>,
}

impl RecorderCallbacks {
    pub fn new<T, E>(on_transcription: T, on_error: E) -> Self
    where
        T: Fn(String) + Send + Sync + 'static,
        E: Fn(ClassifiedError) + Send + Sync + 'static,
    {
        Self {
            on_transcription: Box::new(on_transcription),
            on_error: Box::new(on_error),
        }
    }
}

impl SessionObserver for RecorderCallbacks {
    fn on_transcription(&self, result: &TranscriptionResult) {
        (self.on_transcription)(result.text.clone());
    }

    fn on_error(&self, error: &ClassifiedError) {
        (self.on_error)(error.clone());
    }
}

/// Voice memo recorder
#[derive(Clone)]
pub struct VoiceRecorder {
    controller: SessionController,
}

impl VoiceRecorder {
    pub fn new(
        config: RecorderConfig,
        platform: Platform,
        transcriber: Arc<dyn TranscriptionClient>,
        callbacks: RecorderCallbacks,
    ) -> Self {
        Self {
            controller: SessionController::new(config, platform, transcriber, Arc::new(callbacks)),
        }
    }

    /// Build a recorder whose remote client is chosen by `config.stt`.
    pub fn from_config(
        config: RecorderConfig,
        platform: Platform,
        callbacks: RecorderCallbacks,
    ) -> Result<Self, SttError> {
        let transcriber = stt::create_client(&config.stt, config.transcription_timeout())?;
        Ok(Self::new(config, platform, transcriber, callbacks))
    }

    /// Begin a capture session. Failures surface through `on_error`.
    pub async fn start_recording(&self) {
        self.controller.start().await;
    }

    /// Stop recording and wait for the outcome. Does nothing unless recording.
    pub async fn stop_recording(&self) {
        self.controller.stop().await;
    }

    /// Force idle and release everything.
    pub fn reset(&self) {
        self.controller.reset();
    }

    pub fn state(&self) -> RecordingState {
        self.controller.state()
    }

    pub fn is_recording(&self) -> bool {
        self.controller.is_recording()
    }

    pub fn is_processing(&self) -> bool {
        self.controller.is_processing()
    }

    pub fn elapsed_seconds(&self) -> u64 {
        self.controller.elapsed_seconds()
    }

    pub fn last_error(&self) -> Option<ClassifiedError> {
        self.controller.last_error()
    }

    pub fn status(&self) -> SessionStatus {
        self.controller.status()
    }
}
