//! On-device speech recognition.
//!
//! The platform layer supplies a [`SpeechRecognizer`]. Each started session
//! reports events on a channel: finalized transcript updates, errors, and a
//! terminal [`RecognitionEvent::End`].

mod backup;

pub use backup::BackupRecognizer;

use crate::error::ClassifiedError;
use tokio::sync::mpsc;

/// Errors reported by an on-device recognizer
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecognizerError {
    #[error("Speech recognition permission denied")]
    NotAllowed,

    #[error("No speech detected")]
    NoSpeech,

    #[error("Audio capture failed")]
    AudioCapture,

    #[error("Recognition service unreachable")]
    Network,

    #[error("Recognition aborted")]
    Aborted,

    #[error("Recognition error: {0}")]
    Other(String),
}

impl RecognizerError {
    /// Map to the caller-facing error when the recognizer is the only
    /// transcript source.
    pub fn classify(&self) -> ClassifiedError {
        match self {
            RecognizerError::NotAllowed => ClassifiedError::PermissionDenied,
            RecognizerError::NoSpeech => ClassifiedError::EmptyResult,
            other => ClassifiedError::Unknown(other.to_string()),
        }
    }
}

/// Events emitted by a recognition session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionEvent {
    /// The full finalized transcript so far. Replaces any earlier value.
    Final(String),
    Error(RecognizerError),
    /// The session is over; no further events follow.
    End,
}

/// Settings for a recognition session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecognizerOptions {
    pub language: String,
    pub continuous: bool,
    pub interim_results: bool,
}

/// Control handle for a running recognition session.
pub trait RecognitionHandle: Send {
    /// Finish gracefully. Pending results are delivered before `End`.
    fn stop(&mut self);

    /// Tear down immediately, discarding pending results.
    fn abort(&mut self);
}

/// A running recognition session.
pub struct RecognitionSession {
    pub events: mpsc::UnboundedReceiver<RecognitionEvent>,
    pub handle: Box<dyn RecognitionHandle>,
}

/// A platform speech recognizer.
pub trait SpeechRecognizer: Send + Sync {
    /// Start a new recognition session.
    ///
    /// Permission problems may be reported here or, asynchronously, as the
    /// first event of the session.
    fn start(&self, options: &RecognizerOptions) -> Result<RecognitionSession, RecognizerError>;

    /// Get the name of this recognizer
    fn name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert_eq!(
            RecognizerError::NotAllowed.classify(),
            ClassifiedError::PermissionDenied
        );
        assert_eq!(
            RecognizerError::NoSpeech.classify(),
            ClassifiedError::EmptyResult
        );
        assert_eq!(
            RecognizerError::Network.classify(),
            ClassifiedError::Unknown("Recognition service unreachable".to_string())
        );
        assert!(matches!(
            RecognizerError::Other("engine crashed".into()).classify(),
            ClassifiedError::Unknown(msg) if msg.contains("engine crashed")
        ));
    }
}
