//! Capture strategies.
//!
//! - [`PrimaryCapture`]: encoded microphone audio for remote transcription,
//!   insured by a [`BackupRecognizer`](crate::recognizer::BackupRecognizer)
//! - [`RecognizerOnlyCapture`]: the on-device recognizer as sole source

pub mod primary;
pub mod recognizer_only;

pub use primary::PrimaryCapture;
pub use recognizer_only::{FailureHook, RecognizerOnlyCapture};

/// The capture resources of a session in the recording state.
pub enum ActiveCapture {
    Primary(PrimaryCapture),
    RecognizerOnly(RecognizerOnlyCapture),
}

impl ActiveCapture {
    /// Move any chunks the encoder has produced into the session buffer.
    pub fn collect_chunks(&mut self) {
        if let ActiveCapture::Primary(capture) = self {
            capture.collect();
        }
    }
}
