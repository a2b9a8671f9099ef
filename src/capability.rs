//! Capture strategy selection from runtime capability flags.

use crate::error::ClassifiedError;
use serde::{Deserialize, Serialize};

/// What the current platform can do, as reported by the platform layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilityFlags {
    /// A local audio encoder (microphone recorder) is available.
    pub encoder_capable: bool,
    /// The capture API is reachable over a secure transport.
    pub secure_context: bool,
    /// An on-device speech recognizer is available.
    pub recognizer_capable: bool,
}

/// How a capture session obtains its transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureStrategy {
    /// Record compressed audio locally and transcribe it remotely, with the
    /// on-device recognizer running as a backup.
    PrimaryEncoder,
    /// Use the on-device recognizer as the only transcript source.
    RecognizerOnly,
    /// No usable capture path.
    Unsupported,
}

/// Pick a strategy for the given flags.
pub fn select_strategy(flags: CapabilityFlags) -> CaptureStrategy {
    if flags.encoder_capable && flags.secure_context {
        CaptureStrategy::PrimaryEncoder
    } else if flags.recognizer_capable {
        CaptureStrategy::RecognizerOnly
    } else {
        CaptureStrategy::Unsupported
    }
}

impl CapabilityFlags {
    /// Resolve a usable strategy, or the error to report when there is none.
    ///
    /// An encoder that is only blocked by an insecure context is reported as
    /// [`ClassifiedError::InsecureContext`] so the UI can tell the user why.
    pub fn require_strategy(self) -> Result<CaptureStrategy, ClassifiedError> {
        match select_strategy(self) {
            CaptureStrategy::Unsupported if self.encoder_capable && !self.secure_context => {
                Err(ClassifiedError::InsecureContext)
            }
            CaptureStrategy::Unsupported => Err(ClassifiedError::Unsupported),
            strategy => Ok(strategy),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flags(encoder: bool, secure: bool, recognizer: bool) -> CapabilityFlags {
        CapabilityFlags {
            encoder_capable: encoder,
            secure_context: secure,
            recognizer_capable: recognizer,
        }
    }

    #[test]
    fn test_decision_table() {
        let cases = [
            (flags(true, true, true), CaptureStrategy::PrimaryEncoder),
            (flags(true, true, false), CaptureStrategy::PrimaryEncoder),
            (flags(true, false, true), CaptureStrategy::RecognizerOnly),
            (flags(false, true, true), CaptureStrategy::RecognizerOnly),
            (flags(false, false, true), CaptureStrategy::RecognizerOnly),
            (flags(true, false, false), CaptureStrategy::Unsupported),
            (flags(false, true, false), CaptureStrategy::Unsupported),
            (flags(false, false, false), CaptureStrategy::Unsupported),
        ];

        for (input, expected) in cases {
            assert_eq!(select_strategy(input), expected, "flags: {:?}", input);
        }
    }

    #[test]
    fn test_insecure_context_reported_for_blocked_encoder() {
        assert_eq!(
            flags(true, false, false).require_strategy(),
            Err(ClassifiedError::InsecureContext)
        );
    }

    #[test]
    fn test_unsupported_without_any_capability() {
        assert_eq!(
            CapabilityFlags::default().require_strategy(),
            Err(ClassifiedError::Unsupported)
        );
        assert_eq!(
            flags(false, true, false).require_strategy(),
            Err(ClassifiedError::Unsupported)
        );
    }

    #[test]
    fn test_insecure_context_with_recognizer_falls_back() {
        assert_eq!(
            flags(true, false, true).require_strategy(),
            Ok(CaptureStrategy::RecognizerOnly)
        );
    }
}
