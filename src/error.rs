//! Caller-facing error classification.
//!
//! Every failure a capture session can surface to the embedding UI is one of
//! the [`ClassifiedError`] variants. Lower layers (microphone, recognizer,
//! remote client) keep their own error types and are mapped into this set at
//! the controller boundary.

use serde::Serialize;

/// The closed set of errors reported through `on_error`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum ClassifiedError {
    #[error("Microphone access was denied")]
    PermissionDenied,

    #[error("No microphone was found")]
    NoDevice,

    #[error("Voice capture requires a secure connection")]
    InsecureContext,

    #[error("Voice input is not supported on this device")]
    Unsupported,

    #[error("Recording was too short")]
    TooShort,

    #[error("No speech was detected")]
    EmptyResult,

    #[error("Transcription failed: {0}")]
    NetworkFailure(String),

    #[error("Voice input failed: {0}")]
    Unknown(String),
}

impl ClassifiedError {
    /// Stable machine-readable code, matching the serialized `kind`.
    pub fn code(&self) -> &'static str {
        match self {
            ClassifiedError::PermissionDenied => "permission_denied",
            ClassifiedError::NoDevice => "no_device",
            ClassifiedError::InsecureContext => "insecure_context",
            ClassifiedError::Unsupported => "unsupported",
            ClassifiedError::TooShort => "too_short",
            ClassifiedError::EmptyResult => "empty_result",
            ClassifiedError::NetworkFailure(_) => "network_failure",
            ClassifiedError::Unknown(_) => "unknown",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_match_serialized_kind() {
        let errors = [
            ClassifiedError::PermissionDenied,
            ClassifiedError::TooShort,
            ClassifiedError::NetworkFailure("502".to_string()),
            ClassifiedError::Unknown("boom".to_string()),
        ];

        for error in errors {
            let value = serde_json::to_value(&error).unwrap();
            assert_eq!(value["kind"], error.code());
        }
    }

    #[test]
    fn test_message_carried_for_detailed_variants() {
        let value =
            serde_json::to_value(ClassifiedError::NetworkFailure("timed out".to_string())).unwrap();
        assert_eq!(value["message"], "timed out");

        let value = serde_json::to_value(ClassifiedError::EmptyResult).unwrap();
        assert!(value.get("message").is_none());
    }
}
