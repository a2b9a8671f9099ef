//! Remote speech-to-text clients.
//!
//! A [`TranscriptionClient`] uploads one assembled recording and returns the
//! text. Two backends exist: the companion REST gateway and Groq's Whisper
//! endpoint called directly.

mod gateway;
mod groq;

pub use gateway::GatewaySttClient;
pub use groq::GroqSttClient;

use crate::audio::encoding::EncodedAudio;
use crate::config::{SttConfig, SttProviderKind};
use crate::error::ClassifiedError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// The text produced for one capture session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptionResult {
    pub text: String,
    pub is_empty: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f64>,
}

impl TranscriptionResult {
    /// Build a result from raw text, trimming surrounding whitespace.
    pub fn from_text(text: &str, duration_seconds: Option<f64>) -> Self {
        let text = text.trim().to_string();
        Self {
            is_empty: text.is_empty(),
            text,
            duration_seconds,
        }
    }
}

/// Errors that can occur during remote transcription
#[derive(Debug, thiserror::Error)]
pub enum SttError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("API error ({status}, {code}): {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Audio processing error: {0}")]
    Audio(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Timeout: transcription took too long")]
    Timeout,
}

impl SttError {
    /// Every remote failure is a network failure to the caller; the detail
    /// travels in the message.
    pub fn classify(&self) -> ClassifiedError {
        ClassifiedError::NetworkFailure(self.to_string())
    }
}

/// A remote transcription backend
#[async_trait]
pub trait TranscriptionClient: Send + Sync {
    /// Upload `audio` and return its transcript.
    ///
    /// A service-reported "no speech" is an `Ok` result with `is_empty` set.
    async fn transcribe(&self, audio: &EncodedAudio) -> Result<TranscriptionResult, SttError>;

    /// Get the name of this client
    fn name(&self) -> &'static str;
}

/// Build the client selected by `config`.
pub fn create_client(
    config: &SttConfig,
    timeout: Duration,
) -> Result<Arc<dyn TranscriptionClient>, SttError> {
    let client: Arc<dyn TranscriptionClient> = match config.provider {
        SttProviderKind::Gateway => Arc::new(GatewaySttClient::new(
            &config.endpoint,
            config.api_key.clone(),
            timeout,
        )?),
        SttProviderKind::Groq => {
            let api_key = config
                .api_key
                .clone()
                .filter(|k| !k.trim().is_empty())
                .ok_or_else(|| SttError::Config("Groq API key is not set".to_string()))?;
            Arc::new(GroqSttClient::new(api_key, config.model.clone(), timeout)?)
        }
    };

    log::info!("STT: using {} backend", client.name());
    Ok(client)
}
