//! Client for the companion REST gateway's `POST /api/transcribe`.

use super::{SttError, TranscriptionClient, TranscriptionResult};
use crate::audio::encoding::EncodedAudio;
use async_trait::async_trait;
use reqwest::multipart;
use serde::Deserialize;
use std::time::Duration;

const TRANSCRIBE_PATH: &str = "/api/transcribe";

/// Longest slice of an unparseable error body kept in the message.
const MAX_ERROR_BODY_CHARS: usize = 200;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SuccessBody {
    Wrapped { data: TranscribePayload },
    Bare(TranscribePayload),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TranscribePayload {
    #[serde(default)]
    text: String,
    #[serde(default)]
    empty: bool,
    #[serde(default)]
    duration_seconds: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Gateway transcription client
pub struct GatewaySttClient {
    client: reqwest::Client,
    url: String,
    token: Option<String>,
}

impl GatewaySttClient {
    /// Create a client for the gateway at `endpoint` (scheme, host and port).
    pub fn new(endpoint: &str, token: Option<String>, timeout: Duration) -> Result<Self, SttError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, endpoint, token))
    }

    /// Create a client with a custom HTTP client
    pub fn with_client(client: reqwest::Client, endpoint: &str, token: Option<String>) -> Self {
        Self {
            client,
            url: format!("{}{}", endpoint.trim_end_matches('/'), TRANSCRIBE_PATH),
            token: token.filter(|t| !t.trim().is_empty()),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn parse_error(status: u16, body: &str) -> SttError {
        let value: Option<serde_json::Value> = serde_json::from_str(body).ok();
        let detail = value.as_ref().and_then(|v| {
            let error = v
                .get("error")
                .or_else(|| v.get("detail").and_then(|d| d.get("error")))?;
            serde_json::from_value::<ApiErrorDetail>(error.clone()).ok()
        });

        match detail {
            Some(detail) => SttError::Api {
                status,
                code: detail.code.unwrap_or_else(|| format!("HTTP_{}", status)),
                message: detail
                    .message
                    .unwrap_or_else(|| "Transcription failed".to_string()),
            },
            None => {
                let text: String = body.trim().chars().take(MAX_ERROR_BODY_CHARS).collect();
                SttError::Api {
                    status,
                    code: format!("HTTP_{}", status),
                    message: if text.is_empty() {
                        "Transcription failed".to_string()
                    } else {
                        text
                    },
                }
            }
        }
    }

    fn map_send_error(e: reqwest::Error) -> SttError {
        if e.is_timeout() {
            SttError::Timeout
        } else {
            SttError::Network(e)
        }
    }
}

#[async_trait]
impl TranscriptionClient for GatewaySttClient {
    async fn transcribe(&self, audio: &EncodedAudio) -> Result<TranscriptionResult, SttError> {
        let part = multipart::Part::bytes(audio.bytes.clone())
            .file_name(audio.file_name())
            .mime_str(&audio.mime_type)
            .map_err(|e| SttError::Audio(format!("Failed to create multipart: {}", e)))?;

        let form = multipart::Form::new().part("audio", part);

        log::debug!(
            "STT: uploading {} bytes ({}) to {}",
            audio.len(),
            audio.mime_type,
            self.url
        );

        let mut request = self.client.post(&self.url).multipart(form);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(Self::map_send_error)?;
        let status = response.status();
        let body = response.text().await.map_err(Self::map_send_error)?;

        if !status.is_success() {
            let err = Self::parse_error(status.as_u16(), &body);
            log::warn!("STT: gateway rejected upload: {}", err);
            return Err(err);
        }

        let payload = match serde_json::from_str::<SuccessBody>(&body) {
            Ok(SuccessBody::Wrapped { data }) => data,
            Ok(SuccessBody::Bare(payload)) => payload,
            Err(e) => return Err(SttError::InvalidResponse(e.to_string())),
        };

        let mut result =
            TranscriptionResult::from_text(&payload.text, payload.duration_seconds);
        result.is_empty = result.is_empty || payload.empty;
        if payload.empty {
            result.text.clear();
        }

        log::info!(
            "STT: gateway returned {} chars{}",
            result.text.len(),
            if result.is_empty { " (no speech)" } else { "" }
        );
        Ok(result)
    }

    fn name(&self) -> &'static str {
        "gateway"
    }
}
