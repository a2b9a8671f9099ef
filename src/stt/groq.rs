//! Groq Whisper API transcription client.

use super::{SttError, TranscriptionClient, TranscriptionResult};
use crate::audio::encoding::EncodedAudio;
use async_trait::async_trait;
use reqwest::multipart;
use std::time::Duration;

const GROQ_TRANSCRIPTIONS_URL: &str = "https://api.groq.com/openai/v1/audio/transcriptions";
const DEFAULT_MODEL: &str = "whisper-large-v3";

/// Groq Whisper API client for speech-to-text
pub struct GroqSttClient {
    client: reqwest::Client,
    api_key: String,
    model: String,
    url: String,
}

impl GroqSttClient {
    /// Create a new Groq client
    ///
    /// # Arguments
    /// * `api_key` - Groq API key
    /// * `model` - Model to use (defaults to "whisper-large-v3")
    /// * `timeout` - Upper bound for the whole request
    pub fn new(api_key: String, model: Option<String>, timeout: Duration) -> Result<Self, SttError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, api_key, model))
    }

    /// Create a new client with a custom HTTP client
    pub fn with_client(client: reqwest::Client, api_key: String, model: Option<String>) -> Self {
        Self {
            client,
            api_key,
            model: model
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            url: GROQ_TRANSCRIPTIONS_URL.to_string(),
        }
    }

    /// Point the client at a different OpenAI-compatible endpoint.
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }
}

#[async_trait]
impl TranscriptionClient for GroqSttClient {
    async fn transcribe(&self, audio: &EncodedAudio) -> Result<TranscriptionResult, SttError> {
        let part = multipart::Part::bytes(audio.bytes.clone())
            .file_name(audio.file_name())
            .mime_str(&audio.mime_type)
            .map_err(|e| SttError::Audio(format!("Failed to create multipart: {}", e)))?;

        let form = multipart::Form::new()
            .part("file", part)
            .text("model", self.model.clone())
            .text("response_format", "json");

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| if e.is_timeout() { SttError::Timeout } else { SttError::Network(e) })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(SttError::Api {
                status: status.as_u16(),
                code: "GROQ_API_ERROR".to_string(),
                message: error_text,
            });
        }

        let result: serde_json::Value = response
            .json()
            .await
            .map_err(|e| SttError::InvalidResponse(e.to_string()))?;
        let text = result["text"].as_str().unwrap_or("");
        let duration = result["duration"].as_f64();

        Ok(TranscriptionResult::from_text(text, duration))
    }

    fn name(&self) -> &'static str {
        "groq"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Bytes;
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Json, Router};

    fn client(model: Option<&str>) -> GroqSttClient {
        GroqSttClient::new(
            "test-key".to_string(),
            model.map(String::from),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}/openai/v1/audio/transcriptions", addr)
    }

    fn wav() -> EncodedAudio {
        EncodedAudio {
            bytes: b"RIFF....WAVE".to_vec(),
            mime_type: "audio/wav".to_string(),
        }
    }

    #[test]
    fn test_client_creation() {
        let c = client(None);
        assert_eq!(c.name(), "groq");
        assert_eq!(c.model, "whisper-large-v3");
        assert_eq!(c.url, GROQ_TRANSCRIPTIONS_URL);
    }

    #[test]
    fn test_client_with_custom_model() {
        assert_eq!(client(Some("whisper-large-v3-turbo")).model, "whisper-large-v3-turbo");
        assert_eq!(client(Some("  ")).model, "whisper-large-v3");
    }

    #[tokio::test]
    async fn test_transcribe_sends_file_and_model() {
        let router = Router::new().route(
            "/openai/v1/audio/transcriptions",
            post(|body: Bytes| async move {
                let body = String::from_utf8_lossy(&body);
                assert!(body.contains(r#"name="file""#));
                assert!(body.contains(r#"filename="recording.wav""#));
                assert!(body.contains("whisper-large-v3"));
                Json(serde_json::json!({"text": " hi there ", "duration": 2.5}))
            }),
        );
        let url = serve(router).await;

        let result = client(None).with_url(url).transcribe(&wav()).await.unwrap();
        assert_eq!(result.text, "hi there");
        assert_eq!(result.duration_seconds, Some(2.5));
    }

    #[tokio::test]
    async fn test_api_error_is_reported() {
        let router = Router::new().route(
            "/openai/v1/audio/transcriptions",
            post(|| async { (StatusCode::UNAUTHORIZED, "invalid api key") }),
        );
        let url = serve(router).await;

        let err = client(None).with_url(url).transcribe(&wav()).await.unwrap_err();
        assert!(matches!(
            err,
            SttError::Api { status: 401, ref code, ref message }
                if code == "GROQ_API_ERROR" && message == "invalid api key"
        ));
    }
}
