//! Recorder configuration.
//!
//! Defaults describe the behaviour the prompt composer expects (500 ms
//! minimum, 120 s maximum, one-second ticks and chunks). A JSON file and a
//! handful of environment variables can override them.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::audio::encoding::DEFAULT_MIME_PRIORITY;
use crate::recognizer::RecognizerOptions;

// ============================================================================
// DEFAULTS
// ============================================================================

/// Recordings shorter than this are rejected without transcription.
pub const DEFAULT_MIN_DURATION_MS: u64 = 500;

/// Recording is stopped automatically after this long.
pub const DEFAULT_MAX_DURATION_SECS: u64 = 120;

/// Largest accepted `maxDurationSecs` (one day).
pub const MAX_DURATION_LIMIT_SECS: u64 = 24 * 60 * 60;

/// Elapsed-time display refresh.
pub const DEFAULT_TICK_INTERVAL_MS: u64 = 1000;

/// Requested encoder chunk size.
pub const DEFAULT_CHUNK_INTERVAL_MS: u64 = 1000;

/// How long the error state is shown before returning to idle.
pub const DEFAULT_ERROR_RESET_DELAY_MS: u64 = 3000;

/// Upper bound on a single remote transcription round trip.
pub const DEFAULT_TRANSCRIPTION_TIMEOUT_SECS: u64 = 30;

/// How long a recognizer-only session waits for final results after stop.
pub const DEFAULT_RECOGNIZER_FINALIZE_MS: u64 = 2000;

/// How many consecutive immediate ends the backup recognizer tolerates before
/// giving up. Ordinary silence timeouts are always restarted.
pub const DEFAULT_MAX_BACKUP_RESTARTS: u32 = 3;

pub const DEFAULT_LANGUAGE: &str = "en-US";

pub const DEFAULT_GATEWAY_ENDPOINT: &str = "http://127.0.0.1:3456";

pub const CONFIG_DIR_NAME: &str = "voice-memo";
pub const CONFIG_FILE_NAME: &str = "config.json";

// ============================================================================

/// Errors raised while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Which remote backend transcribes the primary-strategy audio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SttProviderKind {
    /// The companion REST gateway (`POST /api/transcribe`).
    #[default]
    Gateway,
    /// Groq's Whisper endpoint, called directly.
    Groq,
}

/// Remote transcription settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SttConfig {
    pub provider: SttProviderKind,
    /// Gateway base URL. Ignored by the Groq provider.
    pub endpoint: String,
    /// Bearer token for the gateway, or the Groq API key.
    pub api_key: Option<String>,
    /// Model override (Groq only).
    pub model: Option<String>,
}

impl Default for SttConfig {
    fn default() -> Self {
        Self {
            provider: SttProviderKind::Gateway,
            endpoint: DEFAULT_GATEWAY_ENDPOINT.to_string(),
            api_key: None,
            model: None,
        }
    }
}

/// Configuration for the recording session controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RecorderConfig {
    pub min_duration_ms: u64,
    pub max_duration_secs: u64,
    pub tick_interval_ms: u64,
    pub chunk_interval_ms: u64,
    pub error_reset_delay_ms: u64,
    pub transcription_timeout_secs: u64,
    pub recognizer_finalize_ms: u64,
    pub max_backup_restarts: u32,
    /// BCP-47 language tag handed to the on-device recognizer.
    pub language: String,
    /// Encoder MIME types in order of preference.
    pub mime_priority: Vec<String>,
    pub stt: SttConfig,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            min_duration_ms: DEFAULT_MIN_DURATION_MS,
            max_duration_secs: DEFAULT_MAX_DURATION_SECS,
            tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
            chunk_interval_ms: DEFAULT_CHUNK_INTERVAL_MS,
            error_reset_delay_ms: DEFAULT_ERROR_RESET_DELAY_MS,
            transcription_timeout_secs: DEFAULT_TRANSCRIPTION_TIMEOUT_SECS,
            recognizer_finalize_ms: DEFAULT_RECOGNIZER_FINALIZE_MS,
            max_backup_restarts: DEFAULT_MAX_BACKUP_RESTARTS,
            language: DEFAULT_LANGUAGE.to_string(),
            mime_priority: DEFAULT_MIME_PRIORITY.iter().map(|s| s.to_string()).collect(),
            stt: SttConfig::default(),
        }
    }
}

impl RecorderConfig {
    /// Load configuration from `path`, or from the default location when
    /// `path` is `None`, then apply environment overrides.
    ///
    /// A missing default file is not an error; a missing explicit file is.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match default_config_path() {
                Some(path) if path.exists() => Self::from_file(&path)?,
                _ => Self::default(),
            },
        };

        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Parse a JSON config file. Unspecified fields keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply `VOICE_MEMO_ENDPOINT`, `VOICE_MEMO_TOKEN` and `GROQ_API_KEY`.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(endpoint) = non_empty("VOICE_MEMO_ENDPOINT") {
            self.stt.endpoint = endpoint;
        }

        match self.stt.provider {
            SttProviderKind::Gateway => {
                if let Some(token) = non_empty("VOICE_MEMO_TOKEN") {
                    self.stt.api_key = Some(token);
                }
            }
            SttProviderKind::Groq => {
                if let Some(key) = non_empty("GROQ_API_KEY") {
                    self.stt.api_key = Some(key);
                }
            }
        }
    }

    /// Reject settings the controller cannot honour.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_interval_ms == 0 {
            return Err(ConfigError::Invalid("tickIntervalMs must be positive".into()));
        }
        if self.chunk_interval_ms == 0 {
            return Err(ConfigError::Invalid("chunkIntervalMs must be positive".into()));
        }
        if self.max_duration_secs == 0 || self.max_duration_secs > MAX_DURATION_LIMIT_SECS {
            return Err(ConfigError::Invalid(format!(
                "maxDurationSecs must be between 1 and {}",
                MAX_DURATION_LIMIT_SECS
            )));
        }
        if self.min_duration_ms >= self.max_duration_secs.saturating_mul(1000) {
            return Err(ConfigError::Invalid(format!(
                "minDurationMs ({}) must be below maxDurationSecs ({})",
                self.min_duration_ms, self.max_duration_secs
            )));
        }
        if self.transcription_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "transcriptionTimeoutSecs must be positive".into(),
            ));
        }
        if self.mime_priority.iter().all(|m| m.trim().is_empty()) {
            return Err(ConfigError::Invalid("mimePriority must not be empty".into()));
        }
        if self.stt.provider == SttProviderKind::Gateway && self.stt.endpoint.trim().is_empty() {
            return Err(ConfigError::Invalid("stt.endpoint must be set".into()));
        }
        Ok(())
    }

    pub fn min_duration(&self) -> Duration {
        Duration::from_millis(self.min_duration_ms)
    }

    pub fn max_duration(&self) -> Duration {
        Duration::from_secs(self.max_duration_secs)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    pub fn chunk_interval(&self) -> Duration {
        Duration::from_millis(self.chunk_interval_ms.max(1))
    }

    pub fn error_reset_delay(&self) -> Duration {
        Duration::from_millis(self.error_reset_delay_ms)
    }

    pub fn transcription_timeout(&self) -> Duration {
        Duration::from_secs(self.transcription_timeout_secs)
    }

    pub fn recognizer_finalize_timeout(&self) -> Duration {
        Duration::from_millis(self.recognizer_finalize_ms)
    }

    /// Options for a continuous, final-results-only recognizer session.
    pub fn recognizer_options(&self) -> RecognizerOptions {
        RecognizerOptions {
            language: self.language.clone(),
            continuous: true,
            interim_results: false,
        }
    }
}

/// `<config dir>/voice-memo/config.json`, if the platform has a config dir.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = RecorderConfig::default();
        assert_eq!(config.min_duration(), Duration::from_millis(500));
        assert_eq!(config.max_duration(), Duration::from_secs(120));
        assert_eq!(config.tick_interval(), Duration::from_secs(1));
        assert_eq!(config.transcription_timeout(), Duration::from_secs(30));
        assert_eq!(config.mime_priority[0], "audio/webm;codecs=opus");
        assert_eq!(config.stt.provider, SttProviderKind::Gateway);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: RecorderConfig = serde_json::from_str(
            r#"{"maxDurationSecs": 60, "stt": {"provider": "groq", "model": "whisper-large-v3-turbo"}}"#,
        )
        .unwrap();

        assert_eq!(config.max_duration_secs, 60);
        assert_eq!(config.min_duration_ms, DEFAULT_MIN_DURATION_MS);
        assert_eq!(config.stt.provider, SttProviderKind::Groq);
        assert_eq!(config.stt.model.as_deref(), Some("whisper-large-v3-turbo"));
        assert_eq!(config.stt.endpoint, DEFAULT_GATEWAY_ENDPOINT);
    }

    #[test]
    fn test_load_explicit_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"errorResetDelayMs": 1500, "language": "de-DE"}}"#).unwrap();

        let config = RecorderConfig::from_file(file.path()).unwrap();
        assert_eq!(config.error_reset_delay(), Duration::from_millis(1500));
        assert_eq!(config.recognizer_options().language, "de-DE");
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = RecorderConfig::load(Some(&dir.path().join("nope.json")));
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn test_malformed_file_is_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{not json").unwrap();
        assert!(matches!(
            RecorderConfig::from_file(file.path()),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("VOICE_MEMO_ENDPOINT", "https://gateway.example"),
            ("VOICE_MEMO_TOKEN", "secret"),
            ("GROQ_API_KEY", "gsk_test"),
        ]
        .into_iter()
        .collect();
        let lookup = |key: &str| env.get(key).map(|v| v.to_string());

        let mut gateway = RecorderConfig::default();
        gateway.apply_overrides(lookup);
        assert_eq!(gateway.stt.endpoint, "https://gateway.example");
        assert_eq!(gateway.stt.api_key.as_deref(), Some("secret"));

        let mut groq = RecorderConfig::default();
        groq.stt.provider = SttProviderKind::Groq;
        groq.apply_overrides(lookup);
        assert_eq!(groq.stt.api_key.as_deref(), Some("gsk_test"));
    }

    #[test]
    fn test_blank_env_values_ignored() {
        let mut config = RecorderConfig::default();
        config.apply_overrides(|_| Some("   ".to_string()));
        assert_eq!(config.stt.endpoint, DEFAULT_GATEWAY_ENDPOINT);
        assert!(config.stt.api_key.is_none());
    }

    #[test]
    fn test_validate_rejects_bad_durations() {
        let config = RecorderConfig {
            min_duration_ms: 5_000,
            max_duration_secs: 5,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let config = RecorderConfig {
            max_duration_secs: u64::MAX,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let config = RecorderConfig {
            tick_interval_ms: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = RecorderConfig {
            mime_priority: vec![],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
