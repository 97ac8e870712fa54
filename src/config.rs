use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, warn};

/// Default transcription model: file-job class, uploaded and polled remotely.
pub const DEFAULT_AUDIO_MODEL: &str = "qwen3-asr-flash-filetrans";

/// Default text-generation model for notes.
pub const DEFAULT_TEXT_MODEL: &str = "qwen-max-latest";

/// Process-level settings, loaded from `tubenote.toml` with env overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Base directory for sessions, audio artifacts and credentials
    pub data_dir: PathBuf,

    /// HTTP API listen port
    pub port: u16,

    /// Base URL of the remote speech/LLM endpoint family
    pub base_url: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            port: 8000,
            base_url: crate::qwen::DEFAULT_BASE_URL.to_string(),
        }
    }
}

impl Settings {
    /// Load settings from the first parseable config file, falling back to
    /// defaults, then apply environment overrides.
    pub fn load() -> Self {
        let config_paths = ["tubenote.toml", "config/tubenote.toml"];

        let mut settings = Settings::default();
        for path in &config_paths {
            if let Ok(config_str) = std::fs::read_to_string(path) {
                match toml::from_str(&config_str) {
                    Ok(parsed) => {
                        info!("📄 Loaded configuration from: {}", path);
                        settings = parsed;
                        break;
                    }
                    Err(e) => {
                        warn!("Failed to parse config file {}: {}", path, e);
                    }
                }
            }
        }

        if let Ok(data_dir) = std::env::var("TUBENOTE_DATA_DIR") {
            settings.data_dir = PathBuf::from(data_dir);
        }
        if let Ok(port) = std::env::var("TUBENOTE_PORT") {
            match port.parse() {
                Ok(port) => settings.port = port,
                Err(_) => warn!("Ignoring non-numeric TUBENOTE_PORT: {}", port),
            }
        }
        if let Ok(base_url) = std::env::var("DASHSCOPE_BASE_URL") {
            settings.base_url = base_url;
        }

        settings
    }
}

/// Persisted provider credentials plus the model pair they were validated for.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub api_key: String,
    pub audio_model: String,
    pub text_model: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Loads and saves [`Credentials`] at `{data_dir}/config.json`.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join("config.json"),
        }
    }

    /// Returns the stored credentials, or `None` when none were saved yet.
    /// Unreadable files are treated as absent.
    pub async fn load(&self) -> Option<Credentials> {
        let content = fs::read_to_string(&self.path).await.ok()?;
        match serde_json::from_str(&content) {
            Ok(credentials) => Some(credentials),
            Err(e) => {
                warn!(
                    "Ignoring malformed credentials file {}: {}",
                    self.path.display(),
                    e
                );
                None
            }
        }
    }

    /// Save a validated API key together with the default model pair,
    /// preserving the original creation timestamp on overwrite.
    pub async fn save(&self, api_key: &str) -> Result<Credentials> {
        let now = Utc::now();
        let created_at = self.load().await.map(|c| c.created_at).unwrap_or(now);
        let credentials = Credentials {
            api_key: api_key.to_string(),
            audio_model: DEFAULT_AUDIO_MODEL.to_string(),
            text_model: DEFAULT_TEXT_MODEL.to_string(),
            created_at,
            updated_at: now,
        };

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let content = serde_json::to_string_pretty(&credentials)?;
        fs::write(&self.path, content)
            .await
            .with_context(|| format!("failed to write {}", self.path.display()))?;

        Ok(credentials)
    }
}

/// Mask an API key for display: first and last four characters only.
pub fn masked_key(key: &str) -> String {
    if key.len() >= 8 {
        format!("{}****{}", &key[..4], &key[key.len() - 4..])
    } else {
        "****".to_string()
    }
}

/// How a failed credential-validation call should be reported to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialFault {
    QuotaExceeded,
    InvalidKey,
}

/// Classify a provider error message from a validation call.
pub fn classify_credential_error(message: &str) -> CredentialFault {
    if message.contains("Throttling.AllocationQuota") {
        CredentialFault::QuotaExceeded
    } else {
        CredentialFault::InvalidKey
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_masked_key() {
        assert_eq!(masked_key("sk-abcdef123456"), "sk-a****3456");
        assert_eq!(masked_key("short"), "****");
    }

    #[test]
    fn test_classify_credential_error() {
        assert_eq!(
            classify_credential_error("dashscope error 429: Throttling.AllocationQuota exceeded"),
            CredentialFault::QuotaExceeded
        );
        assert_eq!(
            classify_credential_error("dashscope error 401: InvalidApiKey"),
            CredentialFault::InvalidKey
        );
    }

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.port, 8000);
        assert_eq!(settings.base_url, crate::qwen::DEFAULT_BASE_URL);
    }

    #[tokio::test]
    async fn test_credential_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::new(dir.path());

        assert!(store.load().await.is_none());

        let saved = store.save("sk-test-key-123456").await.unwrap();
        assert_eq!(saved.audio_model, DEFAULT_AUDIO_MODEL);
        assert_eq!(saved.text_model, DEFAULT_TEXT_MODEL);

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded.api_key, "sk-test-key-123456");
        assert_eq!(loaded.created_at, saved.created_at);
    }
}
