//! Application configuration
//!
//! Defaults, overridden by an optional TOML file, overridden by the process
//! environment. The only required value is the API credential, which comes
//! exclusively from `GEMINI_API_KEY` (a `.env` file is honored); its absence
//! is detected before any session start and surfaced as a warning, never a
//! crash.

use serde::Deserialize;
use std::path::PathBuf;

use crate::constants::{DEFAULT_CHAT_MODEL, DEFAULT_LIVE_MODEL, DEFAULT_VOICE};
use crate::error::ConfigError;
use crate::session::retry::RetryPolicy;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// API credential. Environment only, never read from the config file.
    #[serde(skip)]
    pub api_key: Option<String>,

    /// Model for the live voice session
    pub live_model: String,

    /// Model for the text chat
    pub chat_model: String,

    /// Prebuilt voice name for synthesized speech
    pub voice: String,

    /// Reconnection backoff policy
    pub retry: RetryPolicy,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            live_model: DEFAULT_LIVE_MODEL.to_string(),
            chat_model: DEFAULT_CHAT_MODEL.to_string(),
            voice: DEFAULT_VOICE.to_string(),
            retry: RetryPolicy::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration: defaults -> optional config file -> environment.
    pub fn load() -> Self {
        let _ = dotenvy::dotenv();

        let mut config = config_file_path()
            .and_then(|path| Self::from_file(&path))
            .unwrap_or_default();

        config.api_key = std::env::var("GEMINI_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty());
        config
    }

    fn from_file(path: &PathBuf) -> Option<Self> {
        let raw = std::fs::read_to_string(path).ok()?;
        match toml::from_str::<Self>(&raw) {
            Ok(config) => {
                tracing::debug!(path = %path.display(), "loaded config file");
                Some(config)
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), "ignoring invalid config file: {}", e);
                None
            }
        }
    }

    pub fn has_credential(&self) -> bool {
        self.api_key.is_some()
    }

    /// The credential, or the error session start refuses with
    pub fn require_api_key(&self) -> Result<String, ConfigError> {
        self.api_key.clone().ok_or(ConfigError::CredentialMissing)
    }
}

/// `$STUDY_VOICE_CONFIG`, or the platform config dir
fn config_file_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("STUDY_VOICE_CONFIG") {
        return Some(PathBuf::from(path));
    }
    directories::ProjectDirs::from("", "", "study-voice")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert!(!config.has_credential());
        assert_eq!(config.voice, "Kore");
        assert_eq!(config.retry.max_attempts, 5);
    }

    #[test]
    fn test_missing_credential_refuses() {
        let config = AppConfig::default();
        assert!(matches!(
            config.require_api_key(),
            Err(ConfigError::CredentialMissing)
        ));
    }

    #[test]
    fn test_toml_overrides() {
        let config: AppConfig = toml::from_str(
            r#"
            voice = "Puck"

            [retry]
            max_attempts = 3
            "#,
        )
        .unwrap();
        assert_eq!(config.voice, "Puck");
        assert_eq!(config.retry.max_attempts, 3);
        // Untouched fields keep their defaults
        assert_eq!(config.chat_model, DEFAULT_CHAT_MODEL);
        assert!(config.api_key.is_none());
    }
}
