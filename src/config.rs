//! Configuration types for vidgen-dl
//!
//! The caller owns the configuration; the library never reads environment
//! variables. Every field has a default except the API key.

use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

use crate::error::{Error, Result};

/// Remote service settings
#[derive(Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Bearer credential sent on every call
    #[serde(default)]
    pub api_key: String,

    /// Base URL of the video API (default: "https://api.openai.com/v1")
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Per-request timeout for submit and poll calls (default: 30 seconds)
    ///
    /// Artifact downloads are not bounded by this timeout.
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,

    /// User agent header (default: "vidgen-dl/<version>")
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl ApiConfig {
    /// Settings for the given key with every other field defaulted
    pub fn with_key(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            ..Default::default()
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: default_base_url(),
            request_timeout: default_request_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

// The key must never end up in logs.
impl std::fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiConfig")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("request_timeout", &self.request_timeout)
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

/// Polling cadence and progress presentation
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PollingConfig {
    /// Wait between successive polls of one job (default: 4 seconds)
    #[serde(default = "default_poll_interval", with = "millis_serde")]
    pub interval: Duration,

    /// Progress displayed while the job is queued (default: 5)
    #[serde(default = "default_queued_progress")]
    pub queued_progress: u8,

    /// Minimum progress displayed while rendering (default: 10)
    ///
    /// The service often reports 0 mid-render. This is a display policy only;
    /// remote progress is not assumed to be monotonic.
    #[serde(default = "default_rendering_floor")]
    pub rendering_progress_floor: u8,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval: default_poll_interval(),
            queued_progress: default_queued_progress(),
            rendering_progress_floor: default_rendering_floor(),
        }
    }
}

/// Artifact retrieval settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Chunk size for streaming downloads (default: 1 MiB)
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Directory finished artifacts are written to (None = keep in memory only)
    #[serde(default)]
    pub output_dir: Option<PathBuf>,

    /// What to do when the artifact file already exists
    #[serde(default)]
    pub file_collision: FileCollisionAction,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            output_dir: None,
            file_collision: FileCollisionAction::default(),
        }
    }
}

/// File collision handling
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileCollisionAction {
    /// Append (1), (2), etc. to the file name (default)
    #[default]
    Rename,
    /// Overwrite the existing file
    Overwrite,
    /// Fail the save
    Skip,
}

/// Main configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Remote service settings
    pub api: ApiConfig,

    /// Polling cadence
    #[serde(default)]
    pub polling: PollingConfig,

    /// Artifact retrieval
    #[serde(default)]
    pub download: DownloadConfig,

    /// Capacity of the event broadcast channel and of the tracker update channel
    /// (default: 256)
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

impl Config {
    /// Configuration for the given API key with every other field defaulted
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api: ApiConfig::with_key(api_key),
            polling: PollingConfig::default(),
            download: DownloadConfig::default(),
            event_buffer: default_event_buffer(),
        }
    }

    /// Check the configuration before any network call is made
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming the offending key.
    pub fn validate(&self) -> Result<()> {
        if self.api.api_key.trim().is_empty() {
            return Err(Error::Config {
                message: "an API key is required".to_string(),
                key: Some("api.api_key".to_string()),
            });
        }

        let url = url::Url::parse(&self.api.base_url).map_err(|e| Error::Config {
            message: format!("invalid base URL '{}': {}", self.api.base_url, e),
            key: Some("api.base_url".to_string()),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::Config {
                message: format!("unsupported URL scheme '{}'", url.scheme()),
                key: Some("api.base_url".to_string()),
            });
        }

        if self.polling.interval.is_zero() {
            return Err(Error::Config {
                message: "poll interval must be greater than zero".to_string(),
                key: Some("polling.interval".to_string()),
            });
        }

        if self.polling.queued_progress > 100 || self.polling.rendering_progress_floor > 100 {
            return Err(Error::Config {
                message: "progress values must be within 0-100".to_string(),
                key: Some("polling".to_string()),
            });
        }

        if self.download.chunk_size == 0 {
            return Err(Error::Config {
                message: "chunk size must be greater than zero".to_string(),
                key: Some("download.chunk_size".to_string()),
            });
        }

        if self.event_buffer == 0 {
            return Err(Error::Config {
                message: "event buffer must hold at least one event".to_string(),
                key: Some("event_buffer".to_string()),
            });
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(String::new())
    }
}

// Default value functions
fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_user_agent() -> String {
    format!("vidgen-dl/{}", env!("CARGO_PKG_VERSION"))
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(4)
}

fn default_queued_progress() -> u8 {
    5
}

fn default_rendering_floor() -> u8 {
    10
}

fn default_chunk_size() -> usize {
    1024 * 1024 // 1 MiB
}

fn default_event_buffer() -> usize {
    256
}

// Duration serialization helper
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// Millisecond Duration serialization helper
mod millis_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_service_behavior() {
        let config = Config::new("sk-test");
        assert_eq!(config.api.base_url, "https://api.openai.com/v1");
        assert_eq!(config.polling.interval, Duration::from_secs(4));
        assert_eq!(config.polling.queued_progress, 5);
        assert_eq!(config.polling.rendering_progress_floor, 10);
        assert_eq!(config.download.chunk_size, 1024 * 1024);
        assert_eq!(config.download.file_collision, FileCollisionAction::Rename);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn missing_api_key_is_rejected() {
        let err = Config::default().validate().unwrap_err();
        match err {
            Error::Config { key, .. } => assert_eq!(key.as_deref(), Some("api.api_key")),
            other => panic!("expected config error, got {other:?}"),
        }
    }

    #[test]
    fn bad_base_url_is_rejected() {
        let mut config = Config::new("sk-test");
        config.api.base_url = "not a url".to_string();
        assert!(config.validate().is_err());

        config.api.base_url = "ftp://example.com".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_interval_and_chunk_size_are_rejected() {
        let mut config = Config::new("sk-test");
        config.polling.interval = Duration::ZERO;
        assert!(config.validate().is_err());

        let mut config = Config::new("sk-test");
        config.download.chunk_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn debug_output_redacts_key() {
        let config = Config::new("sk-very-secret");
        let debug = format!("{:?}", config);
        assert!(!debug.contains("sk-very-secret"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn deserializes_with_defaults() {
        let json = r#"{"api":{"api_key":"sk-1"},"polling":{"interval":250}}"#;
        let config: Config = serde_json::from_str(json).expect("deserialize failed");

        assert_eq!(config.api.api_key, "sk-1");
        assert_eq!(config.api.request_timeout, Duration::from_secs(30));
        assert_eq!(
            config.polling.interval,
            Duration::from_millis(250),
            "interval is expressed in milliseconds"
        );
        assert_eq!(config.polling.queued_progress, 5);
        assert_eq!(config.event_buffer, 256);
    }

    #[test]
    fn request_timeout_serializes_as_seconds() {
        let api = ApiConfig {
            request_timeout: Duration::from_secs(45),
            ..ApiConfig::with_key("sk-1")
        };
        let json = serde_json::to_value(&api).expect("serialize failed");
        assert_eq!(json["request_timeout"], 45);
    }
}
