//! Configuration management for the artcast pipeline
//!
//! Transport and path settings come from `ARTCAST_*` environment variables;
//! taxonomy data (trigger times, blacklist rules) lives in JSON files under
//! the config directory. Invalid configuration is fatal at startup.

use crate::error::{Error, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default media extension allow-list
const DEFAULT_ALLOWED_FORMATS: &[&str] = &[".jpg", ".jpeg", ".png", ".bmp"];

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Outbound transport configuration
    pub transport: TransportConfig,

    /// Data and config file locations
    pub paths: PathsConfig,

    /// Media fingerprinting configuration
    pub media: MediaConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Transport-specific configuration shared by all outbound requests
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Minimum delay between outbound requests in seconds
    pub request_delay_secs: u64,

    /// Maximum connection-retry count
    pub max_retries: u32,

    /// Fixed sleep between retry attempts in seconds
    pub retry_delay_secs: u64,

    /// Request timeout in seconds
    pub request_timeout_secs: u64,

    /// Optional proxy address (`host:port`)
    pub proxy: Option<String>,
}

/// File locations for durable state and taxonomy config
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Directory holding trigger-time and blacklist JSON files
    pub config_dir: PathBuf,

    /// Directory holding schedule, cursor and fingerprint state
    pub data_dir: PathBuf,
}

/// Media fingerprinting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaConfig {
    /// URL extensions accepted for fingerprinting (with leading dot)
    pub allowed_formats: Vec<String>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let request_delay_secs = env_parse("ARTCAST_REQUEST_DELAY", 1);
        let max_retries = env_parse("ARTCAST_MAX_REQUEST_RETRIES", 5);
        let retry_delay_secs = env_parse("ARTCAST_RETRY_DELAY", 10);
        let request_timeout_secs = env_parse("ARTCAST_REQUEST_TIMEOUT", 30);

        let proxy = std::env::var("ARTCAST_PROXY").ok().and_then(validate_proxy);

        let config_dir = std::env::var("ARTCAST_CONFIG_DIR")
            .unwrap_or_else(|_| String::from("config"))
            .into();
        let data_dir = std::env::var("ARTCAST_DATA_DIR")
            .unwrap_or_else(|_| String::from("data"))
            .into();

        let allowed_formats = std::env::var("ARTCAST_ALLOWED_FORMATS")
            .map(|v| {
                v.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_else(|_| {
                DEFAULT_ALLOWED_FORMATS
                    .iter()
                    .map(|s| s.to_string())
                    .collect()
            });

        let level = std::env::var("ARTCAST_LOG_LEVEL").unwrap_or_else(|_| String::from("info"));
        let format = std::env::var("ARTCAST_LOG_FORMAT").unwrap_or_else(|_| String::from("text"));

        let config = Self {
            transport: TransportConfig {
                request_delay_secs,
                max_retries,
                retry_delay_secs,
                request_timeout_secs,
                proxy,
            },
            paths: PathsConfig {
                config_dir,
                data_dir,
            },
            media: MediaConfig { allowed_formats },
            logging: LoggingConfig { level, format },
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.transport.request_timeout_secs == 0 {
            return Err(Error::config("request_timeout_secs must be positive"));
        }
        if self.media.allowed_formats.is_empty() {
            return Err(Error::config("allowed_formats must not be empty"));
        }
        for fmt in &self.media.allowed_formats {
            if !fmt.starts_with('.') {
                return Err(Error::config(format!(
                    "allowed format must start with a dot: {fmt}"
                )));
            }
        }
        Ok(())
    }
}

impl TransportConfig {
    /// Get request timeout as Duration
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            transport: TransportConfig {
                request_delay_secs: 1,
                max_retries: 5,
                retry_delay_secs: 10,
                request_timeout_secs: 30,
                proxy: None,
            },
            paths: PathsConfig {
                config_dir: PathBuf::from("config"),
                data_dir: PathBuf::from("data"),
            },
            media: MediaConfig {
                allowed_formats: DEFAULT_ALLOWED_FORMATS
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
            },
            logging: LoggingConfig {
                level: String::from("info"),
                format: String::from("text"),
            },
        }
    }
}

impl PathsConfig {
    /// Persisted schedule file
    pub fn schedule_file(&self) -> PathBuf {
        self.data_dir.join("schedule.json")
    }

    /// Fingerprint store database
    pub fn hash_db(&self) -> PathBuf {
        self.data_dir.join("image_hashes.db")
    }

    /// Feed cursor file
    pub fn cursor_file(&self) -> PathBuf {
        self.data_dir.join("cursor.json")
    }

    /// Drop file consumed by the JSON feed adapter
    pub fn inbox_file(&self) -> PathBuf {
        self.data_dir.join("inbox.json")
    }

    /// Blacklist rule config
    pub fn blacklist_file(&self) -> PathBuf {
        self.config_dir.join("blacklist.json")
    }

    /// Scheduler config (trigger times, check interval)
    pub fn scheduler_file(&self) -> PathBuf {
        self.config_dir.join("scheduler.json")
    }

    /// Create the data directory if missing
    pub fn ensure_data_dir(&self) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir)?;
        Ok(())
    }
}

/// Scheduler configuration loaded from `scheduler.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Daily trigger times for content pulls, `HH:MM` 24h format
    pub update_times: Vec<String>,

    /// Poll interval of the dispatcher loop in seconds
    #[serde(default = "default_check_interval")]
    pub check_interval_secs: u64,
}

fn default_check_interval() -> u64 {
    60
}

impl ScheduleConfig {
    /// Load from a JSON file; a missing or malformed file is fatal
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::config(format!("cannot read {}: {e}", path.display())))?;
        let config: Self = serde_json::from_str(&content)
            .map_err(|e| Error::config(format!("cannot parse {}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate scheduler values
    pub fn validate(&self) -> Result<()> {
        if self.update_times.is_empty() {
            return Err(Error::config("update_times must not be empty"));
        }
        if self.check_interval_secs == 0 {
            return Err(Error::config("check_interval_secs must be positive"));
        }
        Ok(())
    }

    /// Get check interval as Duration
    #[must_use]
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }
}

/// Validate a proxy address shape (`host:port`); invalid addresses are
/// dropped with a warning rather than failing startup
fn validate_proxy(addr: String) -> Option<String> {
    let pattern = Regex::new(r"^(\d{1,3}\.){3}\d{1,3}:\d{1,6}$").ok()?;
    if pattern.is_match(&addr) {
        Some(addr)
    } else {
        tracing::warn!(proxy = %addr, "Invalid proxy address, no proxy will be used");
        None
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.transport.request_delay_secs, 1);
        assert_eq!(config.transport.max_retries, 5);
        assert_eq!(config.transport.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.media.allowed_formats, DEFAULT_ALLOWED_FORMATS);
    }

    #[test]
    fn test_validate_rejects_bad_format() {
        let mut config = Config::default();
        config.media.allowed_formats = vec!["jpg".into()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_empty_formats() {
        let mut config = Config::default();
        config.media.allowed_formats.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_proxy_validation() {
        assert_eq!(
            validate_proxy("127.0.0.1:8080".into()),
            Some("127.0.0.1:8080".into())
        );
        assert_eq!(validate_proxy("not-a-proxy".into()), None);
        assert_eq!(validate_proxy("127.0.0.1".into()), None);
    }

    #[test]
    fn test_schedule_config_validate() {
        let config = ScheduleConfig {
            update_times: vec!["07:00".into()],
            check_interval_secs: 60,
        };
        assert!(config.validate().is_ok());

        let empty = ScheduleConfig {
            update_times: vec![],
            check_interval_secs: 60,
        };
        assert!(empty.validate().is_err());

        let zero = ScheduleConfig {
            update_times: vec!["07:00".into()],
            check_interval_secs: 0,
        };
        assert!(zero.validate().is_err());
    }

    #[test]
    fn test_schedule_config_parse_defaults() {
        let config: ScheduleConfig =
            serde_json::from_str(r#"{"update_times": ["07:00", "19:30"]}"#).unwrap();
        assert_eq!(config.check_interval_secs, 60);
        assert_eq!(config.check_interval(), Duration::from_secs(60));
    }

    #[test]
    fn test_paths() {
        let paths = PathsConfig {
            config_dir: PathBuf::from("config"),
            data_dir: PathBuf::from("data"),
        };
        assert_eq!(paths.schedule_file(), PathBuf::from("data/schedule.json"));
        assert_eq!(paths.hash_db(), PathBuf::from("data/image_hashes.db"));
        assert_eq!(
            paths.blacklist_file(),
            PathBuf::from("config/blacklist.json")
        );
    }
}
