use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::application::ports::output::scheduler_port::PollPriority;
use crate::core::platform::manager::reconciler::RetentionPolicy;
use crate::core::platform::manager::scheduler::PollOptions;
use crate::infrastructure::adapters::api::HttpNotificationApiConfig;
use crate::infrastructure::adapters::logs::{LogFormat, SystemLogAdapterConfig};

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Failed to read settings file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse settings file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to assemble settings: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid settings: {0}")]
    Invalid(String),
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ApiSettings {
    pub base_url: String,
    pub token: String,
    pub timeout_seconds: u64,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000/api".to_string(),
            token: String::new(),
            timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct PollingSettings {
    pub interval_seconds: u64,
    /// Honored by embedders that supply a `VisibilityPort`. The daemon has no host
    /// visibility and always polls.
    pub pause_when_hidden: bool,
    pub priority: PollPriority,
    pub retention: RetentionPolicy,
}

impl Default for PollingSettings {
    fn default() -> Self {
        Self {
            interval_seconds: 30,
            pause_when_hidden: false,
            priority: PollPriority::Normal,
            retention: RetentionPolicy::TolerateOneMiss,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct CacheSettings {
    pub directory: PathBuf,
    pub validity_seconds: u64,
    /// Keep the cache in memory only when false
    pub enabled: bool,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            directory: PathBuf::from(".gymdesk/cache"),
            validity_seconds: 300,
            enabled: true,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
    /// `text` or `json`
    pub format: String,
    pub file: Option<PathBuf>,
    pub console: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
            file: None,
            console: true,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub api: ApiSettings,
    pub polling: PollingSettings,
    pub cache: CacheSettings,
    pub logging: LoggingSettings,
}

impl Settings {
    /// Defaults, then `config.toml`, then `config.{APP_ENV}`, then `GYMDESK__*` variables.
    pub fn new() -> Result<Self, SettingsError> {
        let mut builder = Config::builder()
            .add_source(Config::try_from(&Settings::default())?)
            .add_source(File::with_name("config").required(false));

        if let Ok(env) = std::env::var("APP_ENV") {
            builder = builder.add_source(File::with_name(&format!("config.{}", env)).required(false));
        }

        let settings: Settings = builder
            .add_source(Environment::with_prefix("GYMDESK").separator("__").try_parsing(true))
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn load_from_file(filename: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let content = fs::read_to_string(filename)?;
        let settings: Settings = toml::from_str(&content)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.api.base_url.is_empty() {
            return Err(SettingsError::Invalid("api.base_url cannot be empty".to_string()));
        }
        if !self.api.base_url.starts_with("http://") && !self.api.base_url.starts_with("https://") {
            return Err(SettingsError::Invalid("api.base_url must be an http or https URL".to_string()));
        }
        if self.polling.interval_seconds == 0 {
            return Err(SettingsError::Invalid("polling.interval_seconds must be at least 1".to_string()));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.polling.interval_seconds)
    }

    pub fn poll_options(&self) -> PollOptions {
        PollOptions {
            pause_when_hidden: self.polling.pause_when_hidden,
            priority: self.polling.priority,
        }
    }

    pub fn cache_validity(&self) -> Duration {
        Duration::from_secs(self.cache.validity_seconds)
    }

    pub fn api_config(&self) -> HttpNotificationApiConfig {
        HttpNotificationApiConfig {
            base_url: self.api.base_url.clone(),
            token: self.api.token.clone(),
            timeout_seconds: self.api.timeout_seconds,
        }
    }

    pub fn log_config(&self) -> SystemLogAdapterConfig {
        SystemLogAdapterConfig {
            log_level: self.logging.level.clone(),
            format: LogFormat::parse(&self.logging.format),
            file_path: self.logging.file.clone(),
            enable_console: self.logging.console,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
[api]
base_url = "https://console.example/api"
token = "secret"

[polling]
interval_seconds = 15
priority = "high"
retention = "trust_server"

[cache]
enabled = false
"#
        )
        .unwrap();

        let settings = Settings::load_from_file(file.path()).unwrap();

        assert_eq!(settings.api.base_url, "https://console.example/api");
        assert_eq!(settings.api.timeout_seconds, 30);
        assert_eq!(settings.poll_interval(), Duration::from_secs(15));
        assert_eq!(settings.polling.priority, PollPriority::High);
        assert_eq!(settings.polling.retention, RetentionPolicy::TrustServer);
        assert!(!settings.cache.enabled);
        assert_eq!(settings.cache_validity(), Duration::from_secs(300));
        assert_eq!(settings.logging, LoggingSettings::default());
    }

    #[test]
    fn test_validation() {
        let mut settings = Settings::default();
        assert!(settings.validate().is_ok());

        settings.api.base_url = "ftp://console.example".to_string();
        assert!(matches!(settings.validate(), Err(SettingsError::Invalid(_))));

        settings.api.base_url = String::new();
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.polling.interval_seconds = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_invalid_file_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "[polling]\ninterval_seconds = 0\n").unwrap();
        assert!(matches!(Settings::load_from_file(file.path()), Err(SettingsError::Invalid(_))));

        let mut file = NamedTempFile::new().unwrap();
        write!(file, "[api\nbase_url = ").unwrap();
        assert!(matches!(Settings::load_from_file(file.path()), Err(SettingsError::Parse(_))));

        assert!(matches!(Settings::load_from_file("/nonexistent/gymdesk.toml"), Err(SettingsError::Io(_))));
    }

    #[test]
    fn test_derived_configs() {
        let mut settings = Settings::default();
        settings.logging.format = "json".to_string();
        settings.polling.pause_when_hidden = true;

        assert_eq!(settings.log_config().format, LogFormat::Json);
        assert!(settings.poll_options().pause_when_hidden);
        assert_eq!(settings.api_config().base_url, settings.api.base_url);
    }
}
