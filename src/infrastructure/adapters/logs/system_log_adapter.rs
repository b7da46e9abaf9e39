/*
System Log Adapter

Installs the process-wide tracing subscriber: an env-filter, a console layer in JSON or text
form, and an optional daily-rolling file layer written through a non-blocking appender.

Configuration comes from the `[logging]` settings section or from environment variables.
*/

use std::env;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Errors raised while installing the subscriber
#[derive(Debug, Error)]
pub enum LogError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(String),
}

pub type LogResult<T> = Result<T, LogError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Text,
}

impl LogFormat {
    pub fn parse(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "json" => LogFormat::Json,
            _ => LogFormat::Text,
        }
    }
}

/// Configuration for the system log adapter
#[derive(Debug, Clone)]
pub struct SystemLogAdapterConfig {
    /// Filter directive, e.g. `info` or `gymdesk=debug,reqwest=warn`
    pub log_level: String,
    /// Console output format
    pub format: LogFormat,
    /// Rolling log file; no file output when `None`
    pub file_path: Option<PathBuf>,
    /// Enable console output
    pub enable_console: bool,
}

impl Default for SystemLogAdapterConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            format: LogFormat::Text,
            file_path: None,
            enable_console: true,
        }
    }
}

impl SystemLogAdapterConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self {
            log_level: env::var("GYMDESK_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            format: LogFormat::parse(&env::var("GYMDESK_LOG_FORMAT").unwrap_or_else(|_| "text".to_string())),
            file_path: env::var("GYMDESK_LOG_FILE").ok().map(PathBuf::from),
            enable_console: env::var("GYMDESK_LOG_ENABLE_CONSOLE")
                .unwrap_or_else(|_| "true".to_string())
                .parse()
                .unwrap_or(true),
        }
    }
}

/// Keeps the file writer alive for as long as the process logs
pub struct SystemLogAdapter {
    config: SystemLogAdapterConfig,
    _file_guard: Option<WorkerGuard>,
}

impl SystemLogAdapter {
    /// Install the global subscriber described by `config`.
    pub fn init(config: SystemLogAdapterConfig) -> LogResult<Self> {
        let filter = EnvFilter::try_new(&config.log_level)
            .map_err(|e| LogError::ConfigError(format!("Invalid log level: {}", e)))?;

        let json_console = (config.enable_console && config.format == LogFormat::Json)
            .then(|| fmt::layer().json().with_current_span(false).with_span_list(true));
        let text_console = (config.enable_console && config.format == LogFormat::Text)
            .then(|| fmt::layer().with_target(true).with_level(true));

        let (file_guard, file_layer) = match &config.file_path {
            Some(path) => {
                let (directory, file_name) = split_log_path(path)?;
                std::fs::create_dir_all(&directory)
                    .map_err(|e| LogError::IoError(format!("Failed to create log directory: {}", e)))?;
                let (writer, guard) = non_blocking(rolling::daily(directory, file_name));
                (Some(guard), Some(fmt::layer().json().with_writer(writer).with_ansi(false)))
            }
            None => (None, None),
        };

        Registry::default()
            .with(filter)
            .with(json_console)
            .with(text_console)
            .with(file_layer)
            .try_init()
            .map_err(|e| LogError::ConfigError(format!("Failed to initialize logging: {}", e)))?;

        Ok(Self {
            config,
            _file_guard: file_guard,
        })
    }

    pub fn from_env() -> LogResult<Self> {
        Self::init(SystemLogAdapterConfig::from_env())
    }

    pub fn config(&self) -> &SystemLogAdapterConfig {
        &self.config
    }
}

fn split_log_path(path: &Path) -> LogResult<(PathBuf, String)> {
    let directory = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| LogError::ConfigError("Invalid log filename".to_string()))?
        .to_string();
    Ok((directory, file_name))
}
