// src/config/mod.rs
pub mod application_settings;

pub use application_settings::{
    ApiSettings, CacheSettings, LoggingSettings, PollingSettings, Settings, SettingsError,
};
