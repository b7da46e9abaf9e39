// src/lib.rs
pub mod application;
pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod infrastructure;

pub use crate::core::platform::container::notification::{NotificationRecord, NotificationType};
pub use crate::core::platform::container::notification_event::{
    ChangeCause, NotificationEvent, NotificationEventKind, StateChange,
};
pub use crate::core::platform::manager::notification_engine::{
    EngineStatus, InitOutcome, NotificationEngine, NotificationEngineBuilder, PollOutcome,
};
pub use crate::error::{EngineError, EngineResult};
