/*
Notification API Port

This port is the engine's view of the server that owns the notification stream. The server
returns the full list of a principal's notifications and accepts read-state confirmations.
Everything else the console does over REST (members, trainers, payments, tickets) is out of
scope for this port.

The adapter decides how to reach the server; the engine only cares about the outcome and,
on failure, about which family of failure it was. Authentication failures stop polling until
the principal signs in again, every other failure is transient and only costs one tick.
*/

use async_trait::async_trait;
use serde::Deserialize;

use crate::core::platform::container::notification::NotificationRecord;

/// Result type for notification API operations
pub type NotificationApiResult<T> = Result<T, NotificationApiError>;

/// Errors surfaced by a notification API adapter
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum NotificationApiError {
    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Authentication error: HTTP {status}")]
    AuthenticationError { status: u16 },

    #[error("Server error: HTTP {status}")]
    ServerError { status: u16 },

    #[error("Unexpected response: HTTP {status}")]
    UnexpectedStatus { status: u16 },

    #[error("Decode error: {0}")]
    DecodeError(String),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Timeout error")]
    Timeout,
}

/// Failure families the engine reacts to differently
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Skip this tick and keep the store
    Transient,
    /// Stop polling and wait for re-authentication
    Auth,
}

impl NotificationApiError {
    /// Classifies a non-success HTTP status.
    pub fn from_status(status: u16) -> Self {
        match status {
            401 | 403 => NotificationApiError::AuthenticationError { status },
            500..=599 => NotificationApiError::ServerError { status },
            _ => NotificationApiError::UnexpectedStatus { status },
        }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            NotificationApiError::AuthenticationError { .. } => FailureKind::Auth,
            _ => FailureKind::Transient,
        }
    }

    pub fn is_auth(&self) -> bool {
        self.kind() == FailureKind::Auth
    }
}

/// Body of `GET /notifications/all`
#[derive(Debug, Clone, Deserialize)]
pub struct NotificationListResponse {
    pub notifications: Vec<NotificationRecord>,
}

/// Server side of the notification stream
#[async_trait]
pub trait NotificationApiPort: Send + Sync {
    /// Fetch every notification currently reported for the principal.
    async fn fetch_all(&self) -> NotificationApiResult<Vec<NotificationRecord>>;

    /// Confirm that one notification was read.
    async fn mark_read(&self, id: &str) -> NotificationApiResult<()>;

    /// Confirm that every notification was read.
    async fn mark_all_read(&self) -> NotificationApiResult<()>;
}
