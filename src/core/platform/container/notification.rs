/*
Notification Container Module

A Notification Record is a single operational alert raised for a principal of the gym
operations console: a payment landed, a membership is about to lapse, a trainer changed a
session, a trial was booked, and so on. Records are created server side and observed by the
notification engine by polling; the engine never deletes them and the only field it changes
locally is the read flag.

The Cache Envelope is the persisted snapshot of a principal's notification list together with
the instant it was saved, so that a restarted console can show the last known state before the
first poll completes.
*/

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::core::platform::manager::deduplicator::signature;

/// Prefix of identifiers minted locally for injected notifications.
pub const SYNTHETIC_ID_PREFIX: &str = "local-";

/// Prefix of identifiers derived from a record's signature.
pub const DERIVED_ID_PREFIX: &str = "sig-";

/// Category of a notification.
///
/// Drives icon and badge selection in consumers. The engine only uses it for grouping
/// statistics and as one input of the signature. Unknown tags are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum NotificationType {
    Payment,
    Membership,
    Trainer,
    System,
    TrialBooking,
    Attendance,
    Equipment,
    Support,
    Other(String),
}

impl NotificationType {
    pub fn as_str(&self) -> &str {
        match self {
            NotificationType::Payment => "payment",
            NotificationType::Membership => "membership",
            NotificationType::Trainer => "trainer",
            NotificationType::System => "system",
            NotificationType::TrialBooking => "trial-booking",
            NotificationType::Attendance => "attendance",
            NotificationType::Equipment => "equipment",
            NotificationType::Support => "support",
            NotificationType::Other(tag) => tag,
        }
    }
}

impl From<String> for NotificationType {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            "payment" => NotificationType::Payment,
            "membership" => NotificationType::Membership,
            "trainer" => NotificationType::Trainer,
            "system" => NotificationType::System,
            "trial-booking" => NotificationType::TrialBooking,
            "attendance" => NotificationType::Attendance,
            "equipment" => NotificationType::Equipment,
            "support" => NotificationType::Support,
            _ => NotificationType::Other(tag),
        }
    }
}

impl From<&str> for NotificationType {
    fn from(tag: &str) -> Self {
        NotificationType::from(tag.to_string())
    }
}

impl From<NotificationType> for String {
    fn from(notification_type: NotificationType) -> Self {
        notification_type.as_str().to_string()
    }
}

impl fmt::Display for NotificationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A notification as served by the notification API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "WireRecord")]
pub struct NotificationRecord {
    /// Opaque identifier assigned by the server. Records sent without one get an id
    /// derived from their signature.
    pub id: String,
    /// Category tag
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
    /// Display title
    #[serde(default)]
    pub title: String,
    /// Display message
    #[serde(default)]
    pub message: String,
    /// Creation instant as sent by the server (ISO 8601)
    pub timestamp: String,
    /// Read flag; the only field the client mutates
    #[serde(default)]
    pub read: bool,
    /// Opaque bag, passed through unmodified
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub metadata: Value,
}

impl NotificationRecord {
    pub fn new(
        id: impl Into<String>,
        notification_type: impl Into<NotificationType>,
        title: impl Into<String>,
        message: impl Into<String>,
        timestamp: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            notification_type: notification_type.into(),
            title: title.into(),
            message: message.into(),
            timestamp: timestamp.into(),
            read: false,
            metadata: Value::Null,
        }
    }

    /// Builds a locally raised notification stamped at `now`.
    pub fn synthetic(
        notification_type: NotificationType,
        title: String,
        message: String,
        metadata: Value,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: format!("{}{}", SYNTHETIC_ID_PREFIX, Uuid::new_v4()),
            notification_type,
            title,
            message,
            timestamp: now.to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            read: false,
            metadata,
        }
    }

    pub fn with_read(mut self, read: bool) -> Self {
        self.read = read;
        self
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }

    /// Stable id computed from the signature, for records the server sent without a usable
    /// id or under an id already taken by a different event.
    pub fn derived_id(&self) -> String {
        let digest = format!("{:x}", Sha256::digest(signature(self).as_bytes()));
        format!("{}{}", DERIVED_ID_PREFIX, &digest[..16])
    }

    /// True for records minted by `synthetic`, which the server has never seen.
    pub fn is_synthetic(&self) -> bool {
        self.id.starts_with(SYNTHETIC_ID_PREFIX)
    }

    /// True when the id was assigned locally, so the server cannot be addressed with it.
    pub fn has_local_id(&self) -> bool {
        self.is_synthetic() || self.id.starts_with(DERIVED_ID_PREFIX)
    }

    /// Parsed creation instant, if the server sent a valid RFC 3339 timestamp.
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.timestamp)
            .ok()
            .map(|instant| instant.with_timezone(&Utc))
    }
}

/// Servers in the wild send ids as strings or as numbers, and sometimes not at all.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Number(i64),
}

#[derive(Deserialize)]
struct WireRecord {
    #[serde(default)]
    id: Option<RawId>,
    #[serde(rename = "type")]
    notification_type: NotificationType,
    #[serde(default)]
    title: String,
    #[serde(default)]
    message: String,
    timestamp: String,
    #[serde(default)]
    read: bool,
    #[serde(default)]
    metadata: Value,
}

impl From<WireRecord> for NotificationRecord {
    fn from(wire: WireRecord) -> Self {
        let mut record = NotificationRecord {
            id: String::new(),
            notification_type: wire.notification_type,
            title: wire.title,
            message: wire.message,
            timestamp: wire.timestamp,
            read: wire.read,
            metadata: wire.metadata,
        };
        record.id = match wire.id {
            Some(RawId::Text(text)) if !text.is_empty() => text,
            Some(RawId::Number(number)) => number.to_string(),
            _ => record.derived_id(),
        };
        record
    }
}

/// Persisted snapshot of a principal's notification list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEnvelope {
    /// Most-recent-first list as it was in the store
    pub notifications: Vec<NotificationRecord>,
    /// Save instant, epoch milliseconds
    #[serde(rename = "timestamp")]
    pub saved_at_ms: i64,
}

impl CacheEnvelope {
    pub fn new(notifications: Vec<NotificationRecord>, saved_at: DateTime<Utc>) -> Self {
        Self {
            notifications,
            saved_at_ms: saved_at.timestamp_millis(),
        }
    }

    pub fn saved_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.saved_at_ms).single()
    }

    /// An envelope is fresh while `now - saved_at` does not exceed `validity`.
    pub fn is_fresh_at(&self, now: DateTime<Utc>, validity: Duration) -> bool {
        let age_ms = now.timestamp_millis().saturating_sub(self.saved_at_ms);
        age_ms <= i64::try_from(validity.as_millis()).unwrap_or(i64::MAX)
    }
}
