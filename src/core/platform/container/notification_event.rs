/*
Notification Event

Events are the signals the notification engine fans out to its consumers: the bell badge, the
toast layer, the recent activity feed or any other module that wants to react to alerts.

Two kinds exist. New Notifications carries only the records that passed deduplication as
genuinely new, so a consumer that plays a sound or shows a toast does it exactly once per
logical event. State Changed fires after every mutation of the store and carries a small
summary, for consumers that simply re-render from the current store contents.
*/

use serde::{Deserialize, Serialize};

use crate::core::platform::container::notification::NotificationRecord;

/// Discriminant used when subscribing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationEventKind {
    NewNotifications,
    StateChanged,
}

/// What caused a state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeCause {
    /// The store was restored from the persistent cache
    Restored,
    /// A server snapshot was merged
    Reconciled,
    /// One record was marked read
    MarkedRead,
    /// Every record was marked read
    MarkedAllRead,
    /// A locally raised record was added
    Injected,
}

/// Summary attached to a state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateChange {
    pub cause: ChangeCause,
    pub total: usize,
    pub unread_count: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NotificationEvent {
    NewNotifications(Vec<NotificationRecord>),
    StateChanged(StateChange),
}

impl NotificationEvent {
    pub fn kind(&self) -> NotificationEventKind {
        match self {
            NotificationEvent::NewNotifications(_) => NotificationEventKind::NewNotifications,
            NotificationEvent::StateChanged(_) => NotificationEventKind::StateChanged,
        }
    }
}
