/*
Signature Deduplicator

Decides whether a notification is a genuinely new logical event for this engine instance.

The server delivers at least once, so the same event can come back under a fresh id, and an
"active" record is re-sent verbatim on every poll. Identity is therefore the signature built
from the category, the message and the creation instant rather than the server id. The seen
set lives as long as the engine and is never persisted.
*/

use std::collections::HashSet;

use chrono::SecondsFormat;

use crate::core::platform::container::notification::NotificationRecord;

const FIELD_SEPARATOR: char = '\u{1f}';

/// Deterministic identity of the logical event behind `record`.
///
/// Timestamps that parse as RFC 3339 are normalized to UTC milliseconds so that the same
/// instant written two ways yields one signature.
pub fn signature(record: &NotificationRecord) -> String {
    let timestamp = record
        .created_at()
        .map(|instant| instant.to_rfc3339_opts(SecondsFormat::Millis, true))
        .unwrap_or_else(|| record.timestamp.clone());

    format!(
        "{}{sep}{}{sep}{}",
        record.notification_type.as_str(),
        record.message,
        timestamp,
        sep = FIELD_SEPARATOR
    )
}

#[derive(Debug, Default)]
pub struct SignatureDeduplicator {
    seen: HashSet<String>,
}

impl SignatureDeduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true the first time a signature is offered, false afterwards.
    pub fn is_new(&mut self, record: &NotificationRecord) -> bool {
        self.seen.insert(signature(record))
    }

    /// Marks a record as already surfaced without reporting it.
    pub fn observe(&mut self, record: &NotificationRecord) {
        self.seen.insert(signature(record));
    }

    pub fn has_seen(&self, record: &NotificationRecord) -> bool {
        self.seen.contains(&signature(record))
    }

    /// The subset of `records` that is new, in input order.
    pub fn filter_new(&mut self, records: &[NotificationRecord]) -> Vec<NotificationRecord> {
        records
            .iter()
            .filter(|record| self.is_new(record))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
