/*
Notification Store

The reconciled, in-memory notification list of one engine instance and its unread count.

The unread count is never maintained by increments and decrements: every mutation re-derives
it from the list, so `unread_count == items.filter(!read).count()` holds after each operation.
*/

use std::collections::BTreeMap;

use serde::Serialize;

use crate::core::platform::container::notification::NotificationRecord;
use crate::core::platform::manager::reconciler::unread_count;

/// Grouping statistics over the store
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NotificationStats {
    pub total: usize,
    pub unread: usize,
    /// Record count per category tag
    pub by_type: BTreeMap<String, usize>,
    /// Unread count per category tag
    pub unread_by_type: BTreeMap<String, usize>,
}

#[derive(Debug, Default, Clone)]
pub struct NotificationStore {
    items: Vec<NotificationRecord>,
    unread_count: usize,
}

impl NotificationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn items(&self) -> &[NotificationRecord] {
        &self.items
    }

    pub fn unread_count(&self) -> usize {
        self.unread_count
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&NotificationRecord> {
        self.items.iter().find(|record| record.id == id)
    }

    /// Replace the whole list with a reconciled one.
    pub fn replace(&mut self, items: Vec<NotificationRecord>) {
        self.items = items;
        self.recount();
    }

    /// Mark one record read. Returns false if it is unknown or already read.
    pub fn mark_read(&mut self, id: &str) -> bool {
        let changed = match self.items.iter_mut().find(|record| record.id == id) {
            Some(record) if !record.read => {
                record.read = true;
                true
            }
            _ => false,
        };
        self.recount();
        changed
    }

    /// Mark every record read. Returns how many changed.
    pub fn mark_all_read(&mut self) -> usize {
        let mut changed = 0;
        for record in self.items.iter_mut().filter(|record| !record.read) {
            record.read = true;
            changed += 1;
        }
        self.recount();
        changed
    }

    /// The `limit` most recent records.
    pub fn recent(&self, limit: usize) -> Vec<NotificationRecord> {
        self.items.iter().take(limit).cloned().collect()
    }

    pub fn stats(&self) -> NotificationStats {
        let mut stats = NotificationStats {
            total: self.items.len(),
            unread: self.unread_count,
            ..Default::default()
        };
        for record in &self.items {
            let tag = record.notification_type.as_str().to_string();
            if !record.read {
                *stats.unread_by_type.entry(tag.clone()).or_insert(0) += 1;
            }
            *stats.by_type.entry(tag).or_insert(0) += 1;
        }
        stats
    }

    fn recount(&mut self) {
        self.unread_count = unread_count(&self.items);
    }
}
