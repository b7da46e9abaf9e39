/*
Merge Reconciler

Combines a freshly fetched server list with the list the store currently holds.

The server list is authoritative for every field except the read flag: once a record was read
locally it never becomes unread again because of a stale server echo. Records the server stops
reporting are dropped according to the retention policy, and locally raised records are kept
until the server reports the same logical event, which then supersedes them.

The reconciler is only invoked after a successful fetch. A failed fetch leaves the store alone.
*/

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::core::platform::container::notification::NotificationRecord;
use crate::core::platform::manager::deduplicator::signature;

/// How records missing from a server snapshot are treated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetentionPolicy {
    /// The server list is exhaustive; anything missing is dropped at once
    TrustServer,
    /// A record is dropped only after two consecutive snapshots without it
    #[default]
    TolerateOneMiss,
}

#[derive(Debug, Default)]
pub struct MergeReconciler {
    policy: RetentionPolicy,
    missed_once: HashSet<String>,
}

impl MergeReconciler {
    pub fn new(policy: RetentionPolicy) -> Self {
        Self {
            policy,
            missed_once: HashSet::new(),
        }
    }

    pub fn policy(&self) -> RetentionPolicy {
        self.policy
    }

    /// Merge a successful server snapshot into `existing`.
    pub fn reconcile(
        &mut self,
        existing: &[NotificationRecord],
        incoming: Vec<NotificationRecord>,
    ) -> Vec<NotificationRecord> {
        let by_id: HashMap<&str, &NotificationRecord> =
            existing.iter().map(|record| (record.id.as_str(), record)).collect();
        let read_synthetic: HashSet<String> = existing
            .iter()
            .filter(|record| record.is_synthetic() && record.read)
            .map(signature)
            .collect();

        let mut incoming_ids: HashMap<String, String> = HashMap::with_capacity(incoming.len());
        let mut incoming_signatures = HashSet::with_capacity(incoming.len());
        let mut merged = Vec::with_capacity(incoming.len() + self.missed_once.len());

        for mut record in incoming {
            let record_signature = signature(&record);
            // one id reused by an unrelated event: keep both, rename the later one
            match incoming_ids.get(&record.id) {
                Some(taken) if *taken == record_signature => continue,
                Some(_) => {
                    record.id = record.derived_id();
                    if incoming_ids.contains_key(&record.id) {
                        continue;
                    }
                }
                None => {}
            }
            incoming_ids.insert(record.id.clone(), record_signature.clone());
            match by_id.get(record.id.as_str()) {
                Some(previous) if previous.read => record.read = true,
                Some(_) => {}
                None if read_synthetic.contains(&record_signature) => record.read = true,
                None => {}
            }
            incoming_signatures.insert(record_signature);
            self.missed_once.remove(&record.id);
            merged.push(record);
        }

        for previous in existing {
            if incoming_ids.contains_key(&previous.id) {
                continue;
            }
            if previous.is_synthetic() {
                if !incoming_signatures.contains(&signature(previous)) {
                    merged.push(previous.clone());
                }
                continue;
            }
            match self.policy {
                RetentionPolicy::TrustServer => {}
                RetentionPolicy::TolerateOneMiss => {
                    if self.missed_once.insert(previous.id.clone()) {
                        merged.push(previous.clone());
                    } else {
                        self.missed_once.remove(&previous.id);
                    }
                }
            }
        }

        self.missed_once
            .retain(|id| merged.iter().any(|record| &record.id == id));
        sort_most_recent_first(&mut merged);
        merged
    }

    /// Insert or replace a single record outside of a poll.
    pub fn upsert(existing: &[NotificationRecord], mut record: NotificationRecord) -> Vec<NotificationRecord> {
        let mut merged = Vec::with_capacity(existing.len() + 1);
        let mut replaced = false;
        for previous in existing {
            if previous.id == record.id {
                if previous.read {
                    record.read = true;
                }
                merged.push(record.clone());
                replaced = true;
            } else {
                merged.push(previous.clone());
            }
        }
        if !replaced {
            merged.insert(0, record);
        }
        sort_most_recent_first(&mut merged);
        merged
    }

    /// Carry read flags from a stale cached snapshot into a server list.
    pub fn preserve_read_state(baseline: &[NotificationRecord], incoming: &mut [NotificationRecord]) {
        let read_ids: HashSet<&str> = baseline
            .iter()
            .filter(|record| record.read)
            .map(|record| record.id.as_str())
            .collect();
        for record in incoming.iter_mut() {
            if read_ids.contains(record.id.as_str()) || read_ids.contains(record.derived_id().as_str()) {
                record.read = true;
            }
        }
    }
}

/// Count of unread records; the store derives its unread count from this alone.
pub fn unread_count(items: &[NotificationRecord]) -> usize {
    items.iter().filter(|record| !record.read).count()
}

/// Stable sort, newest first. Records without a parseable timestamp go last in their
/// original relative order.
pub fn sort_most_recent_first(items: &mut [NotificationRecord]) {
    items.sort_by(|a, b| match (a.created_at(), b.created_at()) {
        (Some(left), Some(right)) => right.cmp(&left),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });
}
