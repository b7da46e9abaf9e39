/*
Notification Engine

Orchestrates one principal's notification feed: poll the API, drop what was already
announced, merge with the store, write through to the persistent cache and fan out events.

Each engine is an explicit instance built with its own API client, storage, scheduler and
clock, so several principals or tests can run side by side. Clones share the same state.

Store mutations run inside short lock sections that never span an await, so every mutation is
atomic with respect to the others and they apply in call order. Events are emitted after the
lock is released; handlers may call back into the engine.

At most one poll fetch is in flight. A poll that finds one running returns Skipped at once.
Nothing here is fatal: failed fetches keep the last known good store, a rejected credential
stops polling until the next start, and storage failures degrade to memory only.
*/

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::FutureExt;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::application::ports::output::cache_storage_port::CacheStoragePort;
use crate::application::ports::output::clock_port::Clock;
use crate::application::ports::output::notification_api_port::{
    FailureKind, NotificationApiError, NotificationApiPort, NotificationApiResult,
};
use crate::application::ports::output::scheduler_port::PollTask;
use crate::core::platform::container::notification::{NotificationRecord, NotificationType};
use crate::core::platform::container::notification_event::{
    ChangeCause, NotificationEvent, NotificationEventKind, StateChange,
};
use crate::core::platform::manager::deduplicator::{signature, SignatureDeduplicator};
use crate::core::platform::manager::event_manager::{EventEmitter, EventHandler, SubscriptionId};
use crate::core::platform::manager::notification_store::{NotificationStats, NotificationStore};
use crate::core::platform::manager::persistent_cache::{
    principal_key, CachedSnapshot, PersistentCache, CACHE_VALIDITY_WINDOW,
};
use crate::core::platform::manager::reconciler::{sort_most_recent_first, MergeReconciler, RetentionPolicy};
use crate::core::platform::manager::scheduler::{FixedIntervalScheduler, PollOptions, PollScheduler};
use crate::error::{EngineError, EngineResult};
use crate::infrastructure::adapters::clock::SystemClock;
use crate::infrastructure::adapters::storage::MemoryCacheStorage;
use crate::infrastructure::adapters::visibility::AlwaysVisible;

/// Default time between two polls
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Result of one poll cycle
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// The server snapshot was merged; `new` records were announced
    Reconciled { new: usize, total: usize },
    /// Another fetch was already in flight
    Skipped,
    /// The fetch failed and the store was left alone
    Failed(NotificationApiError),
}

/// What `initialize` found in the persistent cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitOutcome {
    /// A fresh entry was loaded into the store
    Restored { count: usize },
    /// A stale entry was kept as read-state baseline for the first poll
    StaleBaseline { count: usize },
    /// Nothing usable was cached
    Empty,
}

/// Snapshot of the engine's health
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineStatus {
    pub polling: bool,
    pub auth_required: bool,
    pub memory_only: bool,
    pub last_successful_poll: Option<DateTime<Utc>>,
    pub scheduler: &'static str,
    pub total: usize,
    pub unread_count: usize,
}

struct EngineState {
    store: NotificationStore,
    deduplicator: SignatureDeduplicator,
    reconciler: MergeReconciler,
    /// Stale cached records whose read flags the first poll should honor
    baseline: Option<Vec<NotificationRecord>>,
    last_successful_poll: Option<DateTime<Utc>>,
}

struct EngineInner {
    principal: String,
    cache_key: String,
    api: Arc<dyn NotificationApiPort>,
    cache: PersistentCache,
    scheduler: Arc<dyn PollScheduler>,
    clock: Arc<dyn Clock>,
    events: EventEmitter,
    state: Mutex<EngineState>,
    persist_lock: tokio::sync::Mutex<()>,
    in_flight: AtomicBool,
    auth_required: AtomicBool,
    poll_interval: Duration,
    poll_options: PollOptions,
}

/// Releases the in-flight flag when a poll ends, however it ends.
struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct NotificationEngineBuilder {
    principal: String,
    api: Arc<dyn NotificationApiPort>,
    storage: Option<Arc<dyn CacheStoragePort>>,
    scheduler: Option<Arc<dyn PollScheduler>>,
    clock: Option<Arc<dyn Clock>>,
    poll_interval: Duration,
    poll_options: PollOptions,
    retention: RetentionPolicy,
    cache_validity: Duration,
}

impl NotificationEngineBuilder {
    pub fn storage(mut self, storage: Arc<dyn CacheStoragePort>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn scheduler(mut self, scheduler: Arc<dyn PollScheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn poll_options(mut self, options: PollOptions) -> Self {
        self.poll_options = options;
        self
    }

    pub fn retention(mut self, retention: RetentionPolicy) -> Self {
        self.retention = retention;
        self
    }

    pub fn cache_validity(mut self, validity: Duration) -> Self {
        self.cache_validity = validity;
        self
    }

    pub fn build(self) -> NotificationEngine {
        let storage = self
            .storage
            .unwrap_or_else(|| Arc::new(MemoryCacheStorage::new()));
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let scheduler = self
            .scheduler
            .unwrap_or_else(|| Arc::new(FixedIntervalScheduler::new(Arc::new(AlwaysVisible::new()))));

        let inner = EngineInner {
            cache_key: principal_key(&self.principal),
            principal: self.principal,
            api: self.api,
            cache: PersistentCache::new(storage, clock.clone()).with_validity(self.cache_validity),
            scheduler,
            clock,
            events: EventEmitter::new(),
            state: Mutex::new(EngineState {
                store: NotificationStore::new(),
                deduplicator: SignatureDeduplicator::new(),
                reconciler: MergeReconciler::new(self.retention),
                baseline: None,
                last_successful_poll: None,
            }),
            persist_lock: tokio::sync::Mutex::new(()),
            in_flight: AtomicBool::new(false),
            auth_required: AtomicBool::new(false),
            poll_interval: self.poll_interval,
            poll_options: self.poll_options,
        };

        NotificationEngine {
            inner: Arc::new(inner),
        }
    }
}

#[derive(Clone)]
pub struct NotificationEngine {
    inner: Arc<EngineInner>,
}

impl NotificationEngine {
    pub fn builder(principal: impl Into<String>, api: Arc<dyn NotificationApiPort>) -> NotificationEngineBuilder {
        NotificationEngineBuilder {
            principal: principal.into(),
            api,
            storage: None,
            scheduler: None,
            clock: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
            poll_options: PollOptions::default(),
            retention: RetentionPolicy::default(),
            cache_validity: CACHE_VALIDITY_WINDOW,
        }
    }

    pub fn principal(&self) -> &str {
        &self.inner.principal
    }

    /// Load the principal's cached snapshot, before the first poll.
    pub async fn initialize(&self) -> InitOutcome {
        let inner = &self.inner;
        let Some(CachedSnapshot { envelope, fresh }) = inner.cache.load_any(&inner.cache_key).await else {
            debug!(principal = %inner.principal, "No cached notifications");
            return InitOutcome::Empty;
        };

        let count = envelope.notifications.len();
        let change = {
            let mut guard = inner.state();
            let state = &mut *guard;
            for record in &envelope.notifications {
                state.deduplicator.observe(record);
            }
            if fresh {
                let mut records = envelope.notifications;
                sort_most_recent_first(&mut records);
                state.store.replace(records);
                Some(state_change(&state.store, ChangeCause::Restored))
            } else {
                state.baseline = Some(envelope.notifications);
                None
            }
        };

        match change {
            Some(change) => {
                info!(principal = %inner.principal, count, "Restored notifications from cache");
                inner.events.emit(NotificationEvent::StateChanged(change)).await;
                InitOutcome::Restored { count }
            }
            None => {
                info!(principal = %inner.principal, count, "Cached notifications are stale, keeping read state only");
                InitOutcome::StaleBaseline { count }
            }
        }
    }

    /// Poll once now, then hand the cadence to the scheduler.
    pub async fn start(&self) -> EngineResult<()> {
        let inner = &self.inner;
        inner.auth_required.store(false, Ordering::Release);

        if let PollOutcome::Failed(e) = inner.poll().await {
            if e.is_auth() {
                return Err(EngineError::AuthenticationRequired);
            }
        }

        let engine: Weak<EngineInner> = Arc::downgrade(inner);
        let task: PollTask = Arc::new(move || {
            let engine = engine.clone();
            async move {
                if let Some(inner) = engine.upgrade() {
                    inner.poll().await;
                }
            }
            .boxed()
        });

        inner
            .scheduler
            .start(task, inner.poll_interval, inner.poll_options)?;
        info!(
            principal = %inner.principal,
            scheduler = inner.scheduler.name(),
            interval_ms = inner.poll_interval.as_millis() as u64,
            "Notification polling started"
        );
        Ok(())
    }

    /// Stop polling. Safe to call at any time.
    pub fn stop(&self) {
        self.inner.scheduler.stop();
    }

    /// Run one poll cycle immediately.
    pub async fn refresh(&self) -> PollOutcome {
        self.inner.poll().await
    }

    /// Mark one record read locally, then confirm with the server.
    ///
    /// Returns false when the record is unknown or already read. The local change stands even
    /// if the confirmation fails.
    pub async fn mark_read(&self, id: &str) -> bool {
        let inner = &self.inner;
        let (change, confirm) = {
            let mut state = inner.state();
            if !state.store.mark_read(id) {
                return false;
            }
            let confirm = state.store.get(id).map_or(false, |record| !record.has_local_id());
            (state_change(&state.store, ChangeCause::MarkedRead), confirm)
        };

        inner.persist().await;
        inner.events.emit(NotificationEvent::StateChanged(change)).await;

        if confirm {
            let result = inner.api.mark_read(id).await;
            inner.confirmation_settled("mark_read", result);
        }
        true
    }

    /// Mark everything read locally, then confirm with the server. Returns how many changed.
    pub async fn mark_all_read(&self) -> usize {
        let inner = &self.inner;
        let (changed, change) = {
            let mut state = inner.state();
            let changed = state.store.mark_all_read();
            (changed, state_change(&state.store, ChangeCause::MarkedAllRead))
        };
        if changed == 0 {
            return 0;
        }

        inner.persist().await;
        inner.events.emit(NotificationEvent::StateChanged(change)).await;

        let result = inner.api.mark_all_read().await;
        inner.confirmation_settled("mark_all_read", result);
        changed
    }

    /// Raise a notification locally.
    ///
    /// The record goes through the same deduplication as polled records; `None` means an
    /// identical event was already announced.
    pub async fn add_notification(
        &self,
        notification_type: impl Into<NotificationType>,
        title: impl Into<String>,
        message: impl Into<String>,
        metadata: Value,
    ) -> Option<NotificationRecord> {
        let inner = &self.inner;
        let record = NotificationRecord::synthetic(
            notification_type.into(),
            title.into(),
            message.into(),
            metadata,
            inner.clock.now(),
        );

        let change = {
            let mut guard = inner.state();
            let state = &mut *guard;
            if !state.deduplicator.is_new(&record) {
                debug!(principal = %inner.principal, "Local notification already announced");
                return None;
            }
            let merged = MergeReconciler::upsert(state.store.items(), record.clone());
            state.store.replace(merged);
            state_change(&state.store, ChangeCause::Injected)
        };

        inner.persist().await;
        inner
            .events
            .emit(NotificationEvent::NewNotifications(vec![record.clone()]))
            .await;
        inner.events.emit(NotificationEvent::StateChanged(change)).await;
        Some(record)
    }

    pub fn items(&self) -> Vec<NotificationRecord> {
        self.inner.state().store.items().to_vec()
    }

    pub fn unread_count(&self) -> usize {
        self.inner.state().store.unread_count()
    }

    /// The `limit` most recent records, for activity feeds.
    pub fn recent(&self, limit: usize) -> Vec<NotificationRecord> {
        self.inner.state().store.recent(limit)
    }

    pub fn stats(&self) -> NotificationStats {
        self.inner.state().store.stats()
    }

    pub fn status(&self) -> EngineStatus {
        let inner = &self.inner;
        let state = inner.state();
        EngineStatus {
            polling: inner.scheduler.is_running(),
            auth_required: inner.auth_required.load(Ordering::Acquire),
            memory_only: inner.cache.is_memory_only(),
            last_successful_poll: state.last_successful_poll,
            scheduler: inner.scheduler.name(),
            total: state.store.len(),
            unread_count: state.store.unread_count(),
        }
    }

    /// Forget the principal's persisted snapshot, e.g. on sign-out.
    pub async fn clear_cache(&self) {
        self.inner.cache.clear(&self.inner.cache_key).await;
        info!(principal = %self.inner.principal, "Notification cache cleared");
    }

    pub async fn on_new_notifications<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&[NotificationRecord]) + Send + Sync + 'static,
    {
        self.inner.events.on_new_notifications(handler).await
    }

    pub async fn on_state_changed<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&StateChange) + Send + Sync + 'static,
    {
        self.inner.events.on_state_changed(handler).await
    }

    pub async fn subscribe(&self, kind: NotificationEventKind, handler: Arc<dyn EventHandler>) -> SubscriptionId {
        self.inner.events.subscribe(kind, handler).await
    }

    pub async fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.events.unsubscribe(id).await
    }
}

fn state_change(store: &NotificationStore, cause: ChangeCause) -> StateChange {
    StateChange {
        cause,
        total: store.len(),
        unread_count: store.unread_count(),
    }
}

impl EngineInner {
    fn state(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn poll(&self) -> PollOutcome {
        if self.in_flight.swap(true, Ordering::AcqRel) {
            debug!(principal = %self.principal, "Poll already in flight, skipping tick");
            return PollOutcome::Skipped;
        }
        let _in_flight = InFlightGuard(&self.in_flight);

        let incoming = match self.api.fetch_all().await {
            Ok(incoming) => incoming,
            Err(e) => {
                self.fetch_failed(&e);
                return PollOutcome::Failed(e);
            }
        };

        let (announced, change) = {
            let mut guard = self.state();
            let state = &mut *guard;
            let mut incoming = incoming;
            if let Some(baseline) = state.baseline.take() {
                MergeReconciler::preserve_read_state(&baseline, &mut incoming);
            }

            let fresh = state.deduplicator.filter_new(&incoming);
            let merged = state.reconciler.reconcile(state.store.items(), incoming);
            let announced: Vec<NotificationRecord> = {
                let by_signature: HashMap<String, &NotificationRecord> =
                    merged.iter().map(|record| (signature(record), record)).collect();
                fresh
                    .iter()
                    .filter_map(|record| by_signature.get(&signature(record)).map(|&found| found.clone()))
                    .collect()
            };

            state.store.replace(merged);
            state.last_successful_poll = Some(self.clock.now());
            (announced, state_change(&state.store, ChangeCause::Reconciled))
        };
        self.auth_required.store(false, Ordering::Release);

        self.persist().await;

        let new = announced.len();
        if new > 0 {
            info!(principal = %self.principal, count = new, "New notifications");
            self.events
                .emit(NotificationEvent::NewNotifications(announced))
                .await;
        }
        self.events.emit(NotificationEvent::StateChanged(change)).await;

        debug!(principal = %self.principal, new, total = change.total, unread = change.unread_count, "Poll reconciled");
        PollOutcome::Reconciled {
            new,
            total: change.total,
        }
    }

    fn fetch_failed(&self, error: &NotificationApiError) {
        match error.kind() {
            FailureKind::Auth => self.require_authentication(error),
            FailureKind::Transient => {
                warn!(principal = %self.principal, error = %error, "Notification poll failed, keeping last known state");
            }
        }
    }

    fn confirmation_settled(&self, operation: &str, result: NotificationApiResult<()>) {
        match result {
            Ok(()) => debug!(principal = %self.principal, operation, "Server confirmed"),
            Err(e) if e.is_auth() => self.require_authentication(&e),
            Err(e) => warn!(principal = %self.principal, operation, error = %e, "Server confirmation failed"),
        }
    }

    fn require_authentication(&self, error: &NotificationApiError) {
        self.auth_required.store(true, Ordering::Release);
        self.scheduler.stop();
        warn!(principal = %self.principal, error = %error, "Notification API rejected credentials, polling stopped");
    }

    /// Write the current store through to the persistent cache.
    async fn persist(&self) {
        let _write = self.persist_lock.lock().await;
        let items = self.state().store.items().to_vec();
        let envelope = self.cache.snapshot(items);
        self.cache.save(&self.cache_key, &envelope).await;
    }
}

impl Drop for EngineInner {
    fn drop(&mut self) {
        self.scheduler.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;

    struct StaticApi {
        response: Mutex<NotificationApiResult<Vec<NotificationRecord>>>,
    }

    impl StaticApi {
        fn returning(records: Vec<NotificationRecord>) -> Arc<Self> {
            Arc::new(Self {
                response: Mutex::new(Ok(records)),
            })
        }

        fn set(&self, response: NotificationApiResult<Vec<NotificationRecord>>) {
            *self.response.lock().unwrap() = response;
        }
    }

    #[async_trait]
    impl NotificationApiPort for StaticApi {
        async fn fetch_all(&self) -> NotificationApiResult<Vec<NotificationRecord>> {
            self.response.lock().unwrap().clone()
        }

        async fn mark_read(&self, _id: &str) -> NotificationApiResult<()> {
            Ok(())
        }

        async fn mark_all_read(&self) -> NotificationApiResult<()> {
            Ok(())
        }
    }

    fn payment(id: &str) -> NotificationRecord {
        NotificationRecord::new(id, NotificationType::Payment, "Payment", "Paid", "2024-01-01T00:00:00Z")
    }

    #[tokio::test]
    async fn test_refresh_merges_and_counts() {
        let api = StaticApi::returning(vec![payment("a")]);
        let engine = NotificationEngine::builder("admin@gym", api.clone()).build();

        assert_eq!(engine.refresh().await, PollOutcome::Reconciled { new: 1, total: 1 });
        assert_eq!(engine.unread_count(), 1);
        assert_eq!(engine.refresh().await, PollOutcome::Reconciled { new: 0, total: 1 });

        api.set(Err(NotificationApiError::ServerError { status: 502 }));
        assert!(matches!(engine.refresh().await, PollOutcome::Failed(_)));
        assert_eq!(engine.items().len(), 1);
        assert!(engine.status().last_successful_poll.is_some());
    }

    #[tokio::test]
    async fn test_add_notification_is_deduplicated() {
        let engine = NotificationEngine::builder("admin@gym", StaticApi::returning(Vec::new())).build();

        let record = engine
            .add_notification("support", "Ticket", "New ticket #7", json!({"ticket": 7}))
            .await
            .unwrap();
        assert!(record.is_synthetic());
        assert_eq!(engine.unread_count(), 1);
        assert_eq!(engine.stats().by_type.get("support"), Some(&1));
    }

    #[tokio::test]
    async fn test_mark_read_unknown_id() {
        let engine = NotificationEngine::builder("admin@gym", StaticApi::returning(vec![payment("a")])).build();
        engine.refresh().await;

        assert!(!engine.mark_read("missing").await);
        assert!(engine.mark_read("a").await);
        assert!(!engine.mark_read("a").await);
        assert_eq!(engine.mark_all_read().await, 0);
        assert_eq!(engine.unread_count(), 0);
    }

    #[tokio::test]
    async fn test_auth_failure_flags_status() {
        let api = StaticApi::returning(Vec::new());
        api.set(Err(NotificationApiError::AuthenticationError { status: 401 }));
        let engine = NotificationEngine::builder("admin@gym", api).build();

        assert_eq!(engine.start().await, Err(EngineError::AuthenticationRequired));
        let status = engine.status();
        assert!(status.auth_required);
        assert!(!status.polling);
        assert_eq!(status.scheduler, "fixed-interval");
    }
}
