/*
Test doubles shared by the engine integration tests.
*/
#![allow(dead_code)]

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use tokio::sync::{Notify, Semaphore};

use gymdesk::application::ports::output::notification_api_port::{
    NotificationApiError, NotificationApiPort, NotificationApiResult,
};
use gymdesk::application::ports::output::scheduler_port::{
    ExternalPollingService, PollPriority, PollRegistration, PollTask, SchedulerError,
};
use gymdesk::core::platform::container::notification::{NotificationRecord, NotificationType};

pub fn start_instant() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap()
}

pub fn record(id: &str, kind: NotificationType, message: &str, timestamp: &str) -> NotificationRecord {
    NotificationRecord::new(id, kind.clone(), kind.as_str().to_string(), message, timestamp)
}

pub fn payment(id: &str) -> NotificationRecord {
    record(id, NotificationType::Payment, &format!("Payment {} received", id), "2024-03-01T09:00:00Z")
}

/// Notification API whose answers and timing the test controls
#[derive(Default)]
pub struct FakeNotificationApi {
    response: Mutex<Option<NotificationApiResult<Vec<NotificationRecord>>>>,
    confirmation: Mutex<Option<NotificationApiError>>,
    fetch_gate: Mutex<Option<Arc<Semaphore>>>,
    confirmation_gate: Mutex<Option<Arc<Semaphore>>>,
    fetch_started: Notify,
    confirmation_started: Notify,
    fetches: AtomicUsize,
    mark_all_read_calls: AtomicUsize,
    mark_read_ids: Mutex<Vec<String>>,
}

impl FakeNotificationApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn returning(records: Vec<NotificationRecord>) -> Arc<Self> {
        let api = Self::new();
        api.set_records(records);
        api
    }

    pub fn set_records(&self, records: Vec<NotificationRecord>) {
        *self.response.lock().unwrap() = Some(Ok(records));
    }

    pub fn fail_with(&self, error: NotificationApiError) {
        *self.response.lock().unwrap() = Some(Err(error));
    }

    pub fn fail_confirmations_with(&self, error: NotificationApiError) {
        *self.confirmation.lock().unwrap() = Some(error);
    }

    /// Make fetches wait until the returned semaphore gets permits.
    pub fn hold_fetches(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.fetch_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    /// Make confirmations wait until the returned semaphore gets permits.
    pub fn hold_confirmations(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.confirmation_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub async fn fetch_started(&self) {
        self.fetch_started.notified().await;
    }

    pub async fn confirmation_started(&self) {
        self.confirmation_started.notified().await;
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn mark_read_ids(&self) -> Vec<String> {
        self.mark_read_ids.lock().unwrap().clone()
    }

    pub fn mark_all_read_calls(&self) -> usize {
        self.mark_all_read_calls.load(Ordering::SeqCst)
    }

    async fn pass(gate: Option<Arc<Semaphore>>) {
        if let Some(gate) = gate {
            gate.acquire().await.unwrap().forget();
        }
    }

    async fn confirm(&self) -> NotificationApiResult<()> {
        self.confirmation_started.notify_one();
        let gate = self.confirmation_gate.lock().unwrap().clone();
        Self::pass(gate).await;
        match self.confirmation.lock().unwrap().clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl NotificationApiPort for FakeNotificationApi {
    async fn fetch_all(&self) -> NotificationApiResult<Vec<NotificationRecord>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.fetch_started.notify_one();
        let gate = self.fetch_gate.lock().unwrap().clone();
        Self::pass(gate).await;
        self.response
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn mark_read(&self, id: &str) -> NotificationApiResult<()> {
        self.mark_read_ids.lock().unwrap().push(id.to_string());
        self.confirm().await
    }

    async fn mark_all_read(&self) -> NotificationApiResult<()> {
        self.mark_all_read_calls.fetch_add(1, Ordering::SeqCst);
        self.confirm().await
    }
}

/// External polling service that only records registrations
#[derive(Default)]
pub struct FakePollingService {
    pub unavailable: bool,
    next_id: AtomicU64,
    registrations: Mutex<Vec<(PollRegistration, String, Duration, PollPriority, PollTask)>>,
    unregistered: Mutex<Vec<PollRegistration>>,
}

impl FakePollingService {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn unavailable() -> Arc<Self> {
        Arc::new(Self {
            unavailable: true,
            ..Default::default()
        })
    }

    pub fn registration_count(&self) -> usize {
        self.registrations.lock().unwrap().len()
    }

    pub fn last_registration(&self) -> Option<(PollRegistration, String, Duration, PollPriority)> {
        self.registrations
            .lock()
            .unwrap()
            .last()
            .map(|(id, name, interval, priority, _)| (*id, name.clone(), *interval, *priority))
    }

    /// Run the most recently registered task, as the service would on its own schedule.
    pub async fn run_task(&self) {
        let task = self
            .registrations
            .lock()
            .unwrap()
            .last()
            .map(|(.., task)| task.clone());
        if let Some(task) = task {
            task().await;
        }
    }

    pub fn unregistered(&self) -> Vec<PollRegistration> {
        self.unregistered.lock().unwrap().clone()
    }
}

impl ExternalPollingService for FakePollingService {
    fn is_available(&self) -> bool {
        !self.unavailable
    }

    fn register(
        &self,
        name: &str,
        interval: Duration,
        priority: PollPriority,
        task: PollTask,
    ) -> Result<PollRegistration, SchedulerError> {
        let registration = PollRegistration(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.registrations
            .lock()
            .unwrap()
            .push((registration, name.to_string(), interval, priority, task));
        Ok(registration)
    }

    fn unregister(&self, registration: PollRegistration) {
        self.unregistered.lock().unwrap().push(registration);
    }
}
