/*
Scheduler Port

Contracts between the notification engine and whatever decides when it polls.

The External Polling Service is the companion cooperative scheduler some deployments run: it
batches the periodic work of several console modules, spreads it by priority and may throttle
it. It is optional, so the engine only talks to it through a poll scheduler adapter that can
fall back to a plain fixed-interval timer.

The Visibility Port tells schedulers whether the host is currently shown to the user, so that
polling can pause while nobody is looking.
*/

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::watch;

/// Unit of work a scheduler runs on each tick
pub type PollTask = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// Advisory priority handed to cooperative schedulers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PollPriority {
    Low,
    #[default]
    Normal,
    High,
}

/// Handle of a task registered with an external polling service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PollRegistration(pub u64);

/// Errors that can occur in scheduler operations
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SchedulerError {
    #[error("No async runtime available to drive the poll loop")]
    NoRuntime,

    #[error("Invalid poll interval: {0:?}")]
    InvalidInterval(Duration),

    #[error("Registration rejected: {0}")]
    RegistrationRejected(String),
}

/// Companion cooperative scheduler
pub trait ExternalPollingService: Send + Sync {
    /// Whether the service is up and accepting registrations.
    fn is_available(&self) -> bool;

    /// Register `task` to run roughly every `interval`.
    fn register(
        &self,
        name: &str,
        interval: Duration,
        priority: PollPriority,
        task: PollTask,
    ) -> Result<PollRegistration, SchedulerError>;

    /// Drop a registration. Unknown registrations are ignored.
    fn unregister(&self, registration: PollRegistration);
}

/// Host visibility, as a watch channel of "is visible" values
pub trait VisibilityPort: Send + Sync {
    fn subscribe(&self) -> watch::Receiver<bool>;

    fn is_visible(&self) -> bool {
        *self.subscribe().borrow()
    }
}
