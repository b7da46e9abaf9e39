/*
Scheduler

Poll scheduler adapters decide when the notification engine polls. They never look at what a
poll does: the engine hands over a task and the adapter runs it on its own cadence.

Two strategies exist, chosen when the engine is built:
- Fixed Interval runs its own tokio timer loop.
- Cooperative registers the task with the companion External Polling Service, and falls back
  to a fixed interval loop when that service is down or refuses the registration.

An adapter owns at most one active loop. Starting again stops the previous loop first, and
stopping is idempotent. With pause-when-hidden, ticks while the host is hidden are skipped and
the task runs once immediately when the host becomes visible again.

Each tick spawns the task instead of awaiting it, so a slow poll never delays the timer. The
engine's in-flight guard turns overlapping ticks into no-ops.
*/

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::future::{self, BoxFuture, FutureExt};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::application::ports::output::scheduler_port::{
    ExternalPollingService, PollPriority, PollRegistration, PollTask, SchedulerError, VisibilityPort,
};

/// Name under which the engine registers with an external polling service
pub const POLL_TASK_NAME: &str = "gymdesk-notifications";

/// Options passed alongside the poll task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PollOptions {
    /// Skip ticks while the host is hidden, poll once on becoming visible
    pub pause_when_hidden: bool,
    /// Advisory; only external schedulers look at it
    pub priority: PollPriority,
}

/// Strategy deciding when the engine polls
pub trait PollScheduler: Send + Sync {
    /// Run `task` every `interval`, replacing any loop started before.
    fn start(&self, task: PollTask, interval: Duration, options: PollOptions) -> Result<(), SchedulerError>;

    /// Stop the active loop, if any.
    fn stop(&self);

    fn is_running(&self) -> bool;

    /// Short strategy name for status reporting
    fn name(&self) -> &'static str;
}

/// Pick the strategy for an engine: cooperative when an external service is wired in.
pub fn scheduler_for(
    external: Option<Arc<dyn ExternalPollingService>>,
    visibility: Arc<dyn VisibilityPort>,
) -> Arc<dyn PollScheduler> {
    match external {
        Some(service) => Arc::new(CooperativeScheduler::new(service, visibility)),
        None => Arc::new(FixedIntervalScheduler::new(visibility)),
    }
}

fn validate_interval(interval: Duration) -> Result<(), SchedulerError> {
    if interval.is_zero() {
        Err(SchedulerError::InvalidInterval(interval))
    } else {
        Ok(())
    }
}

fn current_runtime() -> Result<Handle, SchedulerError> {
    Handle::try_current().map_err(|_| SchedulerError::NoRuntime)
}

/// Timer loop owned by the adapter itself
pub struct FixedIntervalScheduler {
    visibility: Arc<dyn VisibilityPort>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl FixedIntervalScheduler {
    pub fn new(visibility: Arc<dyn VisibilityPort>) -> Self {
        Self {
            visibility,
            handle: Mutex::new(None),
        }
    }
}

impl PollScheduler for FixedIntervalScheduler {
    fn start(&self, task: PollTask, interval: Duration, options: PollOptions) -> Result<(), SchedulerError> {
        validate_interval(interval)?;
        let runtime = current_runtime()?;

        let visibility = options.pause_when_hidden.then(|| self.visibility.subscribe());
        let mut slot = self.handle.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = slot.take() {
            previous.abort();
            debug!("Replaced running poll loop");
        }
        *slot = Some(runtime.spawn(run_fixed_interval(task, interval, visibility)));

        info!(interval_ms = interval.as_millis() as u64, pause_when_hidden = options.pause_when_hidden, "Fixed interval polling started");
        Ok(())
    }

    fn stop(&self) {
        if let Some(handle) = self.handle.lock().unwrap_or_else(PoisonError::into_inner).take() {
            handle.abort();
            info!("Fixed interval polling stopped");
        }
    }

    fn is_running(&self) -> bool {
        self.handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map_or(false, |handle| !handle.is_finished())
    }

    fn name(&self) -> &'static str {
        "fixed-interval"
    }
}

impl Drop for FixedIntervalScheduler {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.get_mut().unwrap_or_else(PoisonError::into_inner).take() {
            handle.abort();
        }
    }
}

enum Wake {
    Tick,
    Shown,
    Hidden,
    Detached,
}

async fn run_fixed_interval(task: PollTask, period: Duration, mut visibility: Option<watch::Receiver<bool>>) {
    // The first tick is one period out; the engine polls on its own when it starts.
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        let wake = match visibility.as_mut() {
            None => {
                ticker.tick().await;
                Wake::Tick
            }
            Some(receiver) => tokio::select! {
                _ = ticker.tick() => Wake::Tick,
                changed = receiver.changed() => match changed {
                    Ok(()) if *receiver.borrow_and_update() => Wake::Shown,
                    Ok(()) => Wake::Hidden,
                    Err(_) => Wake::Detached,
                },
            },
        };

        match wake {
            Wake::Tick => {
                let visible = visibility.as_ref().map_or(true, |receiver| *receiver.borrow());
                if visible {
                    tokio::spawn(task());
                }
            }
            Wake::Shown => {
                debug!("Host visible again, polling now");
                tokio::spawn(task());
                ticker.reset();
            }
            Wake::Hidden => debug!("Host hidden, pausing polls"),
            Wake::Detached => {
                debug!("Visibility source gone, polling unconditionally");
                visibility = None;
            }
        }
    }
}

enum Active {
    External {
        registration: PollRegistration,
        watcher: Option<JoinHandle<()>>,
    },
    Fallback,
}

/// Delegates the cadence to an external polling service
pub struct CooperativeScheduler {
    service: Arc<dyn ExternalPollingService>,
    visibility: Arc<dyn VisibilityPort>,
    fallback: FixedIntervalScheduler,
    active: Mutex<Option<Active>>,
}

impl CooperativeScheduler {
    pub fn new(service: Arc<dyn ExternalPollingService>, visibility: Arc<dyn VisibilityPort>) -> Self {
        Self {
            service,
            fallback: FixedIntervalScheduler::new(visibility.clone()),
            visibility,
            active: Mutex::new(None),
        }
    }

    /// True when the last start had to fall back to the internal timer.
    pub fn is_fallback(&self) -> bool {
        matches!(
            *self.active.lock().unwrap_or_else(PoisonError::into_inner),
            Some(Active::Fallback)
        )
    }

    fn start_fallback(&self, task: PollTask, interval: Duration, options: PollOptions) -> Result<(), SchedulerError> {
        self.fallback.start(task, interval, options)?;
        *self.active.lock().unwrap_or_else(PoisonError::into_inner) = Some(Active::Fallback);
        Ok(())
    }

    fn gate_on_visibility(&self, task: PollTask) -> PollTask {
        let visibility = self.visibility.clone();
        Arc::new(move || -> BoxFuture<'static, ()> {
            if visibility.is_visible() {
                task()
            } else {
                future::ready(()).boxed()
            }
        })
    }
}

impl PollScheduler for CooperativeScheduler {
    fn start(&self, task: PollTask, interval: Duration, options: PollOptions) -> Result<(), SchedulerError> {
        validate_interval(interval)?;
        self.stop();

        if !self.service.is_available() {
            warn!("External polling service unavailable, using fixed interval polling");
            return self.start_fallback(task, interval, options);
        }

        let watcher_runtime = if options.pause_when_hidden {
            Some(current_runtime()?)
        } else {
            None
        };
        let registered = if options.pause_when_hidden {
            self.gate_on_visibility(task.clone())
        } else {
            task.clone()
        };

        let registration = match self.service.register(POLL_TASK_NAME, interval, options.priority, registered) {
            Ok(registration) => registration,
            Err(e) => {
                warn!(error = %e, "External polling service refused registration, using fixed interval polling");
                return self.start_fallback(task, interval, options);
            }
        };

        let watcher = watcher_runtime.map(|runtime| {
            let receiver = self.visibility.subscribe();
            runtime.spawn(poll_when_shown(task, receiver))
        });

        *self.active.lock().unwrap_or_else(PoisonError::into_inner) = Some(Active::External { registration, watcher });
        info!(
            registration = registration.0,
            interval_ms = interval.as_millis() as u64,
            priority = ?options.priority,
            "Registered with external polling service"
        );
        Ok(())
    }

    fn stop(&self) {
        let active = self.active.lock().unwrap_or_else(PoisonError::into_inner).take();
        match active {
            Some(Active::External { registration, watcher }) => {
                self.service.unregister(registration);
                if let Some(watcher) = watcher {
                    watcher.abort();
                }
                info!(registration = registration.0, "Unregistered from external polling service");
            }
            Some(Active::Fallback) => self.fallback.stop(),
            None => {}
        }
    }

    fn is_running(&self) -> bool {
        match *self.active.lock().unwrap_or_else(PoisonError::into_inner) {
            Some(Active::External { .. }) => true,
            Some(Active::Fallback) => self.fallback.is_running(),
            None => false,
        }
    }

    fn name(&self) -> &'static str {
        if self.is_fallback() {
            self.fallback.name()
        } else {
            "cooperative"
        }
    }
}

impl Drop for CooperativeScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn poll_when_shown(task: PollTask, mut receiver: watch::Receiver<bool>) {
    while receiver.changed().await.is_ok() {
        if *receiver.borrow_and_update() {
            debug!("Host visible again, polling now");
            tokio::spawn(task());
        }
    }
}
