/*
Integration tests for engine polling

The engine started on the fixed interval timer (with virtual time) and on a fake external
polling service: tick cadence, pausing while hidden, auth failures and fallback.
*/

mod common;

use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;

use common::{payment, FakeNotificationApi, FakePollingService};
use gymdesk::application::ports::output::notification_api_port::NotificationApiError;
use gymdesk::application::ports::output::scheduler_port::{ExternalPollingService, PollPriority, VisibilityPort};
use gymdesk::core::platform::manager::scheduler::{scheduler_for, FixedIntervalScheduler, PollOptions, POLL_TASK_NAME};
use gymdesk::infrastructure::adapters::visibility::{AlwaysVisible, WatchVisibility};
use gymdesk::{EngineError, NotificationEngine};

const INTERVAL: Duration = Duration::from_secs(30);

fn fixed_engine(api: Arc<FakeNotificationApi>, visibility: Arc<dyn VisibilityPort>, options: PollOptions) -> NotificationEngine {
    NotificationEngine::builder("admin@gym", api)
        .scheduler(Arc::new(FixedIntervalScheduler::new(visibility)))
        .poll_interval(INTERVAL)
        .poll_options(options)
        .build()
}

async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test(start_paused = true)]
async fn test_start_polls_now_then_every_interval() {
    let api = FakeNotificationApi::returning(vec![payment("a")]);
    let engine = fixed_engine(api.clone(), Arc::new(AlwaysVisible::new()), PollOptions::default());

    engine.start().await.unwrap();
    assert_eq!(api.fetches(), 1);
    assert_eq!(engine.unread_count(), 1);
    assert!(engine.status().polling);

    sleep(INTERVAL * 2 + Duration::from_secs(1)).await;
    assert_eq!(api.fetches(), 3);

    engine.stop();
    engine.stop();
    sleep(INTERVAL * 3).await;
    assert_eq!(api.fetches(), 3);
    assert!(!engine.status().polling);
}

#[tokio::test(start_paused = true)]
async fn test_restart_keeps_single_loop() {
    let api = FakeNotificationApi::new();
    let engine = fixed_engine(api.clone(), Arc::new(AlwaysVisible::new()), PollOptions::default());

    engine.start().await.unwrap();
    engine.start().await.unwrap();
    assert_eq!(api.fetches(), 2);

    sleep(INTERVAL + Duration::from_secs(1)).await;
    assert_eq!(api.fetches(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_pause_while_hidden_and_poll_on_return() {
    let api = FakeNotificationApi::new();
    let visibility = Arc::new(WatchVisibility::new(true));
    let options = PollOptions {
        pause_when_hidden: true,
        ..Default::default()
    };
    let engine = fixed_engine(api.clone(), visibility.clone(), options);

    engine.start().await.unwrap();
    assert_eq!(api.fetches(), 1);

    visibility.set_visible(false);
    sleep(INTERVAL * 4).await;
    assert_eq!(api.fetches(), 1);

    visibility.set_visible(true);
    settle().await;
    assert_eq!(api.fetches(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_auth_failure_stops_polling() {
    let api = FakeNotificationApi::new();
    let engine = fixed_engine(api.clone(), Arc::new(AlwaysVisible::new()), PollOptions::default());

    engine.start().await.unwrap();
    api.fail_with(NotificationApiError::AuthenticationError { status: 401 });

    sleep(INTERVAL + Duration::from_secs(1)).await;
    assert_eq!(api.fetches(), 2);
    let status = engine.status();
    assert!(status.auth_required);
    assert!(!status.polling);

    sleep(INTERVAL * 5).await;
    assert_eq!(api.fetches(), 2);

    // starting again retries once and reports the rejection
    assert_eq!(engine.start().await, Err(EngineError::AuthenticationRequired));
    assert_eq!(api.fetches(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_transient_failures_keep_polling() {
    let api = FakeNotificationApi::returning(vec![payment("a")]);
    let engine = fixed_engine(api.clone(), Arc::new(AlwaysVisible::new()), PollOptions::default());

    engine.start().await.unwrap();
    api.fail_with(NotificationApiError::ServerError { status: 503 });

    sleep(INTERVAL * 2 + Duration::from_secs(1)).await;
    assert_eq!(api.fetches(), 3);
    assert!(engine.status().polling);
    assert_eq!(engine.items().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_slow_fetch_skips_ticks() {
    let api = FakeNotificationApi::new();
    let engine = fixed_engine(api.clone(), Arc::new(AlwaysVisible::new()), PollOptions::default());
    engine.start().await.unwrap();

    let gate = api.hold_fetches();
    sleep(INTERVAL * 3 + Duration::from_secs(1)).await;
    assert_eq!(api.fetches(), 2);

    gate.add_permits(1);
    settle().await;
    sleep(INTERVAL).await;
    gate.add_permits(1);
    settle().await;
    assert_eq!(api.fetches(), 3);
}

#[tokio::test]
async fn test_cooperative_registration() {
    let api = FakeNotificationApi::returning(vec![payment("a")]);
    let service = FakePollingService::new();
    let external: Arc<dyn ExternalPollingService> = service.clone();
    let engine = NotificationEngine::builder("admin@gym", api.clone())
        .scheduler(scheduler_for(Some(external), Arc::new(AlwaysVisible::new())))
        .poll_interval(INTERVAL)
        .poll_options(PollOptions {
            pause_when_hidden: false,
            priority: PollPriority::Low,
        })
        .build();

    engine.start().await.unwrap();
    let (registration, name, interval, priority) = service.last_registration().unwrap();
    assert_eq!(name, POLL_TASK_NAME);
    assert_eq!(interval, INTERVAL);
    assert_eq!(priority, PollPriority::Low);
    assert_eq!(engine.status().scheduler, "cooperative");

    service.run_task().await;
    assert_eq!(api.fetches(), 2);

    engine.stop();
    assert_eq!(service.unregistered(), vec![registration]);
}

#[tokio::test]
async fn test_cooperative_task_does_not_keep_engine_alive() {
    let api = FakeNotificationApi::new();
    let service = FakePollingService::new();
    let external: Arc<dyn ExternalPollingService> = service.clone();
    let engine = NotificationEngine::builder("admin@gym", api.clone())
        .scheduler(scheduler_for(Some(external), Arc::new(AlwaysVisible::new())))
        .build();

    engine.start().await.unwrap();
    drop(engine);

    assert_eq!(service.unregistered().len(), 1);
    service.run_task().await;
    assert_eq!(api.fetches(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_cooperative_falls_back_to_fixed_interval() {
    let api = FakeNotificationApi::new();
    let service = FakePollingService::unavailable();
    let external: Arc<dyn ExternalPollingService> = service.clone();
    let engine = NotificationEngine::builder("admin@gym", api.clone())
        .scheduler(scheduler_for(Some(external), Arc::new(AlwaysVisible::new())))
        .poll_interval(INTERVAL)
        .build();

    engine.start().await.unwrap();
    assert_eq!(engine.status().scheduler, "fixed-interval");
    assert_eq!(service.registration_count(), 0);

    sleep(INTERVAL + Duration::from_secs(1)).await;
    assert_eq!(api.fetches(), 2);
}

#[tokio::test]
async fn test_zero_interval_is_rejected() {
    let api = FakeNotificationApi::new();
    let engine = NotificationEngine::builder("admin@gym", api)
        .poll_interval(Duration::ZERO)
        .build();

    assert!(matches!(engine.start().await, Err(EngineError::Scheduler(_))));
    assert!(!engine.status().polling);
}
