// src/main.rs
use std::process;
use std::sync::Arc;

use gymdesk::application::ports::output::cache_storage_port::CacheStoragePort;
use gymdesk::cli::Cli;
use gymdesk::config::Settings;
use gymdesk::core::platform::manager::notification_engine::{NotificationEngine, PollOutcome};
use gymdesk::core::platform::manager::scheduler::FixedIntervalScheduler;
use gymdesk::infrastructure::adapters::api::HttpNotificationApi;
use gymdesk::infrastructure::adapters::logs::SystemLogAdapter;
use gymdesk::infrastructure::adapters::storage::{FileCacheStorage, MemoryCacheStorage};
use gymdesk::infrastructure::adapters::visibility::AlwaysVisible;
use structopt::StructOpt;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    let cli = Cli::from_args();

    let settings = match &cli.config {
        Some(path) => Settings::load_from_file(path),
        None => Settings::new(),
    };
    let settings = match settings {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    let _logging = match SystemLogAdapter::init(settings.log_config()) {
        Ok(logging) => logging,
        Err(e) => {
            eprintln!("Failed to initialize logging: {}", e);
            process::exit(1);
        }
    };

    let api = match HttpNotificationApi::new(settings.api_config()) {
        Ok(api) => api,
        Err(e) => {
            error!(error = %e, "Failed to build notification API client");
            process::exit(1);
        }
    };

    let storage: Arc<dyn CacheStoragePort> = if settings.cache.enabled {
        Arc::new(FileCacheStorage::new(settings.cache.directory.clone()))
    } else {
        Arc::new(MemoryCacheStorage::new())
    };

    let engine = NotificationEngine::builder(cli.principal.clone(), Arc::new(api))
        .storage(storage)
        // headless: nothing ever hides the daemon
        .scheduler(Arc::new(FixedIntervalScheduler::new(Arc::new(AlwaysVisible::new()))))
        .poll_interval(settings.poll_interval())
        .poll_options(settings.poll_options())
        .retention(settings.polling.retention)
        .cache_validity(settings.cache_validity())
        .build();

    engine
        .on_new_notifications(|records| {
            for record in records {
                info!(
                    id = %record.id,
                    kind = %record.notification_type,
                    title = %record.title,
                    message = %record.message,
                    "Notification"
                );
            }
        })
        .await;

    let restored = engine.initialize().await;
    info!(principal = %cli.principal, ?restored, "Notification engine initialized");

    if cli.once {
        match engine.refresh().await {
            PollOutcome::Failed(e) => {
                error!(error = %e, "Notification poll failed");
                process::exit(1);
            }
            outcome => info!(?outcome, "Notification poll finished"),
        }
        if cli.mark_all_read {
            let marked = engine.mark_all_read().await;
            info!(marked, "Marked notifications read");
        }
        let stats = engine.stats();
        info!(total = stats.total, unread = stats.unread, by_type = ?stats.by_type, "Notification feed");
        return;
    }

    if let Err(e) = engine.start().await {
        error!(error = %e, "Failed to start notification polling");
        process::exit(1);
    }
    if cli.mark_all_read {
        let marked = engine.mark_all_read().await;
        info!(marked, "Marked notifications read");
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
    }
    engine.stop();
    info!(status = ?engine.status(), "Notification engine stopped");
}
