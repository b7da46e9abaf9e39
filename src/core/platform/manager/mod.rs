pub mod deduplicator;
pub mod event_manager;
pub mod notification_engine;
pub mod notification_store;
pub mod persistent_cache;
pub mod reconciler;
pub mod scheduler;
