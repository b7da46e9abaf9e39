pub mod cache_storage_port;
pub mod clock_port;
pub mod notification_api_port;
pub mod scheduler_port;
