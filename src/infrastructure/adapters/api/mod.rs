pub mod http_notification_api;

pub use http_notification_api::{HttpNotificationApi, HttpNotificationApiConfig};
