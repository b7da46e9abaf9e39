use std::env;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::{Client, Response};
use tracing::debug;
use url::Url;

use crate::application::ports::output::notification_api_port::{
    NotificationApiError, NotificationApiPort, NotificationApiResult, NotificationListResponse,
};
use crate::core::platform::container::notification::NotificationRecord;

/// Configuration for the HTTP notification API adapter
#[derive(Debug, Clone)]
pub struct HttpNotificationApiConfig {
    /// Base URL of the console API, e.g. `https://console.example/api`
    pub base_url: String,
    /// Bearer token of the signed-in principal
    pub token: String,
    pub timeout_seconds: u64,
}

impl HttpNotificationApiConfig {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token: token.into(),
            timeout_seconds: 30,
        }
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, String> {
        let base_url = env::var("GYMDESK_API_URL")
            .map_err(|_| "GYMDESK_API_URL environment variable not set")?;
        let token = env::var("GYMDESK_API_TOKEN").unwrap_or_default();
        let timeout_seconds = env::var("GYMDESK_API_TIMEOUT_SECONDS")
            .unwrap_or_else(|_| "30".to_string())
            .parse()
            .map_err(|_| "Invalid GYMDESK_API_TIMEOUT_SECONDS value")?;

        Ok(Self {
            base_url,
            token,
            timeout_seconds,
        })
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.base_url.is_empty() {
            return Err("Base URL cannot be empty".to_string());
        }
        if !self.base_url.starts_with("http") {
            return Err("Base URL must start with http or https".to_string());
        }
        if self.timeout_seconds == 0 {
            return Err("Timeout must be at least one second".to_string());
        }
        Ok(())
    }
}

/// Notification API over REST with bearer authentication
#[derive(Debug, Clone)]
pub struct HttpNotificationApi {
    base_url: Url,
    client: Client,
}

impl HttpNotificationApi {
    pub fn new(config: HttpNotificationApiConfig) -> NotificationApiResult<Self> {
        config.validate().map_err(NotificationApiError::ConfigurationError)?;

        let base_url = Url::parse(&config.base_url)
            .map_err(|e| NotificationApiError::ConfigurationError(format!("Invalid base URL: {}", e)))?;
        if base_url.cannot_be_a_base() {
            return Err(NotificationApiError::ConfigurationError(
                "Base URL cannot carry a path".to_string(),
            ));
        }

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        if !config.token.is_empty() {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {}", config.token)).map_err(|_| {
                    NotificationApiError::ConfigurationError("Invalid token format".to_string())
                })?,
            );
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .default_headers(headers)
            .build()
            .map_err(|e| {
                NotificationApiError::ConfigurationError(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self { base_url, client })
    }

    pub fn from_env() -> NotificationApiResult<Self> {
        let config = HttpNotificationApiConfig::from_env().map_err(NotificationApiError::ConfigurationError)?;
        Self::new(config)
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn check(response: Response) -> NotificationApiResult<Response> {
        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            Err(NotificationApiError::from_status(status.as_u16()))
        }
    }
}

fn map_transport_error(error: reqwest::Error) -> NotificationApiError {
    if error.is_timeout() {
        NotificationApiError::Timeout
    } else {
        NotificationApiError::ConnectionError(error.to_string())
    }
}

#[async_trait]
impl NotificationApiPort for HttpNotificationApi {
    async fn fetch_all(&self) -> NotificationApiResult<Vec<NotificationRecord>> {
        let url = self.endpoint(&["notifications", "all"]);
        let response = self.client.get(url).send().await.map_err(map_transport_error)?;
        let response = Self::check(response).await?;

        let body = response.text().await.map_err(map_transport_error)?;
        let list: NotificationListResponse = serde_json::from_str(&body)
            .map_err(|e| NotificationApiError::DecodeError(e.to_string()))?;

        debug!(count = list.notifications.len(), "Fetched notifications");
        Ok(list.notifications)
    }

    async fn mark_read(&self, id: &str) -> NotificationApiResult<()> {
        let url = self.endpoint(&["notifications", id, "read"]);
        let response = self.client.patch(url).send().await.map_err(map_transport_error)?;
        Self::check(response).await.map(|_| ())
    }

    async fn mark_all_read(&self) -> NotificationApiResult<()> {
        let url = self.endpoint(&["notifications", "mark-all-read"]);
        let response = self.client.patch(url).send().await.map_err(map_transport_error)?;
        Self::check(response).await.map(|_| ())
    }
}
