//! HTTP delivery to the display endpoint.

use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{Jitter, RetryTransientMiddleware, policies::ExponentialBackoff};
use url::Url;

use super::{DeliveryResult, Notifier, NotifierError};
use crate::{
    config::{DisplayConfig, HttpRetryConfig, JitterSetting},
    models::DisplayNotification,
};

/// Creates an HTTP client that retries transient failures according to
/// `config`.
pub fn create_retryable_http_client(
    config: &HttpRetryConfig,
    base_client: reqwest::Client,
) -> ClientWithMiddleware {
    let policy_builder = match config.jitter {
        JitterSetting::None => ExponentialBackoff::builder().jitter(Jitter::None),
        JitterSetting::Full => ExponentialBackoff::builder().jitter(Jitter::Full),
    };

    let retry_policy = policy_builder
        .base(config.base_for_backoff)
        .retry_bounds(config.initial_backoff_ms, config.max_backoff_secs)
        .build_with_max_retries(config.max_retries);

    ClientBuilder::new(base_client)
        .with(RetryTransientMiddleware::new_with_policy(retry_policy))
        .build()
}

/// Posts notifications as JSON to the display endpoint.
#[derive(Debug)]
pub struct HttpDisplayNotifier {
    url: Url,
    client: ClientWithMiddleware,
}

impl HttpDisplayNotifier {
    /// Creates a notifier for `url`. The per-request timeout matches the
    /// delivery timeout so that a hung connection is abandoned.
    pub fn new(url: Url, config: &DisplayConfig) -> Result<Self, NotifierError> {
        let base_client = reqwest::Client::builder().timeout(config.timeout_ms).build()?;
        let client = create_retryable_http_client(&config.retry_policy, base_client);
        Ok(Self { url, client })
    }
}

#[async_trait::async_trait]
impl Notifier for HttpDisplayNotifier {
    async fn deliver(&self, notification: &DisplayNotification) -> DeliveryResult {
        let response = self.client.post(self.url.clone()).json(notification).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(NotifierError::Rejected(status.as_u16()));
        }

        tracing::debug!(text = %notification.text, "Notification delivered to display.");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use mockito::Matcher;

    use super::*;

    fn notification() -> DisplayNotification {
        DisplayNotification {
            text: "First Hoopoe of 2025!".to_string(),
            icon: "rare".to_string(),
            color: "#FFD700".to_string(),
            duration_secs: 10,
            media: None,
        }
    }

    fn notifier(url: &str) -> HttpDisplayNotifier {
        HttpDisplayNotifier::new(Url::parse(url).unwrap(), &DisplayConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn test_deliver_posts_json() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/notify")
            .match_header("content-type", "application/json")
            .match_body(Matcher::PartialJson(serde_json::json!({
                "text": "First Hoopoe of 2025!",
                "icon": "rare",
                "color": "#FFD700",
                "duration_secs": 10
            })))
            .with_status(200)
            .create_async()
            .await;

        let result = notifier(&format!("{}/notify", server.url())).deliver(&notification()).await;
        assert!(result.is_ok());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_deliver_reports_rejection() {
        let mut server = mockito::Server::new_async().await;
        let mock = server.mock("POST", "/notify").with_status(503).create_async().await;

        let result = notifier(&format!("{}/notify", server.url())).deliver(&notification()).await;
        assert!(matches!(result, Err(NotifierError::Rejected(503))));
        mock.assert_async().await;
    }
}
