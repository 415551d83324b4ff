//! Delivery of rendered notifications to the shared display.

mod display;
mod error;
mod logging;
mod template;

use std::time::Duration;

pub use display::{HttpDisplayNotifier, create_retryable_http_client};
pub use error::NotifierError;
pub use logging::LogNotifier;
#[cfg(test)]
use mockall::automock;
pub use template::{NotificationRenderer, TemplateService, TemplateServiceError};

use crate::models::DisplayNotification;

/// Outcome of a single delivery.
pub type DeliveryResult = Result<(), NotifierError>;

/// A channel that can show a notification.
#[cfg_attr(test, automock)]
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    /// Delivers one notification.
    async fn deliver(&self, notification: &DisplayNotification) -> DeliveryResult;
}

/// Delivers a notification, giving up after `timeout`.
pub async fn deliver_with_timeout(
    notifier: &dyn Notifier,
    notification: &DisplayNotification,
    timeout: Duration,
) -> DeliveryResult {
    match tokio::time::timeout(timeout, notifier.deliver(notification)).await {
        Ok(result) => result,
        Err(_) => Err(NotifierError::Timeout(timeout)),
    }
}
