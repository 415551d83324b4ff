use super::{DeliveryResult, Notifier};
use crate::models::DisplayNotification;

/// Writes notifications to the log. Used when no display endpoint is
/// configured and by the replay command.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait::async_trait]
impl Notifier for LogNotifier {
    async fn deliver(&self, notification: &DisplayNotification) -> DeliveryResult {
        tracing::info!(
            text = %notification.text,
            icon = %notification.icon,
            color = %notification.color,
            duration_secs = notification.duration_secs,
            media = ?notification.media,
            "Display notification."
        );
        Ok(())
    }
}
