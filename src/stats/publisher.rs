use bytes::Bytes;
#[cfg(test)]
use mockall::automock;

use crate::models::StatsReport;

/// Errors raised while emitting a stats report.
#[derive(Debug, thiserror::Error)]
pub enum StatsPublishError {
    /// The report could not be serialized.
    #[error("Failed to serialize stats report: {0}")]
    Serialize(#[from] serde_json::Error),

    /// NATS publish error.
    #[error("NATS publish error: {0}")]
    NatsPublish(#[from] async_nats::PublishError),

    /// NATS flush error.
    #[error("NATS flush error: {0}")]
    NatsFlush(#[from] async_nats::client::FlushError),
}

/// Emits stats reports to an external metrics channel.
#[cfg_attr(test, automock)]
#[async_trait::async_trait]
pub trait StatsPublisher: Send + Sync {
    /// Publishes one report.
    async fn publish(&self, report: &StatsReport) -> Result<(), StatsPublishError>;
}

/// Publishes every station snapshot as a JSON message on a NATS subject.
pub struct NatsStatsPublisher {
    client: async_nats::Client,
    subject: String,
}

impl NatsStatsPublisher {
    /// Wraps an existing client.
    pub fn new(client: async_nats::Client, subject: impl Into<String>) -> Self {
        Self { client, subject: subject.into() }
    }
}

#[async_trait::async_trait]
impl StatsPublisher for NatsStatsPublisher {
    async fn publish(&self, report: &StatsReport) -> Result<(), StatsPublishError> {
        for snapshot in &report.snapshots {
            let payload = serde_json::to_vec(snapshot)?;
            self.client.publish(self.subject.clone(), Bytes::from(payload)).await?;
        }
        self.client.flush().await?;
        Ok(())
    }
}

/// Writes every station snapshot as a structured log line.
#[derive(Debug, Default)]
pub struct LogStatsPublisher;

#[async_trait::async_trait]
impl StatsPublisher for LogStatsPublisher {
    async fn publish(&self, report: &StatsReport) -> Result<(), StatsPublishError> {
        for snapshot in &report.snapshots {
            tracing::info!(
                station = %snapshot.station,
                period_start = %snapshot.period_start,
                period_end = %snapshot.period_end,
                total = snapshot.counts.total,
                shown = snapshot.counts.shown,
                skipped = snapshot.counts.skipped,
                on_cooldown = snapshot.skip_reasons.on_cooldown,
                burst_suppressed = snapshot.skip_reasons.burst_suppressed,
                send_failed = snapshot.skip_reasons.send_failed,
                malformed_event = snapshot.skip_reasons.malformed_event,
                average_confidence = ?snapshot.average_confidence,
                "Detection stats."
            );
        }
        Ok(())
    }
}
