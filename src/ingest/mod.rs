//! Inbound detections. Each station feeds its own subscription into one
//! shared queue consumed by the decision pipeline.

mod nats;

use chrono::{DateTime, Utc};
pub use nats::NatsEventSource;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::models::{InboundDetection, RawDetection};

/// Errors raised by an event source.
#[derive(Debug, Error)]
pub enum IngestError {
    /// Connecting to the broker failed.
    #[error("NATS connection error: {0}")]
    Connect(#[from] async_nats::ConnectError),

    /// Subscribing to the station subject failed.
    #[error("NATS subscribe error: {0}")]
    Subscribe(#[from] async_nats::SubscribeError),

    /// The pipeline stopped accepting detections.
    #[error("Detection queue closed")]
    QueueClosed,
}

/// A producer of detections for one station.
#[async_trait::async_trait]
pub trait EventSource: Send + Sync {
    /// Station served by this source.
    fn station(&self) -> &str;

    /// Forwards detections into `tx` until `cancel` fires or the source ends.
    async fn run(
        &self,
        tx: mpsc::Sender<InboundDetection>,
        cancel: CancellationToken,
    ) -> Result<(), IngestError>;
}

/// Turns a transport payload into an [`InboundDetection`]. A payload that is
/// not valid JSON is kept as an empty detection so that it is still counted
/// as malformed.
pub fn parse_payload(
    payload: &[u8],
    station: &str,
    received_at: DateTime<Utc>,
) -> InboundDetection {
    let raw = serde_json::from_slice::<RawDetection>(payload).unwrap_or_else(|e| {
        tracing::warn!(station = %station, error = %e, "Received undecodable detection payload.");
        RawDetection::default()
    });
    InboundDetection { station: station.to_string(), received_at, raw }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_payload() {
        let now = Utc::now();
        let inbound = parse_payload(
            br#"{"scientific_name": "Pica pica", "common_name": "Magpie", "confidence": 0.81}"#,
            "garden",
            now,
        );
        assert_eq!(inbound.station, "garden");
        assert_eq!(inbound.received_at, now);
        let event = inbound.validate().unwrap();
        assert_eq!(event.common_name, "Magpie");
        assert_eq!(event.timestamp, now);
    }

    #[test]
    fn test_parse_garbage_payload_is_malformed() {
        let inbound = parse_payload(b"\x00not json", "roof", Utc::now());
        assert_eq!(inbound.raw, RawDetection::default());
        assert!(inbound.validate().is_err());
    }
}
