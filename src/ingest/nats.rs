use chrono::Utc;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::{EventSource, IngestError, parse_payload};
use crate::{
    config::{NatsConfig, StationConfig},
    models::InboundDetection,
};

/// Subscribes to one station's detection subject.
pub struct NatsEventSource {
    client: async_nats::Client,
    station: StationConfig,
}

impl NatsEventSource {
    /// Wraps an existing client.
    pub fn new(client: async_nats::Client, station: StationConfig) -> Self {
        Self { client, station }
    }

    /// Connects to the broker described by `config`.
    pub async fn connect(config: &NatsConfig) -> Result<async_nats::Client, IngestError> {
        let options = match config.token.as_ref() {
            Some(token) => async_nats::ConnectOptions::with_token(token.clone()),
            None => async_nats::ConnectOptions::new(),
        };
        Ok(options.connect(&config.urls).await?)
    }
}

#[async_trait::async_trait]
impl EventSource for NatsEventSource {
    fn station(&self) -> &str {
        &self.station.id
    }

    async fn run(
        &self,
        tx: mpsc::Sender<InboundDetection>,
        cancel: CancellationToken,
    ) -> Result<(), IngestError> {
        let mut subscriber = self.client.subscribe(self.station.subject.clone()).await?;
        tracing::info!(
            station = %self.station.id,
            subject = %self.station.subject,
            "Subscribed to detections."
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!(station = %self.station.id, "Detection subscription stopping.");
                    break;
                }
                message = subscriber.next() => {
                    let Some(message) = message else {
                        tracing::warn!(
                            station = %self.station.id,
                            "Detection subscription closed by the server."
                        );
                        break;
                    };
                    let inbound = parse_payload(&message.payload, &self.station.id, Utc::now());
                    if tx.send(inbound).await.is_err() {
                        return Err(IngestError::QueueClosed);
                    }
                }
            }
        }

        if let Err(e) = subscriber.unsubscribe().await {
            tracing::debug!(station = %self.station.id, error = %e, "Unsubscribe failed.");
        }
        Ok(())
    }
}
