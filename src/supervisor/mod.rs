//! The Supervisor module manages the lifecycle of the gate.
//!
//! It owns the long-running services: one subscription task per station, the
//! species table reloader and the decision pipeline. It listens for shutdown
//! signals (Ctrl+C or SIGTERM), cancels every task and lets the pipeline save
//! its state before the process exits.

mod builder;
pub mod pipeline;

use std::{path::PathBuf, sync::Arc, time::SystemTime};

pub use builder::SupervisorBuilder;
use thiserror::Error;
use tokio::{signal, sync::mpsc};
use tokio_util::sync::CancellationToken;

use self::pipeline::{EventPipeline, PipelineSettings};
use crate::{
    config::{AppConfig, AppConfigError},
    engine::{dedup::DedupBuffer, orchestrator::DecisionOrchestrator, rarity::RarityClassifier},
    ingest::EventSource,
    loader::modified_at,
    models::SpeciesTableError,
    notifier::{NotificationRenderer, Notifier, NotifierError, TemplateServiceError},
    persistence::traits::StateStore,
    stats::StatsPublisher,
};

/// Represents the set of errors that can occur during the supervisor's
/// operation.
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// A required configuration was not provided to the `SupervisorBuilder`.
    #[error("Missing configuration for Supervisor")]
    MissingConfig,

    /// A state store was not provided to the `SupervisorBuilder`.
    #[error("Missing state store for Supervisor")]
    MissingStateStore,

    /// The application settings are unusable.
    #[error("Configuration error: {0}")]
    Config(#[from] AppConfigError),

    /// The species table could not be loaded.
    #[error("Species table error: {0}")]
    SpeciesTable(#[from] SpeciesTableError),

    /// A display template does not compile.
    #[error("Display template error: {0}")]
    Template(#[from] TemplateServiceError),

    /// The display notifier could not be created.
    #[error("Notifier error: {0}")]
    Notifier(#[from] NotifierError),

    /// The decision pipeline task failed.
    #[error("Decision pipeline failed: {0}")]
    Pipeline(#[from] tokio::task::JoinError),
}

/// The primary runtime manager for the application.
pub struct Supervisor {
    config: Arc<AppConfig>,
    store: Arc<dyn StateStore>,
    classifier: Arc<RarityClassifier>,
    renderer: Arc<NotificationRenderer>,
    notifier: Arc<dyn Notifier>,
    publisher: Arc<dyn StatsPublisher>,
    sources: Vec<Arc<dyn EventSource>>,
    cancellation_token: CancellationToken,
    join_set: tokio::task::JoinSet<()>,
}

impl Supervisor {
    /// Creates a new Supervisor instance with all its required components.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: AppConfig,
        store: Arc<dyn StateStore>,
        classifier: Arc<RarityClassifier>,
        renderer: Arc<NotificationRenderer>,
        notifier: Arc<dyn Notifier>,
        publisher: Arc<dyn StatsPublisher>,
        sources: Vec<Arc<dyn EventSource>>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            store,
            classifier,
            renderer,
            notifier,
            publisher,
            sources,
            cancellation_token: CancellationToken::new(),
            join_set: tokio::task::JoinSet::new(),
        }
    }

    /// Returns a new `SupervisorBuilder` instance.
    pub fn builder() -> SupervisorBuilder {
        SupervisorBuilder::new()
    }

    /// A token that stops the supervisor when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }

    /// Starts every service and runs until a shutdown signal arrives or all
    /// detection sources have stopped.
    ///
    /// 1. Spawns a signal handler for `SIGINT` and `SIGTERM`.
    /// 2. Restores the gate state from the store.
    /// 3. Spawns one task per detection source and the species table
    ///    reloader.
    /// 4. Runs the decision pipeline until cancellation, then waits for it to
    ///    save its state.
    pub async fn run(mut self) -> Result<(), SupervisorError> {
        let cancellation_token = self.cancellation_token.clone();
        self.join_set.spawn(async move {
            let ctrl_c = signal::ctrl_c();
            #[cfg(unix)]
            let terminate = async {
                match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                    Ok(mut stream) => {
                        stream.recv().await;
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to register SIGTERM handler.");
                        std::future::pending::<()>().await;
                    }
                }
            };
            #[cfg(not(unix))]
            let terminate = std::future::pending::<()>();

            tokio::select! {
                _ = ctrl_c => {
                    tracing::info!("SIGINT (Ctrl+C) received, initiating graceful shutdown.");
                }
                _ = terminate => {
                    tracing::info!("SIGTERM received, initiating graceful shutdown.");
                }
                _ = cancellation_token.cancelled() => {}
            }

            cancellation_token.cancel();
        });

        // --- State restore ---
        let state = self.store.load().await;
        let orchestrator = DecisionOrchestrator::from_state(
            &self.config.gate,
            Arc::clone(&self.classifier),
            state,
            chrono::Utc::now(),
        );

        // --- Task spawning ---
        let (tx, rx) = mpsc::channel(self.config.event_channel_capacity.max(1) as usize);

        if self.sources.is_empty() {
            tracing::warn!("No detection sources configured.");
        }
        for source in &self.sources {
            let source = Arc::clone(source);
            let tx = tx.clone();
            let cancel = self.cancellation_token.clone();
            self.join_set.spawn(async move {
                if let Err(e) = source.run(tx, cancel).await {
                    tracing::error!(
                        station = %source.station(),
                        error = %e,
                        "Detection source failed."
                    );
                }
            });
        }
        drop(tx);

        self.join_set.spawn(run_species_reloader(
            Arc::clone(&self.classifier),
            self.config.species_path.clone(),
            self.config.species_reload_interval_secs,
            self.cancellation_token.clone(),
        ));

        let pipeline = EventPipeline::new(
            orchestrator,
            DedupBuffer::new(self.config.gate.dedup_window_secs),
            Arc::clone(&self.renderer),
            Arc::clone(&self.notifier),
            Arc::clone(&self.store),
            Arc::clone(&self.publisher),
            PipelineSettings {
                persist_interval: self.config.persist_interval_secs,
                stats_interval: self.config.stats_interval_secs,
                delivery_timeout: self.config.display.timeout_ms,
                shutdown_timeout: self.config.shutdown_timeout,
            },
        );
        let mut pipeline_handle =
            tokio::spawn(pipeline.run(rx, self.cancellation_token.clone()));

        // --- Main supervisor loop ---
        let pipeline_result = loop {
            tokio::select! {
                result = &mut pipeline_handle => break result,
                Some(result) = self.join_set.join_next() => {
                    if let Err(e) = result {
                        tracing::error!("A supervised task failed: {:?}. Initiating shutdown.", e);
                        self.cancellation_token.cancel();
                    }
                }
            }
        };

        // --- Graceful shutdown ---
        self.cancellation_token.cancel();
        self.join_set.shutdown().await;
        tracing::info!("All supervised tasks have completed.");

        let final_state = pipeline_result?;
        tracing::info!(
            species = final_state.cooldowns.len(),
            "Supervisor shutdown complete."
        );
        Ok(())
    }
}

/// Polls the species table file and swaps the table in when it changes. A
/// table that fails to load is logged and the previous one stays active.
async fn run_species_reloader(
    classifier: Arc<RarityClassifier>,
    path: PathBuf,
    interval: std::time::Duration,
    cancel: CancellationToken,
) {
    if interval.is_zero() {
        return;
    }
    let mut last_seen: Option<SystemTime> = modified_at(&path);
    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let current = modified_at(&path);
                if current.is_none() || current == last_seen {
                    continue;
                }
                last_seen = current;
                if let Err(e) = classifier.reload_from(&path) {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "Species table reload failed, keeping the previous table."
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tempfile::tempdir;

    use super::*;
    use crate::{config::TierCooldowns, models::RarityTier};

    #[tokio::test]
    async fn test_species_reloader_picks_up_changes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("species.yaml");
        std::fs::write(&path, "species:\n  - scientific_name: Pica pica\n    tier: common\n")
            .unwrap();

        let classifier =
            Arc::new(RarityClassifier::load_from(&path, TierCooldowns::default()).unwrap());
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_species_reloader(
            Arc::clone(&classifier),
            path.clone(),
            Duration::from_millis(20),
            cancel.clone(),
        ));

        // Make sure the modification time moves on coarse filesystems.
        tokio::time::sleep(Duration::from_millis(1100)).await;
        std::fs::write(&path, "species:\n  - scientific_name: Pica pica\n    tier: rare\n")
            .unwrap();

        let mut tier = RarityTier::Common;
        for _ in 0..50 {
            tier = classifier.classify("Pica pica").tier;
            if tier == RarityTier::Rare {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(tier, RarityTier::Rare);

        cancel.cancel();
        task.await.unwrap();
    }
}
