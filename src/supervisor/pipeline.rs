//! The single-owner decision loop.
//!
//! All stations feed one queue. Decisions are made strictly one at a time on
//! this loop, which owns the gate state outright. Delivery, persistence and
//! stats publishing run in spawned tasks and report back through channels so
//! that a slow display or disk never stalls the next decision.

use std::{sync::Arc, time::Duration};

use chrono::Utc;
use tokio::{
    sync::mpsc,
    task::{JoinHandle, JoinSet},
};
use tokio_util::sync::CancellationToken;

use crate::{
    engine::{dedup::DedupBuffer, orchestrator::DecisionOrchestrator},
    models::{GateDecision, InboundDetection, PersistedState, StatsReport},
    notifier::{NotificationRenderer, Notifier, deliver_with_timeout},
    persistence::{error::PersistenceError, traits::StateStore},
    stats::StatsPublisher,
};

/// How often held duplicates are checked for release.
const DEDUP_TICK: Duration = Duration::from_millis(250);

/// Timing knobs of the pipeline.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Interval between state saves.
    pub persist_interval: Duration,
    /// Interval between stats reports.
    pub stats_interval: Duration,
    /// Upper bound for one display delivery.
    pub delivery_timeout: Duration,
    /// Upper bound for the shutdown sequence.
    pub shutdown_timeout: Duration,
}

/// A delivery that did not complete.
#[derive(Debug, Clone)]
struct DeliveryFailure {
    station: String,
    confidence: Option<f64>,
}

/// Owns the orchestrator and drives it from the inbound queue.
pub struct EventPipeline {
    orchestrator: DecisionOrchestrator,
    dedup: DedupBuffer,
    renderer: Arc<NotificationRenderer>,
    notifier: Arc<dyn Notifier>,
    store: Arc<dyn StateStore>,
    publisher: Arc<dyn StatsPublisher>,
    settings: PipelineSettings,
    failures_tx: mpsc::UnboundedSender<DeliveryFailure>,
    failures_rx: mpsc::UnboundedReceiver<DeliveryFailure>,
    reports_tx: mpsc::UnboundedSender<StatsReport>,
    reports_rx: mpsc::UnboundedReceiver<StatsReport>,
    deliveries: JoinSet<()>,
    save_task: Option<JoinHandle<Result<(), PersistenceError>>>,
    publish_task: Option<JoinHandle<()>>,
}

impl EventPipeline {
    /// Creates a pipeline around an orchestrator.
    pub fn new(
        orchestrator: DecisionOrchestrator,
        dedup: DedupBuffer,
        renderer: Arc<NotificationRenderer>,
        notifier: Arc<dyn Notifier>,
        store: Arc<dyn StateStore>,
        publisher: Arc<dyn StatsPublisher>,
        settings: PipelineSettings,
    ) -> Self {
        let (failures_tx, failures_rx) = mpsc::unbounded_channel();
        let (reports_tx, reports_rx) = mpsc::unbounded_channel();
        Self {
            orchestrator,
            dedup,
            renderer,
            notifier,
            store,
            publisher,
            settings,
            failures_tx,
            failures_rx,
            reports_tx,
            reports_rx,
            deliveries: JoinSet::new(),
            save_task: None,
            publish_task: None,
        }
    }

    /// Processes detections until `cancel` fires or every producer is gone,
    /// then flushes held detections, saves the state and emits the final
    /// stats. Returns the state that was last handed to the store.
    pub async fn run(
        mut self,
        mut inbound: mpsc::Receiver<InboundDetection>,
        cancel: CancellationToken,
    ) -> PersistedState {
        let mut dedup_tick = tokio::time::interval(DEDUP_TICK);
        let mut persist_tick = tokio::time::interval(self.settings.persist_interval);
        let mut stats_tick = tokio::time::interval(self.settings.stats_interval);
        // The first tick of an interval fires immediately.
        persist_tick.tick().await;
        stats_tick.tick().await;

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    tracing::info!("Decision pipeline received shutdown signal.");
                    break;
                }
                Some(failure) = self.failures_rx.recv() => {
                    self.orchestrator.mark_send_failed(&failure.station, failure.confidence);
                }
                Some(report) = self.reports_rx.recv() => {
                    self.orchestrator.restore_stats(report);
                }
                maybe_detection = inbound.recv() => {
                    match maybe_detection {
                        Some(detection) => self.handle(detection),
                        None => {
                            tracing::info!("All detection sources have stopped.");
                            break;
                        }
                    }
                }
                _ = dedup_tick.tick() => {
                    for detection in self.dedup.drain_ready(Utc::now()) {
                        self.decide_and_dispatch(&detection);
                    }
                }
                _ = persist_tick.tick() => self.spawn_save(),
                _ = stats_tick.tick() => self.spawn_publish(),
                Some(_) = self.deliveries.join_next(), if !self.deliveries.is_empty() => {}
            }
        }

        self.shutdown().await
    }

    /// Offers one detection to the duplicate buffer and decides on it if it
    /// is not held back.
    pub fn handle(&mut self, detection: InboundDetection) {
        if let Some(detection) = self.dedup.offer(detection) {
            self.decide_and_dispatch(&detection);
        }
    }

    fn decide_and_dispatch(&mut self, detection: &InboundDetection) {
        let decision = self.orchestrator.decide(detection);
        if !decision.notifications.is_empty() {
            self.spawn_delivery(&decision);
        }
    }

    fn spawn_delivery(&mut self, decision: &GateDecision) {
        let renderer = Arc::clone(&self.renderer);
        let notifier = Arc::clone(&self.notifier);
        let failures = self.failures_tx.clone();
        let timeout = self.settings.delivery_timeout;
        let requests = decision.notifications.clone();
        let station = decision.station.clone();
        let confidence = decision.event.as_ref().map(|event| event.confidence);

        self.deliveries.spawn(async move {
            for request in &requests {
                let result = match renderer.render(request) {
                    Ok(notification) => {
                        deliver_with_timeout(notifier.as_ref(), &notification, timeout).await
                    }
                    Err(e) => Err(e.into()),
                };
                if let Err(e) = result {
                    tracing::warn!(
                        station = %station,
                        species = %request.event.scientific_name,
                        error = %e,
                        "Notification delivery failed."
                    );
                    let _ = failures.send(DeliveryFailure { station, confidence });
                    return;
                }
            }
        });
    }

    fn spawn_save(&mut self) {
        if self.save_task.as_ref().is_some_and(|task| !task.is_finished()) {
            tracing::debug!("Previous state save still running, skipping this tick.");
            return;
        }

        let state = self.orchestrator.snapshot(Utc::now());
        let store = Arc::clone(&self.store);
        self.save_task = Some(tokio::spawn(async move {
            let result = store.save(&state).await;
            match &result {
                Ok(()) => tracing::debug!("Periodic state save completed."),
                Err(e) => tracing::error!(
                    error = %e,
                    "State save failed, keeping state in memory until the next save."
                ),
            }
            result
        }));
    }

    fn spawn_publish(&mut self) {
        if self.publish_task.as_ref().is_some_and(|task| !task.is_finished()) {
            tracing::debug!("Previous stats report still publishing, skipping this tick.");
            return;
        }

        let report = self.orchestrator.flush_stats(Utc::now());
        if report.is_empty() {
            return;
        }
        let publisher = Arc::clone(&self.publisher);
        let returned = self.reports_tx.clone();
        self.publish_task = Some(tokio::spawn(async move {
            if let Err(e) = publisher.publish(&report).await {
                tracing::warn!(error = %e, "Failed to publish stats, retrying next period.");
                let _ = returned.send(report);
            }
        }));
    }

    async fn shutdown(mut self) -> PersistedState {
        let shutdown_timeout = self.settings.shutdown_timeout;
        tracing::info!("Flushing held detections and saving state...");

        for detection in self.dedup.drain_all() {
            self.decide_and_dispatch(&detection);
        }

        let mut final_state = self.orchestrator.snapshot(Utc::now());
        let cleanup = async {
            while self.deliveries.join_next().await.is_some() {}
            while let Ok(failure) = self.failures_rx.try_recv() {
                self.orchestrator.mark_send_failed(&failure.station, failure.confidence);
            }

            if let Some(task) = self.save_task.take() {
                if let Err(e) = task.await {
                    tracing::warn!(error = %e, "In-flight state save did not complete.");
                }
            }
            final_state = self.orchestrator.snapshot(Utc::now());
            if let Err(e) = self.store.save(&final_state).await {
                tracing::error!(error = %e, "Final state save failed.");
            } else {
                tracing::info!("Final state saved.");
            }

            if let Some(task) = self.publish_task.take() {
                let _ = task.await;
            }
            while let Ok(report) = self.reports_rx.try_recv() {
                self.orchestrator.restore_stats(report);
            }
            let report = self.orchestrator.flush_stats(Utc::now());
            if !report.is_empty() {
                if let Err(e) = self.publisher.publish(&report).await {
                    tracing::warn!(error = %e, "Failed to publish final stats.");
                }
            }
        };

        if tokio::time::timeout(shutdown_timeout, cleanup).await.is_err() {
            tracing::warn!(
                "Pipeline shutdown did not complete within the timeout of {:?}.",
                shutdown_timeout
            );
        }
        final_state
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::{
        config::{DisplayConfig, GateConfig},
        engine::rarity::RarityClassifier,
        models::{EventTimestamp, RarityTier, RawDetection, SpeciesEntry},
        notifier::{MockNotifier, NotifierError},
        persistence::traits::MockStateStore,
        stats::MockStatsPublisher,
    };

    fn settings() -> PipelineSettings {
        PipelineSettings {
            persist_interval: Duration::from_secs(3600),
            stats_interval: Duration::from_secs(3600),
            delivery_timeout: Duration::from_secs(1),
            shutdown_timeout: Duration::from_secs(5),
        }
    }

    fn pipeline(
        notifier: MockNotifier,
        store: MockStateStore,
        publisher: MockStatsPublisher,
    ) -> EventPipeline {
        let config = GateConfig { dedup_window_secs: Duration::ZERO, ..Default::default() };
        let classifier = RarityClassifier::from_entries(
            vec![SpeciesEntry::new("Pica pica", RarityTier::Common)],
            config.cooldowns.clone(),
        )
        .unwrap();
        EventPipeline::new(
            DecisionOrchestrator::new(&config, Arc::new(classifier), Utc::now()),
            DedupBuffer::new(config.dedup_window_secs),
            Arc::new(NotificationRenderer::new(&DisplayConfig::default()).unwrap()),
            Arc::new(notifier),
            Arc::new(store),
            Arc::new(publisher),
            settings(),
        )
    }

    fn detection() -> InboundDetection {
        InboundDetection::new(
            "garden",
            RawDetection {
                scientific_name: Some("Pica pica".to_string()),
                confidence: Some(0.8),
                timestamp: Some(EventTimestamp::Rfc3339(Utc::now())),
                ..Default::default()
            },
        )
    }

    fn capturing_publisher(reports: Arc<Mutex<Vec<StatsReport>>>) -> MockStatsPublisher {
        let mut publisher = MockStatsPublisher::new();
        publisher.expect_publish().returning(move |report| {
            reports.lock().unwrap().push(report.clone());
            Ok(())
        });
        publisher
    }

    #[tokio::test]
    async fn test_run_delivers_and_saves_on_shutdown() {
        let mut notifier = MockNotifier::new();
        notifier.expect_deliver().times(1).returning(|_| Ok(()));
        let mut store = MockStateStore::new();
        store.expect_save().times(1).returning(|_| Ok(()));
        let reports = Arc::new(Mutex::new(Vec::new()));

        let pipeline = pipeline(notifier, store, capturing_publisher(Arc::clone(&reports)));
        let (tx, rx) = mpsc::channel(8);
        tx.send(detection()).await.unwrap();
        drop(tx);

        let state = pipeline.run(rx, CancellationToken::new()).await;
        assert!(state.cooldowns.contains_key("pica pica"));

        let reports = reports.lock().unwrap();
        let garden = reports[0].station("garden").unwrap();
        assert_eq!(garden.counts.shown, 1);
    }

    #[tokio::test]
    async fn test_failed_delivery_is_counted_as_send_failed() {
        let mut notifier = MockNotifier::new();
        notifier.expect_deliver().times(1).returning(|_| Err(NotifierError::Rejected(500)));
        let mut store = MockStateStore::new();
        store.expect_save().returning(|_| Ok(()));
        let reports = Arc::new(Mutex::new(Vec::new()));

        let pipeline = pipeline(notifier, store, capturing_publisher(Arc::clone(&reports)));
        let (tx, rx) = mpsc::channel(8);
        tx.send(detection()).await.unwrap();
        drop(tx);

        let state = pipeline.run(rx, CancellationToken::new()).await;
        // A failed send still spends the cooldown.
        assert!(state.cooldowns.contains_key("pica pica"));

        let reports = reports.lock().unwrap();
        let garden = reports[0].station("garden").unwrap();
        assert_eq!(garden.counts.shown, 0);
        assert_eq!(garden.skip_reasons.send_failed, 1);
    }

    #[tokio::test]
    async fn test_failed_save_does_not_stop_the_pipeline() {
        let mut notifier = MockNotifier::new();
        notifier.expect_deliver().returning(|_| Ok(()));
        let mut store = MockStateStore::new();
        store.expect_save().returning(|_| {
            Err(PersistenceError::Io(std::io::Error::other("disk full")))
        });
        let mut publisher = MockStatsPublisher::new();
        publisher.expect_publish().returning(|_| Ok(()));

        let pipeline = pipeline(notifier, store, publisher);
        let (tx, rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(pipeline.run(rx, cancel.clone()));

        tx.send(detection()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();

        let state = handle.await.unwrap();
        assert!(state.cooldowns.contains_key("pica pica"));
    }
}
