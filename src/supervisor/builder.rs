//! This module provides the `SupervisorBuilder` for constructing a `Supervisor`.

use std::sync::Arc;

use super::{Supervisor, SupervisorError};
use crate::{
    config::AppConfig,
    engine::rarity::RarityClassifier,
    ingest::EventSource,
    notifier::{HttpDisplayNotifier, LogNotifier, NotificationRenderer, Notifier},
    persistence::traits::StateStore,
    stats::{LogStatsPublisher, StatsPublisher},
};

/// A builder for creating a `Supervisor` instance.
#[derive(Default)]
pub struct SupervisorBuilder {
    config: Option<AppConfig>,
    store: Option<Arc<dyn StateStore>>,
    classifier: Option<Arc<RarityClassifier>>,
    notifier: Option<Arc<dyn Notifier>>,
    publisher: Option<Arc<dyn StatsPublisher>>,
    sources: Vec<Arc<dyn EventSource>>,
}

impl SupervisorBuilder {
    /// Creates a new, empty `SupervisorBuilder`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the application configuration for the `Supervisor`.
    pub fn config(mut self, config: AppConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Sets the state store.
    pub fn store(mut self, store: Arc<dyn StateStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Sets the classifier. Defaults to loading the configured species table.
    pub fn classifier(mut self, classifier: Arc<RarityClassifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    /// Sets the notifier. Defaults to the configured display endpoint, or the
    /// log when none is configured.
    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Sets the stats publisher. Defaults to the log.
    pub fn publisher(mut self, publisher: Arc<dyn StatsPublisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    /// Adds a detection source.
    pub fn source(mut self, source: Arc<dyn EventSource>) -> Self {
        self.sources.push(source);
        self
    }

    /// Assembles and validates the components to build a `Supervisor`.
    pub fn build(self) -> Result<Supervisor, SupervisorError> {
        let config = self.config.ok_or(SupervisorError::MissingConfig)?;
        let store = self.store.ok_or(SupervisorError::MissingStateStore)?;
        config.validate()?;

        let classifier = match self.classifier {
            Some(classifier) => classifier,
            None => {
                tracing::debug!(
                    path = %config.species_path.display(),
                    "Loading species table..."
                );
                let classifier = RarityClassifier::load_from(
                    &config.species_path,
                    config.gate.cooldowns.clone(),
                )?;
                tracing::info!(count = classifier.species_count(), "Loaded species table.");
                Arc::new(classifier)
            }
        };

        let renderer = Arc::new(NotificationRenderer::new(&config.display)?);

        let notifier: Arc<dyn Notifier> = match (self.notifier, config.display.url.clone()) {
            (Some(notifier), _) => notifier,
            (None, Some(url)) => {
                tracing::info!(url = %url, "Delivering notifications to the display endpoint.");
                Arc::new(HttpDisplayNotifier::new(url, &config.display)?)
            }
            (None, None) => {
                tracing::warn!("No display endpoint configured, notifications go to the log.");
                Arc::new(LogNotifier)
            }
        };

        let publisher = self.publisher.unwrap_or_else(|| Arc::new(LogStatsPublisher));

        Ok(Supervisor::new(
            config,
            store,
            classifier,
            renderer,
            notifier,
            publisher,
            self.sources,
        ))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tempfile::tempdir;

    use super::*;
    use crate::{
        config::{AppConfigError, TierCooldowns},
        persistence::traits::MockStateStore,
    };

    fn classifier() -> Arc<RarityClassifier> {
        Arc::new(RarityClassifier::from_entries(vec![], TierCooldowns::default()).unwrap())
    }

    #[test]
    fn build_succeeds_with_defaults() {
        let result = SupervisorBuilder::new()
            .config(AppConfig::default())
            .store(Arc::new(MockStateStore::new()))
            .classifier(classifier())
            .build();
        assert!(result.is_ok());
    }

    #[test]
    fn build_fails_if_config_is_missing() {
        let result = SupervisorBuilder::new().store(Arc::new(MockStateStore::new())).build();
        assert!(matches!(result, Err(SupervisorError::MissingConfig)));
    }

    #[test]
    fn build_fails_if_store_is_missing() {
        let result = SupervisorBuilder::new().config(AppConfig::default()).build();
        assert!(matches!(result, Err(SupervisorError::MissingStateStore)));
    }

    #[test]
    fn build_falls_back_to_empty_species_table() {
        let dir = tempdir().unwrap();
        let config = AppConfig::builder().species_path(dir.path().join("missing.yaml")).build();
        let result =
            SupervisorBuilder::new().config(config).store(Arc::new(MockStateStore::new())).build();
        assert!(result.is_ok());
    }

    #[test]
    fn build_fails_on_invalid_species_table() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("species.yaml");
        std::fs::write(
            &path,
            concat!(
                "species:\n",
                "  - scientific_name: Upupa epops\n    tier: rare\n",
                "  - scientific_name: upupa epops\n    tier: common\n",
            ),
        )
        .unwrap();
        let config = AppConfig::builder().species_path(path).build();
        let result =
            SupervisorBuilder::new().config(config).store(Arc::new(MockStateStore::new())).build();
        assert!(matches!(result, Err(SupervisorError::SpeciesTable(_))));
    }

    #[test]
    fn build_fails_on_zero_persist_interval() {
        let config = AppConfig::builder().persist_interval(Duration::ZERO).build();
        let result = SupervisorBuilder::new()
            .config(config)
            .store(Arc::new(MockStateStore::new()))
            .classifier(classifier())
            .build();
        assert!(matches!(
            result,
            Err(SupervisorError::Config(AppConfigError::ZeroDuration("persist_interval_secs")))
        ));
    }

    #[test]
    fn build_fails_on_invalid_template() {
        let mut config = AppConfig::default();
        config.display.templates.milestone = "{% if %}".to_string();
        let result = SupervisorBuilder::new()
            .config(config)
            .store(Arc::new(MockStateStore::new()))
            .classifier(classifier())
            .build();
        assert!(matches!(result, Err(SupervisorError::Template(_))));
    }

    #[tokio::test]
    async fn run_saves_state_when_cancelled() {
        let mut store = MockStateStore::new();
        store.expect_load().times(1).returning(crate::models::PersistedState::empty);
        store.expect_save().times(1..).returning(|_| Ok(()));

        let mut config = AppConfig::default();
        config.shutdown_timeout = Duration::from_secs(2);
        let supervisor = SupervisorBuilder::new()
            .config(config)
            .store(Arc::new(store))
            .classifier(classifier())
            .build()
            .unwrap();

        let token = supervisor.cancellation_token();
        let handle = tokio::spawn(supervisor.run());
        tokio::time::sleep(Duration::from_millis(50)).await;
        token.cancel();

        assert!(handle.await.unwrap().is_ok());
    }
}
