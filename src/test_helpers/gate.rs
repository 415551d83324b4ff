//! Helpers for wiring a decision orchestrator in tests.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::{
    config::GateConfig,
    engine::{orchestrator::DecisionOrchestrator, rarity::RarityClassifier},
    models::{PersistedState, RarityTier, SpeciesEntry},
};

/// A small species table covering every tier.
pub fn test_species_table() -> Vec<SpeciesEntry> {
    vec![
        SpeciesEntry::new("Erithacus rubecula", RarityTier::Common),
        SpeciesEntry::new("Turdus merula", RarityTier::Common),
        SpeciesEntry::new("Sitta europaea", RarityTier::Uncommon),
        SpeciesEntry::new("Upupa epops", RarityTier::Rare),
        SpeciesEntry::new("Bubo bubo", RarityTier::VeryRare),
        SpeciesEntry::new("Aquila chrysaetos", RarityTier::Exceptional),
    ]
}

/// A classifier built from `entries` and the tier cooldowns of `config`.
pub fn create_test_classifier(
    config: &GateConfig,
    entries: Vec<SpeciesEntry>,
) -> Arc<RarityClassifier> {
    match RarityClassifier::from_entries(entries, config.cooldowns.clone()) {
        Ok(classifier) => Arc::new(classifier),
        Err(e) => panic!("invalid test species table: {e}"),
    }
}

/// An orchestrator over [`test_species_table`] with an empty state.
pub fn create_test_orchestrator(config: &GateConfig, now: DateTime<Utc>) -> DecisionOrchestrator {
    DecisionOrchestrator::new(config, create_test_classifier(config, test_species_table()), now)
}

/// An orchestrator over [`test_species_table`] seeded with `state`.
pub fn create_test_orchestrator_with_state(
    config: &GateConfig,
    state: PersistedState,
    now: DateTime<Utc>,
) -> DecisionOrchestrator {
    DecisionOrchestrator::from_state(
        config,
        create_test_classifier(config, test_species_table()),
        state,
        now,
    )
}

/// A state in which every species in `names` was already seen in `year`,
/// so first-of-year highlights do not interfere with a test.
pub fn state_with_seen_species(year: i32, names: &[&str]) -> PersistedState {
    let mut state = PersistedState::empty();
    let seen = state.first_of_year.entry(year).or_default();
    for name in names {
        seen.insert(crate::models::species_key(name));
    }
    state
}
