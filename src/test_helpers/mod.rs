//! A set of helpers for testing

mod detection;
mod gate;

pub use detection::{DetectionBuilder, utc};
pub use gate::{
    create_test_classifier, create_test_orchestrator, create_test_orchestrator_with_state,
    state_with_seen_species, test_species_table,
};
