use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::RarityTier;
use crate::{
    config::{deserialize_optional_duration_from_seconds, serialize_optional_duration_to_seconds},
    loader::{Loadable, LoaderError},
};

/// Errors raised while loading or validating the species rarity table.
#[derive(Debug, Error)]
pub enum SpeciesTableError {
    /// The table file could not be read or parsed.
    #[error("Failed to load species table: {0}")]
    Loader(#[from] LoaderError),

    /// An entry has no scientific name.
    #[error("Species entry is missing a scientific name")]
    EmptyName,

    /// The same species appears more than once.
    #[error("Species '{0}' is listed more than once")]
    Duplicate(String),
}

/// One row of the species rarity table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeciesEntry {
    /// Scientific name, matched case-insensitively.
    pub scientific_name: String,

    /// Optional common name, informational only.
    #[serde(default)]
    pub common_name: Option<String>,

    /// Rarity tier.
    pub tier: RarityTier,

    /// Overrides the tier's base cooldown for this species.
    #[serde(
        default,
        deserialize_with = "deserialize_optional_duration_from_seconds",
        serialize_with = "serialize_optional_duration_to_seconds"
    )]
    pub cooldown_secs: Option<Duration>,
}

impl SpeciesEntry {
    /// Creates an entry without a cooldown override.
    pub fn new(scientific_name: &str, tier: RarityTier) -> Self {
        Self {
            scientific_name: scientific_name.to_string(),
            common_name: None,
            tier,
            cooldown_secs: None,
        }
    }

    /// Lookup key for this entry.
    pub fn key(&self) -> String {
        species_key(&self.scientific_name)
    }
}

/// Normalizes a scientific name for lookups.
pub fn species_key(name: &str) -> String {
    name.trim().to_lowercase()
}

impl Loadable for SpeciesEntry {
    type Error = SpeciesTableError;

    const KEY: &'static str = "species";

    fn validate(&mut self) -> Result<(), Self::Error> {
        self.scientific_name = self.scientific_name.trim().to_string();
        if self.scientific_name.is_empty() {
            return Err(SpeciesTableError::EmptyName);
        }
        Ok(())
    }
}
