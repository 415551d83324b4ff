//! Maps species to rarity tiers and base cooldowns.

use std::{collections::HashMap, path::Path, sync::Arc, time::Duration};

use arc_swap::ArcSwap;

use crate::{
    config::TierCooldowns,
    loader::load_config,
    models::{Classification, RarityTier, SpeciesEntry, SpeciesTableError, species_key},
};

/// An immutable lookup table built from the species list.
#[derive(Debug, Default)]
pub struct RarityTable {
    entries: HashMap<String, SpeciesEntry>,
}

impl RarityTable {
    /// Builds a table, rejecting duplicate species.
    pub fn build(entries: Vec<SpeciesEntry>) -> Result<Self, SpeciesTableError> {
        let mut map = HashMap::with_capacity(entries.len());
        for entry in entries {
            let key = entry.key();
            if key.is_empty() {
                return Err(SpeciesTableError::EmptyName);
            }
            if map.contains_key(&key) {
                return Err(SpeciesTableError::Duplicate(entry.scientific_name));
            }
            map.insert(key, entry);
        }
        Ok(Self { entries: map })
    }

    /// Number of species in the table.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Looks up a species by scientific name.
    pub fn get(&self, scientific_name: &str) -> Option<&SpeciesEntry> {
        self.entries.get(&species_key(scientific_name))
    }
}

/// Classifies species against a table that can be swapped at runtime.
///
/// Readers always see either the old or the new table in full. Unknown
/// species fall back to the common tier with the shortest configured base
/// cooldown, so they are never silenced for long.
#[derive(Debug)]
pub struct RarityClassifier {
    table: ArcSwap<RarityTable>,
    cooldowns: TierCooldowns,
}

impl RarityClassifier {
    /// Creates a classifier from an already-built table.
    pub fn new(table: RarityTable, cooldowns: TierCooldowns) -> Self {
        Self { table: ArcSwap::new(Arc::new(table)), cooldowns }
    }

    /// Creates a classifier from a list of entries.
    pub fn from_entries(
        entries: Vec<SpeciesEntry>,
        cooldowns: TierCooldowns,
    ) -> Result<Self, SpeciesTableError> {
        Ok(Self::new(RarityTable::build(entries)?, cooldowns))
    }

    /// Loads the species table from a YAML file. A missing file yields an
    /// empty table so that every species is treated as common.
    pub fn load_from(path: &Path, cooldowns: TierCooldowns) -> Result<Self, SpeciesTableError> {
        if !path.exists() {
            tracing::warn!(
                path = %path.display(),
                "Species table not found, all species will be treated as common."
            );
            return Ok(Self::new(RarityTable::default(), cooldowns));
        }
        let entries = load_config::<SpeciesEntry>(path)?;
        Self::from_entries(entries, cooldowns)
    }

    /// Classifies a species.
    pub fn classify(&self, scientific_name: &str) -> Classification {
        let table = self.table.load();
        match table.get(scientific_name) {
            Some(entry) => Classification {
                tier: entry.tier,
                base_cooldown: entry
                    .cooldown_secs
                    .unwrap_or_else(|| self.cooldowns.base(entry.tier)),
            },
            None => Classification {
                tier: RarityTier::Common,
                base_cooldown: self.unknown_cooldown(),
            },
        }
    }

    /// Atomically replaces the table. On error the current table is kept.
    pub fn reload(&self, entries: Vec<SpeciesEntry>) -> Result<usize, SpeciesTableError> {
        let table = RarityTable::build(entries)?;
        let count = table.len();
        self.table.store(Arc::new(table));
        tracing::info!(species = count, "Species table reloaded.");
        Ok(count)
    }

    /// Reloads the table from a YAML file. On error the current table is
    /// kept.
    pub fn reload_from(&self, path: &Path) -> Result<usize, SpeciesTableError> {
        let entries = load_config::<SpeciesEntry>(path)?;
        self.reload(entries)
    }

    /// Number of species in the current table.
    pub fn species_count(&self) -> usize {
        self.table.load().len()
    }

    fn unknown_cooldown(&self) -> Duration {
        self.cooldowns.shortest()
    }
}
