//! Per-species cooldowns scaled by local time of day and season.

use std::{collections::BTreeMap, time::Duration};

use chrono::{DateTime, Datelike, FixedOffset, TimeDelta, Timelike, Utc};

use crate::{
    config::{GateConfig, SeasonWindow, TimeOfDayWindow},
    models::{Classification, SpeciesCooldownState, species_key},
};

/// Tracks when each species was last shown and until when it stays quiet.
///
/// The cooldown end is computed once, at the time the species is shown, from
/// the multipliers in effect at that moment. Later decisions only compare
/// against the stored instant.
#[derive(Debug, Clone)]
pub struct CooldownManager {
    offset: FixedOffset,
    time_of_day: Vec<TimeOfDayWindow>,
    seasons: Vec<SeasonWindow>,
    records: BTreeMap<String, SpeciesCooldownState>,
}

impl CooldownManager {
    /// Creates an empty manager.
    pub fn new(config: &GateConfig) -> Self {
        Self {
            offset: config.local_offset(),
            time_of_day: config.time_of_day.clone(),
            seasons: config.seasons.clone(),
            records: BTreeMap::new(),
        }
    }

    /// Restores previously persisted cooldowns.
    pub fn with_records(mut self, records: BTreeMap<String, SpeciesCooldownState>) -> Self {
        self.records = records;
        self
    }

    /// Multiplier of the first time-of-day window containing `at`, or 1.0.
    pub fn time_of_day_multiplier(&self, at: DateTime<Utc>) -> f64 {
        let hour = at.with_timezone(&self.offset).hour();
        self.time_of_day
            .iter()
            .find(|window| window.contains(hour))
            .map(|window| window.multiplier)
            .unwrap_or(1.0)
    }

    /// Multiplier of the first season containing `at`, or 1.0.
    pub fn season_multiplier(&self, at: DateTime<Utc>) -> f64 {
        let month = at.with_timezone(&self.offset).month();
        self.seasons
            .iter()
            .find(|season| season.months.contains(&month))
            .map(|season| season.multiplier)
            .unwrap_or(1.0)
    }

    /// Base cooldown scaled by the multipliers in effect at `at`.
    pub fn effective_cooldown(&self, base: Duration, at: DateTime<Utc>) -> Duration {
        let factor = self.time_of_day_multiplier(at) * self.season_multiplier(at);
        base.mul_f64(factor)
    }

    /// Whether `species` is still cooling down at `at`.
    pub fn is_on_cooldown(&self, species: &str, at: DateTime<Utc>) -> bool {
        self.records
            .get(&species_key(species))
            .is_some_and(|record| at < record.cooldown_until)
    }

    /// Records a shown notification for `species` at `at`. The stored end
    /// of the cooldown never moves backwards.
    pub fn record_shown(
        &mut self,
        species: &str,
        classification: Classification,
        at: DateTime<Utc>,
    ) -> DateTime<Utc> {
        let cooldown = self.effective_cooldown(classification.base_cooldown, at);
        let until = TimeDelta::from_std(cooldown)
            .ok()
            .and_then(|delta| at.checked_add_signed(delta))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        let key = species_key(species);
        match self.records.get_mut(&key) {
            Some(record) => {
                record.last_shown = record.last_shown.max(at);
                record.tier = classification.tier;
                record.cooldown_until = record.cooldown_until.max(until);
                record.cooldown_until
            }
            None => {
                self.records.insert(
                    key,
                    SpeciesCooldownState {
                        last_shown: at,
                        tier: classification.tier,
                        cooldown_until: until,
                    },
                );
                until
            }
        }
    }

    /// The stored record for `species`.
    pub fn get(&self, species: &str) -> Option<&SpeciesCooldownState> {
        self.records.get(&species_key(species))
    }

    /// A copy of every record, for persistence.
    pub fn snapshot(&self) -> BTreeMap<String, SpeciesCooldownState> {
        self.records.clone()
    }
}
