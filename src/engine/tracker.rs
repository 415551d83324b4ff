//! First-of-year and milestone tracking.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Datelike, FixedOffset, Utc};

use crate::{
    config::GateConfig,
    models::{MilestoneRecord, species_key},
};

/// Remembers which species were already seen each local calendar year and
/// how many times each species has been detected.
///
/// Records are never evicted. A new year is a new key, so earlier years stay
/// intact.
#[derive(Debug, Clone)]
pub struct MilestoneTracker {
    offset: FixedOffset,
    thresholds: BTreeSet<u64>,
    first_of_year: BTreeMap<i32, BTreeSet<String>>,
    milestones: BTreeMap<String, MilestoneRecord>,
}

impl MilestoneTracker {
    /// Creates an empty tracker.
    pub fn new(config: &GateConfig) -> Self {
        Self {
            offset: config.local_offset(),
            thresholds: config.milestones.iter().copied().collect(),
            first_of_year: BTreeMap::new(),
            milestones: BTreeMap::new(),
        }
    }

    /// Restores persisted records.
    pub fn with_records(
        mut self,
        first_of_year: BTreeMap<i32, BTreeSet<String>>,
        milestones: BTreeMap<String, MilestoneRecord>,
    ) -> Self {
        self.first_of_year = first_of_year;
        self.milestones = milestones;
        self
    }

    /// Local calendar year of `at`.
    pub fn local_year(&self, at: DateTime<Utc>) -> i32 {
        at.with_timezone(&self.offset).year()
    }

    /// Returns true the first time `species` is seen in the local year of
    /// `at`, and false for every later call in that year.
    pub fn check_first_of_year(&mut self, species: &str, at: DateTime<Utc>) -> bool {
        let year = self.local_year(at);
        self.first_of_year.entry(year).or_default().insert(species_key(species))
    }

    /// Whether `species` has already been seen in `year`.
    pub fn seen_in_year(&self, species: &str, year: i32) -> bool {
        self.first_of_year.get(&year).is_some_and(|seen| seen.contains(&species_key(species)))
    }

    /// Counts a detection of `species` at `at` and returns the threshold it
    /// crossed, if any. Only detections later than the last counted one
    /// advance the counter, so a redelivered event is not counted twice.
    /// Every threshold at or below the new count is marked as announced;
    /// the highest newly crossed one is returned.
    pub fn check_milestone(&mut self, species: &str, at: DateTime<Utc>) -> Option<u64> {
        let record = self.milestones.entry(species_key(species)).or_default();
        if record.last_counted_at.is_some_and(|last| at <= last) {
            return None;
        }
        record.count += 1;
        record.last_counted_at = Some(at);

        let mut crossed = None;
        for threshold in self.thresholds.range(..=record.count) {
            if record.notified.insert(*threshold) {
                crossed = Some(*threshold);
            }
        }
        crossed
    }

    /// The milestone record of `species`.
    pub fn milestone(&self, species: &str) -> Option<&MilestoneRecord> {
        self.milestones.get(&species_key(species))
    }

    /// Copies of the first-of-year and milestone records, for persistence.
    pub fn snapshot(&self) -> (BTreeMap<i32, BTreeSet<String>>, BTreeMap<String, MilestoneRecord>) {
        (self.first_of_year.clone(), self.milestones.clone())
    }
}
