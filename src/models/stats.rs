use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::SkipReason;

/// Decision totals for a period.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsCounts {
    /// Every decision made.
    pub total: u64,
    /// Decisions that ended in a delivered or pending notification.
    pub shown: u64,
    /// Decisions that were suppressed.
    pub skipped: u64,
}

/// Skipped decisions broken down by reason.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkipCounts {
    /// Skipped because of the species cooldown.
    pub on_cooldown: u64,
    /// Skipped by the burst suppressor.
    pub burst_suppressed: u64,
    /// Shown by the gate but rejected by the display.
    pub send_failed: u64,
    /// Skipped because the payload was malformed.
    pub malformed_event: u64,
}

impl SkipCounts {
    /// Increments the counter for `reason`.
    pub fn increment(&mut self, reason: SkipReason) {
        *self.slot(reason) += 1;
    }

    /// Current count for `reason`.
    pub fn get(&self, reason: SkipReason) -> u64 {
        match reason {
            SkipReason::OnCooldown => self.on_cooldown,
            SkipReason::BurstSuppressed => self.burst_suppressed,
            SkipReason::SendFailed => self.send_failed,
            SkipReason::MalformedEvent => self.malformed_event,
        }
    }

    /// Adds every counter of `other` to this one.
    pub fn merge(&mut self, other: &SkipCounts) {
        self.on_cooldown += other.on_cooldown;
        self.burst_suppressed += other.burst_suppressed;
        self.send_failed += other.send_failed;
        self.malformed_event += other.malformed_event;
    }

    /// Sum of all counters.
    pub fn total(&self) -> u64 {
        self.on_cooldown + self.burst_suppressed + self.send_failed + self.malformed_event
    }

    fn slot(&mut self, reason: SkipReason) -> &mut u64 {
        match reason {
            SkipReason::OnCooldown => &mut self.on_cooldown,
            SkipReason::BurstSuppressed => &mut self.burst_suppressed,
            SkipReason::SendFailed => &mut self.send_failed,
            SkipReason::MalformedEvent => &mut self.malformed_event,
        }
    }
}

/// Per-station statistics for one reporting period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    /// Station identifier.
    pub station: String,
    /// Start of the period.
    pub period_start: DateTime<Utc>,
    /// End of the period.
    pub period_end: DateTime<Utc>,
    /// Decision totals.
    pub counts: StatsCounts,
    /// Skipped decisions by reason.
    pub skip_reasons: SkipCounts,
    /// Mean confidence of the shown detections in the period.
    pub average_confidence: Option<f64>,
}

/// A drained set of per-station snapshots.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatsReport {
    /// One snapshot per station with activity in the period.
    pub snapshots: Vec<StatsSnapshot>,
}

impl StatsReport {
    /// Whether the report carries no snapshots.
    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// Snapshot for `station`, if present.
    pub fn station(&self, station: &str) -> Option<&StatsSnapshot> {
        self.snapshots.iter().find(|s| s.station == station)
    }
}
