use std::collections::{BTreeMap, BTreeSet, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::RarityTier;

/// Layout version written with every snapshot. Files with any other
/// version are treated as unreadable.
pub const PERSISTED_STATE_VERSION: u32 = 1;

/// Cooldown bookkeeping for one species.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeciesCooldownState {
    /// Event time of the last shown notification.
    pub last_shown: DateTime<Utc>,
    /// Tier at the time it was shown.
    pub tier: RarityTier,
    /// The species is on cooldown until this instant.
    pub cooldown_until: DateTime<Utc>,
}

/// One bucket of the burst window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BurstBucket {
    /// Start of the bucket's time slice.
    pub start: DateTime<Utc>,
    /// Events counted in the slice.
    pub count: u32,
}

/// Rolling burst window.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BurstWindowState {
    /// Buckets, oldest first.
    pub buckets: VecDeque<BurstBucket>,
    /// Latest event time observed. Never moves backwards.
    pub horizon: Option<DateTime<Utc>>,
}

/// Lifetime detection count for one species.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MilestoneRecord {
    /// Detections counted so far.
    pub count: u64,
    /// Event time of the last counted detection.
    pub last_counted_at: Option<DateTime<Utc>>,
    /// Thresholds already announced.
    pub notified: BTreeSet<u64>,
}

/// Everything the gate needs to survive a restart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedState {
    /// Layout version.
    pub version: u32,
    /// When the snapshot was taken.
    #[serde(default)]
    pub saved_at: Option<DateTime<Utc>>,
    /// Cooldowns keyed by species.
    #[serde(default)]
    pub cooldowns: BTreeMap<String, SpeciesCooldownState>,
    /// Burst window.
    #[serde(default)]
    pub burst: BurstWindowState,
    /// Milestone counters keyed by species.
    #[serde(default)]
    pub milestones: BTreeMap<String, MilestoneRecord>,
    /// Species already seen, per local year.
    #[serde(default)]
    pub first_of_year: BTreeMap<i32, BTreeSet<String>>,
}

impl PersistedState {
    /// A fresh state with nothing recorded.
    pub fn empty() -> Self {
        Self {
            version: PERSISTED_STATE_VERSION,
            saved_at: None,
            cooldowns: BTreeMap::new(),
            burst: BurstWindowState::default(),
            milestones: BTreeMap::new(),
            first_of_year: BTreeMap::new(),
        }
    }

    /// Whether the snapshot was written with the current layout.
    pub fn is_current_version(&self) -> bool {
        self.version == PERSISTED_STATE_VERSION
    }
}

impl Default for PersistedState {
    fn default() -> Self {
        Self::empty()
    }
}
