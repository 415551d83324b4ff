//! Data types shared across the gate: detections, tiers, decisions,
//! notifications, statistics and persisted state.

mod decision;
mod detection;
mod notification;
mod rarity;
mod species;
mod state;
mod stats;

pub use decision::{GateDecision, Highlight, NotificationDecision, SkipReason};
pub use detection::{DetectionEvent, EventTimestamp, InboundDetection, MalformedEvent, RawDetection};
pub use notification::{DisplayNotification, NotificationRequest};
pub use rarity::{Classification, RarityTier};
pub use species::{SpeciesEntry, SpeciesTableError, species_key};
pub use state::{
    BurstBucket, BurstWindowState, MilestoneRecord, PERSISTED_STATE_VERSION, PersistedState,
    SpeciesCooldownState,
};
pub use stats::{SkipCounts, StatsCounts, StatsReport, StatsSnapshot};
