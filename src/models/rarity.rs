use std::{fmt, time::Duration};

use serde::{Deserialize, Serialize};

/// How notable a sighting of a species is. The ordering doubles as
/// notification priority: later variants outrank earlier ones.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum RarityTier {
    /// Seen most days.
    #[default]
    Common,
    /// Seen regularly but not daily.
    Uncommon,
    /// Seen a few times a season.
    Rare,
    /// Seen a few times a year at most.
    VeryRare,
    /// Not expected at this location.
    Exceptional,
}

impl RarityTier {
    /// All tiers, lowest priority first.
    pub const ALL: [RarityTier; 5] = [
        RarityTier::Common,
        RarityTier::Uncommon,
        RarityTier::Rare,
        RarityTier::VeryRare,
        RarityTier::Exceptional,
    ];

    /// Notification priority; higher wins tie-breaks and burst precedence.
    pub fn priority(self) -> u8 {
        self as u8
    }

    /// Stable lowercase name.
    pub fn as_str(self) -> &'static str {
        match self {
            RarityTier::Common => "common",
            RarityTier::Uncommon => "uncommon",
            RarityTier::Rare => "rare",
            RarityTier::VeryRare => "very_rare",
            RarityTier::Exceptional => "exceptional",
        }
    }
}

impl fmt::Display for RarityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of classifying a species.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    /// The species' rarity tier.
    pub tier: RarityTier,
    /// Base cooldown before time-of-day and season multipliers.
    pub base_cooldown: Duration,
}
