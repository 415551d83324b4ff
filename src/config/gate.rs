//! Tuning for the decision engine: cooldowns, multipliers, burst protection
//! and milestones.

use std::time::Duration;

use chrono::{FixedOffset, Offset, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{
    deserialize_duration_from_ms, deserialize_duration_from_seconds, serialize_duration_to_ms,
    serialize_duration_to_seconds,
};
use crate::models::RarityTier;

/// Errors produced when the gate configuration is internally inconsistent.
#[derive(Debug, Error, PartialEq)]
pub enum GateConfigError {
    /// A multiplier was zero, negative or not a number.
    #[error("Multiplier must be a positive number, got {0}")]
    InvalidMultiplier(f64),

    /// An hour outside of 0..=24 was used in a time-of-day window.
    #[error("Invalid hour {0} in time-of-day window")]
    InvalidHour(u32),

    /// A month outside of 1..=12 was used in a season window.
    #[error("Invalid month {0} in season window")]
    InvalidMonth(u32),

    /// The UTC offset is larger than a day.
    #[error("UTC offset of {0} minutes is out of range")]
    InvalidUtcOffset(i32),

    /// The burst window configuration cannot produce a usable ring.
    #[error("Burst window must be longer than zero and at least one bucket wide")]
    InvalidBurstWindow,

    /// A milestone threshold of zero was configured.
    #[error("Milestone thresholds must be greater than zero")]
    ZeroMilestone,
}

/// How a first-of-year or milestone notification interacts with the normal
/// notification for the same event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoalescePolicy {
    /// A single notification carries the highlight.
    #[default]
    Combined,
    /// The highlight is delivered on its own, followed by the normal
    /// notification when cooldown and burst protection would have allowed it.
    Separate,
}

/// Which decisions are counted in the burst window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BurstCountMode {
    /// Every decision for a well-formed event, shown or skipped.
    #[default]
    All,
    /// Only shown decisions.
    Shown,
}

/// Base cooldown per rarity tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TierCooldowns {
    /// Base cooldown for common species.
    #[serde(
        deserialize_with = "deserialize_duration_from_seconds",
        serialize_with = "serialize_duration_to_seconds"
    )]
    pub common: Duration,
    /// Base cooldown for uncommon species.
    #[serde(
        deserialize_with = "deserialize_duration_from_seconds",
        serialize_with = "serialize_duration_to_seconds"
    )]
    pub uncommon: Duration,
    /// Base cooldown for rare species.
    #[serde(
        deserialize_with = "deserialize_duration_from_seconds",
        serialize_with = "serialize_duration_to_seconds"
    )]
    pub rare: Duration,
    /// Base cooldown for very rare species.
    #[serde(
        deserialize_with = "deserialize_duration_from_seconds",
        serialize_with = "serialize_duration_to_seconds"
    )]
    pub very_rare: Duration,
    /// Base cooldown for exceptional species.
    #[serde(
        deserialize_with = "deserialize_duration_from_seconds",
        serialize_with = "serialize_duration_to_seconds"
    )]
    pub exceptional: Duration,
}

impl Default for TierCooldowns {
    fn default() -> Self {
        Self {
            common: Duration::from_secs(600),
            uncommon: Duration::from_secs(300),
            rare: Duration::from_secs(120),
            very_rare: Duration::from_secs(60),
            exceptional: Duration::from_secs(30),
        }
    }
}

impl TierCooldowns {
    /// Returns the base cooldown for a tier.
    pub fn base(&self, tier: RarityTier) -> Duration {
        match tier {
            RarityTier::Common => self.common,
            RarityTier::Uncommon => self.uncommon,
            RarityTier::Rare => self.rare,
            RarityTier::VeryRare => self.very_rare,
            RarityTier::Exceptional => self.exceptional,
        }
    }

    /// Returns the shortest configured base cooldown across all tiers.
    pub fn shortest(&self) -> Duration {
        RarityTier::ALL.iter().map(|tier| self.base(*tier)).min().unwrap_or_default()
    }
}

/// A local time-of-day window that scales cooldowns. `start_hour` is
/// inclusive, `end_hour` exclusive; a window with `start_hour > end_hour`
/// wraps around midnight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeOfDayWindow {
    /// Optional label used in logs.
    #[serde(default)]
    pub name: Option<String>,
    /// First hour of the window (0-23).
    pub start_hour: u32,
    /// Hour at which the window ends (1-24).
    pub end_hour: u32,
    /// Cooldown multiplier applied inside the window.
    pub multiplier: f64,
}

impl TimeOfDayWindow {
    /// Returns true if the local hour falls inside this window.
    pub fn contains(&self, hour: u32) -> bool {
        if self.start_hour <= self.end_hour {
            hour >= self.start_hour && hour < self.end_hour
        } else {
            hour >= self.start_hour || hour < self.end_hour
        }
    }
}

/// A set of calendar months that scales cooldowns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeasonWindow {
    /// Optional label used in logs.
    #[serde(default)]
    pub name: Option<String>,
    /// Months (1-12) belonging to the season.
    pub months: Vec<u32>,
    /// Cooldown multiplier applied during the season.
    pub multiplier: f64,
}

/// Global burst protection settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BurstConfig {
    /// Length of the trailing window.
    #[serde(
        deserialize_with = "deserialize_duration_from_seconds",
        serialize_with = "serialize_duration_to_seconds"
    )]
    pub window_secs: Duration,
    /// Width of one counting bucket in the ring.
    #[serde(
        deserialize_with = "deserialize_duration_from_ms",
        serialize_with = "serialize_duration_to_ms"
    )]
    pub bucket_ms: Duration,
    /// Number of decisions in the window after which suppression starts.
    pub ceiling: u32,
    /// Lowest tier that is still admitted while suppression is active.
    pub min_tier: RarityTier,
    /// Which decisions are counted.
    pub count: BurstCountMode,
}

impl Default for BurstConfig {
    fn default() -> Self {
        Self {
            window_secs: Duration::from_secs(60),
            bucket_ms: Duration::from_millis(1000),
            ceiling: 20,
            min_tier: RarityTier::Rare,
            count: BurstCountMode::All,
        }
    }
}

fn default_time_of_day() -> Vec<TimeOfDayWindow> {
    vec![
        TimeOfDayWindow {
            name: Some("dawn".to_string()),
            start_hour: 4,
            end_hour: 7,
            multiplier: 1.5,
        },
        TimeOfDayWindow {
            name: Some("dusk".to_string()),
            start_hour: 18,
            end_hour: 21,
            multiplier: 1.5,
        },
        TimeOfDayWindow {
            name: Some("night".to_string()),
            start_hour: 22,
            end_hour: 4,
            multiplier: 0.5,
        },
    ]
}

fn default_seasons() -> Vec<SeasonWindow> {
    vec![
        SeasonWindow { name: Some("winter".to_string()), months: vec![12, 1, 2], multiplier: 0.75 },
        SeasonWindow { name: Some("migration".to_string()), months: vec![4, 5], multiplier: 1.25 },
    ]
}

/// Configuration of the decision engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    /// Offset from UTC, in minutes, used for local time-of-day, season and
    /// calendar year.
    pub utc_offset_minutes: i32,

    /// Reports of the same species from different stations inside this
    /// window are treated as one event. Zero disables coalescing.
    #[serde(
        deserialize_with = "deserialize_duration_from_seconds",
        serialize_with = "serialize_duration_to_seconds"
    )]
    pub dedup_window_secs: Duration,

    /// How highlight notifications combine with normal ones.
    pub coalesce: CoalescePolicy,

    /// Base cooldowns per tier.
    pub cooldowns: TierCooldowns,

    /// Time-of-day cooldown multipliers; the first matching window wins.
    pub time_of_day: Vec<TimeOfDayWindow>,

    /// Seasonal cooldown multipliers; the first matching season wins.
    pub seasons: Vec<SeasonWindow>,

    /// Burst protection.
    pub burst: BurstConfig,

    /// Cumulative detection counts that trigger a one-time notification.
    pub milestones: Vec<u64>,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            utc_offset_minutes: 0,
            dedup_window_secs: Duration::from_secs(5),
            coalesce: CoalescePolicy::default(),
            cooldowns: TierCooldowns::default(),
            time_of_day: default_time_of_day(),
            seasons: default_seasons(),
            burst: BurstConfig::default(),
            milestones: vec![100, 500, 1000, 5000, 10000],
        }
    }
}

impl GateConfig {
    /// Returns the fixed offset used to compute local time.
    pub fn local_offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_minutes * 60).unwrap_or_else(|| Utc.fix())
    }

    /// Checks the configuration for values the engine cannot work with.
    pub fn validate(&self) -> Result<(), GateConfigError> {
        if self.utc_offset_minutes.abs() >= 24 * 60 {
            return Err(GateConfigError::InvalidUtcOffset(self.utc_offset_minutes));
        }

        for window in &self.time_of_day {
            if window.start_hour > 23 {
                return Err(GateConfigError::InvalidHour(window.start_hour));
            }
            if window.end_hour > 24 {
                return Err(GateConfigError::InvalidHour(window.end_hour));
            }
            check_multiplier(window.multiplier)?;
        }

        for season in &self.seasons {
            if let Some(month) = season.months.iter().find(|m| !(1..=12).contains(*m)) {
                return Err(GateConfigError::InvalidMonth(*month));
            }
            check_multiplier(season.multiplier)?;
        }

        if self.burst.bucket_ms.is_zero() || self.burst.window_secs < self.burst.bucket_ms {
            return Err(GateConfigError::InvalidBurstWindow);
        }

        if self.milestones.contains(&0) {
            return Err(GateConfigError::ZeroMilestone);
        }

        Ok(())
    }
}

fn check_multiplier(multiplier: f64) -> Result<(), GateConfigError> {
    if multiplier.is_finite() && multiplier > 0.0 {
        Ok(())
    } else {
        Err(GateConfigError::InvalidMultiplier(multiplier))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert_eq!(GateConfig::default().validate(), Ok(()));
    }

    #[test]
    fn test_shortest_cooldown() {
        let cooldowns = TierCooldowns::default();
        assert_eq!(cooldowns.shortest(), Duration::from_secs(30));
        assert_eq!(cooldowns.base(RarityTier::Common), Duration::from_secs(600));
    }

    #[test]
    fn test_time_of_day_window_wraps_midnight() {
        let night =
            TimeOfDayWindow { name: None, start_hour: 22, end_hour: 4, multiplier: 0.5 };
        assert!(night.contains(23));
        assert!(night.contains(0));
        assert!(night.contains(3));
        assert!(!night.contains(4));
        assert!(!night.contains(12));

        let dawn = TimeOfDayWindow { name: None, start_hour: 4, end_hour: 7, multiplier: 1.5 };
        assert!(dawn.contains(4));
        assert!(dawn.contains(6));
        assert!(!dawn.contains(7));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = GateConfig::default();
        config.seasons[0].months.push(13);
        assert_eq!(config.validate(), Err(GateConfigError::InvalidMonth(13)));

        let mut config = GateConfig::default();
        config.time_of_day[0].multiplier = 0.0;
        assert_eq!(config.validate(), Err(GateConfigError::InvalidMultiplier(0.0)));

        let mut config = GateConfig::default();
        config.burst.bucket_ms = Duration::ZERO;
        assert_eq!(config.validate(), Err(GateConfigError::InvalidBurstWindow));

        let mut config = GateConfig::default();
        config.milestones = vec![10, 0];
        assert_eq!(config.validate(), Err(GateConfigError::ZeroMilestone));

        let mut config = GateConfig::default();
        config.utc_offset_minutes = 24 * 60;
        assert_eq!(config.validate(), Err(GateConfigError::InvalidUtcOffset(1440)));
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config: GateConfig = serde_json::from_str(
            r#"{"coalesce": "separate", "burst": {"ceiling": 5, "min_tier": "very_rare"}}"#,
        )
        .unwrap();
        assert_eq!(config.coalesce, CoalescePolicy::Separate);
        assert_eq!(config.burst.ceiling, 5);
        assert_eq!(config.burst.min_tier, RarityTier::VeryRare);
        assert_eq!(config.burst.window_secs, Duration::from_secs(60));
        assert_eq!(config.cooldowns, TierCooldowns::default());
        assert_eq!(config.milestones, vec![100, 500, 1000, 5000, 10000]);
    }
}
