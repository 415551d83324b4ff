use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use super::{
    HttpRetryConfig, deserialize_duration_from_ms, deserialize_duration_from_seconds,
    serialize_duration_to_ms, serialize_duration_to_seconds,
};
use crate::models::RarityTier;

/// Text templates for the display label, rendered with the detection context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayTemplates {
    /// Template for a plain detection.
    pub detection: String,
    /// Template for the first detection of a species in a calendar year.
    pub first_of_year: String,
    /// Template for a milestone detection.
    pub milestone: String,
}

impl Default for DisplayTemplates {
    fn default() -> Self {
        Self {
            detection: "{{ common_name }} ({{ confidence | percent }}%)".to_string(),
            first_of_year: "First {{ common_name }} of {{ year }}!".to_string(),
            milestone: "{{ common_name }}: {{ milestone }} detections".to_string(),
        }
    }
}

/// Display colors per tier, as hex strings understood by the display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TierColors {
    /// Color for common species.
    pub common: String,
    /// Color for uncommon species.
    pub uncommon: String,
    /// Color for rare species.
    pub rare: String,
    /// Color for very rare species.
    pub very_rare: String,
    /// Color for exceptional species.
    pub exceptional: String,
    /// Color used for first-of-year and milestone notifications.
    pub highlight: String,
}

impl Default for TierColors {
    fn default() -> Self {
        Self {
            common: "#FFFFFF".to_string(),
            uncommon: "#00FF7F".to_string(),
            rare: "#1E90FF".to_string(),
            very_rare: "#BA55D3".to_string(),
            exceptional: "#FF4500".to_string(),
            highlight: "#FFD700".to_string(),
        }
    }
}

impl TierColors {
    /// Returns the configured color for a tier.
    pub fn for_tier(&self, tier: RarityTier) -> &str {
        match tier {
            RarityTier::Common => &self.common,
            RarityTier::Uncommon => &self.uncommon,
            RarityTier::Rare => &self.rare,
            RarityTier::VeryRare => &self.very_rare,
            RarityTier::Exceptional => &self.exceptional,
        }
    }
}

fn default_timeout() -> Duration {
    Duration::from_millis(2000)
}

fn default_display_duration() -> Duration {
    Duration::from_secs(10)
}

/// Settings for the outbound display channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayConfig {
    /// Endpoint accepting display notifications. Notifications are written
    /// to the log when unset.
    #[serde(default)]
    pub url: Option<Url>,

    /// Upper bound for a single delivery, including transport retries.
    #[serde(
        default = "default_timeout",
        deserialize_with = "deserialize_duration_from_ms",
        serialize_with = "serialize_duration_to_ms"
    )]
    pub timeout_ms: Duration,

    /// How long the display shows a notification.
    #[serde(
        default = "default_display_duration",
        deserialize_with = "deserialize_duration_from_seconds",
        serialize_with = "serialize_duration_to_seconds"
    )]
    pub duration_secs: Duration,

    /// Transport-level retry policy.
    #[serde(default)]
    pub retry_policy: HttpRetryConfig,

    /// Label templates.
    #[serde(default)]
    pub templates: DisplayTemplates,

    /// Colors per tier.
    #[serde(default)]
    pub colors: TierColors,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            url: None,
            timeout_ms: default_timeout(),
            duration_secs: default_display_duration(),
            retry_policy: HttpRetryConfig::default(),
            templates: DisplayTemplates::default(),
            colors: TierColors::default(),
        }
    }
}
