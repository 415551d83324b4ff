use serde::{Deserialize, Serialize};

use super::{DetectionEvent, NotificationRequest, RarityTier};

/// Why a detection did not produce a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The species was shown recently.
    OnCooldown,
    /// Too many notifications in the rolling window.
    BurstSuppressed,
    /// The notification was chosen but the display did not accept it.
    SendFailed,
    /// The event could not be evaluated.
    MalformedEvent,
}

impl SkipReason {
    /// Stable lowercase name.
    pub fn as_str(self) -> &'static str {
        match self {
            SkipReason::OnCooldown => "on_cooldown",
            SkipReason::BurstSuppressed => "burst_suppressed",
            SkipReason::SendFailed => "send_failed",
            SkipReason::MalformedEvent => "malformed_event",
        }
    }
}

/// A special occasion attached to a shown detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Highlight {
    /// First detection of the species in the given local year.
    FirstOfYear {
        /// Local calendar year.
        year: i32,
    },
    /// The species' lifetime count reached a threshold.
    Milestone {
        /// The threshold that was crossed.
        threshold: u64,
    },
}

/// The gate's verdict for a single detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum NotificationDecision {
    /// Surface the detection, with any highlights that forced it through.
    Shown {
        /// Empty for an ordinary notification.
        highlights: Vec<Highlight>,
    },
    /// Suppress the detection.
    Skipped(SkipReason),
}

impl NotificationDecision {
    /// An ordinary shown decision.
    pub fn shown() -> Self {
        NotificationDecision::Shown { highlights: Vec::new() }
    }

    /// Whether the detection is shown.
    pub fn is_shown(&self) -> bool {
        matches!(self, NotificationDecision::Shown { .. })
    }

    /// The skip reason, if skipped.
    pub fn skip_reason(&self) -> Option<SkipReason> {
        match self {
            NotificationDecision::Skipped(reason) => Some(*reason),
            NotificationDecision::Shown { .. } => None,
        }
    }
}

/// A decision together with what the gate knew when making it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateDecision {
    /// Station the detection is attributed to.
    pub station: String,
    /// The verdict.
    pub decision: NotificationDecision,
    /// The validated event, absent when the payload was malformed.
    pub event: Option<DetectionEvent>,
    /// Tier the species was classified as.
    pub tier: RarityTier,
    /// Notifications to hand to the notifier, in order.
    pub notifications: Vec<NotificationRequest>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decision_serialization() {
        let shown = NotificationDecision::Shown {
            highlights: vec![Highlight::FirstOfYear { year: 2025 }],
        };
        let json = serde_json::to_value(&shown).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "outcome": "shown",
                "detail": { "highlights": [{ "kind": "first_of_year", "year": 2025 }] }
            })
        );

        let skipped = NotificationDecision::Skipped(SkipReason::BurstSuppressed);
        let json = serde_json::to_value(&skipped).unwrap();
        assert_eq!(json, serde_json::json!({ "outcome": "skipped", "detail": "burst_suppressed" }));
        assert_eq!(skipped.skip_reason(), Some(SkipReason::BurstSuppressed));
        assert!(!skipped.is_shown());
    }
}
