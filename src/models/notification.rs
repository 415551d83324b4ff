use serde::{Deserialize, Serialize};

use super::{DetectionEvent, Highlight, RarityTier};

/// A notification chosen by the gate, before rendering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationRequest {
    /// The detection being announced.
    pub event: DetectionEvent,
    /// Tier of the species.
    pub tier: RarityTier,
    /// Highlights to announce. Empty for an ordinary notification.
    pub highlights: Vec<Highlight>,
}

impl NotificationRequest {
    /// Whether this notification announces a special occasion.
    pub fn is_highlight(&self) -> bool {
        !self.highlights.is_empty()
    }
}

/// The rendered payload sent to the display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayNotification {
    /// Text shown on the display.
    pub text: String,
    /// Icon identifier, the tier name.
    pub icon: String,
    /// Hex color.
    pub color: String,
    /// How long the display keeps the notification up.
    pub duration_secs: u64,
    /// Optional media reference.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media: Option<String>,
}
