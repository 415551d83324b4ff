//! A builder for creating `InboundDetection` instances in tests.

use chrono::{DateTime, TimeZone, Utc};

use crate::models::{EventTimestamp, InboundDetection, RawDetection};

/// A builder for creating `InboundDetection` instances in tests.
pub struct DetectionBuilder {
    station: String,
    scientific_name: Option<String>,
    common_name: Option<String>,
    confidence: Option<f64>,
    timestamp: Option<DateTime<Utc>>,
    received_at: Option<DateTime<Utc>>,
    media: Option<String>,
}

impl Default for DetectionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl DetectionBuilder {
    /// Creates a builder for a well-formed detection of a common garden bird.
    pub fn new() -> Self {
        DetectionBuilder {
            station: "garden".to_string(),
            scientific_name: Some("Turdus merula".to_string()),
            common_name: None,
            confidence: Some(0.85),
            timestamp: None,
            received_at: None,
            media: None,
        }
    }

    /// Sets the station of the subscription.
    pub fn station(mut self, station: &str) -> Self {
        self.station = station.to_string();
        self
    }

    /// Sets the scientific name.
    pub fn species(mut self, name: &str) -> Self {
        self.scientific_name = Some(name.to_string());
        self
    }

    /// Removes the scientific name.
    pub fn without_species(mut self) -> Self {
        self.scientific_name = None;
        self
    }

    /// Sets the common name.
    pub fn common_name(mut self, name: &str) -> Self {
        self.common_name = Some(name.to_string());
        self
    }

    /// Sets the confidence.
    pub fn confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }

    /// Sets the event time.
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Sets the arrival time. Defaults to the event time.
    pub fn received_at(mut self, received_at: DateTime<Utc>) -> Self {
        self.received_at = Some(received_at);
        self
    }

    /// Sets the media reference.
    pub fn media(mut self, media: &str) -> Self {
        self.media = Some(media.to_string());
        self
    }

    /// Builds the `InboundDetection`.
    pub fn build(self) -> InboundDetection {
        let received_at = self.received_at.or(self.timestamp).unwrap_or_else(Utc::now);
        InboundDetection {
            station: self.station,
            received_at,
            raw: RawDetection {
                scientific_name: self.scientific_name,
                common_name: self.common_name,
                confidence: self.confidence,
                station: None,
                timestamp: self.timestamp.map(EventTimestamp::Rfc3339),
                media: self.media,
            },
        }
    }
}

/// A UTC instant on the given date and time.
pub fn utc(year: i32, month: u32, day: u32, hour: u32, minute: u32, second: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, hour, minute, second).single().unwrap_or_default()
}
