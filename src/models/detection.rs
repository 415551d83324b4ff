use std::ops::RangeInclusive;

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Event years the gate accepts. Anything else is treated as a bad clock.
const PLAUSIBLE_YEARS: RangeInclusive<i32> = 1970..=9999;

/// Reasons an inbound detection cannot be evaluated.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum MalformedEvent {
    /// The species name is absent or blank.
    #[error("Detection has no species")]
    MissingSpecies,

    /// The confidence is absent.
    #[error("Detection has no confidence")]
    MissingConfidence,

    /// The confidence is outside of 0.0..=1.0.
    #[error("Confidence {0} is outside of 0.0..=1.0")]
    InvalidConfidence(f64),

    /// The timestamp could not be interpreted.
    #[error("Detection timestamp is out of range")]
    InvalidTimestamp,
}

/// An event time as sent by the transport: RFC 3339 text or epoch seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EventTimestamp {
    /// RFC 3339 / ISO-8601 timestamp.
    Rfc3339(DateTime<Utc>),
    /// Seconds since the Unix epoch, possibly fractional.
    Epoch(f64),
}

impl EventTimestamp {
    /// Converts to a UTC datetime.
    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        match self {
            EventTimestamp::Rfc3339(ts) => Some(*ts),
            EventTimestamp::Epoch(secs) => {
                if !secs.is_finite() {
                    return None;
                }
                let whole = secs.floor();
                let nanos = ((secs - whole) * 1_000_000_000.0).round() as u32;
                DateTime::from_timestamp(whole as i64, nanos.min(999_999_999))
            }
        }
    }
}

/// A detection payload as received from the transport. Every field is
/// optional so that incomplete payloads can still be counted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawDetection {
    /// Scientific name of the detected species.
    #[serde(default, alias = "sci_name")]
    pub scientific_name: Option<String>,
    /// Common name of the detected species.
    #[serde(default, alias = "com_name")]
    pub common_name: Option<String>,
    /// Classifier confidence, 0.0 to 1.0.
    #[serde(default)]
    pub confidence: Option<f64>,
    /// Station that produced the detection.
    #[serde(default)]
    pub station: Option<String>,
    /// Event time.
    #[serde(default)]
    pub timestamp: Option<EventTimestamp>,
    /// Optional reference to a recording or spectrogram.
    #[serde(default)]
    pub media: Option<String>,
}

/// A detection handed to the gate, tagged with the subscription it came
/// from and its arrival time.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundDetection {
    /// Station of the subscription that delivered the payload.
    pub station: String,
    /// Wall-clock arrival time.
    pub received_at: DateTime<Utc>,
    /// The payload.
    pub raw: RawDetection,
}

impl InboundDetection {
    /// Wraps a payload received now.
    pub fn new(station: &str, raw: RawDetection) -> Self {
        Self { station: station.to_string(), received_at: Utc::now(), raw }
    }

    /// The station to attribute this detection to.
    pub fn station(&self) -> &str {
        self.raw.station.as_deref().filter(|s| !s.trim().is_empty()).unwrap_or(&self.station)
    }

    /// Validates the payload.
    pub fn validate(&self) -> Result<DetectionEvent, MalformedEvent> {
        DetectionEvent::from_raw(&self.raw, self.station(), self.received_at)
    }
}

/// A validated, immutable detection event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionEvent {
    /// Scientific name.
    pub scientific_name: String,
    /// Common name, falling back to the scientific name.
    pub common_name: String,
    /// Classifier confidence, 0.0 to 1.0.
    pub confidence: f64,
    /// Station that produced the detection.
    pub station: String,
    /// Event time.
    pub timestamp: DateTime<Utc>,
    /// Optional media reference.
    pub media: Option<String>,
}

impl DetectionEvent {
    /// Validates a raw payload. A missing timestamp falls back to
    /// `received_at`.
    pub fn from_raw(
        raw: &RawDetection,
        station: &str,
        received_at: DateTime<Utc>,
    ) -> Result<Self, MalformedEvent> {
        let scientific_name = raw
            .scientific_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .ok_or(MalformedEvent::MissingSpecies)?;

        let confidence = raw.confidence.ok_or(MalformedEvent::MissingConfidence)?;
        if !(0.0..=1.0).contains(&confidence) {
            return Err(MalformedEvent::InvalidConfidence(confidence));
        }

        let timestamp = match &raw.timestamp {
            Some(ts) => ts
                .to_datetime()
                .filter(|at| PLAUSIBLE_YEARS.contains(&at.year()))
                .ok_or(MalformedEvent::InvalidTimestamp)?,
            None => received_at,
        };

        let common_name = raw
            .common_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(scientific_name);

        Ok(Self {
            scientific_name: scientific_name.to_string(),
            common_name: common_name.to_string(),
            confidence,
            station: station.to_string(),
            timestamp,
            media: raw.media.clone(),
        })
    }
}
