//! Coalesces near-simultaneous reports of the same species from different
//! stations into one logical event.

use std::{collections::HashMap, time::Duration};

use chrono::{DateTime, TimeDelta, Utc};

use crate::models::{DetectionEvent, InboundDetection, species_key};

#[derive(Debug)]
struct HeldDetection {
    inbound: InboundDetection,
    event: DetectionEvent,
    release_at: DateTime<Utc>,
}

/// Holds detections for a short window so that a second report of the same
/// species can be merged into the first.
///
/// Reports are keyed by species and event time rounded down to the window.
/// When two reports share a key the one with the higher confidence is kept;
/// on a tie the earlier report wins. Malformed reports pass straight
/// through, as does everything when the window is zero.
#[derive(Debug)]
pub struct DedupBuffer {
    window: TimeDelta,
    held: HashMap<(String, i64), HeldDetection>,
}

impl DedupBuffer {
    /// Creates a buffer with the given window.
    pub fn new(window: Duration) -> Self {
        Self {
            window: TimeDelta::from_std(window).unwrap_or(TimeDelta::zero()),
            held: HashMap::new(),
        }
    }

    /// Whether the buffer passes everything through.
    pub fn is_disabled(&self) -> bool {
        self.window <= TimeDelta::zero()
    }

    /// Number of held detections.
    pub fn len(&self) -> usize {
        self.held.len()
    }

    /// Whether nothing is held.
    pub fn is_empty(&self) -> bool {
        self.held.is_empty()
    }

    /// Offers a detection. Returns it back when it must be decided on right
    /// away; otherwise it is held until [`DedupBuffer::drain_ready`] releases
    /// it.
    pub fn offer(&mut self, inbound: InboundDetection) -> Option<InboundDetection> {
        if self.is_disabled() {
            return Some(inbound);
        }
        let Ok(event) = inbound.validate() else {
            return Some(inbound);
        };

        let key = (species_key(&event.scientific_name), self.slot(event.timestamp));
        match self.held.get_mut(&key) {
            Some(held) => {
                if event.confidence > held.event.confidence {
                    tracing::debug!(
                        species = %event.scientific_name,
                        kept = %event.station,
                        dropped = %held.event.station,
                        "Merged duplicate detection, keeping the higher confidence report."
                    );
                    held.inbound = inbound;
                    held.event = event;
                } else {
                    tracing::debug!(
                        species = %event.scientific_name,
                        kept = %held.event.station,
                        dropped = %event.station,
                        "Merged duplicate detection."
                    );
                }
            }
            None => {
                let release_at = inbound.received_at + self.window;
                self.held.insert(key, HeldDetection { inbound, event, release_at });
            }
        }
        None
    }

    /// Releases every detection whose window has passed at `now`, ordered by
    /// event time.
    pub fn drain_ready(&mut self, now: DateTime<Utc>) -> Vec<InboundDetection> {
        let ready: Vec<_> = self
            .held
            .iter()
            .filter(|(_, held)| held.release_at <= now)
            .map(|(key, _)| key.clone())
            .collect();

        let mut released: Vec<HeldDetection> =
            ready.into_iter().filter_map(|key| self.held.remove(&key)).collect();
        Self::ordered(&mut released)
    }

    /// Releases everything, ordered by event time.
    pub fn drain_all(&mut self) -> Vec<InboundDetection> {
        let mut released: Vec<HeldDetection> = self.held.drain().map(|(_, held)| held).collect();
        Self::ordered(&mut released)
    }

    fn ordered(released: &mut Vec<HeldDetection>) -> Vec<InboundDetection> {
        released.sort_by(|a, b| {
            a.event
                .timestamp
                .cmp(&b.event.timestamp)
                .then_with(|| a.event.scientific_name.cmp(&b.event.scientific_name))
        });
        released.drain(..).map(|held| held.inbound).collect()
    }

    fn slot(&self, at: DateTime<Utc>) -> i64 {
        at.timestamp_millis().div_euclid(self.window.num_milliseconds().max(1))
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::models::{EventTimestamp, RawDetection};

    fn base() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 7, 1, 12, 0, 0).unwrap()
    }

    fn inbound(station: &str, species: &str, confidence: f64, offset_ms: i64) -> InboundDetection {
        let at = base() + TimeDelta::milliseconds(offset_ms);
        InboundDetection {
            station: station.to_string(),
            received_at: at,
            raw: RawDetection {
                scientific_name: Some(species.to_string()),
                confidence: Some(confidence),
                timestamp: Some(EventTimestamp::Rfc3339(at)),
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_duplicate_reports_keep_higher_confidence() {
        let mut buffer = DedupBuffer::new(Duration::from_secs(5));
        assert!(buffer.offer(inbound("garden", "Pica pica", 0.6, 0)).is_none());
        assert!(buffer.offer(inbound("roof", "Pica pica", 0.9, 1500)).is_none());
        assert_eq!(buffer.len(), 1);

        assert!(buffer.drain_ready(base() + TimeDelta::seconds(4)).is_empty());
        let released = buffer.drain_ready(base() + TimeDelta::seconds(5));
        assert_eq!(released.len(), 1);
        assert_eq!(released[0].station, "roof");
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_different_species_are_held_separately() {
        let mut buffer = DedupBuffer::new(Duration::from_secs(5));
        buffer.offer(inbound("garden", "Turdus merula", 0.8, 200));
        buffer.offer(inbound("roof", "Pica pica", 0.8, 100));
        let released = buffer.drain_all();
        assert_eq!(released.len(), 2);
        assert_eq!(released[0].raw.scientific_name.as_deref(), Some("Pica pica"));
    }

    #[test]
    fn test_malformed_and_disabled_pass_through() {
        let mut buffer = DedupBuffer::new(Duration::from_secs(5));
        let malformed = InboundDetection::new("garden", RawDetection::default());
        assert!(buffer.offer(malformed).is_some());

        let mut disabled = DedupBuffer::new(Duration::ZERO);
        assert!(disabled.offer(inbound("garden", "Pica pica", 0.6, 0)).is_some());
        assert!(disabled.is_empty());
    }
}
