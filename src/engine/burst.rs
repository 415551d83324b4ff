//! Global burst protection over a trailing window of decisions.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

use crate::{
    config::BurstConfig,
    models::{BurstBucket, BurstWindowState, RarityTier},
};

/// Counts decisions in a trailing window made of fixed-width buckets.
///
/// Time only moves forward: the window is anchored at the latest event time
/// seen (the horizon). An event older than the newest bucket is counted in
/// that bucket rather than rewriting history.
#[derive(Debug, Clone)]
pub struct BurstSuppressor {
    window: TimeDelta,
    bucket_width: TimeDelta,
    capacity: usize,
    ceiling: u32,
    min_tier: RarityTier,
    state: BurstWindowState,
}

impl BurstSuppressor {
    /// Creates an empty suppressor.
    pub fn new(config: &BurstConfig) -> Self {
        let window = to_delta(config.window_secs);
        let bucket_width = to_delta(config.bucket_ms).max(TimeDelta::milliseconds(1));
        let buckets = window.num_milliseconds() / bucket_width.num_milliseconds();
        Self {
            window,
            bucket_width,
            capacity: buckets.max(1) as usize + 1,
            ceiling: config.ceiling,
            min_tier: config.min_tier,
            state: BurstWindowState::default(),
        }
    }

    /// Restores a persisted window.
    pub fn with_state(mut self, state: BurstWindowState) -> Self {
        self.state = state;
        self.trim_to_capacity();
        self
    }

    /// Whether an event of `tier` at `at` may be shown. Suppression is
    /// active while the window already holds `ceiling` or more decisions;
    /// tiers at or above the minimum tier are admitted regardless.
    pub fn admit(&mut self, tier: RarityTier, at: DateTime<Utc>) -> bool {
        self.advance(at);
        tier >= self.min_tier || self.count() < self.ceiling
    }

    /// Whether suppression is currently active.
    pub fn is_suppressing(&self) -> bool {
        self.count() >= self.ceiling
    }

    /// Counts one decision at `at`.
    pub fn record(&mut self, at: DateTime<Utc>) {
        self.advance(at);
        let start = self.bucket_start(at);

        match self.state.buckets.back_mut() {
            Some(newest) if newest.start >= start => newest.count += 1,
            _ => self.state.buckets.push_back(BurstBucket { start, count: 1 }),
        }
        self.trim_to_capacity();
    }

    /// Decisions currently inside the window.
    pub fn count(&self) -> u32 {
        self.state.buckets.iter().map(|bucket| bucket.count).sum()
    }

    /// A copy of the window, for persistence.
    pub fn snapshot(&self) -> BurstWindowState {
        self.state.clone()
    }

    fn advance(&mut self, at: DateTime<Utc>) {
        let horizon = match self.state.horizon {
            Some(current) if current >= at => current,
            _ => {
                self.state.horizon = Some(at);
                at
            }
        };

        // Near the edge of the representable range every bucket is kept.
        let Some(cutoff) = horizon.checked_sub_signed(self.window) else {
            return;
        };
        while self.state.buckets.front().is_some_and(|bucket| bucket.start <= cutoff) {
            self.state.buckets.pop_front();
        }
    }

    fn trim_to_capacity(&mut self) {
        while self.state.buckets.len() > self.capacity {
            self.state.buckets.pop_front();
        }
    }

    fn bucket_start(&self, at: DateTime<Utc>) -> DateTime<Utc> {
        let width = self.bucket_width.num_milliseconds();
        let millis = at.timestamp_millis().div_euclid(width) * width;
        DateTime::from_timestamp_millis(millis).unwrap_or(at)
    }
}

fn to_delta(duration: Duration) -> TimeDelta {
    TimeDelta::from_std(duration).unwrap_or(TimeDelta::MAX)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 7, 1, 12, 0, 0).unwrap() + TimeDelta::seconds(secs)
    }

    fn suppressor(ceiling: u32) -> BurstSuppressor {
        BurstSuppressor::new(&BurstConfig { ceiling, ..Default::default() })
    }

    #[test]
    fn test_suppresses_after_ceiling_reached() {
        let mut burst = suppressor(3);
        for i in 0..3 {
            assert!(burst.admit(RarityTier::Common, t(i)));
            burst.record(t(i));
        }
        assert!(!burst.admit(RarityTier::Common, t(3)));
        assert!(!burst.admit(RarityTier::Uncommon, t(3)));
        assert!(burst.admit(RarityTier::Rare, t(3)));
        assert!(burst.admit(RarityTier::Exceptional, t(3)));
        assert!(burst.is_suppressing());
    }

    #[test]
    fn test_window_slides_forward() {
        let mut burst = suppressor(2);
        burst.record(t(0));
        burst.record(t(10));
        assert!(!burst.admit(RarityTier::Common, t(30)));

        // t(0) leaves the window once the horizon reaches t(60).
        assert!(burst.admit(RarityTier::Common, t(60)));
        assert_eq!(burst.count(), 1);

        assert!(burst.admit(RarityTier::Common, t(75)));
        assert_eq!(burst.count(), 0);
    }

    #[test]
    fn test_window_near_earliest_instant_keeps_buckets() {
        let mut burst = suppressor(2);
        let at = DateTime::<Utc>::MIN_UTC + TimeDelta::seconds(10);
        assert!(burst.admit(RarityTier::Common, at));
        burst.record(at);
        burst.record(at + TimeDelta::seconds(1));
        assert_eq!(burst.count(), 2);
        assert!(!burst.admit(RarityTier::Common, at + TimeDelta::seconds(2)));
    }

    #[test]
    fn test_late_events_do_not_rewind_the_window() {
        let mut burst = suppressor(5);
        burst.record(t(100));
        burst.record(t(50));
        assert_eq!(burst.count(), 2);
        let snapshot = burst.snapshot();
        assert_eq!(snapshot.horizon, Some(t(100)));
        assert_eq!(snapshot.buckets.len(), 1);
        assert_eq!(snapshot.buckets[0].count, 2);
    }

    #[test]
    fn test_sub_second_events_share_a_bucket() {
        let mut burst = suppressor(10);
        burst.record(t(1));
        burst.record(t(1) + TimeDelta::milliseconds(400));
        burst.record(t(2));
        let snapshot = burst.snapshot();
        assert_eq!(snapshot.buckets.len(), 2);
        assert_eq!(snapshot.buckets[0].count, 2);
    }

    #[test]
    fn test_restored_window_keeps_suppressing() {
        let mut burst = suppressor(2);
        burst.record(t(0));
        burst.record(t(1));

        let mut restored = suppressor(2).with_state(burst.snapshot());
        assert!(!restored.admit(RarityTier::Common, t(2)));
    }
}
