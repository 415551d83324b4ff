//! Per-station decision statistics, accumulated between reporting ticks.

mod publisher;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
pub use publisher::{LogStatsPublisher, NatsStatsPublisher, StatsPublishError, StatsPublisher};

#[cfg(test)]
pub use publisher::MockStatsPublisher;

use crate::models::{
    NotificationDecision, SkipCounts, SkipReason, StatsCounts, StatsReport, StatsSnapshot,
};

#[derive(Debug, Clone)]
struct StationStats {
    period_start: DateTime<Utc>,
    counts: StatsCounts,
    skip_reasons: SkipCounts,
    confidence_sum: f64,
    confidence_samples: u64,
}

impl StationStats {
    fn new(period_start: DateTime<Utc>) -> Self {
        Self {
            period_start,
            counts: StatsCounts::default(),
            skip_reasons: SkipCounts::default(),
            confidence_sum: 0.0,
            confidence_samples: 0,
        }
    }

    fn skip(&mut self, reason: SkipReason) {
        self.counts.skipped += 1;
        self.skip_reasons.increment(reason);
    }

    fn into_snapshot(self, station: String, period_end: DateTime<Utc>) -> StatsSnapshot {
        let average_confidence = (self.confidence_samples > 0)
            .then(|| self.confidence_sum / self.confidence_samples as f64);
        StatsSnapshot {
            station,
            period_start: self.period_start,
            period_end,
            counts: self.counts,
            skip_reasons: self.skip_reasons,
            average_confidence,
        }
    }
}

/// Accumulates decision counts per station until the next flush.
///
/// Averages cover the confidence of shown detections. A flush drains every
/// counter; if publishing the report fails it is handed back through
/// [`StatsAggregator::restore`] and re-emitted with the next period.
#[derive(Debug, Clone)]
pub struct StatsAggregator {
    period_start: DateTime<Utc>,
    stations: BTreeMap<String, StationStats>,
}

impl StatsAggregator {
    /// Starts the first period at `period_start`.
    pub fn new(period_start: DateTime<Utc>) -> Self {
        Self { period_start, stations: BTreeMap::new() }
    }

    /// Records one decision for `station`.
    pub fn record(
        &mut self,
        station: &str,
        decision: &NotificationDecision,
        confidence: Option<f64>,
    ) {
        let stats = self.station_mut(station);
        stats.counts.total += 1;
        match decision {
            NotificationDecision::Shown { .. } => {
                stats.counts.shown += 1;
                if let Some(confidence) = confidence {
                    stats.confidence_sum += confidence;
                    stats.confidence_samples += 1;
                }
            }
            NotificationDecision::Skipped(reason) => stats.skip(*reason),
        }
    }

    /// Reclassifies a shown decision as `Skipped(SendFailed)` after its
    /// delivery failed. When the shown decision was already flushed with an
    /// earlier period, the failure is counted as an extra skipped decision.
    pub fn mark_send_failed(&mut self, station: &str, confidence: Option<f64>) {
        let stats = self.station_mut(station);
        if stats.counts.shown > 0 {
            stats.counts.shown -= 1;
            if let Some(confidence) = confidence.filter(|_| stats.confidence_samples > 0) {
                stats.confidence_sum -= confidence;
                stats.confidence_samples -= 1;
            }
        } else {
            stats.counts.total += 1;
        }
        stats.skip(SkipReason::SendFailed);
    }

    /// Drains every counter into a report and starts a new period at
    /// `period_end`.
    pub fn flush(&mut self, period_end: DateTime<Utc>) -> StatsReport {
        let stations = std::mem::take(&mut self.stations);
        self.period_start = period_end;
        StatsReport {
            snapshots: stations
                .into_iter()
                .map(|(station, stats)| stats.into_snapshot(station, period_end))
                .collect(),
        }
    }

    /// Merges a report that could not be published back into the current
    /// period.
    pub fn restore(&mut self, report: StatsReport) {
        for snapshot in report.snapshots {
            let stats = self.station_mut(&snapshot.station);
            stats.period_start = stats.period_start.min(snapshot.period_start);
            stats.counts.total += snapshot.counts.total;
            stats.counts.shown += snapshot.counts.shown;
            stats.counts.skipped += snapshot.counts.skipped;
            stats.skip_reasons.merge(&snapshot.skip_reasons);
            if let Some(average) = snapshot.average_confidence {
                stats.confidence_sum += average * snapshot.counts.shown as f64;
                stats.confidence_samples += snapshot.counts.shown;
            }
        }
    }

    /// The counts recorded so far for `station` in the current period.
    pub fn counts(&self, station: &str) -> Option<StatsCounts> {
        self.stations.get(station).map(|stats| stats.counts)
    }

    /// Start of the current period.
    pub fn period_start(&self) -> DateTime<Utc> {
        self.period_start
    }

    fn station_mut(&mut self, station: &str) -> &mut StationStats {
        let period_start = self.period_start;
        self.stations
            .entry(station.to_string())
            .or_insert_with(|| StationStats::new(period_start))
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeDelta, TimeZone};

    use super::*;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 7, 1, 12, 0, 0).unwrap()
    }

    fn populated() -> StatsAggregator {
        let mut stats = StatsAggregator::new(t0());
        stats.record("garden", &NotificationDecision::shown(), Some(0.8));
        stats.record("garden", &NotificationDecision::shown(), Some(0.6));
        stats.record("garden", &NotificationDecision::Skipped(SkipReason::OnCooldown), Some(0.9));
        stats.record("roof", &NotificationDecision::Skipped(SkipReason::MalformedEvent), None);
        stats
    }

    #[test]
    fn test_flush_reports_per_station() {
        let mut stats = populated();
        let end = t0() + TimeDelta::minutes(5);
        let report = stats.flush(end);

        let garden = report.station("garden").unwrap();
        assert_eq!(garden.counts, StatsCounts { total: 3, shown: 2, skipped: 1 });
        assert_eq!(garden.skip_reasons.on_cooldown, 1);
        assert!((garden.average_confidence.unwrap() - 0.7).abs() < 1e-9);
        assert_eq!(garden.period_start, t0());
        assert_eq!(garden.period_end, end);

        let roof = report.station("roof").unwrap();
        assert_eq!(roof.skip_reasons.malformed_event, 1);
        assert_eq!(roof.average_confidence, None);

        assert!(stats.flush(end + TimeDelta::minutes(5)).is_empty());
        assert_eq!(stats.period_start(), end + TimeDelta::minutes(5));
    }

    #[test]
    fn test_send_failure_moves_shown_to_skipped() {
        let mut stats = populated();
        stats.mark_send_failed("garden", Some(0.8));
        let counts = stats.counts("garden").unwrap();
        assert_eq!(counts, StatsCounts { total: 3, shown: 1, skipped: 2 });

        let report = stats.flush(t0() + TimeDelta::minutes(1));
        let garden = report.station("garden").unwrap();
        assert_eq!(garden.skip_reasons.send_failed, 1);
        assert!((garden.average_confidence.unwrap() - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_late_send_failure_after_flush_adds_a_skip() {
        let mut stats = populated();
        stats.flush(t0() + TimeDelta::minutes(1));
        stats.mark_send_failed("garden", Some(0.8));
        let counts = stats.counts("garden").unwrap();
        assert_eq!(counts, StatsCounts { total: 1, shown: 0, skipped: 1 });
    }

    #[test]
    fn test_restore_reemits_failed_report() {
        let mut stats = populated();
        let report = stats.flush(t0() + TimeDelta::minutes(5));
        stats.record("garden", &NotificationDecision::shown(), Some(1.0));
        stats.restore(report);

        let merged = stats.flush(t0() + TimeDelta::minutes(10));
        let garden = merged.station("garden").unwrap();
        assert_eq!(garden.counts, StatsCounts { total: 4, shown: 3, skipped: 1 });
        assert_eq!(garden.period_start, t0());
        assert!((garden.average_confidence.unwrap() - 0.8).abs() < 1e-9);
        assert!(merged.station("roof").is_some());
    }
}
