//! Combines the engine components into one decision per detection.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::{
    burst::BurstSuppressor, cooldown::CooldownManager, rarity::RarityClassifier,
    tracker::MilestoneTracker,
};
use crate::{
    config::{BurstCountMode, CoalescePolicy, GateConfig},
    models::{
        GateDecision, Highlight, InboundDetection, NotificationDecision, NotificationRequest,
        PERSISTED_STATE_VERSION, PersistedState, RarityTier, SkipReason, StatsReport,
    },
    stats::StatsAggregator,
};

/// Owns the mutable gate state and decides, one detection at a time, whether
/// a notification is shown.
///
/// Precedence, first match wins:
/// 1. malformed payload: `Skipped(MalformedEvent)`
/// 2. first-of-year or milestone: `Shown`, bypassing cooldown and burst
/// 3. species on cooldown: `Skipped(OnCooldown)`
/// 4. burst suppression: `Skipped(BurstSuppressed)`
/// 5. otherwise `Shown`
///
/// Every shown decision records the species cooldown. Every decision is
/// counted in the stats.
#[derive(Debug)]
pub struct DecisionOrchestrator {
    classifier: Arc<RarityClassifier>,
    coalesce: CoalescePolicy,
    burst_count: BurstCountMode,
    cooldowns: CooldownManager,
    burst: BurstSuppressor,
    tracker: MilestoneTracker,
    stats: StatsAggregator,
}

impl DecisionOrchestrator {
    /// Creates an orchestrator with empty state.
    pub fn new(config: &GateConfig, classifier: Arc<RarityClassifier>, now: DateTime<Utc>) -> Self {
        Self::from_state(config, classifier, PersistedState::empty(), now)
    }

    /// Creates an orchestrator seeded from a persisted snapshot.
    pub fn from_state(
        config: &GateConfig,
        classifier: Arc<RarityClassifier>,
        state: PersistedState,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            classifier,
            coalesce: config.coalesce,
            burst_count: config.burst.count,
            cooldowns: CooldownManager::new(config).with_records(state.cooldowns),
            burst: BurstSuppressor::new(&config.burst).with_state(state.burst),
            tracker: MilestoneTracker::new(config)
                .with_records(state.first_of_year, state.milestones),
            stats: StatsAggregator::new(now),
        }
    }

    /// The classifier, shared with the species table reloader.
    pub fn classifier(&self) -> &Arc<RarityClassifier> {
        &self.classifier
    }

    /// Decides on one detection.
    pub fn decide(&mut self, inbound: &InboundDetection) -> GateDecision {
        let station = inbound.station().to_string();

        let event = match inbound.validate() {
            Ok(event) => event,
            Err(reason) => {
                tracing::warn!(station = %station, %reason, "Skipping malformed detection.");
                let decision = NotificationDecision::Skipped(SkipReason::MalformedEvent);
                self.stats.record(&station, &decision, None);
                return GateDecision {
                    station,
                    decision,
                    event: None,
                    tier: RarityTier::Common,
                    notifications: Vec::new(),
                };
            }
        };

        let species = event.scientific_name.as_str();
        let at = event.timestamp;
        let classification = self.classifier.classify(species);

        let mut highlights = Vec::new();
        if self.tracker.check_first_of_year(species, at) {
            highlights.push(Highlight::FirstOfYear { year: self.tracker.local_year(at) });
        }
        if let Some(threshold) = self.tracker.check_milestone(species, at) {
            highlights.push(Highlight::Milestone { threshold });
        }

        let normal = if self.cooldowns.is_on_cooldown(species, at) {
            Err(SkipReason::OnCooldown)
        } else if !self.burst.admit(classification.tier, at) {
            Err(SkipReason::BurstSuppressed)
        } else {
            Ok(())
        };

        let request = |highlights: Vec<Highlight>| NotificationRequest {
            event: event.clone(),
            tier: classification.tier,
            highlights,
        };

        let (decision, notifications) = match (highlights.is_empty(), normal) {
            (true, Ok(())) => (NotificationDecision::shown(), vec![request(Vec::new())]),
            (true, Err(reason)) => (NotificationDecision::Skipped(reason), Vec::new()),
            (false, normal) => {
                let mut notifications = vec![request(highlights.clone())];
                if self.coalesce == CoalescePolicy::Separate && normal.is_ok() {
                    notifications.push(request(Vec::new()));
                }
                (NotificationDecision::Shown { highlights }, notifications)
            }
        };

        if decision.is_shown() {
            self.cooldowns.record_shown(species, classification, at);
        }
        if self.burst_count == BurstCountMode::All || decision.is_shown() {
            self.burst.record(at);
        }
        self.stats.record(&station, &decision, Some(event.confidence));

        tracing::debug!(
            station = %station,
            species = %species,
            tier = %classification.tier,
            confidence = event.confidence,
            decision = ?decision,
            "Detection decided."
        );

        GateDecision {
            station,
            decision,
            event: Some(event),
            tier: classification.tier,
            notifications,
        }
    }

    /// Counts a failed delivery against `station`.
    pub fn mark_send_failed(&mut self, station: &str, confidence: Option<f64>) {
        self.stats.mark_send_failed(station, confidence);
    }

    /// Drains the stats for the period ending at `period_end`.
    pub fn flush_stats(&mut self, period_end: DateTime<Utc>) -> StatsReport {
        self.stats.flush(period_end)
    }

    /// Hands back a report that could not be published.
    pub fn restore_stats(&mut self, report: StatsReport) {
        self.stats.restore(report);
    }

    /// Snapshot of all persisted sub-states.
    pub fn snapshot(&self, saved_at: DateTime<Utc>) -> PersistedState {
        let (first_of_year, milestones) = self.tracker.snapshot();
        PersistedState {
            version: PERSISTED_STATE_VERSION,
            saved_at: Some(saved_at),
            cooldowns: self.cooldowns.snapshot(),
            burst: self.burst.snapshot(),
            milestones,
            first_of_year,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeDelta, TimeZone};

    use super::*;
    use crate::{
        config::TierCooldowns,
        models::{EventTimestamp, RawDetection, SpeciesEntry},
    };

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 7, 1, 12, 0, 0).unwrap() + TimeDelta::seconds(secs)
    }

    fn detection(species: &str, secs: i64) -> InboundDetection {
        InboundDetection {
            station: "garden".to_string(),
            received_at: t(secs),
            raw: RawDetection {
                scientific_name: Some(species.to_string()),
                confidence: Some(0.9),
                timestamp: Some(EventTimestamp::Rfc3339(t(secs))),
                ..Default::default()
            },
        }
    }

    fn orchestrator(config: GateConfig) -> DecisionOrchestrator {
        let classifier = RarityClassifier::from_entries(
            vec![
                SpeciesEntry::new("Pica pica", RarityTier::Common),
                SpeciesEntry::new("Bubo bubo", RarityTier::VeryRare),
            ],
            TierCooldowns::default(),
        )
        .unwrap();
        DecisionOrchestrator::new(&config, Arc::new(classifier), t(0))
    }

    #[test]
    fn test_first_sighting_is_highlighted_then_cooled_down() {
        let mut gate = orchestrator(GateConfig::default());
        let first = gate.decide(&detection("Pica pica", 0));
        assert_eq!(
            first.decision,
            NotificationDecision::Shown { highlights: vec![Highlight::FirstOfYear { year: 2025 }] }
        );
        assert_eq!(first.notifications.len(), 1);

        let second = gate.decide(&detection("Pica pica", 60));
        assert_eq!(second.decision, NotificationDecision::Skipped(SkipReason::OnCooldown));
        assert!(second.notifications.is_empty());

        let third = gate.decide(&detection("Pica pica", 600));
        assert_eq!(third.decision, NotificationDecision::shown());
    }

    #[test]
    fn test_malformed_event_is_skipped_and_not_counted_in_burst() {
        let mut gate = orchestrator(GateConfig::default());
        let decision = gate.decide(&InboundDetection::new("roof", RawDetection::default()));
        assert_eq!(decision.decision, NotificationDecision::Skipped(SkipReason::MalformedEvent));
        assert_eq!(decision.station, "roof");
        assert!(decision.event.is_none());
        assert_eq!(gate.snapshot(t(1)).burst.buckets.len(), 0);

        let report = gate.flush_stats(t(2));
        assert_eq!(report.station("roof").unwrap().skip_reasons.malformed_event, 1);
    }

    #[test]
    fn test_timestamp_at_edge_of_range_is_malformed() {
        let mut gate = orchestrator(GateConfig::default());
        let mut inbound = detection("Pica pica", 0);
        inbound.raw.timestamp =
            Some(EventTimestamp::Epoch((DateTime::<Utc>::MIN_UTC.timestamp() + 10) as f64));

        let decision = gate.decide(&inbound);
        assert_eq!(decision.decision, NotificationDecision::Skipped(SkipReason::MalformedEvent));

        let next = gate.decide(&detection("Bubo bubo", 1));
        assert!(next.decision.is_shown());
    }

    fn burst_outcomes(count: BurstCountMode) -> Vec<NotificationDecision> {
        let config = GateConfig {
            burst: crate::config::BurstConfig { ceiling: 2, count, ..Default::default() },
            ..Default::default()
        };
        let names = ["Testus a", "Testus b", "Testus c", "Testus d", "Testus e"];
        let mut state = PersistedState::empty();
        let seen = names.iter().map(|name| crate::models::species_key(name)).collect();
        state.first_of_year.insert(2025, seen);
        let classifier = RarityClassifier::from_entries(vec![], TierCooldowns::default()).unwrap();
        let mut gate = DecisionOrchestrator::from_state(&config, Arc::new(classifier), state, t(0));

        [(names[0], 0), (names[1], 1), (names[2], 30), (names[3], 40), (names[4], 61)]
            .into_iter()
            .map(|(name, secs)| gate.decide(&detection(name, secs)).decision)
            .collect()
    }

    #[test]
    fn test_skipped_decisions_keep_suppression_alive_only_when_counted() {
        let suppressed = NotificationDecision::Skipped(SkipReason::BurstSuppressed);
        let shown = NotificationDecision::shown();

        // The two suppressed events at 30s and 40s are still in the window at 61s.
        assert_eq!(
            burst_outcomes(BurstCountMode::All),
            vec![
                shown.clone(),
                shown.clone(),
                suppressed.clone(),
                suppressed.clone(),
                suppressed.clone(),
            ]
        );
        assert_eq!(
            burst_outcomes(BurstCountMode::Shown),
            vec![shown.clone(), shown.clone(), suppressed.clone(), suppressed, shown]
        );
    }

    #[test]
    fn test_separate_policy_emits_two_notifications() {
        let config = GateConfig { coalesce: CoalescePolicy::Separate, ..Default::default() };
        let mut gate = orchestrator(config);
        let decision = gate.decide(&detection("Bubo bubo", 0));
        assert_eq!(decision.notifications.len(), 2);
        assert!(decision.notifications[0].is_highlight());
        assert!(!decision.notifications[1].is_highlight());
        assert_eq!(decision.tier, RarityTier::VeryRare);
    }

    #[test]
    fn test_milestone_bypasses_cooldown() {
        let config = GateConfig { milestones: vec![2], ..Default::default() };
        let mut gate = orchestrator(config);
        gate.decide(&detection("Pica pica", 0));

        let decision = gate.decide(&detection("Pica pica", 30));
        assert_eq!(
            decision.decision,
            NotificationDecision::Shown { highlights: vec![Highlight::Milestone { threshold: 2 }] }
        );

        let decision = gate.decide(&detection("Pica pica", 31));
        assert_eq!(decision.decision, NotificationDecision::Skipped(SkipReason::OnCooldown));
    }

    #[test]
    fn test_send_failure_is_reflected_in_stats() {
        let mut gate = orchestrator(GateConfig::default());
        gate.decide(&detection("Pica pica", 0));
        gate.mark_send_failed("garden", Some(0.9));
        let report = gate.flush_stats(t(10));
        let garden = report.station("garden").unwrap();
        assert_eq!(garden.counts.shown, 0);
        assert_eq!(garden.skip_reasons.send_failed, 1);
    }
}
