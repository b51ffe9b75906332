use std::collections::{HashMap, HashSet};

use chrono::Utc;
use pulse_types::MicroBatch;
use serde::Serialize;
use tracing::{debug, info};

/// Exponent of the reversal-probability curve.  Chosen so that 20%
/// confidence already maps below 1% reversal risk and 67% below 1e-6.
const REVERSAL_EXPONENT: i32 = 21;

/// Quorum settings for instant finality.
#[derive(Debug, Clone)]
pub struct FinalityConfig {
    /// Size of the validator set the threshold is measured against.
    pub total_validators: usize,

    /// Fraction of validators (0 < t ≤ 1) whose acks finalise a batch.
    pub instant_threshold: f64,

    /// How long a batch may sit unfinalised before it is marked timed out.
    pub timeout_window_ms: i64,
}

impl Default for FinalityConfig {
    fn default() -> Self {
        Self {
            total_validators: 1,
            instant_threshold: 0.20,
            timeout_window_ms: 10,
        }
    }
}

/// Per-batch acknowledgment state.
#[derive(Debug, Clone)]
pub struct FinalityEntry {
    pub batch: MicroBatch,
    pub acks: HashSet<String>,
    pub started_at: i64,
    pub finalised: bool,
    pub timed_out: bool,
    pub time_to_finality: Option<i64>,
}

/// Payload of the instant-finality notification, emitted exactly once per
/// finalised batch.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalityEvent {
    pub batch_id: String,
    pub batch_number: u64,
    /// Percentage of the validator set that acknowledged.
    pub confidence: f64,
    pub validators: Vec<String>,
    pub time_to_finality: i64,
    pub timestamp: i64,
}

/// Snapshot of one batch's progress toward finality.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalityStatus {
    pub ack_count: usize,
    pub total_validators: usize,
    pub confidence: f64,
    pub reversal_probability: f64,
    pub has_instant_finality: bool,
    pub validators: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackerStats {
    pub tracked_batches: usize,
    pub finalized_batches: usize,
    /// Percentage of tracked batches that reached finality.
    pub finality_rate: f64,
}

/// Tracks validator acknowledgments per batch and detects the moment the
/// configured quorum fraction is crossed.
///
/// Per-batch state machine: `Tracking → Finalised` (terminal) or
/// `Tracking → TimedOut` (also terminal; late acks are still recorded for
/// inspection but can no longer finalise the batch).
pub struct FinalityTracker {
    config: FinalityConfig,
    tracked: HashMap<String, FinalityEntry>,
    finalised: HashSet<String>,
}

impl FinalityTracker {
    pub fn new(config: FinalityConfig) -> Self {
        let config = FinalityConfig {
            total_validators: config.total_validators.max(1),
            ..config
        };
        Self {
            config,
            tracked: HashMap::new(),
            finalised: HashSet::new(),
        }
    }

    /// Acks needed to finalise: `ceil(total × threshold)`.
    pub fn required_acks(&self) -> usize {
        (self.config.total_validators as f64 * self.config.instant_threshold).ceil() as usize
    }

    /// Begin tracking `batch`.  Returns `false` when the id is already
    /// tracked (idempotent no-op).
    pub fn track(&mut self, batch: MicroBatch) -> bool {
        if self.tracked.contains_key(&batch.id) {
            return false;
        }
        debug!(batch = %batch.id, number = batch.batch_number, "tracking batch");
        let entry = FinalityEntry {
            started_at: Utc::now().timestamp_millis(),
            acks: HashSet::new(),
            finalised: false,
            timed_out: false,
            time_to_finality: None,
            batch,
        };
        self.tracked.insert(entry.batch.id.clone(), entry);
        true
    }

    /// Record one validator's acknowledgment.  Duplicate acks are no-ops;
    /// acks for unknown batches are ignored.  Returns the finality event at
    /// the exact ack that crosses the threshold, and only then.
    pub fn acknowledge(&mut self, batch_id: &str, validator_id: &str) -> Option<FinalityEvent> {
        let required = self.required_acks();
        let total = self.config.total_validators;

        let entry = self.tracked.get_mut(batch_id)?;
        entry.acks.insert(validator_id.to_string());

        if entry.finalised || entry.timed_out || entry.acks.len() < required {
            return None;
        }

        let now = Utc::now().timestamp_millis();
        let time_to_finality = now - entry.started_at;
        entry.finalised = true;
        entry.time_to_finality = Some(time_to_finality);
        self.finalised.insert(batch_id.to_string());

        let mut validators: Vec<String> = entry.acks.iter().cloned().collect();
        validators.sort();
        let confidence = entry.acks.len() as f64 / total as f64 * 100.0;

        info!(
            batch = %batch_id,
            confidence,
            time_to_finality_ms = time_to_finality,
            "instant finality reached"
        );

        Some(FinalityEvent {
            batch_id: batch_id.to_string(),
            batch_number: entry.batch.batch_number,
            confidence,
            validators,
            time_to_finality,
            timestamp: now,
        })
    }

    pub fn status(&self, batch_id: &str) -> Option<FinalityStatus> {
        let entry = self.tracked.get(batch_id)?;
        let confidence =
            entry.acks.len() as f64 / self.config.total_validators as f64 * 100.0;
        let mut validators: Vec<String> = entry.acks.iter().cloned().collect();
        validators.sort();

        Some(FinalityStatus {
            ack_count: entry.acks.len(),
            total_validators: self.config.total_validators,
            confidence,
            reversal_probability: Self::reversal_probability(confidence),
            has_instant_finality: entry.finalised,
            validators,
        })
    }

    /// Advisory estimate of the chance an accepted batch is later
    /// overturned, as a monotone non-increasing function of confidence.
    pub fn reversal_probability(confidence: f64) -> f64 {
        if confidence <= 0.0 {
            return 1.0;
        }
        if confidence >= 100.0 {
            return 0.0;
        }
        (1.0 - confidence / 100.0).powi(REVERSAL_EXPONENT)
    }

    /// Mark entries older than the timeout window.  Timed-out entries are
    /// retained for inspection.  Returns the ids that newly timed out.
    pub fn check_timeouts(&mut self) -> Vec<String> {
        let now = Utc::now().timestamp_millis();
        let mut newly_timed_out = Vec::new();

        for (id, entry) in &mut self.tracked {
            if entry.finalised || entry.timed_out {
                continue;
            }
            if now - entry.started_at > self.config.timeout_window_ms {
                entry.timed_out = true;
                newly_timed_out.push(id.clone());
            }
        }

        if !newly_timed_out.is_empty() {
            debug!(count = newly_timed_out.len(), "batches timed out");
        }
        newly_timed_out
    }

    /// Rebase the quorum; in-flight entries keep their ack sets and later
    /// acks are measured against the new threshold.
    pub fn set_total_validators(&mut self, total: usize) {
        self.config.total_validators = total.max(1);
    }

    pub fn entry(&self, batch_id: &str) -> Option<&FinalityEntry> {
        self.tracked.get(batch_id)
    }

    /// Acknowledging validators for a batch, sorted.
    pub fn acks(&self, batch_id: &str) -> Option<Vec<String>> {
        let entry = self.tracked.get(batch_id)?;
        let mut validators: Vec<String> = entry.acks.iter().cloned().collect();
        validators.sort();
        Some(validators)
    }

    /// Drop a batch from tracking; returns whether it was present.
    pub fn clear_batch(&mut self, batch_id: &str) -> bool {
        self.tracked.remove(batch_id).is_some()
    }

    pub fn stats(&self) -> TrackerStats {
        let tracked = self.tracked.len();
        let finalized = self.finalised.len();
        let finality_rate = if tracked == 0 {
            0.0
        } else {
            finalized as f64 / tracked as f64 * 100.0
        };
        TrackerStats {
            tracked_batches: tracked,
            finalized_batches: finalized,
            finality_rate,
        }
    }
}

#[cfg(test)]
mod tests {
    use num_bigint::BigUint;
    use pulse_types::Transaction;

    use super::*;

    fn batch(number: u64) -> MicroBatch {
        let tx = Transaction::new(
            "aa".repeat(32),
            "bb".repeat(32),
            BigUint::from(10u8),
            BigUint::from(1u8),
            number,
        );
        MicroBatch::new(number, vec![tx])
    }

    fn tracker(total: usize, threshold: f64) -> FinalityTracker {
        FinalityTracker::new(FinalityConfig {
            total_validators: total,
            instant_threshold: threshold,
            timeout_window_ms: 10_000,
        })
    }

    #[test]
    fn threshold_crossing_fires_exactly_once() {
        let mut tracker = tracker(30, 0.20);
        let batch = batch(1);
        let id = batch.id.clone();
        assert!(tracker.track(batch));
        assert_eq!(tracker.required_acks(), 6);

        for validator in 1..=5 {
            assert!(tracker.acknowledge(&id, &format!("validator-{validator}")).is_none());
        }
        let status = tracker.status(&id).unwrap();
        assert!(!status.has_instant_finality);
        assert_eq!(status.ack_count, 5);

        let event = tracker
            .acknowledge(&id, "validator-6")
            .expect("sixth distinct ack crosses 20%");
        assert_eq!(event.confidence, 20.0);
        assert_eq!(event.validators.len(), 6);
        assert!(event.time_to_finality >= 0);

        // Further acks never re-fire the event.
        assert!(tracker.acknowledge(&id, "validator-7").is_none());
        assert!(tracker.status(&id).unwrap().has_instant_finality);
    }

    #[test]
    fn duplicate_acks_count_once() {
        let mut tracker = tracker(30, 0.20);
        let batch = batch(1);
        let id = batch.id.clone();
        tracker.track(batch);

        for _ in 0..10 {
            assert!(tracker.acknowledge(&id, "validator-1").is_none());
        }
        assert_eq!(tracker.status(&id).unwrap().ack_count, 1);
    }

    #[test]
    fn single_validator_finalises_on_first_ack() {
        let mut tracker = tracker(1, 0.20);
        let batch = batch(1);
        let id = batch.id.clone();
        tracker.track(batch);

        assert_eq!(tracker.required_acks(), 1);
        let event = tracker.acknowledge(&id, "only-validator").unwrap();
        assert_eq!(event.confidence, 100.0);
    }

    #[test]
    fn unknown_batch_is_ignored() {
        let mut tracker = tracker(3, 0.5);
        assert!(tracker.acknowledge("no-such-batch", "validator-1").is_none());
        assert!(tracker.status("no-such-batch").is_none());
    }

    #[test]
    fn duplicate_track_is_rejected() {
        let mut tracker = tracker(3, 0.5);
        let batch = batch(1);
        assert!(tracker.track(batch.clone()));
        assert!(!tracker.track(batch));
        assert_eq!(tracker.stats().tracked_batches, 1);
    }

    #[test]
    fn timed_out_batch_stays_timed_out() {
        let mut tracker = FinalityTracker::new(FinalityConfig {
            total_validators: 2,
            instant_threshold: 0.5,
            timeout_window_ms: 0,
        });
        let batch = batch(1);
        let id = batch.id.clone();
        tracker.track(batch);

        std::thread::sleep(std::time::Duration::from_millis(5));
        assert_eq!(tracker.check_timeouts(), vec![id.clone()]);
        assert!(tracker.entry(&id).unwrap().timed_out);

        // Late ack is recorded for inspection but cannot finalise.
        assert!(tracker.acknowledge(&id, "validator-1").is_none());
        assert!(tracker.acknowledge(&id, "validator-2").is_none());
        assert_eq!(tracker.status(&id).unwrap().ack_count, 2);
        assert!(!tracker.status(&id).unwrap().has_instant_finality);
        // And it only reports once.
        assert!(tracker.check_timeouts().is_empty());
    }

    #[test]
    fn finalised_batch_never_times_out() {
        let mut tracker = FinalityTracker::new(FinalityConfig {
            total_validators: 1,
            instant_threshold: 0.2,
            timeout_window_ms: 0,
        });
        let batch = batch(1);
        let id = batch.id.clone();
        tracker.track(batch);
        tracker.acknowledge(&id, "validator-1").unwrap();

        std::thread::sleep(std::time::Duration::from_millis(5));
        assert!(tracker.check_timeouts().is_empty());
    }

    #[test]
    fn rebasing_total_validators_changes_the_quorum() {
        let mut tracker = tracker(2, 0.5);
        let batch = batch(1);
        let id = batch.id.clone();
        tracker.track(batch);

        tracker.set_total_validators(10);
        assert_eq!(tracker.required_acks(), 5);
        for validator in 1..=4 {
            assert!(tracker.acknowledge(&id, &format!("validator-{validator}")).is_none());
        }
        assert!(tracker.acknowledge(&id, "validator-5").is_some());
    }

    #[test]
    fn reversal_probability_meets_anchor_constraints() {
        assert_eq!(FinalityTracker::reversal_probability(0.0), 1.0);
        assert_eq!(FinalityTracker::reversal_probability(100.0), 0.0);
        assert!(FinalityTracker::reversal_probability(20.0) < 0.01);
        assert!(FinalityTracker::reversal_probability(67.0) < 1e-6);
    }

    #[test]
    fn reversal_probability_is_monotone_non_increasing() {
        let mut previous = 1.0f64;
        for step in 0..=100 {
            let current = FinalityTracker::reversal_probability(step as f64);
            assert!(current <= previous, "p({step}) increased");
            previous = current;
        }
    }

    #[test]
    fn stats_tracks_finality_rate() {
        let mut tracker = tracker(1, 0.2);
        let first = batch(1);
        let second = batch(2);
        let first_id = first.id.clone();
        tracker.track(first);
        tracker.track(second);
        tracker.acknowledge(&first_id, "validator-1").unwrap();

        let stats = tracker.stats();
        assert_eq!(stats.tracked_batches, 2);
        assert_eq!(stats.finalized_batches, 1);
        assert_eq!(stats.finality_rate, 50.0);
    }

    #[test]
    fn clear_batch_removes_tracking_state() {
        let mut tracker = tracker(1, 0.2);
        let batch = batch(1);
        let id = batch.id.clone();
        tracker.track(batch);

        assert!(tracker.clear_batch(&id));
        assert!(!tracker.clear_batch(&id));
        assert!(tracker.status(&id).is_none());
    }
}
