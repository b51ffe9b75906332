use std::collections::HashMap;

use chrono::Utc;
use num_bigint::BigUint;
use pulse_finality::{FinalityConfig, FinalityEvent, FinalityStatus, FinalityTracker};
use pulse_ledger::{Ledger, Store};
use pulse_mempool::{Mempool, MempoolConfig, MempoolStats};
use pulse_types::{Account, Block, MicroBatch, Transaction};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use crate::{builder::BatchBuilder, config::ValidatorConfig, event::ValidatorEvent, NodeError};

/// The Pulse validator node.
///
/// Owns the ledger, mempool, batch builder, and finality tracker, and is the
/// single logical owner of all their state: every mutation happens inside
/// one of its methods, either from an API call or from the periodic tick in
/// [`Validator::run`].
///
/// Pipeline: accepted transactions pool in the mempool; each tick drains the
/// best of them into a merkle-committed micro-batch, which is tracked for
/// validator acknowledgments (the local node pre-acks its own batches).  The
/// ack that crosses the quorum threshold promotes the batch to a block,
/// executed atomically against the ledger.
pub struct Validator {
    config: ValidatorConfig,
    ledger: Ledger,
    mempool: Mempool,
    builder: BatchBuilder,
    tracker: FinalityTracker,
    pending_batches: HashMap<String, MicroBatch>,
    finalized_batches: HashMap<String, MicroBatch>,
    running: bool,
    started_at: Option<i64>,
    event_tx: mpsc::UnboundedSender<ValidatorEvent>,
}

/// Operational summary surfaced by the stats queries.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidatorStats {
    pub validator_id: String,
    pub is_running: bool,
    pub block_height: u64,
    pub pending_transactions: usize,
    pub total_batches: u64,
    pub finalized_batches: usize,
    pub finality_rate: f64,
    /// Milliseconds since `start()`; zero while stopped.
    pub uptime: i64,
}

impl Validator {
    /// Create a validator over its own store, loading or creating genesis.
    ///
    /// Returns the validator together with a receiver for
    /// [`ValidatorEvent`]s that the embedding application can process
    /// independently.
    pub fn new(
        config: ValidatorConfig,
    ) -> Result<(Self, mpsc::UnboundedReceiver<ValidatorEvent>), NodeError> {
        let store = match &config.data_dir {
            Some(path) => Store::open(path)?,
            None => Store::temporary()?,
        };
        let ledger = Ledger::open(store)?;

        let mempool = Mempool::new(MempoolConfig {
            max_size: config.mempool_max_size,
            expiration_ms: config.mempool_expiration_ms,
        });
        let builder = BatchBuilder::new(config.batch_interval_ms, config.max_batch_size);
        let tracker = FinalityTracker::new(FinalityConfig {
            total_validators: config.total_validators,
            instant_threshold: config.instant_threshold,
            timeout_window_ms: config.timeout_window_ms,
        });

        let (event_tx, event_rx) = mpsc::unbounded_channel();

        info!(validator = %config.validator_id, "validator initialised");

        Ok((
            Self {
                config,
                ledger,
                mempool,
                builder,
                tracker,
                pending_batches: HashMap::new(),
                finalized_batches: HashMap::new(),
                running: false,
                started_at: None,
                event_tx,
            },
            event_rx,
        ))
    }

    // ── Lifecycle ────────────────────────────────────────────────────────────

    pub fn start(&mut self) {
        if self.running {
            return;
        }
        self.running = true;
        self.started_at = Some(Utc::now().timestamp_millis());
        self.builder.start();
        info!(validator = %self.config.validator_id, "validator started");
    }

    /// Stop producing batches; ledger and tracker state stay live.
    pub fn stop(&mut self) {
        self.running = false;
        if self.builder.stop() {
            self.emit(ValidatorEvent::BuilderStopped);
        }
        info!(validator = %self.config.validator_id, "validator stopped");
    }

    /// Stop and flush the store.
    pub fn shutdown(&mut self) -> Result<(), NodeError> {
        self.stop();
        self.ledger.flush()?;
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn validator_id(&self) -> &str {
        &self.config.validator_id
    }

    /// Drive the periodic batch pipeline until cancelled.  Re-arms the
    /// ticker whenever the batch interval is retuned.
    pub async fn run(&mut self) {
        let mut current_interval = self.builder.batch_interval();
        let mut ticker = tokio::time::interval(current_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            self.tick();
            self.check_timeouts();

            let configured = self.builder.batch_interval();
            if configured != current_interval {
                current_interval = configured;
                ticker = tokio::time::interval(current_interval);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            }
        }
    }

    // ── Pipeline ─────────────────────────────────────────────────────────────

    /// Accept a transaction into the mempool.  Only structural and signature
    /// checks happen here; nonce and balance are enforced at block execution
    /// so racy upstream ordering doesn't drop valid transactions.
    pub fn add_transaction(&mut self, tx: Transaction) -> bool {
        if !tx.is_valid() {
            warn!(hash = %tx.hash, "transaction failed basic validation");
            return false;
        }
        if !tx.is_bootstrap() && !tx.verify() {
            warn!(hash = %tx.hash, "transaction signature rejected");
            return false;
        }

        let hash = tx.hash.clone();
        if !self.mempool.add(tx) {
            return false;
        }
        self.emit(ValidatorEvent::TransactionAdded { hash });
        true
    }

    /// One builder tick: a no-op unless the builder is running.
    pub fn tick(&mut self) {
        if !self.builder.is_running() {
            return;
        }
        self.produce_batch();
    }

    /// Build a batch immediately, regardless of the timer.
    pub fn force_batch(&mut self) {
        self.produce_batch();
    }

    fn produce_batch(&mut self) {
        let Some(batch) = self.builder.build_from(&self.mempool) else {
            return;
        };

        let batch_id = batch.id.clone();
        self.pending_batches.insert(batch_id.clone(), batch.clone());
        self.tracker.track(batch.clone());
        self.emit(ValidatorEvent::BatchCreated(batch));

        // The local node pre-acks its own batches; with a validator set of
        // one this finalises the batch on the spot.
        let own_id = self.config.validator_id.clone();
        self.acknowledge_batch(&batch_id, &own_id);
    }

    /// Record `validator_id`'s acknowledgment of a batch.  Returns `true`
    /// exactly when this ack crosses the finality threshold.
    pub fn acknowledge_batch(&mut self, batch_id: &str, validator_id: &str) -> bool {
        match self.tracker.acknowledge(batch_id, validator_id) {
            Some(event) => {
                self.on_instant_finality(event);
                true
            }
            None => false,
        }
    }

    fn on_instant_finality(&mut self, event: FinalityEvent) {
        let Some(batch) = self.pending_batches.remove(&event.batch_id) else {
            warn!(batch = %event.batch_id, "finality event for unknown batch");
            return;
        };

        self.emit(ValidatorEvent::InstantFinality(event));
        self.finalized_batches.insert(batch.id.clone(), batch.clone());
        self.create_block_from_batch(&batch);
    }

    fn create_block_from_batch(&mut self, batch: &MicroBatch) {
        let (tip_number, tip_hash, tip_timestamp) = {
            let tip = self.ledger.tip();
            (tip.number, tip.hash.clone(), tip.timestamp)
        };

        // Same-millisecond batches must still produce strictly increasing
        // block timestamps.
        let timestamp = Utc::now().timestamp_millis().max(tip_timestamp + 1);
        let block = Block::new(
            tip_number + 1,
            timestamp,
            batch.transactions.clone(),
            tip_hash,
            self.config.validator_id.clone(),
        );

        match self.ledger.add_block(&block) {
            Ok(true) => {
                for tx in &batch.transactions {
                    self.mempool.remove(&tx.hash);
                }
                self.emit(ValidatorEvent::BlockCreated {
                    number: block.number,
                    hash: block.hash.clone(),
                    transactions: block.transactions.len(),
                });
            }
            Ok(false) => {
                // Transactions stay pooled; expiry or a later batch with the
                // right nonces picks them back up.
                warn!(batch = %batch.id, "finalised batch rejected at block execution");
            }
            Err(e) => {
                error!(batch = %batch.id, error = %e, "storage failure while committing block");
            }
        }
    }

    /// Sweep the tracker for batches that outlived their quorum window.
    pub fn check_timeouts(&mut self) {
        for batch_id in self.tracker.check_timeouts() {
            self.emit(ValidatorEvent::BatchTimedOut { batch_id });
        }
    }

    /// Drop expired transactions from the pool.
    pub fn evict_expired(&mut self) -> usize {
        self.mempool.evict_expired()
    }

    // ── Tuning ───────────────────────────────────────────────────────────────

    pub fn set_batch_interval(&mut self, interval_ms: u64) {
        self.builder.set_batch_interval(interval_ms);
    }

    pub fn set_max_batch_size(&mut self, max_batch_size: usize) {
        self.builder.set_max_batch_size(max_batch_size);
    }

    pub fn set_total_validators(&mut self, total: usize) {
        self.tracker.set_total_validators(total);
    }

    // ── Queries ──────────────────────────────────────────────────────────────

    pub fn balance(&self, address: &str) -> BigUint {
        self.ledger.balance(address)
    }

    pub fn nonce(&self, address: &str) -> u64 {
        self.ledger.nonce_of(address)
    }

    pub fn account(&self, address: &str) -> Account {
        self.ledger.account(address)
    }

    pub fn latest_block(&self) -> &Block {
        self.ledger.tip()
    }

    pub fn block(&self, number: u64) -> Option<&Block> {
        self.ledger.block(number)
    }

    pub fn chain_length(&self) -> usize {
        self.ledger.chain_len()
    }

    pub fn mempool_size(&self) -> usize {
        self.mempool.size()
    }

    pub fn mempool_stats(&self) -> MempoolStats {
        self.mempool.stats()
    }

    pub fn batch(&self, batch_id: &str) -> Option<&MicroBatch> {
        self.pending_batches
            .get(batch_id)
            .or_else(|| self.finalized_batches.get(batch_id))
    }

    pub fn pending_batches(&self) -> Vec<&MicroBatch> {
        let mut batches: Vec<&MicroBatch> = self.pending_batches.values().collect();
        batches.sort_by_key(|batch| batch.batch_number);
        batches
    }

    pub fn finalized_batches(&self) -> Vec<&MicroBatch> {
        let mut batches: Vec<&MicroBatch> = self.finalized_batches.values().collect();
        batches.sort_by_key(|batch| batch.batch_number);
        batches
    }

    pub fn batch_acks(&self, batch_id: &str) -> Option<Vec<String>> {
        self.tracker.acks(batch_id)
    }

    pub fn finality_status(&self, batch_id: &str) -> Option<FinalityStatus> {
        self.tracker.status(batch_id)
    }

    pub fn stats(&self) -> ValidatorStats {
        let tracker_stats = self.tracker.stats();
        let uptime = match (self.running, self.started_at) {
            (true, Some(started)) => Utc::now().timestamp_millis() - started,
            _ => 0,
        };

        ValidatorStats {
            validator_id: self.config.validator_id.clone(),
            is_running: self.running,
            block_height: self.ledger.height(),
            pending_transactions: self.mempool.size(),
            total_batches: self.builder.batch_number(),
            finalized_batches: self.finalized_batches.len(),
            finality_rate: tracker_stats.finality_rate,
            uptime,
        }
    }

    fn emit(&self, event: ValidatorEvent) {
        let _ = self.event_tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use pulse_crypto::{Keypair, GENESIS_ADDRESS};

    use super::*;

    fn single_node() -> (Validator, mpsc::UnboundedReceiver<ValidatorEvent>) {
        let (mut validator, events) = Validator::new(ValidatorConfig::default()).unwrap();
        validator.start();
        (validator, events)
    }

    fn bootstrap_tx(to: &str, amount: u64, nonce: u64) -> Transaction {
        Transaction::new(
            GENESIS_ADDRESS.to_string(),
            to.to_string(),
            BigUint::from(amount),
            BigUint::from(0u8),
            nonce,
        )
    }

    #[test]
    fn accepts_bootstrap_and_signed_transactions_only() {
        let (mut validator, _events) = single_node();

        assert!(validator.add_transaction(bootstrap_tx("0xabc", 100, 0)));

        let keypair = Keypair::generate();
        let mut signed = Transaction::new(
            keypair.public_hex(),
            "0xdef".into(),
            BigUint::from(50u8),
            BigUint::from(1u8),
            0,
        );
        signed.sign(&keypair).unwrap();
        assert!(validator.add_transaction(signed));

        let unsigned = Transaction::new(
            keypair.public_hex(),
            "0xdef".into(),
            BigUint::from(50u8),
            BigUint::from(1u8),
            1,
        );
        assert!(!validator.add_transaction(unsigned));
        assert_eq!(validator.mempool_size(), 2);
    }

    #[test]
    fn accept_path_ignores_nonce_and_balance() {
        let (mut validator, _events) = single_node();

        // Wildly out-of-order nonce and absurd amount: still pooled, since
        // economics are deferred to block execution.
        let keypair = Keypair::generate();
        let mut tx = Transaction::new(
            keypair.public_hex(),
            "0xdef".into(),
            BigUint::from(u64::MAX),
            BigUint::from(0u8),
            99,
        );
        tx.sign(&keypair).unwrap();
        assert!(validator.add_transaction(tx));
    }

    #[test]
    fn forced_batch_self_finalises_with_one_validator() {
        let (mut validator, mut events) = single_node();
        let keypair = Keypair::generate();

        assert!(validator.add_transaction(bootstrap_tx(&keypair.address(), 10_000, 0)));
        validator.force_batch();

        assert_eq!(validator.chain_length(), 2);
        assert_eq!(validator.balance(&keypair.address()), BigUint::from(10_000u64));
        assert_eq!(validator.mempool_size(), 0);
        assert_eq!(validator.finalized_batches().len(), 1);
        assert!(validator.pending_batches().is_empty());

        // Events arrive in pipeline order for the batch.
        assert!(matches!(
            events.try_recv().unwrap(),
            ValidatorEvent::TransactionAdded { .. }
        ));
        assert!(matches!(
            events.try_recv().unwrap(),
            ValidatorEvent::BatchCreated(_)
        ));
        assert!(matches!(
            events.try_recv().unwrap(),
            ValidatorEvent::InstantFinality(_)
        ));
        assert!(matches!(
            events.try_recv().unwrap(),
            ValidatorEvent::BlockCreated { number: 1, .. }
        ));
    }

    #[test]
    fn quorum_of_thirty_needs_six_distinct_acks() {
        let (mut validator, _events) =
            Validator::new(ValidatorConfig::with_validator_set(30, 0.20)).unwrap();
        validator.start();

        validator.add_transaction(bootstrap_tx("0xabc", 1_000, 0));
        validator.force_batch();

        let batch_id = validator.pending_batches()[0].id.clone();

        // Self-ack plus four externals: still below the six-ack quorum.
        for peer in 2..=5 {
            assert!(!validator.acknowledge_batch(&batch_id, &format!("peer-{peer}")));
        }
        let status = validator.finality_status(&batch_id).unwrap();
        assert_eq!(status.ack_count, 5);
        assert!(!status.has_instant_finality);

        // Duplicate ack changes nothing.
        assert!(!validator.acknowledge_batch(&batch_id, "peer-5"));

        // Sixth distinct validator crosses 20%.
        assert!(validator.acknowledge_batch(&batch_id, "peer-6"));
        assert_eq!(validator.chain_length(), 2);
        assert_eq!(
            validator.finality_status(&batch_id).unwrap().confidence,
            20.0
        );
    }

    #[test]
    fn batch_that_fails_execution_leaves_transactions_pooled() {
        let (mut validator, _events) = single_node();
        let keypair = Keypair::generate();

        // Signed but unfunded: accepted into the pool, rejected by the
        // ledger when its block executes.
        let mut tx = Transaction::new(
            keypair.public_hex(),
            "0xdef".into(),
            BigUint::from(1_000u64),
            BigUint::from(0u8),
            0,
        );
        tx.sign(&keypair).unwrap();
        assert!(validator.add_transaction(tx));

        validator.force_batch();

        assert_eq!(validator.chain_length(), 1);
        assert_eq!(validator.mempool_size(), 1);
    }

    #[test]
    fn tick_is_inert_while_stopped() {
        let (mut validator, _events) = Validator::new(ValidatorConfig::default()).unwrap();
        validator.add_transaction(bootstrap_tx("0xabc", 100, 0));

        validator.tick();
        assert!(validator.pending_batches().is_empty());

        validator.start();
        validator.tick();
        assert_eq!(validator.chain_length(), 2);
    }

    #[test]
    fn stats_reflect_pipeline_progress() {
        let (mut validator, _events) = single_node();
        validator.add_transaction(bootstrap_tx("0xabc", 100, 0));
        validator.force_batch();

        let stats = validator.stats();
        assert!(stats.is_running);
        assert_eq!(stats.block_height, 1);
        assert_eq!(stats.total_batches, 1);
        assert_eq!(stats.finalized_batches, 1);
        assert_eq!(stats.finality_rate, 100.0);
        assert_eq!(stats.pending_transactions, 0);
        assert!(stats.uptime >= 0);
    }

    #[test]
    fn nonce_sequences_commit_in_order_across_batches() {
        let (mut validator, _events) = single_node();
        let alice = Keypair::generate();
        let bob = Keypair::generate();

        validator.add_transaction(bootstrap_tx(&alice.address(), 10_000, 0));
        validator.force_batch();

        for nonce in 0..3u64 {
            let mut tx = Transaction::new(
                alice.public_hex(),
                bob.address(),
                BigUint::from(100u64),
                BigUint::from(1u8),
                nonce,
            );
            tx.sign(&alice).unwrap();
            assert!(validator.add_transaction(tx));
        }
        validator.force_batch();

        assert_eq!(validator.chain_length(), 3);
        assert_eq!(validator.nonce(&alice.address()), 3);
        assert_eq!(validator.balance(&bob.address()), BigUint::from(300u64));
        // Three transfers of 100 plus three burned fees of 1.
        assert_eq!(
            validator.balance(&alice.address()),
            BigUint::from(10_000u64 - 303)
        );
    }
}
