use std::time::Duration;

use pulse_crypto::merkle_root;
use pulse_mempool::Mempool;
use pulse_types::{MicroBatch, Transaction};
use tracing::debug;

/// Produces bounded, merkle-committed micro-batches from the mempool.
///
/// The builder owns only the cadence settings and the batch counter; the
/// periodic timer itself lives in the validator's run loop, which calls
/// [`BatchBuilder::build_from`] on every tick while the builder is running.
///
/// Transactions selected into a batch are *not* removed from the mempool;
/// they leave it only when the resulting block commits, so a batch that
/// misses its quorum is naturally reconsidered.
pub struct BatchBuilder {
    batch_interval: Duration,
    max_batch_size: usize,
    batch_number: u64,
    running: bool,
}

impl BatchBuilder {
    pub fn new(batch_interval_ms: u64, max_batch_size: usize) -> Self {
        Self {
            batch_interval: Duration::from_millis(batch_interval_ms.max(1)),
            max_batch_size,
            batch_number: 0,
            running: false,
        }
    }

    /// Begin producing batches.  Idempotent; returns whether the state
    /// changed.
    pub fn start(&mut self) -> bool {
        if self.running {
            return false;
        }
        self.running = true;
        true
    }

    /// Stop producing batches.  Idempotent; returns whether the state
    /// changed.
    pub fn stop(&mut self) -> bool {
        if !self.running {
            return false;
        }
        self.running = false;
        true
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn batch_interval(&self) -> Duration {
        self.batch_interval
    }

    /// Retune the cadence; takes effect when the run loop re-arms its timer.
    pub fn set_batch_interval(&mut self, interval_ms: u64) {
        self.batch_interval = Duration::from_millis(interval_ms.max(1));
    }

    pub fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }

    pub fn set_max_batch_size(&mut self, max_batch_size: usize) {
        self.max_batch_size = max_batch_size;
    }

    pub fn batch_number(&self) -> u64 {
        self.batch_number
    }

    /// Reset the batch counter (testing aid).
    pub fn reset(&mut self) {
        self.batch_number = 0;
    }

    /// Drain the best feasible pending transactions into a new batch, or
    /// `None` when the mempool has nothing to offer.
    pub fn build_from(&mut self, mempool: &Mempool) -> Option<MicroBatch> {
        let transactions = mempool.get_for_block(self.max_batch_size);
        if transactions.is_empty() {
            return None;
        }

        self.batch_number += 1;
        let batch = MicroBatch::new(self.batch_number, transactions);
        debug!(
            batch = %batch.id,
            number = batch.batch_number,
            transactions = batch.len(),
            "built micro-batch"
        );
        Some(batch)
    }

    /// Deterministic merkle commitment for an arbitrary transaction list,
    /// exposed for external verification.
    pub fn merkle_root_for(transactions: &[Transaction]) -> String {
        let hashes: Vec<String> = transactions.iter().map(|tx| tx.hash.clone()).collect();
        merkle_root(&hashes)
    }
}
