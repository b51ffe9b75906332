use chrono::Utc;
use pulse_crypto::merkle_root;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::Transaction;

/// A time-boxed, merkle-committed collection of pending transactions
/// awaiting validator acknowledgments.
///
/// Batches are transient: one is either promoted to a block once it reaches
/// instant finality, or it times out and its transactions stay in the
/// mempool for a later batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MicroBatch {
    /// Collision-free identifier.
    pub id: String,

    /// Monotonically increasing counter per builder instance.
    pub batch_number: u64,

    /// Milliseconds since epoch at creation time.
    pub timestamp: i64,

    pub transactions: Vec<Transaction>,

    /// Same computation as a block's merkle root.
    pub merkle_root: String,
}

impl MicroBatch {
    pub fn new(batch_number: u64, transactions: Vec<Transaction>) -> Self {
        let hashes: Vec<String> = transactions.iter().map(|tx| tx.hash.clone()).collect();
        Self {
            id: Uuid::new_v4().to_string(),
            batch_number,
            timestamp: Utc::now().timestamp_millis(),
            transactions,
            merkle_root: merkle_root(&hashes),
        }
    }

    pub fn transaction_hashes(&self) -> Vec<String> {
        self.transactions.iter().map(|tx| tx.hash.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }
}
