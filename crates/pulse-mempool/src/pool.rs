use std::collections::{HashMap, HashSet, VecDeque};

use chrono::Utc;
use num_bigint::BigUint;
use pulse_types::Transaction;
use serde::Serialize;
use tracing::{debug, warn};

/// Capacity and expiry settings for a [`Mempool`].
#[derive(Debug, Clone)]
pub struct MempoolConfig {
    pub max_size: usize,
    pub expiration_ms: i64,
}

impl Default for MempoolConfig {
    fn default() -> Self {
        Self {
            max_size: 100_000,
            expiration_ms: 60_000,
        }
    }
}

/// In-memory pool of accepted-but-unconfirmed transactions.
///
/// Keyed by transaction hash, with secondary indices by sender and insertion
/// time.  Selection favours fee, with FIFO fairness at equal fee; per-sender
/// nonce order is respected by the block-selection path so one stuck sender
/// never blocks the pipeline.  When full, expired entries are evicted first,
/// then the lowest-fee entry if the newcomer outbids it.
pub struct Mempool {
    config: MempoolConfig,
    txs: HashMap<String, Transaction>,
    by_account: HashMap<String, HashSet<String>>,
    inserted_at: HashMap<String, i64>,
    /// Monotone arrival counter; millisecond timestamps collide under load,
    /// so FIFO tie-breaks use this instead.
    arrival: HashMap<String, u64>,
    next_arrival: u64,
}

/// Point-in-time summary of the pool.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MempoolStats {
    pub size: usize,
    pub max_size: usize,
    pub accounts: usize,
    /// Integer division; zero for an empty pool.
    #[serde(serialize_with = "serialize_biguint")]
    pub average_fee: BigUint,
    pub oldest_timestamp: Option<i64>,
    pub newest_timestamp: Option<i64>,
}

fn serialize_biguint<S: serde::Serializer>(
    value: &BigUint,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&value.to_str_radix(10))
}

impl Default for Mempool {
    fn default() -> Self {
        Self::new(MempoolConfig::default())
    }
}

impl Mempool {
    pub fn new(config: MempoolConfig) -> Self {
        Self {
            config,
            txs: HashMap::new(),
            by_account: HashMap::new(),
            inserted_at: HashMap::new(),
            arrival: HashMap::new(),
            next_arrival: 0,
        }
    }

    pub fn size(&self) -> usize {
        self.txs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.txs.is_empty()
    }

    pub fn contains(&self, hash: &str) -> bool {
        self.txs.contains_key(hash)
    }

    pub fn get(&self, hash: &str) -> Option<&Transaction> {
        self.txs.get(hash)
    }

    /// Insert a transaction.  Duplicates are rejected.  A full pool first
    /// evicts expired entries; if still full, the lowest-fee entry is
    /// evicted only when the newcomer outbids it, so a pool of strictly
    /// better-paying transactions rejects the add.
    pub fn add(&mut self, tx: Transaction) -> bool {
        if self.txs.contains_key(&tx.hash) {
            debug!(hash = %tx.hash, "duplicate transaction ignored");
            return false;
        }

        if self.txs.len() >= self.config.max_size {
            self.evict_expired();
            if self.txs.len() >= self.config.max_size {
                self.evict_lowest_fee_below(&tx.fee);
            }
            if self.txs.len() >= self.config.max_size {
                warn!(hash = %tx.hash, "mempool full, transaction rejected");
                return false;
            }
        }

        let hash = tx.hash.clone();
        self.by_account
            .entry(tx.from.clone())
            .or_default()
            .insert(hash.clone());
        self.inserted_at
            .insert(hash.clone(), Utc::now().timestamp_millis());
        self.arrival.insert(hash.clone(), self.next_arrival);
        self.next_arrival += 1;
        self.txs.insert(hash, tx);
        true
    }

    /// Remove by hash from all indices; returns whether anything was removed.
    pub fn remove(&mut self, hash: &str) -> bool {
        let Some(tx) = self.txs.remove(hash) else {
            return false;
        };
        if let Some(set) = self.by_account.get_mut(&tx.from) {
            set.remove(hash);
            if set.is_empty() {
                self.by_account.remove(&tx.from);
            }
        }
        self.inserted_at.remove(hash);
        self.arrival.remove(hash);
        true
    }

    /// Top `limit` transactions by fee descending, FIFO at equal fee.
    pub fn get_pending_by_priority(&self, limit: usize) -> Vec<Transaction> {
        let mut pending: Vec<&Transaction> = self.txs.values().collect();
        pending.sort_by(|a, b| {
            b.fee
                .cmp(&a.fee)
                .then_with(|| self.arrival_of(&a.hash).cmp(&self.arrival_of(&b.hash)))
        });
        pending.into_iter().take(limit).cloned().collect()
    }

    /// Up to `limit` transactions, round-robin across senders, each sender's
    /// queue in nonce order.
    pub fn get_pending_by_nonce(&self, limit: usize) -> Vec<Transaction> {
        let mut queues = self.sender_queues();
        let mut selected = Vec::new();

        while selected.len() < limit {
            let mut progressed = false;
            for queue in &mut queues {
                if selected.len() >= limit {
                    break;
                }
                if let Some(tx) = queue.pop_front() {
                    selected.push(tx);
                    progressed = true;
                }
            }
            if !progressed {
                break;
            }
        }

        selected
    }

    /// Block-building selection: repeatedly take the highest-fee *head*
    /// across per-sender nonce-ordered queues, so fee priority never jumps a
    /// sender's nonce sequence.
    pub fn get_for_block(&self, limit: usize) -> Vec<Transaction> {
        let mut queues = self.sender_queues();
        let mut selected = Vec::new();

        while selected.len() < limit {
            let mut best: Option<usize> = None;
            for (index, queue) in queues.iter().enumerate() {
                let Some(head) = queue.front() else {
                    continue;
                };
                best = match best {
                    None => Some(index),
                    Some(current) => {
                        let other = queues[current]
                            .front()
                            .expect("best queue is non-empty by construction");
                        let wins = head.fee > other.fee
                            || (head.fee == other.fee
                                && self.arrival_of(&head.hash) < self.arrival_of(&other.hash));
                        if wins {
                            Some(index)
                        } else {
                            Some(current)
                        }
                    }
                };
            }

            match best {
                Some(index) => selected.push(
                    queues[index]
                        .pop_front()
                        .expect("selected queue is non-empty"),
                ),
                None => break,
            }
        }

        selected
    }

    /// Drop every entry older than the configured expiration window.
    /// Returns the number of evicted transactions.
    pub fn evict_expired(&mut self) -> usize {
        let now = Utc::now().timestamp_millis();
        let expired: Vec<String> = self
            .inserted_at
            .iter()
            .filter(|(_, inserted)| now - **inserted > self.config.expiration_ms)
            .map(|(hash, _)| hash.clone())
            .collect();

        for hash in &expired {
            self.remove(hash);
        }
        if !expired.is_empty() {
            debug!(count = expired.len(), "evicted expired transactions");
        }
        expired.len()
    }

    /// This sender's transactions in nonce order.
    pub fn get_by_account(&self, sender: &str) -> Vec<Transaction> {
        let mut txs: Vec<Transaction> = self
            .by_account
            .get(sender)
            .into_iter()
            .flatten()
            .filter_map(|hash| self.txs.get(hash))
            .cloned()
            .collect();
        txs.sort_by_key(|tx| tx.nonce);
        txs
    }

    /// Transactions whose fee falls in `[min, max]`; no ordering guarantee.
    pub fn get_by_fee_range(&self, min: &BigUint, max: Option<&BigUint>) -> Vec<Transaction> {
        self.txs
            .values()
            .filter(|tx| tx.fee >= *min && max.map_or(true, |m| tx.fee <= *m))
            .cloned()
            .collect()
    }

    pub fn stats(&self) -> MempoolStats {
        let size = self.txs.len();
        let average_fee = if size == 0 {
            BigUint::from(0u8)
        } else {
            let total: BigUint = self.txs.values().map(|tx| tx.fee.clone()).sum();
            total / BigUint::from(size)
        };

        MempoolStats {
            size,
            max_size: self.config.max_size,
            accounts: self.by_account.len(),
            average_fee,
            oldest_timestamp: self.inserted_at.values().min().copied(),
            newest_timestamp: self.inserted_at.values().max().copied(),
        }
    }

    // ── Internal helpers ─────────────────────────────────────────────────────

    fn arrival_of(&self, hash: &str) -> u64 {
        self.arrival.get(hash).copied().unwrap_or(u64::MAX)
    }

    /// Per-sender nonce-ordered queues, senders in a stable order.
    fn sender_queues(&self) -> Vec<VecDeque<Transaction>> {
        let mut senders: Vec<&String> = self.by_account.keys().collect();
        senders.sort();

        senders
            .into_iter()
            .map(|sender| {
                let mut txs: Vec<Transaction> = self.by_account[sender]
                    .iter()
                    .filter_map(|hash| self.txs.get(hash))
                    .cloned()
                    .collect();
                txs.sort_by_key(|tx| tx.nonce);
                txs.into()
            })
            .collect()
    }

    /// Evict the lowest-fee entry, but only when it pays strictly less than
    /// `incoming_fee`.
    fn evict_lowest_fee_below(&mut self, incoming_fee: &BigUint) {
        let victim = self
            .txs
            .values()
            .min_by(|a, b| {
                a.fee
                    .cmp(&b.fee)
                    .then_with(|| self.arrival_of(&a.hash).cmp(&self.arrival_of(&b.hash)))
            })
            .filter(|tx| tx.fee < *incoming_fee)
            .map(|tx| tx.hash.clone());

        if let Some(hash) = victim {
            debug!(hash = %hash, "evicting lowest-fee transaction");
            self.remove(&hash);
        }
    }
}
