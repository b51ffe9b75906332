use std::path::PathBuf;

use uuid::Uuid;

/// Full configuration for a [`crate::Validator`].
#[derive(Debug, Clone)]
pub struct ValidatorConfig {
    /// Identifier this node acks and produces blocks under.
    pub validator_id: String,

    /// Where the ledger store lives.  `None` runs on a temporary in-memory
    /// store (tests, throwaway nodes).
    pub data_dir: Option<PathBuf>,

    /// Cadence of the micro-batch builder.
    pub batch_interval_ms: u64,

    /// Upper bound on transactions per batch.
    pub max_batch_size: usize,

    /// Size of the validator set acks are measured against.
    pub total_validators: usize,

    /// Fraction of validators whose acks grant instant finality.
    pub instant_threshold: f64,

    /// How long a batch may wait for its quorum before it times out.
    pub timeout_window_ms: i64,

    pub mempool_max_size: usize,
    pub mempool_expiration_ms: i64,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            validator_id: default_validator_id(),
            data_dir: None,
            batch_interval_ms: 10,
            max_batch_size: 1_000,
            total_validators: 1,
            instant_threshold: 0.20,
            timeout_window_ms: 10,
            mempool_max_size: 100_000,
            mempool_expiration_ms: 60_000,
        }
    }
}

impl ValidatorConfig {
    /// Config for a persistent node rooted at `data_dir`.
    pub fn on_dir(data_dir: PathBuf) -> Self {
        Self {
            data_dir: Some(data_dir),
            ..Self::default()
        }
    }

    /// Config sized for a multi-validator deployment.
    pub fn with_validator_set(total_validators: usize, instant_threshold: f64) -> Self {
        Self {
            total_validators,
            instant_threshold,
            ..Self::default()
        }
    }
}

fn default_validator_id() -> String {
    let id = Uuid::new_v4();
    format!("validator-{}", &id.to_string()[..8])
}
