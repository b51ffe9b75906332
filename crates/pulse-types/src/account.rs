use std::collections::BTreeMap;

use num_bigint::BigUint;
use serde::{Deserialize, Serialize};

use crate::{amount, EntityError};

/// Mutable account state, keyed by a 66-char `0x`-prefixed address.
///
/// Unknown addresses behave as implicit empty accounts and are materialised
/// on first mutation.  The balance is unsigned, so it can never go negative;
/// [`Account::subtract_balance`] refuses underflow instead of panicking.
/// `code` and `storage` are reserved for future contract accounts and stay
/// empty for externally-owned ones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub address: String,

    #[serde(with = "amount")]
    pub balance: BigUint,

    /// Next expected nonce for this account as a sender.
    pub nonce: u64,

    pub code: String,
    pub storage: BTreeMap<String, String>,
}

impl Account {
    /// An empty account at `address`.
    pub fn new(address: String) -> Self {
        Self {
            address,
            balance: BigUint::from(0u8),
            nonce: 0,
            code: String::new(),
            storage: BTreeMap::new(),
        }
    }

    pub fn with_balance(address: String, balance: BigUint) -> Self {
        Self {
            balance,
            ..Self::new(address)
        }
    }

    pub fn add_balance(&mut self, value: &BigUint) {
        self.balance += value;
    }

    /// Deduct `value`, returning `false` (and leaving the balance untouched)
    /// when funds are insufficient.
    pub fn subtract_balance(&mut self, value: &BigUint) -> bool {
        if self.balance < *value {
            return false;
        }
        self.balance -= value;
        true
    }

    pub fn has_balance(&self, value: &BigUint) -> bool {
        self.balance >= *value
    }

    pub fn increment_nonce(&mut self) {
        self.nonce += 1;
    }

    /// Deep copy for rollback.
    pub fn snapshot(&self) -> Account {
        self.clone()
    }

    /// Restore from a snapshot taken earlier.
    pub fn restore(&mut self, snapshot: Account) {
        *self = snapshot;
    }

    pub fn to_json(&self) -> Result<String, EntityError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(raw: &str) -> Result<Self, EntityError> {
        Ok(serde_json::from_str(raw)?)
    }
}
