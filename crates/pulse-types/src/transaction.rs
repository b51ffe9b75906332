use chrono::Utc;
use num_bigint::BigUint;
use pulse_crypto::{sha256_hex, verify_hex, Keypair, GENESIS_ADDRESS};
use serde::{Deserialize, Serialize};

use crate::{amount, EntityError};

/// A signed value transfer between two accounts.
///
/// `from` and `to` carry hex-encoded ed25519 public keys; the bootstrap
/// funding account appears with its literal `0x…` address instead (see
/// [`Transaction::is_bootstrap`]).  The hash covers every field except the
/// signature, so signing the hash stays deterministic.  Amounts and fees are
/// unbounded-precision and serialise as decimal strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub from: String,
    pub to: String,

    #[serde(with = "amount")]
    pub amount: BigUint,

    /// Per-sender replay counter; fixes intra-sender ordering.
    pub nonce: u64,

    /// Milliseconds since epoch at creation time.
    pub timestamp: i64,

    #[serde(with = "amount")]
    pub fee: BigUint,

    /// Hex ed25519 signature over the hash bytes.  Empty until signed.
    pub signature: String,

    /// SHA-256 over the canonical field concatenation.
    pub hash: String,
}

impl Transaction {
    /// Create a new unsigned transaction stamped with the current time.
    pub fn new(from: String, to: String, amount: BigUint, fee: BigUint, nonce: u64) -> Self {
        let mut tx = Self {
            from,
            to,
            amount,
            nonce,
            timestamp: Utc::now().timestamp_millis(),
            fee,
            signature: String::new(),
            hash: String::new(),
        };
        tx.hash = tx.calculate_hash();
        tx
    }

    /// SHA-256 over `from ‖ to ‖ amount ‖ nonce ‖ timestamp ‖ fee`, with
    /// amount and fee in decimal.  The signature is deliberately excluded
    /// from the pre-image.
    pub fn calculate_hash(&self) -> String {
        let preimage = format!(
            "{}{}{}{}{}{}",
            self.from, self.to, self.amount, self.nonce, self.timestamp, self.fee
        );
        sha256_hex(preimage.as_bytes())
    }

    /// Recompute the hash and sign its bytes with `keypair`.
    pub fn sign(&mut self, keypair: &Keypair) -> Result<(), EntityError> {
        self.hash = self.calculate_hash();
        let message = hex::decode(&self.hash)?;
        self.signature = keypair.sign_hex(&message);
        Ok(())
    }

    /// Signature is valid over the hash bytes under `from` as a public key.
    pub fn verify(&self) -> bool {
        let Ok(message) = hex::decode(&self.hash) else {
            return false;
        };
        verify_hex(&self.signature, &message, &self.from)
    }

    /// Stored hash matches the recomputed hash.
    pub fn verify_hash(&self) -> bool {
        self.hash == self.calculate_hash()
    }

    /// A bootstrap transfer spends the genesis account, which has no key
    /// pair; such transfers are exempt from signature verification.
    pub fn is_bootstrap(&self) -> bool {
        self.from == GENESIS_ADDRESS
    }

    /// Non-cryptographic sanity: addresses present, positive amount, a
    /// signature where one is required, and a consistent hash.
    pub fn is_valid(&self) -> bool {
        if self.from.is_empty() || self.to.is_empty() {
            return false;
        }
        if self.amount == BigUint::from(0u8) {
            return false;
        }
        if self.signature.is_empty() && !self.is_bootstrap() {
            return false;
        }
        self.verify_hash()
    }

    /// What the sender pays in total: `amount + fee`.
    pub fn total_cost(&self) -> BigUint {
        &self.amount + &self.fee
    }

    pub fn to_json(&self) -> Result<String, EntityError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(raw: &str) -> Result<Self, EntityError> {
        Ok(serde_json::from_str(raw)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signed_tx(amount: u64, fee: u64, nonce: u64) -> (Transaction, Keypair) {
        let keypair = Keypair::generate();
        let recipient = Keypair::generate();
        let mut tx = Transaction::new(
            keypair.public_hex(),
            recipient.public_hex(),
            BigUint::from(amount),
            BigUint::from(fee),
            nonce,
        );
        tx.sign(&keypair).unwrap();
        (tx, keypair)
    }

    #[test]
    fn hash_is_deterministic_and_excludes_signature() {
        let (mut tx, _) = signed_tx(100, 5, 0);
        let before = tx.hash.clone();
        tx.signature = "00".repeat(64);
        assert_eq!(tx.calculate_hash(), before);
    }

    #[test]
    fn signed_transaction_verifies() {
        let (tx, _) = signed_tx(100, 5, 0);
        assert!(tx.verify());
        assert!(tx.verify_hash());
        assert!(tx.is_valid());
    }

    #[test]
    fn tampered_amount_breaks_hash_and_signature() {
        let (mut tx, _) = signed_tx(100, 5, 0);
        tx.amount = BigUint::from(999u64);
        assert!(!tx.verify_hash());
        assert!(!tx.is_valid());
        tx.hash = tx.calculate_hash();
        // Hash is consistent again but the signature no longer covers it.
        assert!(!tx.verify());
    }

    #[test]
    fn zero_amount_is_invalid() {
        let keypair = Keypair::generate();
        let mut tx = Transaction::new(
            keypair.public_hex(),
            "recipient".into(),
            BigUint::from(0u8),
            BigUint::from(0u8),
            0,
        );
        tx.sign(&keypair).unwrap();
        assert!(!tx.is_valid());
    }

    #[test]
    fn unsigned_transaction_is_invalid_unless_bootstrap() {
        let tx = Transaction::new(
            "aa".repeat(32),
            "bb".repeat(32),
            BigUint::from(10u8),
            BigUint::from(0u8),
            0,
        );
        assert!(!tx.is_valid());

        let bootstrap = Transaction::new(
            GENESIS_ADDRESS.to_string(),
            "bb".repeat(32),
            BigUint::from(10u8),
            BigUint::from(0u8),
            0,
        );
        assert!(bootstrap.is_bootstrap());
        assert!(bootstrap.is_valid());
    }

    #[test]
    fn total_cost_sums_amount_and_fee() {
        let (tx, _) = signed_tx(1_000, 10, 0);
        assert_eq!(tx.total_cost(), BigUint::from(1_010u64));
    }

    #[test]
    fn json_roundtrip_preserves_hash_and_signature() {
        let (tx, _) = signed_tx(12_345, 7, 3);
        let restored = Transaction::from_json(&tx.to_json().unwrap()).unwrap();
        assert_eq!(restored, tx);
        assert_eq!(restored.hash, tx.hash);
        assert!(restored.verify());
    }

    #[test]
    fn json_amounts_are_decimal_strings() {
        let (tx, _) = signed_tx(42, 1, 0);
        let value: serde_json::Value = serde_json::from_str(&tx.to_json().unwrap()).unwrap();
        assert_eq!(value["amount"], "42");
        assert_eq!(value["fee"], "1");
    }
}
