use pulse_crypto::{merkle_root, sha256_hex, MerkleProof, MerkleTree, ZERO_HASH};
use serde::{Deserialize, Serialize};

use crate::{EntityError, Transaction};

/// An append-only element of the chain.
///
/// The merkle root commits the block to its transaction set; the hash chains
/// it to its parent.  Both are recomputable from the stored fields, which is
/// what [`Block::verify_hash`] and [`Block::verify_merkle_root`] check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    /// Height; genesis is 0.
    pub number: u64,

    /// Milliseconds since epoch; strictly greater than the parent's.
    pub timestamp: i64,

    pub transactions: Vec<Transaction>,

    /// Parent's hash; 64 zero hex chars for genesis.
    pub previous_hash: String,

    /// Opaque identifier of the producer.
    pub validator: String,

    pub hash: String,
    pub merkle_root: String,
}

impl Block {
    pub fn new(
        number: u64,
        timestamp: i64,
        transactions: Vec<Transaction>,
        previous_hash: String,
        validator: String,
    ) -> Self {
        let mut block = Self {
            number,
            timestamp,
            transactions,
            previous_hash,
            validator,
            hash: String::new(),
            merkle_root: String::new(),
        };
        block.merkle_root = block.calculate_merkle_root();
        block.hash = block.calculate_hash();
        block
    }

    /// The deterministic block 0.
    pub fn genesis() -> Self {
        Self::new(0, 0, Vec::new(), ZERO_HASH.to_string(), "genesis".to_string())
    }

    /// SHA-256 over `number ‖ timestamp ‖ merkleRoot ‖ previousHash ‖ validator`.
    pub fn calculate_hash(&self) -> String {
        let preimage = format!(
            "{}{}{}{}{}",
            self.number, self.timestamp, self.merkle_root, self.previous_hash, self.validator
        );
        sha256_hex(preimage.as_bytes())
    }

    pub fn calculate_merkle_root(&self) -> String {
        merkle_root(&self.transaction_hashes())
    }

    pub fn transaction_hashes(&self) -> Vec<String> {
        self.transactions.iter().map(|tx| tx.hash.clone()).collect()
    }

    pub fn verify_hash(&self) -> bool {
        self.hash == self.calculate_hash()
    }

    pub fn verify_merkle_root(&self) -> bool {
        self.merkle_root == self.calculate_merkle_root()
    }

    /// Every contained transaction carries a valid signature (bootstrap
    /// transfers are exempt, they have no signing key).
    pub fn verify_transactions(&self) -> bool {
        self.transactions
            .iter()
            .all(|tx| tx.is_valid() && (tx.is_bootstrap() || tx.verify()))
    }

    /// Structural validity: consistent hash and merkle root, sane
    /// transactions, and (when a parent is supplied) correct linkage.
    pub fn is_valid(&self, parent: Option<&Block>) -> bool {
        if !self.verify_hash() || !self.verify_merkle_root() {
            return false;
        }
        if !self.transactions.iter().all(Transaction::is_valid) {
            return false;
        }
        match parent {
            None => true,
            Some(parent) => {
                self.number == parent.number + 1
                    && self.previous_hash == parent.hash
                    && self.timestamp > parent.timestamp
            }
        }
    }

    /// Build the sibling-chain inclusion proof for `tx_hash`, or `None` when
    /// the transaction is not in this block.
    pub fn merkle_proof(&self, tx_hash: &str) -> Option<MerkleProof> {
        MerkleTree::new(&self.transaction_hashes()).proof(tx_hash)
    }

    /// Walk `proof` from `tx_hash` and check it reproduces `root`.
    pub fn verify_merkle_proof(tx_hash: &str, proof: &MerkleProof, root: &str) -> bool {
        proof.leaf_hash == tx_hash && proof.verify(root)
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
    use num_bigint::BigUint;
    use pulse_crypto::Keypair;

    use super::*;

    fn signed_tx(nonce: u64) -> Transaction {
        let keypair = Keypair::generate();
        let mut tx = Transaction::new(
            keypair.public_hex(),
            "cc".repeat(32),
            BigUint::from(100u64 + nonce),
            BigUint::from(1u8),
            nonce,
        );
        tx.sign(&keypair).unwrap();
        tx
    }

    fn block_with(transactions: Vec<Transaction>) -> Block {
        let genesis = Block::genesis();
        Block::new(
            1,
            genesis.timestamp + 1,
            transactions,
            genesis.hash.clone(),
            "validator-test".into(),
        )
    }

    #[test]
    fn genesis_links_to_zero_hash() {
        let genesis = Block::genesis();
        assert_eq!(genesis.number, 0);
        assert_eq!(genesis.previous_hash, ZERO_HASH);
        assert!(genesis.transactions.is_empty());
        assert!(genesis.verify_hash());
        assert!(genesis.verify_merkle_root());
    }

    #[test]
    fn empty_block_commits_to_hash_of_zero_string() {
        let genesis = Block::genesis();
        assert_eq!(genesis.merkle_root, sha256_hex(b"0"));
    }

    #[test]
    fn single_transaction_root_is_its_hash() {
        let tx = signed_tx(0);
        let block = block_with(vec![tx.clone()]);
        assert_eq!(block.merkle_root, tx.hash);
    }

    #[test]
    fn child_validates_against_parent() {
        let genesis = Block::genesis();
        let block = block_with(vec![signed_tx(0)]);
        assert!(block.is_valid(Some(&genesis)));
        assert!(block.verify_transactions());
    }

    #[test]
    fn wrong_parent_linkage_is_invalid() {
        let genesis = Block::genesis();
        let mut block = block_with(vec![signed_tx(0)]);
        block.previous_hash = sha256_hex(b"someone else");
        block.hash = block.calculate_hash();
        assert!(!block.is_valid(Some(&genesis)));
    }

    #[test]
    fn stale_timestamp_is_invalid() {
        let genesis = Block::genesis();
        let block = Block::new(
            1,
            genesis.timestamp,
            vec![],
            genesis.hash.clone(),
            "validator-test".into(),
        );
        assert!(!block.is_valid(Some(&genesis)));
    }

    #[test]
    fn tampered_transaction_breaks_merkle_root() {
        let mut block = block_with(vec![signed_tx(0), signed_tx(1)]);
        block.transactions[0].amount = BigUint::from(9_999u64);
        block.transactions[0].hash = block.transactions[0].calculate_hash();
        assert!(!block.verify_merkle_root());
    }

    #[test]
    fn merkle_proof_roundtrip_for_middle_transaction() {
        let txs = vec![signed_tx(0), signed_tx(1), signed_tx(2)];
        let block = block_with(txs.clone());

        let proof = block.merkle_proof(&txs[1].hash).expect("tx is in block");
        assert!(Block::verify_merkle_proof(
            &txs[1].hash,
            &proof,
            &block.merkle_root
        ));
    }

    #[test]
    fn tampered_proof_hash_fails() {
        let txs = vec![signed_tx(0), signed_tx(1), signed_tx(2)];
        let block = block_with(txs.clone());

        let mut proof = block.merkle_proof(&txs[1].hash).unwrap();
        proof.path[0].hash = sha256_hex(b"evil");
        assert!(!Block::verify_merkle_proof(
            &txs[1].hash,
            &proof,
            &block.merkle_root
        ));
    }

    #[test]
    fn json_roundtrip_preserves_hash_and_root() {
        let block = block_with(vec![signed_tx(0), signed_tx(1)]);
        let restored = Block::from_json(&block.to_json().unwrap()).unwrap();
        assert_eq!(restored.hash, block.hash);
        assert!(restored.verify_hash());
        assert!(restored.verify_merkle_root());
    }

    #[test]
    fn json_uses_camel_case_contract_fields() {
        let block = Block::genesis();
        let value: serde_json::Value =
            serde_json::from_str(&block.to_json().unwrap()).unwrap();
        assert!(value.get("previousHash").is_some());
        assert!(value.get("merkleRoot").is_some());
    }
}
