use serde::{Deserialize, Serialize};

use crate::sha256_hex;

/// A binary merkle tree over lowercase hex transaction hashes.
///
/// Parents are computed by *string*-concatenating the two child hex digests
/// and hashing the UTF-8 bytes.  This string form is part of the wire
/// contract: external tooling recomputes roots and checks inclusion proofs
/// against exactly this rule.  When a level has an odd width its last hash is
/// duplicated, never dropped.
///
/// Zero leaves commit to `sha256("0")`; a single leaf is its own root.
#[derive(Debug, Clone)]
pub struct MerkleTree {
    /// `levels[0]` = leaf hashes, `levels[last]` = the single root.
    levels: Vec<Vec<String>>,
}

/// Root committed by a batch or block with no transactions.
fn empty_root() -> String {
    sha256_hex(b"0")
}

fn hash_pair(left: &str, right: &str) -> String {
    sha256_hex(format!("{left}{right}").as_bytes())
}

/// Compute the merkle root over `hashes` without retaining the tree.
pub fn merkle_root(hashes: &[String]) -> String {
    MerkleTree::new(hashes).root().to_string()
}

impl MerkleTree {
    pub fn new(hashes: &[String]) -> Self {
        if hashes.is_empty() {
            return Self {
                levels: vec![vec![empty_root()]],
            };
        }

        let mut level: Vec<String> = hashes.to_vec();
        let mut levels = vec![level.clone()];

        while level.len() > 1 {
            if level.len() % 2 != 0 {
                let last = level.last().cloned().expect("level is non-empty");
                level.push(last);
            }

            let parent: Vec<String> = level
                .chunks(2)
                .map(|pair| hash_pair(&pair[0], &pair[1]))
                .collect();

            levels.push(parent.clone());
            level = parent;
        }

        Self { levels }
    }

    pub fn root(&self) -> &str {
        self.levels
            .last()
            .and_then(|level| level.first())
            .map(String::as_str)
            .expect("tree always has a root level")
    }

    /// Build an inclusion proof for `leaf_hash`, or `None` when the hash is
    /// not a leaf of this tree.
    pub fn proof(&self, leaf_hash: &str) -> Option<MerkleProof> {
        let mut index = self.levels.first()?.iter().position(|h| h == leaf_hash)?;
        let mut path = Vec::new();

        for level in &self.levels[..self.levels.len() - 1] {
            // Mirror the build-time padding so sibling lookups line up.
            let mut padded = level.clone();
            if padded.len() % 2 != 0 {
                let last = padded.last().cloned().expect("level is non-empty");
                padded.push(last);
            }

            let sibling = if index % 2 == 0 { index + 1 } else { index - 1 };
            let side = if index % 2 == 0 {
                ProofSide::Right
            } else {
                ProofSide::Left
            };

            path.push(ProofNode {
                hash: padded[sibling].clone(),
                side,
            });

            index /= 2;
        }

        Some(MerkleProof {
            leaf_hash: leaf_hash.to_string(),
            path,
        })
    }
}

/// Which side the sibling hash sits on when recomputing a parent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProofSide {
    Left,
    Right,
}

/// A single step in a merkle inclusion proof.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofNode {
    pub hash: String,
    pub side: ProofSide,
}

/// An inclusion proof for a single transaction hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MerkleProof {
    pub leaf_hash: String,
    /// Sibling hashes ordered from leaf to root.
    pub path: Vec<ProofNode>,
}

impl MerkleProof {
    /// Returns `true` if walking the sibling chain reproduces `expected_root`.
    pub fn verify(&self, expected_root: &str) -> bool {
        let mut current = self.leaf_hash.clone();

        for node in &self.path {
            current = match node.side {
                ProofSide::Left => hash_pair(&node.hash, &current),
                ProofSide::Right => hash_pair(&current, &node.hash),
            };
        }

        current == expected_root
    }
}
