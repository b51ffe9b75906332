pub mod error;
pub mod hash;
pub mod keys;
pub mod merkle;

pub use error::CryptoError;
pub use hash::{derive_address, sha256_hex, GENESIS_ADDRESS, ZERO_HASH};
pub use keys::{verify_hex, Keypair};
pub use merkle::{merkle_root, MerkleProof, MerkleTree, ProofNode, ProofSide};
