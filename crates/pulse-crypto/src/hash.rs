use sha2::{Digest, Sha256};

use crate::CryptoError;

/// Previous-hash of the genesis block: 64 zero hex chars.
pub const ZERO_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// The bootstrap funding account.  This address has no key pair; it can only
/// be spent through bootstrap transfers that bypass signature verification.
pub const GENESIS_ADDRESS: &str =
    "0x0000000000000000000000000000000000000000000000000000000000000000";

/// SHA-256 digest surfaced as lowercase hex.
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Derive the account address for a hex-encoded public key:
/// `"0x" + sha256(public_key_bytes)`.
pub fn derive_address(public_key_hex: &str) -> Result<String, CryptoError> {
    let bytes = hex::decode(public_key_hex)?;
    Ok(format!("0x{}", sha256_hex(&bytes)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_hex_is_lowercase_and_64_chars() {
        let digest = sha256_hex(b"pulse");
        assert_eq!(digest.len(), 64);
        assert_eq!(digest, digest.to_lowercase());
    }

    #[test]
    fn derive_address_prefixes_and_hashes() {
        let public = hex::encode([7u8; 32]);
        let addr = derive_address(&public).unwrap();
        assert!(addr.starts_with("0x"));
        assert_eq!(addr.len(), 66);
        assert_eq!(addr[2..], sha256_hex(&[7u8; 32]));
    }

    #[test]
    fn derive_address_rejects_bad_hex() {
        assert!(derive_address("not-hex").is_err());
    }

    #[test]
    fn genesis_address_is_zero_hash_with_prefix() {
        assert_eq!(GENESIS_ADDRESS, format!("0x{ZERO_HASH}"));
    }
}
