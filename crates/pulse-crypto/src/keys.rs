use ed25519_dalek::{PublicKey, SecretKey, Signature, Signer, Verifier};
use rand::RngCore;

use crate::{sha256_hex, CryptoError};

/// An ed25519 signing identity.
///
/// All key material crosses API boundaries as lowercase hex; the raw dalek
/// types stay private to this module.
pub struct Keypair {
    inner: ed25519_dalek::Keypair,
}

impl Keypair {
    /// Generate a fresh random keypair from the OS entropy source.
    pub fn generate() -> Self {
        let mut seed = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut seed);
        let secret =
            SecretKey::from_bytes(&seed).expect("a 32-byte seed is always a valid secret key");
        let public = PublicKey::from(&secret);
        Self {
            inner: ed25519_dalek::Keypair { secret, public },
        }
    }

    /// Reconstruct a keypair from a hex-encoded 32-byte secret key.
    pub fn from_secret_hex(secret_hex: &str) -> Result<Self, CryptoError> {
        let bytes = hex::decode(secret_hex)?;
        let secret =
            SecretKey::from_bytes(&bytes).map_err(|e| CryptoError::Key(e.to_string()))?;
        let public = PublicKey::from(&secret);
        Ok(Self {
            inner: ed25519_dalek::Keypair { secret, public },
        })
    }

    pub fn public_hex(&self) -> String {
        hex::encode(self.inner.public.as_bytes())
    }

    pub fn secret_hex(&self) -> String {
        hex::encode(self.inner.secret.as_bytes())
    }

    /// The account address for this keypair: `"0x" + sha256(public_key)`.
    pub fn address(&self) -> String {
        format!("0x{}", sha256_hex(self.inner.public.as_bytes()))
    }

    /// Sign `message` and return the 64-byte signature as hex.
    pub fn sign_hex(&self, message: &[u8]) -> String {
        hex::encode(self.inner.sign(message).to_bytes())
    }
}

/// Verify `signature_hex` over `message` against `public_key_hex`.
/// Malformed hex or key material counts as verification failure.
pub fn verify_hex(signature_hex: &str, message: &[u8], public_key_hex: &str) -> bool {
    let Ok(sig_bytes) = hex::decode(signature_hex) else {
        return false;
    };
    let Ok(pk_bytes) = hex::decode(public_key_hex) else {
        return false;
    };
    let Ok(signature) = Signature::from_bytes(&sig_bytes) else {
        return false;
    };
    let Ok(public) = PublicKey::from_bytes(&pk_bytes) else {
        return false;
    };
    public.verify(message, &signature).is_ok()
}
