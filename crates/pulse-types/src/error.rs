use thiserror::Error;

#[derive(Debug, Error)]
pub enum EntityError {
    #[error("crypto error: {0}")]
    Crypto(#[from] pulse_crypto::CryptoError),

    #[error("invalid hex: {0}")]
    Hex(#[from] hex::FromHexError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
