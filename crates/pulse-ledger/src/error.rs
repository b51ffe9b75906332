use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("storage error: {0}")]
    Storage(#[from] sled::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Persisted state that cannot be loaded.  Startup must halt on this
    /// rather than silently recover; a half-read ledger diverges.
    #[error("corrupt ledger state: {0}")]
    Corrupt(String),
}
