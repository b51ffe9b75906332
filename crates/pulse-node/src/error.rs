use thiserror::Error;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("ledger error: {0}")]
    Ledger(#[from] pulse_ledger::LedgerError),

    #[error("entity error: {0}")]
    Entity(#[from] pulse_types::EntityError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
