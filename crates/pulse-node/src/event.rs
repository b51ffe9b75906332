use pulse_finality::FinalityEvent;
use pulse_types::MicroBatch;

/// High-level events emitted by a running [`crate::Validator`] that callers
/// (RPC surfaces, log sinks, tests) can consume from a channel.
#[derive(Debug, Clone)]
pub enum ValidatorEvent {
    /// A transaction passed the accept checks and entered the mempool.
    TransactionAdded { hash: String },

    /// The builder sealed pending transactions into a new micro-batch.
    BatchCreated(MicroBatch),

    /// A batch collected its quorum of validator acknowledgments.
    InstantFinality(FinalityEvent),

    /// A finalised batch was executed and appended to the chain.
    BlockCreated {
        number: u64,
        hash: String,
        transactions: usize,
    },

    /// A batch sat out its timeout window without reaching quorum.
    BatchTimedOut { batch_id: String },

    /// The periodic batch builder was stopped.
    BuilderStopped,
}
