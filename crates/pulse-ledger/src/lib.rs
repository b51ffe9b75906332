pub mod error;
pub mod ledger;
pub mod store;

pub use error::LedgerError;
pub use ledger::{recipient_address, sender_address, Ledger, GENESIS_SUPPLY};
pub use store::Store;
