use std::path::Path;

use crate::LedgerError;

/// Keys of the persistence schema.  Values are UTF-8 JSON strings.
pub const KEY_LATEST_BLOCK: &str = "latestBlockNumber";
pub const KEY_ACCOUNTS_LIST: &str = "accounts-list";

pub fn block_key(number: u64) -> String {
    format!("block-{number}")
}

pub fn account_key(address: &str) -> String {
    format!("account-{address}")
}

/// String-keyed, UTF-8-valued persistence on top of sled.
///
/// Cloning shares the underlying database handle, so a store can be opened
/// once and handed to several owners within one process.
#[derive(Debug, Clone)]
pub struct Store {
    db: sled::Db,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self, LedgerError> {
        Ok(Self {
            db: sled::open(path)?,
        })
    }

    /// An in-memory store that vanishes on drop.  Used by tests and by
    /// nodes running without a data directory.
    pub fn temporary() -> Result<Self, LedgerError> {
        Ok(Self {
            db: sled::Config::new().temporary(true).open()?,
        })
    }

    pub fn get(&self, key: &str) -> Result<Option<String>, LedgerError> {
        match self.db.get(key)? {
            None => Ok(None),
            Some(raw) => String::from_utf8(raw.to_vec())
                .map(Some)
                .map_err(|_| LedgerError::Corrupt(format!("value at {key:?} is not UTF-8"))),
        }
    }

    pub fn put(&self, key: &str, value: &str) -> Result<(), LedgerError> {
        self.db.insert(key, value.as_bytes())?;
        Ok(())
    }

    /// Apply a write batch atomically and flush it to disk.
    pub fn apply(&self, batch: sled::Batch) -> Result<(), LedgerError> {
        self.db.apply_batch(batch)?;
        self.db.flush()?;
        Ok(())
    }

    pub fn flush(&self) -> Result<(), LedgerError> {
        self.db.flush()?;
        Ok(())
    }
}
