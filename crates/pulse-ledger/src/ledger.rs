use std::collections::HashMap;

use num_bigint::BigUint;
use pulse_crypto::{derive_address, GENESIS_ADDRESS};
use pulse_types::{Account, Block, Transaction};
use tracing::{debug, info, warn};

use crate::{
    store::{account_key, block_key, KEY_ACCOUNTS_LIST, KEY_LATEST_BLOCK},
    LedgerError, Store,
};

/// Initial balance of the genesis account.
pub const GENESIS_SUPPLY: u64 = 1_000_000_000;

/// Account key a transaction spends from.
///
/// `from` normally carries a hex public key and maps to its derived address;
/// a bootstrap transfer names the genesis account by its literal address.
pub fn sender_address(tx: &Transaction) -> Option<String> {
    if tx.is_bootstrap() {
        Some(tx.from.clone())
    } else {
        derive_address(&tx.from).ok()
    }
}

/// Account key a transaction pays into.  `to` may be a public key or an
/// already-derived `0x` address.
pub fn recipient_address(tx: &Transaction) -> Option<String> {
    if tx.to.starts_with("0x") {
        Some(tx.to.clone())
    } else {
        derive_address(&tx.to).ok()
    }
}

/// The chain of committed blocks plus the account state they produce.
///
/// Invariants maintained by this type:
/// - Always contains at least the genesis block.
/// - Every block's `previous_hash` matches the hash of the preceding block,
///   numbers are contiguous from 0, timestamps strictly increase.
/// - Balances never go negative; sender nonces are contiguous from 0.
/// - Block application is atomic: a failure mid-execution restores every
///   account to its pre-block state.
///
/// Local rejections (bad linkage, bad economics, duplicates) return `false`;
/// only storage and corruption problems surface as errors.
pub struct Ledger {
    store: Store,
    chain: Vec<Block>,
    accounts: HashMap<String, Account>,
    /// Pre-validated queue for the simple-chain path; the live pipeline
    /// keeps its own mempool instead.
    pending: Vec<Transaction>,
}

impl Ledger {
    /// Open the ledger, creating the genesis block and funding account on
    /// first run.  Corrupt persisted state halts the open.
    pub fn open(store: Store) -> Result<Self, LedgerError> {
        let mut ledger = Self {
            store,
            chain: Vec::new(),
            accounts: HashMap::new(),
            pending: Vec::new(),
        };

        match ledger.store.get(KEY_LATEST_BLOCK)? {
            None => ledger.create_genesis()?,
            Some(raw) => ledger.load(&raw)?,
        }

        Ok(ledger)
    }

    fn create_genesis(&mut self) -> Result<(), LedgerError> {
        let genesis = Block::genesis();
        let account = Account::with_balance(
            GENESIS_ADDRESS.to_string(),
            BigUint::from(GENESIS_SUPPLY),
        );

        let mut batch = sled::Batch::default();
        batch.insert(
            block_key(0).as_str(),
            serde_json::to_string(&genesis)?.as_str(),
        );
        batch.insert(
            account_key(GENESIS_ADDRESS).as_str(),
            serde_json::to_string(&account)?.as_str(),
        );
        batch.insert(
            KEY_ACCOUNTS_LIST,
            serde_json::to_string(&[GENESIS_ADDRESS])?.as_str(),
        );
        batch.insert(KEY_LATEST_BLOCK, "0");
        self.store.apply(batch)?;

        self.chain.push(genesis);
        self.accounts.insert(GENESIS_ADDRESS.to_string(), account);
        info!(supply = GENESIS_SUPPLY, "created genesis block and account");
        Ok(())
    }

    fn load(&mut self, raw_latest: &str) -> Result<(), LedgerError> {
        let latest: u64 = raw_latest.trim().parse().map_err(|_| {
            LedgerError::Corrupt(format!("latestBlockNumber is not an integer: {raw_latest:?}"))
        })?;

        for number in 0..=latest {
            let raw = self
                .store
                .get(&block_key(number))?
                .ok_or_else(|| LedgerError::Corrupt(format!("missing block {number}")))?;
            self.chain.push(serde_json::from_str(&raw)?);
        }

        let addresses: Vec<String> = match self.store.get(KEY_ACCOUNTS_LIST)? {
            Some(raw) => serde_json::from_str(&raw)?,
            None => Vec::new(),
        };
        for address in addresses {
            let raw = self
                .store
                .get(&account_key(&address))?
                .ok_or_else(|| LedgerError::Corrupt(format!("missing account {address}")))?;
            self.accounts.insert(address, serde_json::from_str(&raw)?);
        }

        debug!(
            blocks = self.chain.len(),
            accounts = self.accounts.len(),
            "loaded ledger from store"
        );
        Ok(())
    }

    // ── Queries ──────────────────────────────────────────────────────────────

    /// The most recent block.
    pub fn tip(&self) -> &Block {
        self.chain
            .last()
            .expect("chain always holds at least the genesis block")
    }

    pub fn height(&self) -> u64 {
        self.tip().number
    }

    pub fn chain_len(&self) -> usize {
        self.chain.len()
    }

    pub fn block(&self, number: u64) -> Option<&Block> {
        self.chain.get(number as usize)
    }

    pub fn blocks(&self) -> &[Block] {
        &self.chain
    }

    /// Account state at `address`; unknown addresses read as implicit empty
    /// accounts without being materialised.
    pub fn account(&self, address: &str) -> Account {
        self.accounts
            .get(address)
            .cloned()
            .unwrap_or_else(|| Account::new(address.to_string()))
    }

    pub fn balance(&self, address: &str) -> BigUint {
        self.account(address).balance
    }

    pub fn nonce_of(&self, address: &str) -> u64 {
        self.account(address).nonce
    }

    pub fn pending(&self) -> &[Transaction] {
        &self.pending
    }

    pub fn flush(&self) -> Result<(), LedgerError> {
        self.store.flush()
    }

    // ── Mutations ────────────────────────────────────────────────────────────

    /// Simple-chain acceptance: full structural, cryptographic, and economic
    /// validation against current state, then queue in the pending list.
    pub fn add_transaction(&mut self, tx: &Transaction) -> bool {
        if !tx.is_valid() {
            warn!(hash = %tx.hash, "transaction failed basic validation");
            return false;
        }
        if !tx.is_bootstrap() && !tx.verify() {
            warn!(hash = %tx.hash, "transaction signature rejected");
            return false;
        }
        if self.pending.iter().any(|pending| pending.hash == tx.hash) {
            return false;
        }

        let Some(sender) = sender_address(tx) else {
            return false;
        };
        let account = self.account(&sender);
        if !account.has_balance(&tx.total_cost()) {
            debug!(hash = %tx.hash, "insufficient balance");
            return false;
        }
        if tx.nonce != account.nonce {
            debug!(hash = %tx.hash, expected = account.nonce, got = tx.nonce, "nonce mismatch");
            return false;
        }

        self.pending.push(tx.clone());
        true
    }

    /// Append `block` to the chain: validate linkage and cryptography,
    /// execute its transactions atomically, persist block and accounts in
    /// one batch.  Returns `Ok(false)` on rejection with state unchanged.
    pub fn add_block(&mut self, block: &Block) -> Result<bool, LedgerError> {
        let tip = self.tip();
        if block.number != tip.number + 1 {
            warn!(got = block.number, expected = tip.number + 1, "block number mismatch");
            return Ok(false);
        }
        if block.previous_hash != tip.hash {
            warn!(number = block.number, "previous hash mismatch");
            return Ok(false);
        }
        if block.timestamp <= tip.timestamp {
            warn!(number = block.number, "block timestamp not after parent");
            return Ok(false);
        }
        if !block.verify_hash() || !block.verify_merkle_root() || !block.verify_transactions() {
            warn!(number = block.number, "block failed cryptographic checks");
            return Ok(false);
        }

        // Snapshot every materialised account so a mid-block failure can
        // restore exactly the pre-block state.
        let snapshot = self.accounts.clone();
        for tx in &block.transactions {
            if !self.execute_transaction(tx) {
                self.accounts = snapshot;
                warn!(
                    number = block.number,
                    hash = %tx.hash,
                    "block execution failed, accounts rolled back"
                );
                return Ok(false);
            }
        }

        self.persist_block(block)?;
        self.chain.push(block.clone());
        self.pending
            .retain(|pending| !block.transactions.iter().any(|tx| tx.hash == pending.hash));

        info!(
            number = block.number,
            transactions = block.transactions.len(),
            "block committed"
        );
        Ok(true)
    }

    /// Replace the local chain when `candidate` is strictly longer and fully
    /// valid; state is rebuilt by replaying every block from genesis.
    pub fn replace_chain(&mut self, candidate: &[Block]) -> Result<bool, LedgerError> {
        if candidate.len() <= self.chain.len() {
            return Ok(false);
        }
        if !Self::validate_chain(candidate) {
            warn!("candidate chain failed validation");
            return Ok(false);
        }

        let previous_chain = std::mem::take(&mut self.chain);
        let previous_accounts = std::mem::take(&mut self.accounts);

        // Genesis re-seeds the genesis account; later blocks re-execute.
        self.accounts.insert(
            GENESIS_ADDRESS.to_string(),
            Account::with_balance(GENESIS_ADDRESS.to_string(), BigUint::from(GENESIS_SUPPLY)),
        );
        self.chain.push(candidate[0].clone());

        for block in &candidate[1..] {
            let replayed = block
                .transactions
                .iter()
                .all(|tx| self.execute_transaction(tx));
            if !replayed {
                warn!(number = block.number, "replay failed, keeping local chain");
                self.chain = previous_chain;
                self.accounts = previous_accounts;
                return Ok(false);
            }
            self.chain.push(block.clone());
        }

        self.persist_full_state()?;
        info!(length = self.chain.len(), "chain replaced");
        Ok(true)
    }

    /// Full-chain validation: every non-genesis block parent-links correctly
    /// and all its signatures hold.
    pub fn is_chain_valid(&self) -> bool {
        self.chain.windows(2).all(|window| {
            window[1].is_valid(Some(&window[0])) && window[1].verify_transactions()
        })
    }

    // ── Internal helpers ─────────────────────────────────────────────────────

    fn validate_chain(chain: &[Block]) -> bool {
        let Some(genesis) = chain.first() else {
            return false;
        };
        if genesis.number != 0
            || genesis.previous_hash != pulse_crypto::ZERO_HASH
            || !genesis.verify_hash()
            || !genesis.verify_merkle_root()
        {
            return false;
        }
        chain.windows(2).all(|window| {
            window[1].is_valid(Some(&window[0])) && window[1].verify_transactions()
        })
    }

    /// Apply one transaction to in-memory state.  Fees are deducted from the
    /// sender along with the amount but credited nowhere (burned).
    fn execute_transaction(&mut self, tx: &Transaction) -> bool {
        let Some(sender_key) = sender_address(tx) else {
            return false;
        };
        let Some(recipient_key) = recipient_address(tx) else {
            return false;
        };

        {
            let sender = self
                .accounts
                .entry(sender_key.clone())
                .or_insert_with(|| Account::new(sender_key.clone()));
            if tx.nonce != sender.nonce {
                return false;
            }
            if !sender.subtract_balance(&tx.total_cost()) {
                return false;
            }
            sender.increment_nonce();
        }

        let recipient = self
            .accounts
            .entry(recipient_key.clone())
            .or_insert_with(|| Account::new(recipient_key));
        recipient.add_balance(&tx.amount);
        true
    }

    fn persist_block(&self, block: &Block) -> Result<(), LedgerError> {
        let mut batch = sled::Batch::default();
        batch.insert(
            block_key(block.number).as_str(),
            serde_json::to_string(block)?.as_str(),
        );
        for account in self.accounts.values() {
            batch.insert(
                account_key(&account.address).as_str(),
                serde_json::to_string(account)?.as_str(),
            );
        }
        batch.insert(KEY_ACCOUNTS_LIST, self.accounts_list_json()?.as_str());
        batch.insert(KEY_LATEST_BLOCK, block.number.to_string().as_str());
        self.store.apply(batch)
    }

    fn persist_full_state(&self) -> Result<(), LedgerError> {
        let mut batch = sled::Batch::default();
        for block in &self.chain {
            batch.insert(
                block_key(block.number).as_str(),
                serde_json::to_string(block)?.as_str(),
            );
        }
        for account in self.accounts.values() {
            batch.insert(
                account_key(&account.address).as_str(),
                serde_json::to_string(account)?.as_str(),
            );
        }
        batch.insert(KEY_ACCOUNTS_LIST, self.accounts_list_json()?.as_str());
        batch.insert(KEY_LATEST_BLOCK, self.tip().number.to_string().as_str());
        self.store.apply(batch)
    }

    fn accounts_list_json(&self) -> Result<String, LedgerError> {
        let mut addresses: Vec<&String> = self.accounts.keys().collect();
        addresses.sort();
        Ok(serde_json::to_string(&addresses)?)
    }
}
