//! Chain engine
//!
//! Owns the block list, the committed account state and the pending pool.
//! `pending_state` is the committed state with every pending transaction
//! applied in admission order, so nonce and balance checks for a new
//! transaction see the effect of everything already admitted.

use std::collections::HashSet;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tracing::{debug, info, warn};
use crate::config::ChainConfig;
use crate::consensus::{validate_chain, Block, ValidationError};
use crate::crypto::Hash;
use crate::node::create_genesis_block;
use crate::storage::{Account, AccountState, BlockStore, StoreError};
use crate::validation::{Transaction, TxError};

/// Chain engine errors
#[derive(Debug, Error)]
pub enum ChainError {
    #[error(transparent)]
    Transaction(#[from] TxError),
    #[error("duplicate transaction {0}")]
    DuplicateTransaction(Hash),
    #[error("pending pool full ({max} transactions)")]
    PoolFull { max: usize },
    #[error("account address must be non-empty")]
    EmptyAddress,
    #[error("validator address must be non-empty")]
    EmptyValidator,
    #[error("archive belongs to a different chain (block {height} differs)")]
    ForeignArchive { height: u64 },
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// In-memory chain with an optional block archive
#[derive(Debug)]
pub struct Blockchain {
    genesis: Block,
    /// Blocks after genesis, `blocks[i].height == i + 1`
    blocks: Vec<Block>,
    state: AccountState,
    pending_state: AccountState,
    pending: Vec<Transaction>,
    pending_hashes: HashSet<Hash>,
    config: ChainConfig,
    store: Option<Box<dyn BlockStore>>,
    archived: Option<u64>,
}

impl Default for Blockchain {
    fn default() -> Self {
        Self::new(ChainConfig::default())
    }
}

impl Blockchain {
    pub fn new(config: ChainConfig) -> Self {
        Self {
            genesis: create_genesis_block(),
            blocks: Vec::new(),
            state: AccountState::new(),
            pending_state: AccountState::new(),
            pending: Vec::new(),
            pending_hashes: HashSet::new(),
            config,
            store: None,
            archived: None,
        }
    }

    /// Attach a block archive. An archive that already holds blocks must
    /// agree with this chain at its tip.
    pub fn attach_store(&mut self, store: Box<dyn BlockStore>) -> Result<(), ChainError> {
        self.archived = match store.tip()? {
            None => None,
            Some((height, hash)) => match self.block(height) {
                Some(block) if block.hash == hash => Some(height),
                _ => return Err(ChainError::ForeignArchive { height }),
            },
        };
        self.store = Some(store);
        Ok(())
    }

    /// Set an account balance outside of any transfer (genesis allocation).
    /// Pending transactions are re-checked against the new balance.
    pub fn init_account(&mut self, address: &str, balance: u64) -> Result<(), ChainError> {
        if address.is_empty() {
            return Err(ChainError::EmptyAddress);
        }
        self.state.set_balance(address, balance);
        self.rebuild_pending();
        info!(address, balance, "account initialized");
        Ok(())
    }

    fn rebuild_pending(&mut self) {
        let mut projected = self.state.clone();
        let pending = std::mem::take(&mut self.pending);
        self.pending_hashes.clear();

        for tx in pending {
            let id = tx.hash();
            match projected.apply_transfer(&tx) {
                Ok(()) => {
                    self.pending_hashes.insert(id);
                    self.pending.push(tx);
                }
                Err(e) => warn!(tx = %id, error = %e, "pending transaction evicted"),
            }
        }
        self.pending_state = projected;
    }

    /// Admit a transaction to the pending pool
    pub fn add_transaction(&mut self, tx: Transaction) -> Result<Hash, ChainError> {
        let id = tx.hash();
        let result = self.admit(&tx, id);
        match &result {
            Ok(()) => {
                debug!(tx = %id, from = %tx.from, to = %tx.to, amount = tx.amount, "transaction admitted");
                self.pending_hashes.insert(id);
                self.pending.push(tx);
            }
            Err(e) => warn!(tx = %id, error = %e, "transaction rejected"),
        }
        result.map(|()| id)
    }

    fn admit(&mut self, tx: &Transaction, id: Hash) -> Result<(), ChainError> {
        tx.check_stateless(self.config.max_transaction_bytes)?;
        if self.pending_hashes.contains(&id) {
            return Err(ChainError::DuplicateTransaction(id));
        }
        if self.pending.len() >= self.config.max_pending_transactions {
            return Err(ChainError::PoolFull { max: self.config.max_pending_transactions });
        }
        self.pending_state.apply_transfer(tx)?;
        Ok(())
    }

    /// Seal every pending transaction into a new block
    pub fn produce_block(&mut self, validator: &str) -> Result<&Block, ChainError> {
        if validator.is_empty() {
            return Err(ChainError::EmptyValidator);
        }

        let parent = self.latest_block();
        let height = parent.height + 1;
        let previous_hash = parent.hash;
        let timestamp = unix_now().max(parent.timestamp);

        let transactions = std::mem::take(&mut self.pending);
        self.pending_hashes.clear();
        self.state = self.pending_state.clone();

        let block = Block::new(height, timestamp, transactions, previous_hash, self.state.root(), validator);
        info!(
            height,
            hash = %block.hash,
            txs = block.transactions.len(),
            validator,
            "block produced"
        );
        self.blocks.push(block);
        Ok(self.latest_block())
    }

    /// Archive every block not yet archived. Returns the committed state root.
    pub fn commit(&mut self) -> Result<Hash, ChainError> {
        self.persist()?;
        Ok(self.state_root())
    }

    fn persist(&mut self) -> Result<(), ChainError> {
        let Some(store) = &self.store else {
            return Ok(());
        };

        let mut next = self.archived.map_or(0, |h| h + 1);
        let tip = self.height();
        let mut result = Ok(());
        while next <= tip {
            let Some(block) = self.block(next) else { break };
            if let Err(e) = store.put_block(block) {
                result = Err(e);
                break;
            }
            next += 1;
        }
        self.archived = next.checked_sub(1);
        Ok(result?)
    }

    pub fn latest_block(&self) -> &Block {
        self.blocks.last().unwrap_or(&self.genesis)
    }

    pub fn height(&self) -> u64 {
        self.latest_block().height
    }

    pub fn latest_hash(&self) -> Hash {
        self.latest_block().hash
    }

    pub fn block(&self, height: u64) -> Option<&Block> {
        match height {
            0 => Some(&self.genesis),
            h => usize::try_from(h - 1).ok().and_then(|i| self.blocks.get(i)),
        }
    }

    /// Committed balance; unknown addresses hold zero
    pub fn balance(&self, address: &str) -> u64 {
        self.state.balance(address)
    }

    /// Committed nonce
    pub fn nonce(&self, address: &str) -> u64 {
        self.state.nonce(address)
    }

    pub fn account(&self, address: &str) -> Option<&Account> {
        self.state.get(address)
    }

    pub fn state(&self) -> &AccountState {
        &self.state
    }

    /// Root of the committed account state
    pub fn state_root(&self) -> Hash {
        self.state.root()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn pending(&self) -> &[Transaction] {
        &self.pending
    }

    /// Height of the last archived block, if any
    pub fn archived_height(&self) -> Option<u64> {
        self.archived
    }

    /// Nothing has happened on this chain yet
    pub fn is_pristine(&self) -> bool {
        self.blocks.is_empty() && self.state.is_empty() && self.pending.is_empty()
    }

    /// Re-derive every hash, root, link and height
    pub fn validate(&self) -> Result<(), ChainError> {
        validate_chain(std::iter::once(&self.genesis).chain(self.blocks.iter()))?;
        Ok(())
    }

    pub fn blocks(&self) -> impl Iterator<Item = &Block> {
        std::iter::once(&self.genesis).chain(self.blocks.iter())
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
