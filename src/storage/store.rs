//! Block archive interface
//!
//! The chain engine only needs to hand finished blocks to somewhere durable
//! and read them back by height. Where the bytes live is up to the backend.

use std::collections::BTreeMap;
use parking_lot::RwLock;
use thiserror::Error;
use crate::consensus::Block;
use crate::crypto::Hash;

/// Archive errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sled::Error),
    #[error("encoding error: {0}")]
    Encoding(#[from] bincode::Error),
    #[error("corrupt record: {0}")]
    Corrupt(String),
    #[error("block {got} does not extend archived tip {tip}")]
    OutOfOrder { tip: u64, got: u64 },
}

/// Append-only block archive
pub trait BlockStore: Send + Sync + std::fmt::Debug {
    /// Archive a block. Blocks must arrive in height order.
    fn put_block(&self, block: &Block) -> Result<(), StoreError>;

    fn get_block(&self, height: u64) -> Result<Option<Block>, StoreError>;

    /// Height and hash of the last archived block
    fn tip(&self) -> Result<Option<(u64, Hash)>, StoreError>;
}

pub(crate) fn check_order(tip: Option<(u64, Hash)>, block: &Block) -> Result<(), StoreError> {
    let expected = tip.map_or(0, |(h, _)| h + 1);
    if block.height != expected {
        return Err(StoreError::OutOfOrder { tip: expected.saturating_sub(1), got: block.height });
    }
    Ok(())
}

/// Archive kept in memory, for tests and ephemeral chains
#[derive(Debug, Default)]
pub struct MemoryBlockStore {
    blocks: RwLock<BTreeMap<u64, Block>>,
}

impl MemoryBlockStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blocks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.read().is_empty()
    }
}

impl BlockStore for MemoryBlockStore {
    fn put_block(&self, block: &Block) -> Result<(), StoreError> {
        let mut blocks = self.blocks.write();
        let tip = blocks.values().next_back().map(|b| (b.height, b.hash));
        check_order(tip, block)?;
        blocks.insert(block.height, block.clone());
        Ok(())
    }

    fn get_block(&self, height: u64) -> Result<Option<Block>, StoreError> {
        Ok(self.blocks.read().get(&height).cloned())
    }

    fn tip(&self) -> Result<Option<(u64, Hash)>, StoreError> {
        Ok(self.blocks.read().values().next_back().map(|b| (b.height, b.hash)))
    }
}
