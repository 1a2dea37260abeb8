//! Block and chain validation
//!
//! Pure functions checking the append-only chain invariants.

use crate::consensus::Block;
use crate::crypto::Hash;
use thiserror::Error;

/// Validation errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("genesis block must have height 0 and the zero previous hash")]
    InvalidGenesis,
    #[error("invalid height: expected {expected}, got {got}")]
    InvalidHeight { expected: u64, got: u64 },
    #[error("invalid previous hash at height {height}")]
    InvalidPrevHash { height: u64 },
    #[error("block hash mismatch at height {height}")]
    InvalidHash { height: u64 },
    #[error("transaction root mismatch at height {height}")]
    InvalidTxRoot { height: u64 },
    #[error("timestamp at height {height} is earlier than its parent")]
    InvalidTimestamp { height: u64 },
}

/// Validate that a block's hash and transaction root match its contents
pub fn validate_block_seal(block: &Block) -> Result<(), ValidationError> {
    if block.hash != block.compute_hash() {
        return Err(ValidationError::InvalidHash { height: block.height });
    }
    if block.tx_root != Block::compute_tx_root(&block.transactions) {
        return Err(ValidationError::InvalidTxRoot { height: block.height });
    }
    Ok(())
}

/// Validate a block against its parent
pub fn validate_block_link(parent: &Block, block: &Block) -> Result<(), ValidationError> {
    let expected = parent.height + 1;
    if block.height != expected {
        return Err(ValidationError::InvalidHeight { expected, got: block.height });
    }
    if block.previous_hash != parent.hash {
        return Err(ValidationError::InvalidPrevHash { height: block.height });
    }
    if block.timestamp < parent.timestamp {
        return Err(ValidationError::InvalidTimestamp { height: block.height });
    }
    validate_block_seal(block)
}

/// Validate a whole chain, genesis first
pub fn validate_chain<'a, I>(blocks: I) -> Result<(), ValidationError>
where
    I: IntoIterator<Item = &'a Block>,
{
    let mut iter = blocks.into_iter();
    let Some(genesis) = iter.next() else {
        return Ok(());
    };
    if genesis.height != 0 || genesis.previous_hash != Hash::zero() {
        return Err(ValidationError::InvalidGenesis);
    }
    validate_block_seal(genesis)?;

    let mut parent = genesis;
    for block in iter {
        validate_block_link(parent, block)?;
        parent = block;
    }
    Ok(())
}
