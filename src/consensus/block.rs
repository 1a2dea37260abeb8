//! Block structure
//!
//! Blocks are append-only. Height 0 is the genesis block, whose
//! `previous_hash` is the zero-hash sentinel.

use serde::{Deserialize, Serialize};
use crate::crypto::{compute_merkle_root, hash_bytes, put_str, Hash};
use crate::validation::Transaction;

/// A block of transfers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Position in the chain, genesis is 0
    pub height: u64,
    /// Seconds since Unix epoch
    pub timestamp: u64,
    pub transactions: Vec<Transaction>,
    pub previous_hash: Hash,
    /// Merkle root of the transaction ids
    pub tx_root: Hash,
    /// Account state root after applying this block
    pub state_root: Hash,
    /// Address of the proposer
    pub validator: String,
    pub hash: Hash,
}

impl Block {
    /// Assemble a block and seal it with its hash
    pub fn new(
        height: u64,
        timestamp: u64,
        transactions: Vec<Transaction>,
        previous_hash: Hash,
        state_root: Hash,
        validator: impl Into<String>,
    ) -> Self {
        let mut block = Self {
            height,
            timestamp,
            tx_root: Self::compute_tx_root(&transactions),
            transactions,
            previous_hash,
            state_root,
            validator: validator.into(),
            hash: Hash::zero(),
        };
        block.hash = block.compute_hash();
        block
    }

    pub fn compute_tx_root(transactions: &[Transaction]) -> Hash {
        let ids: Vec<Hash> = transactions.iter().map(Transaction::hash).collect();
        compute_merkle_root(&ids)
    }

    /// Serialize the header fields for hashing
    pub fn header_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(8 + 8 + 32 * 3 + 8 + self.validator.len());
        bytes.extend_from_slice(&self.height.to_le_bytes());
        bytes.extend_from_slice(&self.timestamp.to_le_bytes());
        bytes.extend_from_slice(&self.previous_hash.0);
        bytes.extend_from_slice(&self.tx_root.0);
        bytes.extend_from_slice(&self.state_root.0);
        put_str(&mut bytes, &self.validator);
        bytes
    }

    /// Recompute the hash from the header fields
    pub fn compute_hash(&self) -> Hash {
        hash_bytes(&self.header_bytes())
    }

    pub fn is_genesis(&self) -> bool {
        self.height == 0 && self.previous_hash.is_zero()
    }
}
