//! Genesis block and genesis allocations
//!
//! The genesis block is fixed: every chain instance starts from the same
//! height-0 block, so `latest_hash` of a fresh chain is a known sentinel.
//! Balances and validators are applied on top of it by `InitChain`.

use serde::{Deserialize, Serialize};
use crate::consensus::Block;
use crate::constants::{GENESIS_PROPOSER, GENESIS_TIMESTAMP};
use crate::crypto::Hash;

/// Initial balance for one account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisAccount {
    pub address: String,
    pub balance: u64,
}

impl GenesisAccount {
    pub fn new(address: impl Into<String>, balance: u64) -> Self {
        Self { address: address.into(), balance }
    }
}

/// Initial validator set member
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisValidator {
    pub address: String,
    pub stake: u64,
}

impl GenesisValidator {
    pub fn new(address: impl Into<String>, stake: u64) -> Self {
        Self { address: address.into(), stake }
    }
}

/// Create the genesis block
///
/// Byte-for-byte identical on every call: no transactions, the empty state
/// root and the zero previous hash.
pub fn create_genesis_block() -> Block {
    Block::new(0, GENESIS_TIMESTAMP, vec![], Hash::zero(), Hash::zero(), GENESIS_PROPOSER)
}

/// Hash of the genesis block
pub fn genesis_hash() -> Hash {
    create_genesis_block().hash
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_genesis_is_deterministic() {
        assert_eq!(create_genesis_block(), create_genesis_block());
        assert_eq!(genesis_hash(), create_genesis_block().hash);
    }

    #[test]
    fn test_genesis_is_genesis() {
        let genesis = create_genesis_block();
        assert!(genesis.is_genesis());
        assert!(genesis.transactions.is_empty());
        assert_eq!(genesis.timestamp, GENESIS_TIMESTAMP);
    }

    #[test]
    fn test_genesis_allocations_parse() {
        let accounts: Vec<GenesisAccount> =
            serde_json::from_str(r#"[{"address":"alice","balance":1000000}]"#).unwrap();
        assert_eq!(accounts, vec![GenesisAccount::new("alice", 1_000_000)]);
    }
}
