//! Database persistence layer using Sled
//!
//! Archives committed blocks to disk, keyed by big-endian height so the
//! tree iterates in chain order.

use std::path::Path;
use sled::{Db, Tree};
use tracing::debug;
use crate::consensus::Block;
use crate::crypto::Hash;
use crate::storage::{check_order, BlockStore, StoreError};

const TIP_HASH_KEY: &str = "tip_hash";
const HEIGHT_KEY: &str = "height";

/// Sled-backed block archive
#[derive(Debug, Clone)]
pub struct SledBlockStore {
    db: Db,
    blocks_tree: Tree,
    metadata_tree: Tree,
}

impl SledBlockStore {
    /// Open or create the database
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let db = sled::open(path)?;
        let blocks_tree = db.open_tree("blocks")?;
        let metadata_tree = db.open_tree("metadata")?;

        Ok(Self { db, blocks_tree, metadata_tree })
    }

    /// Number of archived blocks
    pub fn len(&self) -> usize {
        self.blocks_tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks_tree.is_empty()
    }

    fn read_fixed<const N: usize>(bytes: &[u8], what: &str) -> Result<[u8; N], StoreError> {
        bytes
            .try_into()
            .map_err(|_| StoreError::Corrupt(format!("{what}: expected {N} bytes, got {}", bytes.len())))
    }
}

impl BlockStore for SledBlockStore {
    fn put_block(&self, block: &Block) -> Result<(), StoreError> {
        check_order(self.tip()?, block)?;

        let value = bincode::serialize(block)?;
        self.blocks_tree.insert(block.height.to_be_bytes(), value)?;
        self.metadata_tree.insert(TIP_HASH_KEY, block.hash.0.as_ref())?;
        self.metadata_tree.insert(HEIGHT_KEY, block.height.to_le_bytes().as_ref())?;
        self.db.flush()?;

        debug!(height = block.height, hash = %block.hash, "block archived");
        Ok(())
    }

    fn get_block(&self, height: u64) -> Result<Option<Block>, StoreError> {
        match self.blocks_tree.get(height.to_be_bytes())? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    fn tip(&self) -> Result<Option<(u64, Hash)>, StoreError> {
        let tip = self.metadata_tree.get(TIP_HASH_KEY)?;
        let height = self.metadata_tree.get(HEIGHT_KEY)?;

        match (tip, height) {
            (Some(tip), Some(height)) => {
                let hash = Hash(Self::read_fixed::<32>(&tip, TIP_HASH_KEY)?);
                let height = u64::from_le_bytes(Self::read_fixed::<8>(&height, HEIGHT_KEY)?);
                Ok(Some((height, hash)))
            }
            _ => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::Transaction;

    #[test]
    fn test_blocks_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let genesis = Block::new(0, 1, vec![], Hash::zero(), Hash::zero(), "genesis");
        let next = Block::new(
            1,
            2,
            vec![Transaction::new("alice", "bob", 10, 1)],
            genesis.hash,
            Hash::zero(),
            "v1",
        );
        {
            let store = SledBlockStore::open(dir.path()).unwrap();
            store.put_block(&genesis).unwrap();
            store.put_block(&next).unwrap();
        }

        let store = SledBlockStore::open(dir.path()).unwrap();
        assert_eq!(store.tip().unwrap(), Some((1, next.hash)));
        assert_eq!(store.get_block(1).unwrap(), Some(next));
        assert_eq!(store.get_block(2).unwrap(), None);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_out_of_order_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = SledBlockStore::open(dir.path()).unwrap();
        let orphan = Block::new(3, 1, vec![], Hash::zero(), Hash::zero(), "v1");
        assert!(matches!(store.put_block(&orphan), Err(StoreError::OutOfOrder { .. })));
        assert!(store.is_empty());
    }
}
