//! Merkle roots
//!
//! Used for the transaction root of a block and for the account state root.

use super::{hash_pair, Hash};

/// Compute the merkle root of a list of leaf hashes
///
/// An empty list yields the zero hash. Odd levels pair the last node
/// with itself.
pub fn compute_merkle_root(leaves: &[Hash]) -> Hash {
    let mut level: Vec<Hash> = leaves.to_vec();
    if level.is_empty() {
        return Hash::zero();
    }

    while level.len() > 1 {
        level = level
            .chunks(2)
            .map(|pair| hash_pair(&pair[0], pair.get(1).unwrap_or(&pair[0])))
            .collect();
    }

    level[0]
}
