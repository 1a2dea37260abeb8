//! Cryptography module - BLAKE3 hashing and Merkle roots

mod hash;
mod merkle;

pub use hash::*;
pub use merkle::*;
