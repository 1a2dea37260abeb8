//! Consensus module - Block structure, chain validation, and proposer selection

mod block;
mod validation;
mod proposer;

pub use block::*;
pub use validation::*;
pub use proposer::*;
