//! Node module - Chain engine and genesis

mod blockchain;
mod genesis;

pub use blockchain::*;
pub use genesis::*;
