//! ABCI module - Wire messages and the block lifecycle state machine

mod app;
mod types;

pub use app::*;
pub use types::*;
