//! Storage module - Account state and block archive

mod state;
mod store;
pub mod db;

pub use state::*;
pub use store::*;
pub use db::SledBlockStore;
