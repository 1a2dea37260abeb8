//! Validation module - transaction structure and admission rules

mod transaction;

pub use transaction::*;
