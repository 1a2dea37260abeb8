//! Host module - Typed wrapper over the C ABI
//!
//! What a Rust host links against instead of calling `ffi` directly. Every
//! argument buffer is owned here, every native result is wrapped in a guard
//! before use, and every boundary error becomes a `HostError`.

pub mod bridge;
mod chain;
mod consensus;
mod error;
pub mod marshal;
mod timeout;

pub use chain::*;
pub use consensus::*;
pub use error::*;
pub use timeout::*;
