//! Ledger Bridge Core Library
//!
//! An account-based ledger with stake-weighted proposer selection, exposed
//! to a managed host runtime through opaque handles, a C ABI and an
//! ABCI-style request/response protocol.
//!
//! Layering, innermost first: `crypto`, `validation`, `storage`, `consensus`
//! and `node` make up the chain engine; `abci` drives it from block
//! lifecycle events; `ffi` is the only surface a foreign caller touches;
//! `host` is the typed wrapper a Rust host uses on top of `ffi`.

pub mod abci;
pub mod codec;
pub mod config;
pub mod consensus;
pub mod crypto;
pub mod ffi;
pub mod host;
pub mod node;
pub mod storage;
pub mod telemetry;
pub mod validation;

/// Protocol constants
pub mod constants {
    /// Timestamp of the genesis block (Unix seconds)
    pub const GENESIS_TIMESTAMP: u64 = 1_736_339_922;

    /// Proposer recorded in the genesis block
    pub const GENESIS_PROPOSER: &str = "genesis";

    pub const DEFAULT_CHAIN_ID: &str = "ledger-bridge-local";

    pub const DEFAULT_MAX_PENDING_TRANSACTIONS: usize = 10_000;

    /// Upper bound on the bincode size of one transaction
    pub const DEFAULT_MAX_TRANSACTION_BYTES: usize = 4 * 1024;

    /// Zero stake is never accepted, whatever the configuration says
    pub const DEFAULT_MIN_VALIDATOR_STAKE: u64 = 1;

    /// Boundary error messages are cut to this many bytes
    pub const MAX_ERROR_MESSAGE_LEN: usize = 512;

    pub const DEFAULT_BLOCK_INTERVAL_MS: u64 = 2_000;

    pub const DEFAULT_CALL_TIMEOUT_MS: u64 = 5_000;
}
