//! FFI module - The C ABI
//!
//! Ownership rules:
//! - the registry owns every chain and validator set, the host holds handles;
//! - the host owns its argument buffers, native code only borrows them;
//! - native code allocates every result string, byte buffer and error
//!   message, and the host hands each one back exactly once through
//!   `ledger_free_string`, `ledger_free_bytes` or `ledger_error_free`.

pub mod abci;
pub mod api;
pub mod buffer;
pub mod error;
pub mod guard;
pub mod registry;

pub use abci::*;
pub use api::*;
pub use buffer::ByteBuffer;
pub use error::{BoundaryError, BridgeError, ErrorCode};
pub use registry::{Handle, INVALID_HANDLE};
