//! Boundary error channel
//!
//! Every extern function takes a `*mut BoundaryError` as its last argument
//! and writes the outcome of the call into it. The message is a native
//! allocation: the caller releases it with `ledger_error_free` after every
//! call, success or not.

use std::ffi::c_char;
use std::fmt;
use thiserror::Error;
use crate::abci::AbciError;
use crate::config::ConfigError;
use crate::consensus::ConsensusError;
use crate::constants::MAX_ERROR_MESSAGE_LEN;
use crate::ffi::buffer;
use crate::ffi::registry::{Handle, RegistryError};
use crate::node::ChainError;
use crate::validation::TxError;

/// Numeric failure categories carried by `BoundaryError::code`
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    Success = 0,
    NullPointer = 1,
    InvalidUtf8 = 2,
    InvalidHandle = 3,
    InternalPanic = 4,
    Serialization = 5,
    InsufficientFunds = 6,
    InvalidNonce = 7,
    TransactionRejected = 8,
    Consensus = 9,
    ProtocolViolation = 10,
    InvalidArgument = 11,
    Storage = 12,
}

impl ErrorCode {
    pub const ALL: [ErrorCode; 13] = [
        ErrorCode::Success,
        ErrorCode::NullPointer,
        ErrorCode::InvalidUtf8,
        ErrorCode::InvalidHandle,
        ErrorCode::InternalPanic,
        ErrorCode::Serialization,
        ErrorCode::InsufficientFunds,
        ErrorCode::InvalidNonce,
        ErrorCode::TransactionRejected,
        ErrorCode::Consensus,
        ErrorCode::ProtocolViolation,
        ErrorCode::InvalidArgument,
        ErrorCode::Storage,
    ];

    pub fn from_i32(code: i32) -> Option<Self> {
        Self::ALL.iter().copied().find(|c| *c as i32 == code)
    }

    pub fn as_i32(self) -> i32 {
        self as i32
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorCode::Success => "success",
            ErrorCode::NullPointer => "null pointer",
            ErrorCode::InvalidUtf8 => "invalid UTF-8",
            ErrorCode::InvalidHandle => "invalid handle",
            ErrorCode::InternalPanic => "internal panic",
            ErrorCode::Serialization => "serialization error",
            ErrorCode::InsufficientFunds => "insufficient funds",
            ErrorCode::InvalidNonce => "invalid nonce",
            ErrorCode::TransactionRejected => "transaction rejected",
            ErrorCode::Consensus => "consensus error",
            ErrorCode::ProtocolViolation => "protocol violation",
            ErrorCode::InvalidArgument => "invalid argument",
            ErrorCode::Storage => "storage error",
        };
        f.write_str(name)
    }
}

/// Everything that can go wrong inside a boundary call
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("null pointer passed for `{0}`")]
    NullPointer(&'static str),
    #[error("`{0}` is not valid UTF-8")]
    InvalidUtf8(&'static str),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("serialization failed: {0}")]
    Serialization(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error(transparent)]
    Chain(#[from] ChainError),
    #[error(transparent)]
    Consensus(#[from] ConsensusError),
    #[error(transparent)]
    Abci(#[from] AbciError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl From<serde_json::Error> for BridgeError {
    fn from(e: serde_json::Error) -> Self {
        BridgeError::Serialization(e.to_string())
    }
}

impl BridgeError {
    pub fn invalid_handle(handle: Handle) -> Self {
        BridgeError::Registry(RegistryError::Unknown(handle))
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            BridgeError::NullPointer(_) => ErrorCode::NullPointer,
            BridgeError::InvalidUtf8(_) => ErrorCode::InvalidUtf8,
            BridgeError::Registry(RegistryError::Exhausted) => ErrorCode::InternalPanic,
            BridgeError::Registry(_) => ErrorCode::InvalidHandle,
            BridgeError::Serialization(_) => ErrorCode::Serialization,
            BridgeError::InvalidArgument(_) | BridgeError::Config(_) => ErrorCode::InvalidArgument,
            BridgeError::Chain(e) => chain_code(e),
            BridgeError::Consensus(_) => ErrorCode::Consensus,
            BridgeError::Abci(e) => match e {
                AbciError::OutOfOrder { .. }
                | AbciError::AlreadyInitialized
                | AbciError::UnexpectedHeight { .. } => ErrorCode::ProtocolViolation,
                AbciError::EmptyProposer | AbciError::EmptyGenesisAccount => ErrorCode::InvalidArgument,
                AbciError::UnknownProposer(_) | AbciError::Consensus(_) => ErrorCode::Consensus,
                AbciError::Chain(e) => chain_code(e),
            },
        }
    }
}

fn chain_code(e: &ChainError) -> ErrorCode {
    match e {
        ChainError::Transaction(TxError::InsufficientBalance { .. }) => ErrorCode::InsufficientFunds,
        ChainError::Transaction(TxError::InvalidNonce { .. }) => ErrorCode::InvalidNonce,
        ChainError::Transaction(_)
        | ChainError::DuplicateTransaction(_)
        | ChainError::PoolFull { .. } => ErrorCode::TransactionRejected,
        ChainError::EmptyAddress | ChainError::EmptyValidator => ErrorCode::InvalidArgument,
        ChainError::ForeignArchive { .. } | ChainError::Store(_) => ErrorCode::Storage,
        ChainError::Validation(_) => ErrorCode::Consensus,
    }
}

/// Fixed-layout error record shared with the host
///
/// The host zero-initializes it before the first call.
#[repr(C)]
#[derive(Debug)]
pub struct BoundaryError {
    pub code: i32,
    /// NUL-terminated, at most `MAX_ERROR_MESSAGE_LEN` bytes, or null
    pub message: *mut c_char,
}

impl Default for BoundaryError {
    fn default() -> Self {
        Self::success()
    }
}

impl BoundaryError {
    pub fn success() -> Self {
        Self { code: ErrorCode::Success.as_i32(), message: std::ptr::null_mut() }
    }

    pub fn is_success(&self) -> bool {
        self.code == ErrorCode::Success.as_i32()
    }

    /// Release the current message, if this crate allocated it, and reset to success.
    pub fn clear(&mut self) {
        if !self.message.is_null() {
            buffer::free_string(self.message);
        }
        *self = Self::success();
    }

    pub fn set(&mut self, code: ErrorCode, message: &str) {
        self.clear();
        self.code = code.as_i32();
        self.message = buffer::alloc_string(bounded_message(message));
    }
}

/// Cut to the byte limit on a char boundary and drop interior NULs
pub fn bounded_message(message: &str) -> String {
    let mut out = String::with_capacity(message.len().min(MAX_ERROR_MESSAGE_LEN));
    for ch in message.chars().filter(|c| *c != '\0') {
        if out.len() + ch.len_utf8() > MAX_ERROR_MESSAGE_LEN {
            break;
        }
        out.push(ch);
    }
    out
}
