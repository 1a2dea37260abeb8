//! Errors seen by host callers

use std::time::Duration;
use thiserror::Error;
use crate::ffi::ErrorCode;

#[derive(Debug, Error)]
pub enum HostError {
    #[error("{0} handle already destroyed")]
    Destroyed(&'static str),
    #[error("{code}: {message}")]
    Boundary { code: ErrorCode, message: String },
    #[error("unrecognized boundary error code {code}: {message}")]
    UnknownCode { code: i32, message: String },
    #[error("argument `{0}` contains a NUL byte")]
    InteriorNul(&'static str),
    #[error("native call reported success but returned nothing")]
    EmptyResult,
    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),
    #[error("call did not finish within {0:?}")]
    Timeout(Duration),
    #[error("blocking task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl HostError {
    /// Boundary code, when the failure came from the native side
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            HostError::Boundary { code, .. } => Some(*code),
            _ => None,
        }
    }

    pub fn is_invalid_handle(&self) -> bool {
        self.code() == Some(ErrorCode::InvalidHandle)
    }
}
