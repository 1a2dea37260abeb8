//! ABCI wire messages
//!
//! JSON objects tagged with a `type` field. Every byte-array field is base64
//! text on the wire and goes through `crate::codec`.

use serde::{Deserialize, Serialize};
use crate::node::{GenesisAccount, GenesisValidator};

/// Request from the host's consensus driver
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AbciRequest {
    Info,
    InitChain {
        #[serde(default)]
        validators: Vec<GenesisValidator>,
        #[serde(default)]
        genesis_accounts: Vec<GenesisAccount>,
    },
    BeginBlock {
        height: u64,
        proposer: String,
    },
    DeliverTx {
        /// JSON-encoded `Transaction`
        #[serde(with = "crate::codec::base64_bytes")]
        tx_data: Vec<u8>,
    },
    EndBlock {
        height: u64,
    },
    Commit,
    Query {
        path: String,
        #[serde(default, with = "crate::codec::base64_bytes")]
        data: Vec<u8>,
    },
}

impl AbciRequest {
    pub fn decode(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Requests that never mutate the application
    pub fn is_read_only(&self) -> bool {
        matches!(self, AbciRequest::Info | AbciRequest::Query { .. })
    }

    pub fn name(&self) -> &'static str {
        match self {
            AbciRequest::Info => "Info",
            AbciRequest::InitChain { .. } => "InitChain",
            AbciRequest::BeginBlock { .. } => "BeginBlock",
            AbciRequest::DeliverTx { .. } => "DeliverTx",
            AbciRequest::EndBlock { .. } => "EndBlock",
            AbciRequest::Commit => "Commit",
            AbciRequest::Query { .. } => "Query",
        }
    }
}

/// A change to the validator set reported by `EndBlock`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorUpdate {
    pub address: String,
    pub stake: u64,
}

/// Response returned to the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AbciResponse {
    Info {
        height: u64,
        /// Hex state root
        app_hash: String,
    },
    InitChain,
    BeginBlock,
    DeliverTx {
        code: u32,
        log: String,
    },
    EndBlock {
        validator_updates: Vec<ValidatorUpdate>,
    },
    Commit {
        height: u64,
        app_hash: String,
    },
    Query {
        code: u32,
        #[serde(with = "crate::codec::base64_bytes")]
        value: Vec<u8>,
        log: String,
    },
}

impl AbciResponse {
    pub fn decode(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

/// `DeliverTx` result codes
pub mod tx_code {
    pub const OK: u32 = 0;
    pub const REJECTED: u32 = 1;
    pub const MALFORMED: u32 = 2;
    pub const INVALID_ENCODING: u32 = 3;
}

/// `Query` result codes
pub mod query_code {
    pub const FOUND: u32 = 0;
    pub const NOT_FOUND: u32 = 1;
    pub const UNKNOWN_PATH: u32 = 2;
    pub const BAD_ARGUMENT: u32 = 3;
}
