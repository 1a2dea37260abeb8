//! Bridge configuration
//!
//! JSON with every section optional. The host passes it to
//! `ledger_bridge_init`; the demo node reads it from a file. The installed
//! configuration is read whenever a new chain or consensus instance is
//! created, so instances created before a reinstall keep their settings.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use crate::constants;
use crate::node::{GenesisAccount, GenesisValidator};

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Top-level configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub chain_id: String,
    /// `tracing` filter directive, overridden by `RUST_LOG`
    pub log_filter: String,
    pub chain: ChainConfig,
    pub consensus: ConsensusConfig,
    pub store: StoreConfig,
    pub node: NodeConfig,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        BridgeConfig {
            chain_id: constants::DEFAULT_CHAIN_ID.into(),
            log_filter: "info".into(),
            chain: ChainConfig::default(),
            consensus: ConsensusConfig::default(),
            store: StoreConfig::default(),
            node: NodeConfig::default(),
        }
    }
}

/// Transaction pool limits.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    pub max_pending_transactions: usize,
    pub max_transaction_bytes: usize,
}

impl Default for ChainConfig {
    fn default() -> Self {
        ChainConfig {
            max_pending_transactions: constants::DEFAULT_MAX_PENDING_TRANSACTIONS,
            max_transaction_bytes: constants::DEFAULT_MAX_TRANSACTION_BYTES,
        }
    }
}

/// Validator set settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsensusConfig {
    pub min_validator_stake: u64,
    /// Fixed seed for reproducible proposer draws
    pub seed: Option<u64>,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        ConsensusConfig {
            min_validator_stake: constants::DEFAULT_MIN_VALIDATOR_STAKE,
            seed: None,
        }
    }
}

/// Block archive location. No path means blocks are kept in memory only.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub path: Option<PathBuf>,
}

/// Demo node settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub block_interval_ms: u64,
    pub call_timeout_ms: u64,
    pub genesis_accounts: Vec<GenesisAccount>,
    pub genesis_validators: Vec<GenesisValidator>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        NodeConfig {
            block_interval_ms: constants::DEFAULT_BLOCK_INTERVAL_MS,
            call_timeout_ms: constants::DEFAULT_CALL_TIMEOUT_MS,
            genesis_accounts: vec![],
            genesis_validators: vec![],
        }
    }
}

impl BridgeConfig {
    /// Parse and validate a JSON document
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a JSON file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_json_str(&contents)?;
        tracing::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chain.max_pending_transactions == 0 {
            return Err(ConfigError::Invalid("chain.max_pending_transactions must be > 0".into()));
        }
        if self.chain.max_transaction_bytes == 0 {
            return Err(ConfigError::Invalid("chain.max_transaction_bytes must be > 0".into()));
        }
        if self.consensus.min_validator_stake == 0 {
            return Err(ConfigError::Invalid("consensus.min_validator_stake must be > 0".into()));
        }
        if self.node.block_interval_ms == 0 {
            return Err(ConfigError::Invalid("node.block_interval_ms must be > 0".into()));
        }
        Ok(())
    }
}

static ACTIVE: Lazy<RwLock<Arc<BridgeConfig>>> =
    Lazy::new(|| RwLock::new(Arc::new(BridgeConfig::default())));

/// Replace the process-wide configuration
pub fn install(config: BridgeConfig) {
    *ACTIVE.write() = Arc::new(config);
}

/// The process-wide configuration
pub fn active() -> Arc<BridgeConfig> {
    ACTIVE.read().clone()
}
