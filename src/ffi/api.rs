//! Extern functions for chains and validator sets
//!
//! Calling convention: handle first, then arguments, then `err`. Every
//! function resets `*err` and writes its outcome there. Strings returned
//! are released with `ledger_free_string`; see `ffi::buffer`.

use std::ffi::c_char;
use std::sync::Arc;
use parking_lot::RwLock;
use tracing::info;
use crate::abci::LedgerApp;
use crate::config::{self, BridgeConfig};
use crate::consensus::ConsensusEngine;
use crate::ffi::buffer::{self, ByteBuffer};
use crate::ffi::error::{BoundaryError, BridgeError};
use crate::ffi::guard::{boundary, bytes_arg, cstr_arg};
use crate::ffi::registry::{self, Handle, Instance};
use crate::node::ChainError;
use crate::storage::SledBlockStore;
use crate::telemetry;
use crate::validation::Transaction;

fn open_chain(handle: Handle, config: &BridgeConfig) -> Result<LedgerApp, BridgeError> {
    let mut app = LedgerApp::from_config(config);
    if let Some(root) = &config.store.path {
        let dir = root
            .join(&config.chain_id)
            .join(format!("chain-{}-{handle}", std::process::id()));
        let store = SledBlockStore::open(&dir).map_err(ChainError::from)?;
        app.chain_mut().attach_store(Box::new(store))?;
    }
    Ok(app)
}

fn consensus_from(config: &BridgeConfig) -> ConsensusEngine {
    match config.consensus.seed {
        Some(seed) => ConsensusEngine::with_seed(config.consensus.min_validator_stake, seed),
        None => ConsensusEngine::new(config.consensus.min_validator_stake),
    }
}

fn read_chain<T>(handle: Handle, f: impl FnOnce(&LedgerApp) -> Result<T, BridgeError>) -> Result<T, BridgeError> {
    let app = registry::chain(handle)?;
    let guard = app.read();
    f(&guard)
}

fn write_chain<T>(
    handle: Handle,
    f: impl FnOnce(&mut LedgerApp) -> Result<T, BridgeError>,
) -> Result<T, BridgeError> {
    let app = registry::chain(handle)?;
    let mut guard = app.write();
    f(&mut guard)
}

// ============================================================================
// Bridge lifecycle
// ============================================================================

/// Install configuration and logging. `config_json` may be null for defaults.
///
/// # Safety
/// `config_json` must be null or a NUL-terminated string; `err` see `boundary`.
#[no_mangle]
pub unsafe extern "C" fn ledger_bridge_init(config_json: *const c_char, err: *mut BoundaryError) -> bool {
    boundary(err, "bridge_init", || {
        let config = if config_json.is_null() {
            BridgeConfig::default()
        } else {
            BridgeConfig::from_json_str(cstr_arg(config_json, "config_json")?)?
        };
        telemetry::init_logging(&config.log_filter);
        info!(chain_id = %config.chain_id, "bridge initialized");
        config::install(config);
        Ok(true)
    })
}

/// Destroy every live instance. Outstanding handles stay invalid forever.
///
/// # Safety
/// See `boundary`.
#[no_mangle]
pub unsafe extern "C" fn ledger_bridge_shutdown(err: *mut BoundaryError) -> bool {
    boundary(err, "bridge_shutdown", || {
        registry::clear();
        Ok(true)
    })
}

// ============================================================================
// Blockchain instances
// ============================================================================

/// Create a blockchain. Returns 0 on failure.
///
/// # Safety
/// See `boundary`.
#[no_mangle]
pub unsafe extern "C" fn ledger_blockchain_new(err: *mut BoundaryError) -> Handle {
    boundary(err, "blockchain_new", || {
        let config = config::active();
        let handle = registry::reserve()?;
        let app = open_chain(handle, &config)?;
        registry::register(handle, Instance::Chain(Arc::new(RwLock::new(app))));
        info!(handle, "blockchain created");
        Ok(handle)
    })
}

/// Destroy a blockchain. A second destroy reports `InvalidHandle`.
///
/// # Safety
/// See `boundary`.
#[no_mangle]
pub unsafe extern "C" fn ledger_blockchain_destroy(handle: Handle, err: *mut BoundaryError) -> bool {
    boundary(err, "blockchain_destroy", || {
        registry::destroy(handle, "blockchain")?;
        info!(handle, "blockchain destroyed");
        Ok(true)
    })
}

/// # Safety
/// `address` must be null or a NUL-terminated string; `err` see `boundary`.
#[no_mangle]
pub unsafe extern "C" fn ledger_blockchain_init_account(
    handle: Handle,
    address: *const c_char,
    balance: u64,
    err: *mut BoundaryError,
) -> bool {
    boundary(err, "blockchain_init_account", || {
        let address = cstr_arg(address, "address")?;
        write_chain(handle, |app| {
            app.chain_mut().init_account(address, balance)?;
            Ok(true)
        })
    })
}

/// Committed balance. Unknown addresses are 0, not an error.
///
/// # Safety
/// `address` must be null or a NUL-terminated string; `err` see `boundary`.
#[no_mangle]
pub unsafe extern "C" fn ledger_blockchain_get_balance(
    handle: Handle,
    address: *const c_char,
    err: *mut BoundaryError,
) -> u64 {
    boundary(err, "blockchain_get_balance", || {
        let address = cstr_arg(address, "address")?;
        read_chain(handle, |app| Ok(app.chain().balance(address)))
    })
}

/// # Safety
/// `address` must be null or a NUL-terminated string; `err` see `boundary`.
#[no_mangle]
pub unsafe extern "C" fn ledger_blockchain_get_nonce(
    handle: Handle,
    address: *const c_char,
    err: *mut BoundaryError,
) -> u64 {
    boundary(err, "blockchain_get_nonce", || {
        let address = cstr_arg(address, "address")?;
        read_chain(handle, |app| Ok(app.chain().nonce(address)))
    })
}

/// Admit a JSON-encoded transaction to the pending pool
///
/// # Safety
/// `tx_json` must be null or point to `tx_len` readable bytes; `err` see `boundary`.
#[no_mangle]
pub unsafe extern "C" fn ledger_blockchain_add_transaction(
    handle: Handle,
    tx_json: *const u8,
    tx_len: usize,
    err: *mut BoundaryError,
) -> bool {
    boundary(err, "blockchain_add_transaction", || {
        let tx: Transaction = serde_json::from_slice(bytes_arg(tx_json, tx_len, "tx_json")?)?;
        write_chain(handle, |app| {
            app.chain_mut().add_transaction(tx)?;
            Ok(true)
        })
    })
}

/// Seal the pending pool into a block proposed by `validator`.
/// `out_height` may be null.
///
/// # Safety
/// `validator` must be null or a NUL-terminated string; `out_height` null or
/// writable; `err` see `boundary`.
#[no_mangle]
pub unsafe extern "C" fn ledger_blockchain_create_block(
    handle: Handle,
    validator: *const c_char,
    out_height: *mut u64,
    err: *mut BoundaryError,
) -> bool {
    boundary(err, "blockchain_create_block", || {
        let validator = cstr_arg(validator, "validator")?;
        let height = write_chain(handle, |app| Ok(app.produce_block(validator)?))?;
        if let Some(out) = out_height.as_mut() {
            *out = height;
        }
        Ok(true)
    })
}

/// Draw a stake-weighted proposer from `consensus` and seal a block with it
///
/// # Safety
/// `out_height` null or writable; `err` see `boundary`.
#[no_mangle]
pub unsafe extern "C" fn ledger_blockchain_produce_block(
    handle: Handle,
    consensus: Handle,
    out_height: *mut u64,
    err: *mut BoundaryError,
) -> bool {
    boundary(err, "blockchain_produce_block", || {
        let engine = registry::consensus(consensus)?;
        let app = registry::chain(handle)?;

        let proposer = engine.write().select_proposer()?;
        let height = app.write().produce_block(&proposer)?;
        engine.write().record_proposal(&proposer)?;

        if let Some(out) = out_height.as_mut() {
            *out = height;
        }
        Ok(true)
    })
}

/// # Safety
/// See `boundary`.
#[no_mangle]
pub unsafe extern "C" fn ledger_blockchain_height(handle: Handle, err: *mut BoundaryError) -> u64 {
    boundary(err, "blockchain_height", || read_chain(handle, |app| Ok(app.chain().height())))
}

/// Hex hash of the latest block; the genesis hash on a fresh chain
///
/// # Safety
/// See `boundary`.
#[no_mangle]
pub unsafe extern "C" fn ledger_blockchain_latest_hash(handle: Handle, err: *mut BoundaryError) -> *mut c_char {
    boundary(err, "blockchain_latest_hash", || {
        let hash = read_chain(handle, |app| Ok(app.chain().latest_hash()))?;
        Ok(buffer::alloc_string(hash.to_hex()))
    })
}

/// Hex root of the committed account state
///
/// # Safety
/// See `boundary`.
#[no_mangle]
pub unsafe extern "C" fn ledger_blockchain_state_root(handle: Handle, err: *mut BoundaryError) -> *mut c_char {
    boundary(err, "blockchain_state_root", || {
        let root = read_chain(handle, |app| Ok(app.chain().state_root()))?;
        Ok(buffer::alloc_string(root.to_hex()))
    })
}

/// JSON of the block at `height`
///
/// # Safety
/// See `boundary`.
#[no_mangle]
pub unsafe extern "C" fn ledger_blockchain_get_block(
    handle: Handle,
    height: u64,
    err: *mut BoundaryError,
) -> *mut c_char {
    boundary(err, "blockchain_get_block", || {
        let json = read_chain(handle, |app| match app.chain().block(height) {
            Some(block) => Ok(serde_json::to_string(block)?),
            None => Err(BridgeError::InvalidArgument(format!("no block at height {height}"))),
        })?;
        Ok(buffer::alloc_string(json))
    })
}

/// # Safety
/// See `boundary`.
#[no_mangle]
pub unsafe extern "C" fn ledger_blockchain_pending_count(handle: Handle, err: *mut BoundaryError) -> u64 {
    boundary(err, "blockchain_pending_count", || {
        read_chain(handle, |app| Ok(app.chain().pending_count() as u64))
    })
}

// ============================================================================
// Consensus instances
// ============================================================================

/// Create an empty validator set. Returns 0 on failure.
///
/// # Safety
/// See `boundary`.
#[no_mangle]
pub unsafe extern "C" fn ledger_consensus_new(err: *mut BoundaryError) -> Handle {
    boundary(err, "consensus_new", || {
        let engine = consensus_from(&config::active());
        let handle = registry::reserve()?;
        registry::register(handle, Instance::Consensus(Arc::new(RwLock::new(engine))));
        info!(handle, "consensus engine created");
        Ok(handle)
    })
}

/// # Safety
/// See `boundary`.
#[no_mangle]
pub unsafe extern "C" fn ledger_consensus_destroy(handle: Handle, err: *mut BoundaryError) -> bool {
    boundary(err, "consensus_destroy", || {
        registry::destroy(handle, "consensus")?;
        info!(handle, "consensus engine destroyed");
        Ok(true)
    })
}

/// # Safety
/// `address` must be null or a NUL-terminated string; `err` see `boundary`.
#[no_mangle]
pub unsafe extern "C" fn ledger_consensus_add_validator(
    handle: Handle,
    address: *const c_char,
    stake: u64,
    err: *mut BoundaryError,
) -> bool {
    boundary(err, "consensus_add_validator", || {
        let address = cstr_arg(address, "address")?;
        registry::consensus(handle)?.write().add_validator(address, stake)?;
        Ok(true)
    })
}

/// Deactivate a validator
///
/// # Safety
/// `address` must be null or a NUL-terminated string; `err` see `boundary`.
#[no_mangle]
pub unsafe extern "C" fn ledger_consensus_remove_validator(
    handle: Handle,
    address: *const c_char,
    err: *mut BoundaryError,
) -> bool {
    boundary(err, "consensus_remove_validator", || {
        let address = cstr_arg(address, "address")?;
        registry::consensus(handle)?.write().remove_validator(address)?;
        Ok(true)
    })
}

/// Stake-weighted draw. Null with `Consensus` on an empty set.
///
/// # Safety
/// See `boundary`.
#[no_mangle]
pub unsafe extern "C" fn ledger_consensus_select_proposer(handle: Handle, err: *mut BoundaryError) -> *mut c_char {
    boundary(err, "consensus_select_proposer", || {
        let proposer = registry::consensus(handle)?.write().select_proposer()?;
        Ok(buffer::alloc_string(proposer))
    })
}

/// Number of active validators
///
/// # Safety
/// See `boundary`.
#[no_mangle]
pub unsafe extern "C" fn ledger_consensus_validator_count(handle: Handle, err: *mut BoundaryError) -> u64 {
    boundary(err, "consensus_validator_count", || {
        Ok(registry::consensus(handle)?.read().validator_count() as u64)
    })
}

// ============================================================================
// Ownership transfer back to native
// ============================================================================

/// Release a string returned by this library. `false` if it was not live.
///
/// # Safety
/// `ptr` must not be used after a `true` return.
#[no_mangle]
pub unsafe extern "C" fn ledger_free_string(ptr: *mut c_char) -> bool {
    buffer::free_string(ptr)
}

/// Release a buffer returned by this library. `false` if it was not live.
///
/// # Safety
/// `buffer.data` must not be used after a `true` return.
#[no_mangle]
pub unsafe extern "C" fn ledger_free_bytes(buffer: ByteBuffer) -> bool {
    buffer::free_bytes(buffer)
}

/// Release the message held by `err` and reset it to success
///
/// # Safety
/// `err` must be null or point to an initialized `BoundaryError`.
#[no_mangle]
pub unsafe extern "C" fn ledger_error_free(err: *mut BoundaryError) {
    if let Some(err) = err.as_mut() {
        err.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ffi::error::ErrorCode;
    use std::ffi::{CStr, CString};

    fn take_string(ptr: *mut c_char) -> String {
        let text = unsafe { CStr::from_ptr(ptr) }.to_str().unwrap().to_string();
        assert!(unsafe { ledger_free_string(ptr) });
        text
    }

    #[test]
    fn test_chain_round_trip() {
        let mut err = BoundaryError::success();
        unsafe {
            let chain = ledger_blockchain_new(&mut err);
            assert_ne!(chain, 0);
            let alice = CString::new("alice").unwrap();
            assert!(ledger_blockchain_init_account(chain, alice.as_ptr(), 1_000, &mut err));

            let tx = serde_json::to_vec(&Transaction::new("alice", "bob", 10, 1)).unwrap();
            assert!(ledger_blockchain_add_transaction(chain, tx.as_ptr(), tx.len(), &mut err));
            assert_eq!(ledger_blockchain_pending_count(chain, &mut err), 1);

            let v1 = CString::new("v1").unwrap();
            let mut height = 0;
            assert!(ledger_blockchain_create_block(chain, v1.as_ptr(), &mut height, &mut err));
            assert_eq!(height, 1);
            assert_eq!(ledger_blockchain_get_balance(chain, alice.as_ptr(), &mut err), 990);
            assert_eq!(ledger_blockchain_get_nonce(chain, alice.as_ptr(), &mut err), 1);

            let hash = take_string(ledger_blockchain_latest_hash(chain, &mut err));
            assert_eq!(hash.len(), 64);
            let block = take_string(ledger_blockchain_get_block(chain, 1, &mut err));
            assert!(block.contains("\"validator\":\"v1\""));

            assert!(ledger_blockchain_destroy(chain, &mut err));
            assert_eq!(ledger_blockchain_height(chain, &mut err), 0);
            assert_eq!(err.code, ErrorCode::InvalidHandle as i32);
            ledger_error_free(&mut err);
        }
    }

    #[test]
    fn test_rejections_carry_codes() {
        let mut err = BoundaryError::success();
        unsafe {
            let chain = ledger_blockchain_new(&mut err);
            let tx = serde_json::to_vec(&Transaction::new("alice", "bob", 10, 1)).unwrap();
            assert!(!ledger_blockchain_add_transaction(chain, tx.as_ptr(), tx.len(), &mut err));
            assert_eq!(err.code, ErrorCode::InsufficientFunds as i32);

            let garbage = b"{\"from\":";
            assert!(!ledger_blockchain_add_transaction(chain, garbage.as_ptr(), garbage.len(), &mut err));
            assert_eq!(err.code, ErrorCode::Serialization as i32);

            assert!(!ledger_blockchain_add_transaction(chain, std::ptr::null(), 0, &mut err));
            assert_eq!(err.code, ErrorCode::NullPointer as i32);

            let empty = CString::new("").unwrap();
            assert!(!ledger_blockchain_create_block(chain, empty.as_ptr(), std::ptr::null_mut(), &mut err));
            assert_eq!(err.code, ErrorCode::InvalidArgument as i32);

            assert!(ledger_blockchain_get_block(chain, 9, &mut err).is_null());
            assert_eq!(err.code, ErrorCode::InvalidArgument as i32);

            ledger_blockchain_destroy(chain, &mut err);
            ledger_error_free(&mut err);
        }
    }

    #[test]
    fn test_consensus_round_trip() {
        let mut err = BoundaryError::success();
        unsafe {
            let engine = ledger_consensus_new(&mut err);
            assert!(ledger_consensus_select_proposer(engine, &mut err).is_null());
            assert_eq!(err.code, ErrorCode::Consensus as i32);

            let v1 = CString::new("v1").unwrap();
            assert!(!ledger_consensus_add_validator(engine, v1.as_ptr(), 0, &mut err));
            assert_eq!(err.code, ErrorCode::Consensus as i32);
            assert!(ledger_consensus_add_validator(engine, v1.as_ptr(), 100, &mut err));
            assert_eq!(ledger_consensus_validator_count(engine, &mut err), 1);
            assert_eq!(take_string(ledger_consensus_select_proposer(engine, &mut err)), "v1");

            let chain = ledger_blockchain_new(&mut err);
            let mut height = 0;
            assert!(ledger_blockchain_produce_block(chain, engine, &mut height, &mut err));
            assert_eq!(height, 1);

            assert_eq!(ledger_blockchain_height(engine, &mut err), 0);
            assert_eq!(err.code, ErrorCode::InvalidHandle as i32);

            assert!(ledger_consensus_remove_validator(engine, v1.as_ptr(), &mut err));
            assert!(!ledger_blockchain_produce_block(chain, engine, &mut height, &mut err));
            assert_eq!(err.code, ErrorCode::Consensus as i32);

            assert!(ledger_consensus_destroy(engine, &mut err));
            assert!(!ledger_consensus_destroy(engine, &mut err));
            ledger_blockchain_destroy(chain, &mut err);
            ledger_error_free(&mut err);
        }
    }
}
