//! Typed wrapper over a blockchain handle

use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;
use crate::abci::{AbciRequest, AbciResponse};
use crate::consensus::Block;
use crate::ffi::{self, Handle, INVALID_HANDLE};
use crate::host::marshal::{call, call_bytes, call_string, c_string};
use crate::host::{ConsensusHandle, HostError};
use crate::validation::Transaction;

/// Owns one native blockchain instance. Closed on drop.
#[derive(Debug)]
pub struct ChainHandle {
    handle: AtomicU64,
}

impl ChainHandle {
    pub fn new() -> Result<Self, HostError> {
        let handle = call(|err| unsafe { ffi::ledger_blockchain_new(err) })?;
        debug!(handle, "chain handle opened");
        Ok(Self { handle: AtomicU64::new(handle) })
    }

    /// Raw handle value; 0 once closed
    pub fn raw(&self) -> Handle {
        self.handle.load(Ordering::Acquire)
    }

    fn live(&self) -> Result<Handle, HostError> {
        match self.raw() {
            INVALID_HANDLE => Err(HostError::Destroyed("blockchain")),
            handle => Ok(handle),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.raw() == INVALID_HANDLE
    }

    /// Destroy the native instance. Calling it again is a no-op.
    pub fn close(&self) -> Result<(), HostError> {
        let handle = self.handle.swap(INVALID_HANDLE, Ordering::AcqRel);
        if handle == INVALID_HANDLE {
            return Ok(());
        }
        call(|err| unsafe { ffi::ledger_blockchain_destroy(handle, err) })?;
        debug!(handle, "chain handle closed");
        Ok(())
    }

    pub fn init_account(&self, address: &str, balance: u64) -> Result<(), HostError> {
        let handle = self.live()?;
        let address = c_string(address, "address")?;
        call(|err| unsafe { ffi::ledger_blockchain_init_account(handle, address.as_ptr(), balance, err) })?;
        Ok(())
    }

    pub fn get_balance(&self, address: &str) -> Result<u64, HostError> {
        let handle = self.live()?;
        let address = c_string(address, "address")?;
        call(|err| unsafe { ffi::ledger_blockchain_get_balance(handle, address.as_ptr(), err) })
    }

    pub fn get_nonce(&self, address: &str) -> Result<u64, HostError> {
        let handle = self.live()?;
        let address = c_string(address, "address")?;
        call(|err| unsafe { ffi::ledger_blockchain_get_nonce(handle, address.as_ptr(), err) })
    }

    pub fn add_transaction(&self, tx: &Transaction) -> Result<(), HostError> {
        let handle = self.live()?;
        let bytes = serde_json::to_vec(tx)?;
        call(|err| unsafe { ffi::ledger_blockchain_add_transaction(handle, bytes.as_ptr(), bytes.len(), err) })?;
        Ok(())
    }

    /// Seal the pending pool with an explicit proposer. Returns the new height.
    pub fn create_block(&self, validator: &str) -> Result<u64, HostError> {
        let handle = self.live()?;
        let validator = c_string(validator, "validator")?;
        let mut height = 0u64;
        call(|err| unsafe { ffi::ledger_blockchain_create_block(handle, validator.as_ptr(), &mut height, err) })?;
        Ok(height)
    }

    /// Seal the pending pool with a proposer drawn from `consensus`
    pub fn produce_block(&self, consensus: &ConsensusHandle) -> Result<u64, HostError> {
        let handle = self.live()?;
        let engine = consensus.live()?;
        let mut height = 0u64;
        call(|err| unsafe { ffi::ledger_blockchain_produce_block(handle, engine, &mut height, err) })?;
        Ok(height)
    }

    pub fn height(&self) -> Result<u64, HostError> {
        let handle = self.live()?;
        call(|err| unsafe { ffi::ledger_blockchain_height(handle, err) })
    }

    pub fn latest_hash(&self) -> Result<String, HostError> {
        let handle = self.live()?;
        call_string(|err| unsafe { ffi::ledger_blockchain_latest_hash(handle, err) })
    }

    pub fn state_root(&self) -> Result<String, HostError> {
        let handle = self.live()?;
        call_string(|err| unsafe { ffi::ledger_blockchain_state_root(handle, err) })
    }

    pub fn get_block(&self, height: u64) -> Result<Block, HostError> {
        let handle = self.live()?;
        let json = call_string(|err| unsafe { ffi::ledger_blockchain_get_block(handle, height, err) })?;
        Ok(serde_json::from_str(&json)?)
    }

    pub fn pending_count(&self) -> Result<u64, HostError> {
        let handle = self.live()?;
        call(|err| unsafe { ffi::ledger_blockchain_pending_count(handle, err) })
    }

    /// Send one ABCI request
    pub fn abci(&self, request: &AbciRequest) -> Result<AbciResponse, HostError> {
        let response = self.abci_raw(&request.encode()?)?;
        Ok(AbciResponse::decode(&response)?)
    }

    /// Send an already-encoded ABCI request
    pub fn abci_raw(&self, request: &[u8]) -> Result<Vec<u8>, HostError> {
        let handle = self.live()?;
        call_bytes(|err| unsafe { ffi::ledger_abci_process(handle, request.as_ptr(), request.len(), err) })
    }
}

impl Drop for ChainHandle {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            debug!(error = %e, "chain handle close failed on drop");
        }
    }
}
