//! Typed wrapper over a consensus handle

use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;
use crate::ffi::{self, Handle, INVALID_HANDLE};
use crate::host::marshal::{call, call_string, c_string};
use crate::host::HostError;

/// Owns one native validator set. Closed on drop.
#[derive(Debug)]
pub struct ConsensusHandle {
    handle: AtomicU64,
}

impl ConsensusHandle {
    pub fn new() -> Result<Self, HostError> {
        let handle = call(|err| unsafe { ffi::ledger_consensus_new(err) })?;
        debug!(handle, "consensus handle opened");
        Ok(Self { handle: AtomicU64::new(handle) })
    }

    pub fn raw(&self) -> Handle {
        self.handle.load(Ordering::Acquire)
    }

    pub(crate) fn live(&self) -> Result<Handle, HostError> {
        match self.raw() {
            INVALID_HANDLE => Err(HostError::Destroyed("consensus")),
            handle => Ok(handle),
        }
    }

    /// Destroy the native instance. Calling it again is a no-op.
    pub fn close(&self) -> Result<(), HostError> {
        let handle = self.handle.swap(INVALID_HANDLE, Ordering::AcqRel);
        if handle == INVALID_HANDLE {
            return Ok(());
        }
        call(|err| unsafe { ffi::ledger_consensus_destroy(handle, err) })?;
        Ok(())
    }

    pub fn add_validator(&self, address: &str, stake: u64) -> Result<(), HostError> {
        let handle = self.live()?;
        let address = c_string(address, "address")?;
        call(|err| unsafe { ffi::ledger_consensus_add_validator(handle, address.as_ptr(), stake, err) })?;
        Ok(())
    }

    pub fn remove_validator(&self, address: &str) -> Result<(), HostError> {
        let handle = self.live()?;
        let address = c_string(address, "address")?;
        call(|err| unsafe { ffi::ledger_consensus_remove_validator(handle, address.as_ptr(), err) })?;
        Ok(())
    }

    pub fn select_proposer(&self) -> Result<String, HostError> {
        let handle = self.live()?;
        call_string(|err| unsafe { ffi::ledger_consensus_select_proposer(handle, err) })
    }

    pub fn validator_count(&self) -> Result<u64, HostError> {
        let handle = self.live()?;
        call(|err| unsafe { ffi::ledger_consensus_validator_count(handle, err) })
    }
}

impl Drop for ConsensusHandle {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            debug!(error = %e, "consensus handle close failed on drop");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ffi::ErrorCode;

    #[test]
    fn test_empty_set_and_zero_stake() {
        let engine = ConsensusHandle::new().unwrap();
        assert_eq!(engine.select_proposer().unwrap_err().code(), Some(ErrorCode::Consensus));
        assert_eq!(engine.add_validator("v1", 0).unwrap_err().code(), Some(ErrorCode::Consensus));
        engine.add_validator("v1", 10).unwrap();
        assert_eq!(engine.select_proposer().unwrap(), "v1");
        engine.close().unwrap();
        assert!(matches!(engine.validator_count(), Err(HostError::Destroyed("consensus"))));
    }
}
