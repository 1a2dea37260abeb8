//! Process-wide bridge calls

use std::ffi::CString;
use crate::config::BridgeConfig;
use crate::ffi;
use crate::host::marshal::call;
use crate::host::HostError;

/// Install `config` on the native side and start logging
pub fn init(config: &BridgeConfig) -> Result<(), HostError> {
    let json = CString::new(serde_json::to_string(config)?).map_err(|_| HostError::InteriorNul("config_json"))?;
    call(|err| unsafe { ffi::ledger_bridge_init(json.as_ptr(), err) })?;
    Ok(())
}

/// Install the default configuration
pub fn init_default() -> Result<(), HostError> {
    call(|err| unsafe { ffi::ledger_bridge_init(std::ptr::null(), err) })?;
    Ok(())
}

/// Destroy every live instance. Wrappers still holding handles get `InvalidHandle`.
pub fn shutdown() -> Result<(), HostError> {
    call(|err| unsafe { ffi::ledger_bridge_shutdown(err) })?;
    Ok(())
}
