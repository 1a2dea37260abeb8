//! Opaque handle registry
//!
//! Process-wide map from handle to live instance. Ids come from a counter
//! that only moves forward, so a destroyed handle never names a new
//! object, not even after `clear`. The registry lock is held just long
//! enough to clone an instance's `Arc`; callers then take the instance's
//! own lock.

use std::collections::HashMap;
use std::sync::Arc;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use thiserror::Error;
use tracing::{debug, info};
use crate::abci::LedgerApp;
use crate::consensus::ConsensusEngine;

pub type Handle = u64;

/// Never refers to an instance
pub const INVALID_HANDLE: Handle = 0;

/// Handle lookup errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("invalid handle {0}")]
    Unknown(Handle),
    #[error("handle {handle} is not a {expected} handle")]
    WrongKind { handle: Handle, expected: &'static str },
    #[error("handle space exhausted")]
    Exhausted,
}

pub type SharedChain = Arc<RwLock<LedgerApp>>;
pub type SharedConsensus = Arc<RwLock<ConsensusEngine>>;

/// A registered instance
#[derive(Debug, Clone)]
pub enum Instance {
    Chain(SharedChain),
    Consensus(SharedConsensus),
}

impl Instance {
    pub fn kind(&self) -> &'static str {
        match self {
            Instance::Chain(_) => "blockchain",
            Instance::Consensus(_) => "consensus",
        }
    }
}

#[derive(Debug)]
pub struct HandleRegistry {
    instances: HashMap<Handle, Instance>,
    next_id: Handle,
}

impl Default for HandleRegistry {
    fn default() -> Self {
        Self { instances: HashMap::new(), next_id: INVALID_HANDLE + 1 }
    }
}

impl HandleRegistry {
    /// Take the next id without registering anything under it yet
    pub fn reserve(&mut self) -> Result<Handle, RegistryError> {
        let id = self.next_id;
        self.next_id = id.checked_add(1).ok_or(RegistryError::Exhausted)?;
        Ok(id)
    }

    pub fn insert(&mut self, handle: Handle, instance: Instance) {
        self.instances.insert(handle, instance);
    }

    pub fn remove(&mut self, handle: Handle) -> Result<Instance, RegistryError> {
        self.instances.remove(&handle).ok_or(RegistryError::Unknown(handle))
    }

    pub fn get(&self, handle: Handle) -> Result<&Instance, RegistryError> {
        self.instances.get(&handle).ok_or(RegistryError::Unknown(handle))
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Drop every instance. The id counter keeps counting.
    pub fn clear(&mut self) -> usize {
        let n = self.instances.len();
        self.instances.clear();
        n
    }
}

static REGISTRY: Lazy<RwLock<HandleRegistry>> = Lazy::new(|| RwLock::new(HandleRegistry::default()));

pub fn reserve() -> Result<Handle, RegistryError> {
    REGISTRY.write().reserve()
}

pub fn register(handle: Handle, instance: Instance) {
    debug!(handle, kind = instance.kind(), "handle registered");
    REGISTRY.write().insert(handle, instance);
}

/// Remove a handle of the given kind
pub fn destroy(handle: Handle, kind: &'static str) -> Result<(), RegistryError> {
    let mut registry = REGISTRY.write();
    let found = registry.get(handle)?.kind();
    if found != kind {
        return Err(RegistryError::WrongKind { handle, expected: kind });
    }
    registry.remove(handle)?;
    debug!(handle, kind, "handle destroyed");
    Ok(())
}

pub fn chain(handle: Handle) -> Result<SharedChain, RegistryError> {
    match REGISTRY.read().get(handle)? {
        Instance::Chain(app) => Ok(app.clone()),
        Instance::Consensus(_) => Err(RegistryError::WrongKind { handle, expected: "blockchain" }),
    }
}

pub fn consensus(handle: Handle) -> Result<SharedConsensus, RegistryError> {
    match REGISTRY.read().get(handle)? {
        Instance::Consensus(engine) => Ok(engine.clone()),
        Instance::Chain(_) => Err(RegistryError::WrongKind { handle, expected: "consensus" }),
    }
}

/// Drop every live instance. Returns how many there were.
pub fn clear() -> usize {
    let n = REGISTRY.write().clear();
    info!(instances = n, "handle registry cleared");
    n
}

pub fn live_handles() -> usize {
    REGISTRY.read().len()
}
