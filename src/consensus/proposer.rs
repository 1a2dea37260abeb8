//! Validator set and stake-weighted proposer selection
//!
//! Validators are kept in address order. A draw picks a point in
//! `[0, total_active_stake)` and walks the cumulative stake in that order,
//! so each validator owns an interval as wide as its stake and equal
//! stakes never tie.

use std::collections::BTreeMap;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Validator set errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConsensusError {
    #[error("validator address must be non-empty")]
    EmptyAddress,
    #[error("stake {stake} below minimum {min}")]
    StakeTooLow { stake: u64, min: u64 },
    #[error("validator {0} already registered")]
    DuplicateValidator(String),
    #[error("validator {0} not found")]
    UnknownValidator(String),
    #[error("no active validators")]
    EmptyValidatorSet,
    #[error("total stake overflow")]
    StakeOverflow,
}

/// A registered validator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validator {
    pub address: String,
    pub stake: u64,
    pub active: bool,
    pub blocks_proposed: u64,
}

/// Validator registry with proposer selection
#[derive(Debug, Clone)]
pub struct ConsensusEngine {
    validators: BTreeMap<String, Validator>,
    min_stake: u64,
    round: u64,
    rng: StdRng,
}

impl Default for ConsensusEngine {
    fn default() -> Self {
        Self::new(1)
    }
}

impl ConsensusEngine {
    /// Engine drawing from OS entropy. `min_stake` is clamped to at least 1.
    pub fn new(min_stake: u64) -> Self {
        Self::with_rng(min_stake, StdRng::from_entropy())
    }

    /// Engine with a reproducible draw sequence
    pub fn with_seed(min_stake: u64, seed: u64) -> Self {
        Self::with_rng(min_stake, StdRng::seed_from_u64(seed))
    }

    fn with_rng(min_stake: u64, rng: StdRng) -> Self {
        Self {
            validators: BTreeMap::new(),
            min_stake: min_stake.max(1),
            round: 0,
            rng,
        }
    }

    /// Register a new active validator
    pub fn add_validator(&mut self, address: &str, stake: u64) -> Result<(), ConsensusError> {
        if address.is_empty() {
            return Err(ConsensusError::EmptyAddress);
        }
        if stake < self.min_stake {
            return Err(ConsensusError::StakeTooLow { stake, min: self.min_stake });
        }
        if self.validators.contains_key(address) {
            return Err(ConsensusError::DuplicateValidator(address.to_string()));
        }
        self.total_stake()
            .checked_add(stake)
            .ok_or(ConsensusError::StakeOverflow)?;

        self.validators.insert(
            address.to_string(),
            Validator { address: address.to_string(), stake, active: true, blocks_proposed: 0 },
        );
        info!(validator = address, stake, "validator added");
        Ok(())
    }

    /// Deactivate a validator; it stays in the registry but is never selected
    pub fn remove_validator(&mut self, address: &str) -> Result<(), ConsensusError> {
        match self.validators.get_mut(address) {
            Some(v) if v.active => {
                v.active = false;
                info!(validator = address, "validator deactivated");
                Ok(())
            }
            _ => Err(ConsensusError::UnknownValidator(address.to_string())),
        }
    }

    /// Draw the next proposer weighted by stake
    pub fn select_proposer(&mut self) -> Result<String, ConsensusError> {
        let total = self.total_stake();
        if total == 0 {
            warn!("proposer requested from an empty validator set");
            return Err(ConsensusError::EmptyValidatorSet);
        }
        let target = self.rng.gen_range(0..total);
        let address = self.pick(target)?;
        self.round += 1;
        debug!(round = self.round, proposer = %address, "proposer selected");
        Ok(address)
    }

    /// Proposer for a given height, identical on every replica with the same set
    pub fn select_proposer_for_height(&self, height: u64) -> Result<String, ConsensusError> {
        let total = self.total_stake();
        if total == 0 {
            return Err(ConsensusError::EmptyValidatorSet);
        }
        let mut hasher = Sha256::new();
        hasher.update(b"ledger-bridge/proposer");
        hasher.update(height.to_le_bytes());
        hasher.update(total.to_le_bytes());
        let digest = hasher.finalize();
        let mut seed = [0u8; 8];
        seed.copy_from_slice(&digest[..8]);
        self.pick(u64::from_le_bytes(seed) % total)
    }

    fn pick(&self, target: u64) -> Result<String, ConsensusError> {
        let mut cumulative = 0u64;
        for v in self.validators.values().filter(|v| v.active) {
            cumulative += v.stake;
            if target < cumulative {
                return Ok(v.address.clone());
            }
        }
        Err(ConsensusError::EmptyValidatorSet)
    }

    /// Count a produced block against its proposer
    pub fn record_proposal(&mut self, address: &str) -> Result<(), ConsensusError> {
        let v = self
            .validators
            .get_mut(address)
            .ok_or_else(|| ConsensusError::UnknownValidator(address.to_string()))?;
        v.blocks_proposed += 1;
        Ok(())
    }

    pub fn is_active(&self, address: &str) -> bool {
        self.validators.get(address).is_some_and(|v| v.active)
    }

    pub fn get_validator(&self, address: &str) -> Option<&Validator> {
        self.validators.get(address)
    }

    pub fn active_validators(&self) -> impl Iterator<Item = &Validator> {
        self.validators.values().filter(|v| v.active)
    }

    pub fn validator_count(&self) -> usize {
        self.active_validators().count()
    }

    /// Sum of active stake. Cannot overflow: additions are checked.
    pub fn total_stake(&self) -> u64 {
        self.active_validators().map(|v| v.stake).sum()
    }

    pub fn round(&self) -> u64 {
        self.round
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> ConsensusEngine {
        let mut engine = ConsensusEngine::with_seed(1, 7);
        engine.add_validator("v1", 100_000).unwrap();
        engine.add_validator("v2", 50_000).unwrap();
        engine.add_validator("v3", 25_000).unwrap();
        engine
    }

    #[test]
    fn test_zero_stake_rejected() {
        let mut engine = ConsensusEngine::default();
        assert_eq!(
            engine.add_validator("v", 0),
            Err(ConsensusError::StakeTooLow { stake: 0, min: 1 })
        );
    }

    #[test]
    fn test_min_stake_enforced() {
        let mut engine = ConsensusEngine::new(1_000);
        assert!(engine.add_validator("low", 999).is_err());
        assert!(engine.add_validator("ok", 1_000).is_ok());
    }

    #[test]
    fn test_duplicate_rejected_without_double_counting() {
        let mut engine = engine();
        assert_eq!(
            engine.add_validator("v1", 10),
            Err(ConsensusError::DuplicateValidator("v1".into()))
        );
        assert_eq!(engine.total_stake(), 175_000);
        assert_eq!(engine.validator_count(), 3);
    }

    #[test]
    fn test_empty_set_has_no_proposer() {
        let mut engine = ConsensusEngine::default();
        assert_eq!(engine.select_proposer(), Err(ConsensusError::EmptyValidatorSet));
        assert_eq!(engine.select_proposer_for_height(1), Err(ConsensusError::EmptyValidatorSet));
    }

    #[test]
    fn test_pick_walks_intervals_in_address_order() {
        let engine = engine();
        assert_eq!(engine.pick(0).unwrap(), "v1");
        assert_eq!(engine.pick(99_999).unwrap(), "v1");
        assert_eq!(engine.pick(100_000).unwrap(), "v2");
        assert_eq!(engine.pick(149_999).unwrap(), "v2");
        assert_eq!(engine.pick(150_000).unwrap(), "v3");
        assert_eq!(engine.pick(174_999).unwrap(), "v3");
    }

    #[test]
    fn test_equal_stake_tie_break_is_lexicographic() {
        let mut engine = ConsensusEngine::with_seed(1, 1);
        engine.add_validator("zed", 10).unwrap();
        engine.add_validator("amy", 10).unwrap();
        assert_eq!(engine.pick(0).unwrap(), "amy");
        assert_eq!(engine.pick(10).unwrap(), "zed");
    }

    #[test]
    fn test_selection_frequency_tracks_stake() {
        let mut engine = engine();
        let mut counts = BTreeMap::new();
        for _ in 0..1_000 {
            *counts.entry(engine.select_proposer().unwrap()).or_insert(0u32) += 1;
        }
        let pct = |k: &str| counts.get(k).copied().unwrap_or(0) as f64 / 10.0;
        assert!((pct("v1") - 57.1).abs() < 5.0, "v1 at {}%", pct("v1"));
        assert!((pct("v2") - 28.6).abs() < 5.0, "v2 at {}%", pct("v2"));
        assert!((pct("v3") - 14.3).abs() < 5.0, "v3 at {}%", pct("v3"));
        assert_eq!(engine.round(), 1_000);
    }

    #[test]
    fn test_deactivated_validator_never_selected() {
        let mut engine = engine();
        engine.remove_validator("v1").unwrap();
        for _ in 0..200 {
            assert_ne!(engine.select_proposer().unwrap(), "v1");
        }
        assert_eq!(engine.total_stake(), 75_000);
        assert!(engine.remove_validator("v1").is_err());
    }

    #[test]
    fn test_height_selection_is_deterministic() {
        let a = engine();
        let b = engine();
        for height in 1..50 {
            assert_eq!(
                a.select_proposer_for_height(height).unwrap(),
                b.select_proposer_for_height(height).unwrap()
            );
        }
    }

    #[test]
    fn test_record_proposal() {
        let mut engine = engine();
        engine.record_proposal("v2").unwrap();
        assert_eq!(engine.get_validator("v2").unwrap().blocks_proposed, 1);
        assert!(engine.record_proposal("ghost").is_err());
    }
}
