//! Account state
//!
//! Balances and nonces keyed by address. Accounts are kept in address
//! order so the state root is independent of insertion order.

use std::collections::BTreeMap;
use serde::{Deserialize, Serialize};
use crate::crypto::{compute_merkle_root, hash_bytes, put_str, Hash};
use crate::validation::{Transaction, TxError};

/// A single ledger account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub address: String,
    pub balance: u64,
    /// Number of transfers sent from this account
    pub nonce: u64,
}

impl Account {
    pub fn new(address: impl Into<String>, balance: u64) -> Self {
        Self { address: address.into(), balance, nonce: 0 }
    }

    fn leaf_hash(&self) -> Hash {
        let mut bytes = Vec::with_capacity(24 + self.address.len());
        put_str(&mut bytes, &self.address);
        bytes.extend_from_slice(&self.balance.to_le_bytes());
        bytes.extend_from_slice(&self.nonce.to_le_bytes());
        hash_bytes(&bytes)
    }
}

/// All accounts known to a chain
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountState {
    accounts: BTreeMap<String, Account>,
}

impl AccountState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, address: &str) -> Option<&Account> {
        self.accounts.get(address)
    }

    /// Balance of an address; unknown addresses hold zero
    pub fn balance(&self, address: &str) -> u64 {
        self.accounts.get(address).map_or(0, |a| a.balance)
    }

    /// Nonce of an address; unknown addresses are at zero
    pub fn nonce(&self, address: &str) -> u64 {
        self.accounts.get(address).map_or(0, |a| a.nonce)
    }

    /// Set the balance of an account, creating it if needed. The nonce is kept.
    pub fn set_balance(&mut self, address: &str, balance: u64) {
        self.accounts
            .entry(address.to_string())
            .and_modify(|a| a.balance = balance)
            .or_insert_with(|| Account::new(address, balance));
    }

    /// Check a transfer against this state without applying it
    pub fn check_transfer(&self, tx: &Transaction) -> Result<(), TxError> {
        let expected = self.nonce(&tx.from) + 1;
        if tx.nonce != expected {
            return Err(TxError::InvalidNonce { expected, got: tx.nonce });
        }
        let available = self.balance(&tx.from);
        if available < tx.amount {
            return Err(TxError::InsufficientBalance { available, required: tx.amount });
        }
        if self.balance(&tx.to).checked_add(tx.amount).is_none() {
            return Err(TxError::BalanceOverflow);
        }
        Ok(())
    }

    /// Apply a transfer. Nothing changes if the transfer is invalid.
    pub fn apply_transfer(&mut self, tx: &Transaction) -> Result<(), TxError> {
        self.check_transfer(tx)?;

        if let Some(sender) = self.accounts.get_mut(&tx.from) {
            sender.balance -= tx.amount;
            sender.nonce += 1;
        }
        let receiver = self
            .accounts
            .entry(tx.to.clone())
            .or_insert_with(|| Account::new(tx.to.clone(), 0));
        receiver.balance += tx.amount;

        Ok(())
    }

    /// Merkle root over account leaves in address order
    pub fn root(&self) -> Hash {
        let leaves: Vec<Hash> = self.accounts.values().map(Account::leaf_hash).collect();
        compute_merkle_root(&leaves)
    }

    /// Sum of all balances
    pub fn total_supply(&self) -> u128 {
        self.accounts.values().map(|a| a.balance as u128).sum()
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    pub fn accounts(&self) -> impl Iterator<Item = &Account> {
        self.accounts.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn funded() -> AccountState {
        let mut state = AccountState::new();
        state.set_balance("alice", 1_000);
        state.set_balance("bob", 500);
        state
    }

    #[test]
    fn test_unknown_account_is_zero() {
        let state = AccountState::new();
        assert_eq!(state.balance("nobody"), 0);
        assert_eq!(state.nonce("nobody"), 0);
    }

    #[test]
    fn test_transfer_moves_funds() {
        let mut state = funded();
        state.apply_transfer(&Transaction::new("alice", "bob", 100, 1)).unwrap();
        assert_eq!(state.balance("alice"), 900);
        assert_eq!(state.balance("bob"), 600);
        assert_eq!(state.nonce("alice"), 1);
        assert_eq!(state.nonce("bob"), 0);
    }

    #[test]
    fn test_transfer_creates_recipient() {
        let mut state = funded();
        state.apply_transfer(&Transaction::new("alice", "carol", 1, 1)).unwrap();
        assert_eq!(state.balance("carol"), 1);
        assert_eq!(state.len(), 3);
    }

    #[test]
    fn test_insufficient_balance_leaves_state_untouched() {
        let mut state = funded();
        let before = state.clone();
        let err = state.apply_transfer(&Transaction::new("alice", "bob", 5_000, 1)).unwrap_err();
        assert_eq!(err, TxError::InsufficientBalance { available: 1_000, required: 5_000 });
        assert_eq!(state, before);
    }

    #[test]
    fn test_nonce_must_be_sequential() {
        let mut state = funded();
        let err = state.apply_transfer(&Transaction::new("alice", "bob", 1, 2)).unwrap_err();
        assert_eq!(err, TxError::InvalidNonce { expected: 1, got: 2 });
        state.apply_transfer(&Transaction::new("alice", "bob", 1, 1)).unwrap();
        let replay = state.apply_transfer(&Transaction::new("alice", "bob", 1, 1)).unwrap_err();
        assert_eq!(replay, TxError::InvalidNonce { expected: 2, got: 1 });
    }

    #[test]
    fn test_overflow_rejected() {
        let mut state = funded();
        state.set_balance("bob", u64::MAX);
        let err = state.apply_transfer(&Transaction::new("alice", "bob", 1, 1)).unwrap_err();
        assert_eq!(err, TxError::BalanceOverflow);
    }

    #[test]
    fn test_root_independent_of_insertion_order() {
        let mut a = AccountState::new();
        a.set_balance("alice", 1);
        a.set_balance("bob", 2);
        let mut b = AccountState::new();
        b.set_balance("bob", 2);
        b.set_balance("alice", 1);
        assert_eq!(a.root(), b.root());
    }

    #[test]
    fn test_root_tracks_nonce() {
        let mut state = funded();
        let before = state.root();
        state.apply_transfer(&Transaction::new("alice", "bob", 1, 1)).unwrap();
        assert_ne!(state.root(), before);
    }

    #[test]
    fn test_supply_conserved_by_transfer() {
        let mut state = funded();
        let supply = state.total_supply();
        state.apply_transfer(&Transaction::new("bob", "alice", 250, 1)).unwrap();
        assert_eq!(state.total_supply(), supply);
    }
}
