//! Transaction structure and stateless validation
//!
//! Account-based transfers. Fees are always zero on this ledger.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use crate::crypto::{hash_bytes, put_str, Hash};

/// Transaction rule violations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TxError {
    #[error("transaction amount must be greater than zero")]
    ZeroAmount,
    #[error("transaction fee must be zero, got {0}")]
    NonZeroFee(u64),
    #[error("sender and recipient addresses must be non-empty")]
    EmptyAddress,
    #[error("sender and recipient must differ")]
    SelfTransfer,
    #[error("transaction too large: {size} > {max} bytes")]
    TooLarge { size: usize, max: usize },
    #[error("insufficient balance: {available} < {required}")]
    InsufficientBalance { available: u64, required: u64 },
    #[error("invalid nonce: expected {expected}, got {got}")]
    InvalidNonce { expected: u64, got: u64 },
    #[error("recipient balance would overflow")]
    BalanceOverflow,
}

/// A value transfer between two accounts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub from: String,
    pub to: String,
    pub amount: u64,
    #[serde(default)]
    pub fee: u64,
    #[serde(default)]
    pub timestamp: u64,
    pub nonce: u64,
    /// Opaque signature bytes, base64 in JSON
    #[serde(default, with = "crate::codec::base64_opt")]
    pub signature: Option<Vec<u8>>,
}

impl Transaction {
    /// Create an unsigned zero-fee transfer
    pub fn new(from: impl Into<String>, to: impl Into<String>, amount: u64, nonce: u64) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            amount,
            fee: 0,
            timestamp: 0,
            nonce,
            signature: None,
        }
    }

    pub fn with_timestamp(mut self, timestamp: u64) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Transaction id. The signature is not part of the id.
    pub fn hash(&self) -> Hash {
        hash_bytes(&self.to_bytes_for_signing())
    }

    fn to_bytes_for_signing(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(64 + self.from.len() + self.to.len());
        put_str(&mut bytes, &self.from);
        put_str(&mut bytes, &self.to);
        bytes.extend_from_slice(&self.amount.to_le_bytes());
        bytes.extend_from_slice(&self.fee.to_le_bytes());
        bytes.extend_from_slice(&self.timestamp.to_le_bytes());
        bytes.extend_from_slice(&self.nonce.to_le_bytes());
        bytes
    }

    /// Encoded size used for the admission size limit
    pub fn encoded_size(&self) -> usize {
        bincode::serialized_size(self)
            .map(|n| n as usize)
            .unwrap_or(usize::MAX)
    }

    /// Checks that need no account state
    pub fn check_stateless(&self, max_bytes: usize) -> Result<(), TxError> {
        if self.amount == 0 {
            return Err(TxError::ZeroAmount);
        }
        if self.fee != 0 {
            return Err(TxError::NonZeroFee(self.fee));
        }
        if self.from.is_empty() || self.to.is_empty() {
            return Err(TxError::EmptyAddress);
        }
        if self.from == self.to {
            return Err(TxError::SelfTransfer);
        }
        let size = self.encoded_size();
        if size > max_bytes {
            return Err(TxError::TooLarge { size, max: max_bytes });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAX: usize = 4096;

    #[test]
    fn test_valid_transaction_passes() {
        let tx = Transaction::new("alice", "bob", 100, 1);
        assert!(tx.check_stateless(MAX).is_ok());
    }

    #[test]
    fn test_zero_amount_rejected() {
        let tx = Transaction::new("alice", "bob", 0, 1);
        assert_eq!(tx.check_stateless(MAX), Err(TxError::ZeroAmount));
    }

    #[test]
    fn test_fee_must_be_zero() {
        let mut tx = Transaction::new("alice", "bob", 10, 1);
        tx.fee = 5;
        assert_eq!(tx.check_stateless(MAX), Err(TxError::NonZeroFee(5)));
    }

    #[test]
    fn test_self_transfer_rejected() {
        let tx = Transaction::new("alice", "alice", 10, 1);
        assert_eq!(tx.check_stateless(MAX), Err(TxError::SelfTransfer));
    }

    #[test]
    fn test_empty_address_rejected() {
        let tx = Transaction::new("", "bob", 10, 1);
        assert_eq!(tx.check_stateless(MAX), Err(TxError::EmptyAddress));
    }

    #[test]
    fn test_oversized_rejected() {
        let tx = Transaction::new("a".repeat(200), "bob", 10, 1);
        assert!(matches!(tx.check_stateless(64), Err(TxError::TooLarge { .. })));
    }

    #[test]
    fn test_hash_ignores_signature() {
        let tx1 = Transaction::new("alice", "bob", 10, 1);
        let mut tx2 = tx1.clone();
        tx2.signature = Some(vec![1, 2, 3]);
        assert_eq!(tx1.hash(), tx2.hash());
    }

    #[test]
    fn test_hash_covers_nonce() {
        let tx1 = Transaction::new("alice", "bob", 10, 1);
        let tx2 = Transaction::new("alice", "bob", 10, 2);
        assert_ne!(tx1.hash(), tx2.hash());
    }

    #[test]
    fn test_json_signature_is_base64() {
        let mut tx = Transaction::new("alice", "bob", 10, 1);
        tx.signature = Some(vec![0xde, 0xad, 0xbe, 0xef]);
        let json = serde_json::to_value(&tx).unwrap();
        assert_eq!(json["signature"], "3q2+7w==");
        let back: Transaction = serde_json::from_value(json).unwrap();
        assert_eq!(back, tx);
    }

    #[test]
    fn test_bincode_roundtrip_with_signature() {
        let mut tx = Transaction::new("alice", "bob", 10, 1);
        tx.signature = Some(vec![9; 64]);
        let bytes = bincode::serialize(&tx).unwrap();
        let back: Transaction = bincode::deserialize(&bytes).unwrap();
        assert_eq!(back, tx);
    }

    #[test]
    fn test_minimal_json_defaults() {
        let tx: Transaction =
            serde_json::from_str(r#"{"from":"alice","to":"bob","amount":5,"nonce":1}"#).unwrap();
        assert_eq!(tx.fee, 0);
        assert_eq!(tx.timestamp, 0);
        assert!(tx.signature.is_none());
    }
}
