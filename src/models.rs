// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Core Data Models
//!
//! Persisted entities and boundary types shared by the storage, transfer,
//! and scanner modules. Everything here is plain data: the storage layer
//! populates records by field name, never by column position.
//!
//! ## Trust Boundary
//!
//! [`WalletRecord`] (which carries the private key) is crate-internal and
//! only the storage layer handles it. Callers outside the crate get
//! [`Wallet`], which omits the key; the single sanctioned escape hatch is
//! `WalletStore::reveal_secret`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// Wallet Address Type
// =============================================================================

/// Ethereum-compatible wallet address wrapper.
///
/// Provides type safety for ledger addresses throughout the crate.
/// Format: `0x` followed by 40 hexadecimal characters (20 bytes).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WalletAddress(pub String);

impl WalletAddress {
    /// Lowercased form used as a storage and lock key.
    pub fn normalized(&self) -> String {
        self.0.to_lowercase()
    }
}

impl std::fmt::Display for WalletAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for WalletAddress {
    fn from(value: String) -> Self {
        WalletAddress(value)
    }
}

impl From<&str> for WalletAddress {
    fn from(value: &str) -> Self {
        WalletAddress(value.to_string())
    }
}

impl From<WalletAddress> for String {
    fn from(value: WalletAddress) -> Self {
        value.0
    }
}

// =============================================================================
// Wallet Models
// =============================================================================

/// Wallet row as persisted, including the custodial private key.
///
/// Crate-internal: never hand this to callers. The `cached_balance` field
/// mirrors the ledger and is reconciled on every read path; it is never the
/// source of truth.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct WalletRecord {
    /// Surrogate key (UUID), stable for the wallet's lifetime.
    pub wallet_id: String,
    /// User who owns this wallet.
    pub owner_user_id: String,
    /// Ledger address; globally unique, immutable once created.
    pub address: WalletAddress,
    /// Free-text label, mutable.
    pub label: String,
    /// Hex-encoded private key (0x-prefixed). Custodial secret material.
    pub private_key: String,
    /// Last-known mirror of the ledger balance, in native units.
    pub cached_balance: f64,
    /// When the wallet was created.
    pub created_at: DateTime<Utc>,
}

/// Wallet view returned to callers. Never includes the private key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wallet {
    /// Surrogate key (UUID).
    pub wallet_id: String,
    /// User who owns this wallet.
    pub owner_user_id: String,
    /// Ledger address.
    pub address: WalletAddress,
    /// Free-text label.
    pub label: String,
    /// Last-known mirror of the ledger balance, in native units.
    pub cached_balance: f64,
    /// When the wallet was created.
    pub created_at: DateTime<Utc>,
}

impl From<WalletRecord> for Wallet {
    fn from(record: WalletRecord) -> Self {
        Self {
            wallet_id: record.wallet_id,
            owner_user_id: record.owner_user_id,
            address: record.address,
            label: record.label,
            cached_balance: record.cached_balance,
            created_at: record.created_at,
        }
    }
}

// =============================================================================
// Transaction Models
// =============================================================================

/// Transaction status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxStatus {
    /// Submitted but not yet confirmed.
    Pending,
    /// Confirmed in a block.
    Completed,
    /// Failed, reverted, or timed out waiting for confirmation.
    Failed,
}

impl Default for TxStatus {
    fn default() -> Self {
        Self::Pending
    }
}

/// Kind of value movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxKind {
    /// Wallet-to-wallet transfer.
    Transfer,
    /// Credit from the service-controlled funding account.
    Deposit,
}

/// Local mirror of one observed or self-initiated ledger transaction.
///
/// Not authoritative: the ledger is the system of record. `hash` is unique
/// where present and is the dedup key for the reconciliation scanner; it is
/// `None` only for submissions that failed before a hash existed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionRecord {
    /// Surrogate key (UUID).
    pub tx_id: String,
    /// Sender address.
    pub from_address: WalletAddress,
    /// Recipient address.
    pub to_address: WalletAddress,
    /// Amount in native units. Always positive.
    pub amount: f64,
    /// When the transaction was recorded or observed.
    pub timestamp: DateTime<Utc>,
    /// Transfer or deposit.
    pub kind: TxKind,
    /// Current status.
    pub status: TxStatus,
    /// Ledger transaction hash; unique when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    /// Block number, once confirmed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_number: Option<u64>,
}

impl TransactionRecord {
    /// Build a completed record from a confirmed ledger submission.
    pub fn completed(
        from_address: WalletAddress,
        to_address: WalletAddress,
        amount: f64,
        kind: TxKind,
        hash: String,
        block_number: u64,
    ) -> Self {
        Self {
            tx_id: uuid::Uuid::new_v4().to_string(),
            from_address,
            to_address,
            amount,
            timestamp: Utc::now(),
            kind,
            status: TxStatus::Completed,
            hash: Some(hash),
            block_number: Some(block_number),
        }
    }

    /// Build a failed record for a submission that did not confirm.
    ///
    /// `hash` is present when the transaction was broadcast before the
    /// failure (e.g. confirmation timeout) and absent for signing or
    /// broadcast errors.
    pub fn failed(
        from_address: WalletAddress,
        to_address: WalletAddress,
        amount: f64,
        kind: TxKind,
        hash: Option<String>,
    ) -> Self {
        Self {
            tx_id: uuid::Uuid::new_v4().to_string(),
            from_address,
            to_address,
            amount,
            timestamp: Utc::now(),
            kind,
            status: TxStatus::Failed,
            hash,
            block_number: None,
        }
    }
}

// =============================================================================
// User Models
// =============================================================================

/// Minimal user identity owning zero or more wallets.
///
/// Authentication and session issuance happen outside this crate; the user
/// row exists so wallets have a durable owner reference and emails stay
/// unique.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    /// Surrogate key (UUID).
    pub user_id: String,
    /// Display name.
    pub name: String,
    /// Unique email address.
    pub email: String,
    /// Opaque credential hash, produced and verified by the embedder.
    pub credential_hash: String,
    /// When the user registered.
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wallet_view_omits_private_key() {
        let record = WalletRecord {
            wallet_id: "w-1".to_string(),
            owner_user_id: "u-1".to_string(),
            address: WalletAddress::from("0xAbC"),
            label: "Main".to_string(),
            private_key: "0xsecret".to_string(),
            cached_balance: 1.5,
            created_at: Utc::now(),
        };

        let view = Wallet::from(record);
        let json = serde_json::to_string(&view).unwrap();
        assert!(!json.contains("secret"));
        assert!(json.contains("0xAbC"));
    }

    #[test]
    fn address_normalization_lowercases() {
        let addr = WalletAddress::from("0xAbCd1234");
        assert_eq!(addr.normalized(), "0xabcd1234");
        assert_eq!(addr.to_string(), "0xAbCd1234");
    }

    #[test]
    fn failed_record_keeps_optional_hash() {
        let tx = TransactionRecord::failed(
            "0xa".into(),
            "0xb".into(),
            2.0,
            TxKind::Transfer,
            Some("0xdead".to_string()),
        );
        assert_eq!(tx.status, TxStatus::Failed);
        assert_eq!(tx.hash.as_deref(), Some("0xdead"));
        assert!(tx.block_number.is_none());
    }
}
