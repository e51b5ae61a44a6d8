// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Ledger Client
//!
//! Narrow abstraction over the external blockchain node: balance query,
//! address validation, signed-transfer submission, and a bounded
//! transaction-history scan. The node is a black box; any endpoint
//! supporting balance queries, raw signed-transaction broadcast, and block
//! enumeration satisfies the contract.
//!
//! Failure semantics: node unavailability is reported, not retried — retry
//! policy belongs to the caller. Signing failures are terminal for that
//! submission.

pub mod evm;

#[cfg(test)]
pub(crate) mod mock;

use chrono::{DateTime, Utc};

pub use evm::EvmLedgerClient;

use crate::models::TxStatus;

/// Freshly generated keypair. The private key is returned exactly once and
/// never persisted by the ledger client itself.
#[derive(Debug, Clone)]
pub struct NewAccount {
    /// Address derived from the public key.
    pub address: String,
    /// Hex-encoded private key, 0x-prefixed.
    pub private_key: String,
}

/// Result of a confirmed-or-settled transfer submission.
#[derive(Debug, Clone)]
pub struct TransferOutcome {
    /// Ledger transaction hash.
    pub hash: String,
    /// Block the transaction was included in.
    pub block_number: u64,
    /// Completed, or Failed when the ledger reverted the transaction.
    pub status: TxStatus,
}

/// One transaction observed during a history scan.
#[derive(Debug, Clone)]
pub struct LedgerTransaction {
    /// Ledger transaction hash.
    pub hash: String,
    /// Sender address.
    pub from: String,
    /// Recipient address.
    pub to: String,
    /// Amount in native units.
    pub amount: f64,
    /// Block timestamp.
    pub timestamp: DateTime<Utc>,
    /// Block the transaction was included in.
    pub block_number: u64,
}

/// Errors reported by the ledger client.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// Node unreachable or RPC failure. Never conflated with a zero
    /// balance.
    #[error("ledger node unavailable: {0}")]
    Unavailable(String),

    /// Address failed format/checksum validation.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// Private key malformed or mismatched with the sender address.
    #[error("invalid private key: {0}")]
    InvalidPrivateKey(String),

    /// Broadcast or ledger-side rejection (insufficient ledger funds,
    /// nonce conflict, revert).
    #[error("submission failed: {0}")]
    Submission(String),

    /// Broadcast succeeded but no confirmation arrived within the bound.
    /// Carries the hash so the caller can record the attempt; the scanner
    /// merge later reconciles a delayed confirmation.
    #[error("confirmation timed out for {hash}")]
    ConfirmationTimeout { hash: String },
}

/// Contract against the external ledger node.
///
/// Implementations must not retry internally and must not hold secret
/// material beyond the duration of a single call.
#[allow(async_fn_in_trait)]
pub trait LedgerClient: Send + Sync {
    /// Pure format/checksum validation of a ledger address. Never touches
    /// the network.
    fn validate_address(&self, address: &str) -> bool;

    /// Generate a new keypair. The address is derived deterministically
    /// from the public key per the ledger's addressing scheme.
    fn create_account(&self) -> Result<NewAccount, LedgerError>;

    /// Current confirmed balance in native units. Returns
    /// [`LedgerError::Unavailable`] when the node cannot be reached — a
    /// zero result always means a confirmed zero balance.
    async fn get_balance(&self, address: &str) -> Result<f64, LedgerError>;

    /// Build, sign, and broadcast a value transfer, then block until the
    /// ledger reports inclusion or the configured confirmation bound
    /// elapses.
    async fn submit_transfer(
        &self,
        from: &str,
        to: &str,
        amount: f64,
        private_key: &str,
    ) -> Result<TransferOutcome, LedgerError>;

    /// Walk ledger blocks newest-first collecting transactions touching
    /// `address`, capped at `limit` results or the configured block-depth
    /// horizon. Intentionally bounded, not exhaustive: callers must not
    /// assume completeness.
    async fn scan_history(
        &self,
        address: &str,
        limit: usize,
    ) -> Result<Vec<LedgerTransaction>, LedgerError>;
}
