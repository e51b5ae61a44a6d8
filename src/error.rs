// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Error Taxonomy
//!
//! One discriminated error type for the wallet core. Ledger-origin failures
//! keep their distinguishing kind so callers can decide between retrying
//! (`LedgerUnavailable`) and treating the result as final
//! (`InsufficientFunds`, `SubmissionFailed`).
//!
//! Validation and authorization failures are detected before any ledger
//! call; `ReconciliationPending` marks the one case where the ledger-side
//! transfer succeeded but the local mirror write did not, so an operator can
//! re-run the scanner instead of losing track of real funds movement.

use crate::ledger::LedgerError;
use crate::storage::DbError;

/// Errors returned by wallet-core operations.
#[derive(Debug, thiserror::Error)]
pub enum WalletError {
    /// Bad input shape: missing fields, non-positive amount, unconfirmed
    /// request, malformed address.
    #[error("validation error: {0}")]
    Validation(String),

    /// Wallet or transaction does not exist locally.
    #[error("not found: {0}")]
    NotFound(String),

    /// The authenticated caller does not own the resource.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Ledger balance below the requested amount at validation time.
    #[error("insufficient funds: balance {available} < requested {requested}")]
    InsufficientFunds { available: f64, requested: f64 },

    /// The ledger node could not be reached. Distinct from a confirmed
    /// zero balance; callers may retry.
    #[error("ledger unavailable: {0}")]
    LedgerUnavailable(String),

    /// Signing, broadcast, or nonce error reported by the ledger. Terminal
    /// for this submission; not retried (resubmission risks double spend).
    #[error("submission failed: {0}")]
    SubmissionFailed(String),

    /// Submitted but not confirmed within the configured bound. The ledger
    /// transaction may still confirm later; the scanner merge is the
    /// backstop that reconciles that case.
    #[error("confirmation timed out for transaction {hash}")]
    ConfirmationTimeout { hash: String },

    /// Freshly generated address collided with an existing wallet.
    #[error("duplicate address: {0}")]
    DuplicateAddress(String),

    /// Address generation kept colliding after a retry.
    #[error("address generation failed after retry")]
    AddressGenerationFailed,

    /// The ledger transfer succeeded but the local bookkeeping write
    /// failed. The transfer is real; re-run the scanner for this address.
    #[error("ledger transfer {hash} confirmed but local record failed: {source}")]
    ReconciliationPending { hash: String, source: DbError },

    /// Local persistence failure.
    #[error("storage error: {0}")]
    Storage(#[from] DbError),
}

impl From<LedgerError> for WalletError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::Unavailable(msg) => WalletError::LedgerUnavailable(msg),
            LedgerError::InvalidAddress(msg) => WalletError::Validation(msg),
            LedgerError::InvalidPrivateKey(msg) => WalletError::SubmissionFailed(msg),
            LedgerError::Submission(msg) => WalletError::SubmissionFailed(msg),
            LedgerError::ConfirmationTimeout { hash } => {
                WalletError::ConfirmationTimeout { hash }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ledger_unavailable_stays_distinguishable() {
        let err: WalletError = LedgerError::Unavailable("node down".to_string()).into();
        assert!(matches!(err, WalletError::LedgerUnavailable(_)));
    }

    #[test]
    fn confirmation_timeout_carries_hash() {
        let err: WalletError = LedgerError::ConfirmationTimeout {
            hash: "0xabc".to_string(),
        }
        .into();
        match err {
            WalletError::ConfirmationTimeout { hash } => assert_eq!(hash, "0xabc"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn insufficient_funds_message_names_amounts() {
        let err = WalletError::InsufficientFunds {
            available: 1.5,
            requested: 2.0,
        };
        let msg = err.to_string();
        assert!(msg.contains("1.5"));
        assert!(msg.contains("2"));
    }
}
