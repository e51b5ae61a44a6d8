// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Transfer Coordinator
//!
//! Orchestrates wallet-to-wallet transfers and funding-account deposits
//! against the ledger, with the local database as the bookkeeping mirror.
//!
//! ## Lifecycle
//!
//! A transfer moves through validation, submission, and settlement:
//! cheap structural checks run first (no ledger round trips), ownership
//! next, and the live balance check last, already inside the sender's
//! address lock. The lock stays held through submission and the sender
//! balance write-back, which closes the race where two transfers both
//! pass the funds check against the same balance.
//!
//! ## Failure Bookkeeping
//!
//! Failed submissions leave a `failed` row: with the hash when the
//! transaction was broadcast (confirmation timeout), without one when it
//! never left this process. A timed-out transaction that later confirms
//! is reconciled by the history scanner, which promotes the row. If the
//! ledger transfer succeeds but the local write fails, the caller gets
//! [`WalletError::ReconciliationPending`] carrying the hash — funds moved
//! and the mirror must catch up via a scan, not a retry.

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::WalletError;
use crate::ledger::{LedgerClient, LedgerError, TransferOutcome};
use crate::locks::AddressLocks;
use crate::models::{TransactionRecord, TxKind, WalletAddress};
use crate::storage::{BalanceCache, WalletDatabase};

/// A transfer as requested by a caller, before validation.
#[derive(Debug, Clone)]
pub struct TransferRequest {
    /// Sender wallet address. Must be a locally custodied wallet.
    pub from_address: String,
    /// Recipient address. Any valid ledger address.
    pub to_address: String,
    /// Amount in native units. Must be positive.
    pub amount: f64,
    /// Explicit caller acknowledgement. Transfers are irreversible;
    /// nothing is submitted until this is set.
    pub confirmed: bool,
}

/// Outcome of a settled transfer, including the sender's post-transfer
/// balance so callers need no follow-up read.
#[derive(Debug, Clone)]
pub struct TransferReceipt {
    /// The recorded transaction row.
    pub transaction: TransactionRecord,
    /// Sender balance after settlement, freshly read from the ledger.
    pub sender_balance: f64,
}

/// Coordinates balance checks, submission, and bookkeeping for value
/// movements.
pub struct TransferCoordinator<L: LedgerClient> {
    db: Arc<WalletDatabase>,
    ledger: Arc<L>,
    cache: Arc<BalanceCache>,
    locks: Arc<AddressLocks>,
    funding: Option<(String, String)>,
}

impl<L: LedgerClient> TransferCoordinator<L> {
    pub fn new(
        db: Arc<WalletDatabase>,
        ledger: Arc<L>,
        cache: Arc<BalanceCache>,
        locks: Arc<AddressLocks>,
        config: &Config,
    ) -> Self {
        let funding = match (&config.funding_address, &config.funding_private_key) {
            (Some(address), Some(key)) => Some((address.clone(), key.clone())),
            _ => None,
        };
        Self {
            db,
            ledger,
            cache,
            locks,
            funding,
        }
    }

    // =========================================================================
    // Transfers
    // =========================================================================

    /// Execute a wallet-to-wallet transfer on behalf of
    /// `caller_user_id`.
    ///
    /// Validation order is cheapest-first; the ledger is not contacted
    /// until everything structural and local has passed. The live funds
    /// check and the submission run under the sender's address lock.
    pub async fn transfer(
        &self,
        request: &TransferRequest,
        caller_user_id: &str,
    ) -> Result<TransferReceipt, WalletError> {
        if request.from_address.trim().is_empty() || request.to_address.trim().is_empty() {
            return Err(WalletError::Validation(
                "sender and recipient addresses are required".into(),
            ));
        }
        if !request.confirmed {
            return Err(WalletError::Validation(
                "transfer must be explicitly confirmed".into(),
            ));
        }
        if !request.amount.is_finite() || request.amount <= 0.0 {
            return Err(WalletError::Validation(
                "transfer amount must be positive".into(),
            ));
        }
        if !self.ledger.validate_address(&request.to_address) {
            return Err(WalletError::Validation(format!(
                "invalid recipient address {}",
                request.to_address
            )));
        }
        if request.from_address.eq_ignore_ascii_case(&request.to_address) {
            return Err(WalletError::Validation(
                "sender and recipient must differ".into(),
            ));
        }

        let sender = self
            .db
            .get_wallet_by_address(&request.from_address)?
            .ok_or_else(|| {
                WalletError::NotFound(format!("wallet with address {}", request.from_address))
            })?;
        if sender.owner_user_id != caller_user_id {
            return Err(WalletError::Unauthorized(format!(
                "wallet {} is not owned by the caller",
                sender.wallet_id
            )));
        }

        let from = sender.address.normalized();
        let to = request.to_address.to_lowercase();

        // Funds check, submission, and sender write-back are one critical
        // section per sender address.
        let sender_lock = self.locks.lock_for(&from).await;
        let guard = sender_lock.lock().await;

        let available = self.ledger.get_balance(&from).await?;
        if available < request.amount {
            return Err(WalletError::InsufficientFunds {
                available,
                requested: request.amount,
            });
        }

        let outcome = self
            .submit_and_record(
                &from,
                &to,
                request.amount,
                &sender.private_key,
                TxKind::Transfer,
            )
            .await?;

        let sender_balance = self.refresh_balance(&from).await;
        drop(guard);

        // Recipient refresh happens outside the sender lock; the two
        // locks are never held together.
        self.refresh_recipient(&to).await;

        info!(
            hash = %outcome.hash,
            from = %from,
            to = %to,
            amount = request.amount,
            "Transfer settled"
        );

        let transaction = self
            .db
            .get_transaction_by_hash(&outcome.hash)?
            .ok_or_else(|| WalletError::NotFound(format!("transaction {}", outcome.hash)))?;

        Ok(TransferReceipt {
            transaction,
            sender_balance,
        })
    }

    /// Credit a wallet from the service-controlled funding account.
    ///
    /// The recipient must be a locally custodied wallet owned by the
    /// caller; the funding account needs no ownership check, it belongs
    /// to the service.
    pub async fn deposit(
        &self,
        to_address: &str,
        amount: f64,
        caller_user_id: &str,
    ) -> Result<TransferReceipt, WalletError> {
        let (funding_address, funding_key) = self.funding.clone().ok_or_else(|| {
            WalletError::Validation("no funding account is configured".into())
        })?;

        if !amount.is_finite() || amount <= 0.0 {
            return Err(WalletError::Validation(
                "deposit amount must be positive".into(),
            ));
        }
        if !self.ledger.validate_address(to_address) {
            return Err(WalletError::Validation(format!(
                "invalid recipient address {to_address}"
            )));
        }

        let recipient = self
            .db
            .get_wallet_by_address(to_address)?
            .ok_or_else(|| WalletError::NotFound(format!("wallet with address {to_address}")))?;
        if recipient.owner_user_id != caller_user_id {
            return Err(WalletError::Unauthorized(format!(
                "wallet {} is not owned by the caller",
                recipient.wallet_id
            )));
        }

        let from = funding_address.to_lowercase();
        let to = recipient.address.normalized();

        let funding_lock = self.locks.lock_for(&from).await;
        let guard = funding_lock.lock().await;

        let available = self.ledger.get_balance(&from).await?;
        if available < amount {
            return Err(WalletError::InsufficientFunds {
                available,
                requested: amount,
            });
        }

        let outcome = self
            .submit_and_record(&from, &to, amount, &funding_key, TxKind::Deposit)
            .await?;
        drop(guard);

        let recipient_balance = {
            let lock = self.locks.lock_for(&to).await;
            let _guard = lock.lock().await;
            self.refresh_balance(&to).await
        };

        info!(hash = %outcome.hash, to = %to, amount, "Deposit settled");

        let transaction = self
            .db
            .get_transaction_by_hash(&outcome.hash)?
            .ok_or_else(|| WalletError::NotFound(format!("transaction {}", outcome.hash)))?;

        Ok(TransferReceipt {
            transaction,
            sender_balance: recipient_balance,
        })
    }

    // =========================================================================
    // Internals
    // =========================================================================

    /// Submit to the ledger and write the bookkeeping row for the result,
    /// success or failure.
    async fn submit_and_record(
        &self,
        from: &str,
        to: &str,
        amount: f64,
        private_key: &str,
        kind: TxKind,
    ) -> Result<TransferOutcome, WalletError> {
        let from_addr = WalletAddress::from(from);
        let to_addr = WalletAddress::from(to);

        match self.ledger.submit_transfer(from, to, amount, private_key).await {
            Ok(outcome) => {
                // Funds moved the moment the ledger confirmed; drop the
                // stale cached balances before any bookkeeping that could
                // still fail.
                self.cache.invalidate(from);
                self.cache.invalidate(to);

                let record = TransactionRecord::completed(
                    from_addr,
                    to_addr,
                    amount,
                    kind,
                    outcome.hash.clone(),
                    outcome.block_number,
                );
                if let Err(source) = self.db.record_transaction(&record) {
                    error!(hash = %outcome.hash, error = %source, "Ledger transfer confirmed but local record failed");
                    return Err(WalletError::ReconciliationPending {
                        hash: outcome.hash,
                        source,
                    });
                }
                Ok(outcome)
            }
            Err(LedgerError::ConfirmationTimeout { hash }) => {
                // Broadcast happened and may still confirm; the cached
                // balances are suspect from here on.
                self.cache.invalidate(from);
                self.cache.invalidate(to);

                // Keep the hash so the scanner can promote this row if
                // the transaction confirms late.
                let record = TransactionRecord::failed(
                    from_addr,
                    to_addr,
                    amount,
                    kind,
                    Some(hash.clone()),
                );
                if let Err(err) = self.db.record_transaction(&record) {
                    error!(hash = %hash, error = %err, "Failed to record timed-out transfer");
                }
                warn!(hash = %hash, "Transfer confirmation timed out");
                Err(WalletError::ConfirmationTimeout { hash })
            }
            Err(LedgerError::Unavailable(msg)) => {
                // Nothing was broadcast; no row to write.
                Err(WalletError::LedgerUnavailable(msg))
            }
            Err(err) => {
                let record =
                    TransactionRecord::failed(from_addr, to_addr, amount, kind, None);
                if let Err(db_err) = self.db.record_transaction(&record) {
                    error!(error = %db_err, "Failed to record rejected transfer");
                }
                warn!(from = %from, to = %to, error = %err, "Transfer submission failed");
                Err(err.into())
            }
        }
    }

    /// Re-read one address's balance from the ledger and push it into the
    /// row and cache. Caller holds the address lock. Degrades silently on
    /// an unreachable node; settlement already happened.
    async fn refresh_balance(&self, address: &str) -> f64 {
        match self.ledger.get_balance(address).await {
            Ok(balance) => {
                if let Err(err) = self.db.set_cached_balance(address, balance) {
                    warn!(address = %address, error = %err, "Post-transfer balance write-back failed");
                }
                self.cache.put(address, balance);
                balance
            }
            Err(err) => {
                warn!(address = %address, error = %err, "Post-transfer balance refresh failed");
                self.cache.invalidate(address);
                match self.db.get_wallet_by_address(address) {
                    Ok(Some(wallet)) => wallet.cached_balance,
                    _ => 0.0,
                }
            }
        }
    }

    async fn refresh_recipient(&self, address: &str) {
        // External recipients have no local row; skip the RPC entirely.
        match self.db.get_wallet_by_address(address) {
            Ok(Some(_)) => {
                let lock = self.locks.lock_for(address).await;
                let _guard = lock.lock().await;
                self.refresh_balance(address).await;
            }
            Ok(None) => {}
            Err(err) => {
                warn!(address = %address, error = %err, "Recipient lookup failed after transfer");
            }
        }
    }
}
