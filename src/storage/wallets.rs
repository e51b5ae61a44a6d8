// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Wallet Store
//!
//! Wallet lifecycle and the balance reconciliation read path. Every read
//! returns a [`Wallet`] whose `cached_balance` has been refreshed against
//! the ledger: cache hit first, then one RPC, then a write-back when the
//! stored mirror has drifted beyond the configured epsilon.
//!
//! When the ledger node is unreachable, reads degrade to the stored mirror
//! with a warning instead of failing. The mirror is presentation data;
//! anything that moves funds re-checks the live balance itself.
//!
//! Ownership is enforced here, at the lowest layer that still knows the
//! caller: every accessor takes the requesting user id and compares it
//! against the wallet's owner before touching the row.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::error::WalletError;
use crate::ledger::{LedgerClient, LedgerError};
use crate::locks::AddressLocks;
use crate::models::{Wallet, WalletRecord};
use crate::storage::{BalanceCache, DbError, WalletDatabase};

/// Wallet repository bound to a ledger client for balance reconciliation.
pub struct WalletStore<L: LedgerClient> {
    db: Arc<WalletDatabase>,
    ledger: Arc<L>,
    cache: Arc<BalanceCache>,
    locks: Arc<AddressLocks>,
    balance_epsilon: f64,
}

impl<L: LedgerClient> WalletStore<L> {
    pub fn new(
        db: Arc<WalletDatabase>,
        ledger: Arc<L>,
        cache: Arc<BalanceCache>,
        locks: Arc<AddressLocks>,
        config: &Config,
    ) -> Self {
        Self {
            db,
            ledger,
            cache,
            locks,
            balance_epsilon: config.balance_epsilon,
        }
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Create a wallet for `owner_user_id` with a freshly generated
    /// keypair.
    ///
    /// Address collisions are astronomically unlikely but checked anyway;
    /// one regeneration is attempted before giving up. The uniqueness
    /// check that counts is the one inside the insert transaction, so a
    /// concurrent racer cannot slip a duplicate through.
    pub async fn create_wallet(
        &self,
        owner_user_id: &str,
        label: &str,
    ) -> Result<Wallet, WalletError> {
        if label.trim().is_empty() {
            return Err(WalletError::Validation("wallet label is required".into()));
        }

        let mut account = self.ledger.create_account()?;
        for attempt in 0..2 {
            if self.db.address_exists(&account.address)? {
                warn!(address = %account.address, attempt, "Generated address already registered, regenerating");
                account = self.ledger.create_account()?;
                continue;
            }

            let record = WalletRecord {
                wallet_id: Uuid::new_v4().to_string(),
                owner_user_id: owner_user_id.to_string(),
                address: account.address.clone().into(),
                label: label.to_string(),
                private_key: account.private_key.clone(),
                cached_balance: 0.0,
                created_at: Utc::now(),
            };

            match self.db.insert_wallet(&record) {
                Ok(()) => {
                    info!(wallet_id = %record.wallet_id, address = %record.address, "Wallet created");
                    return Ok(record.into());
                }
                Err(DbError::AlreadyExists(_)) if attempt == 0 => {
                    account = self.ledger.create_account()?;
                }
                Err(err) => return Err(err.into()),
            }
        }

        Err(WalletError::AddressGenerationFailed)
    }

    /// Rename a wallet. The address and key are immutable.
    pub async fn update_label(
        &self,
        wallet_id: &str,
        requester_user_id: &str,
        label: &str,
    ) -> Result<Wallet, WalletError> {
        if label.trim().is_empty() {
            return Err(WalletError::Validation("wallet label is required".into()));
        }
        let mut record = self.owned_record(wallet_id, requester_user_id)?;
        record.label = label.to_string();
        self.db.update_wallet(&record)?;
        Ok(record.into())
    }

    /// Remove the local wallet row. Funds at the address remain on the
    /// ledger; only the custodial bookkeeping (and the key) are dropped.
    pub async fn delete_wallet(
        &self,
        wallet_id: &str,
        requester_user_id: &str,
    ) -> Result<(), WalletError> {
        let record = self.owned_record(wallet_id, requester_user_id)?;
        self.db.delete_wallet(wallet_id)?;
        self.cache.invalidate(&record.address.normalized());
        info!(wallet_id, address = %record.address, "Wallet deleted");
        Ok(())
    }

    // =========================================================================
    // Reads (balance-reconciled)
    // =========================================================================

    /// Fetch a wallet by id with a reconciled balance.
    pub async fn get_wallet(
        &self,
        wallet_id: &str,
        requester_user_id: &str,
    ) -> Result<Wallet, WalletError> {
        let record = self.owned_record(wallet_id, requester_user_id)?;
        Ok(self.reconciled(record).await)
    }

    /// Fetch a wallet by ledger address with a reconciled balance.
    pub async fn get_wallet_by_address(
        &self,
        address: &str,
        requester_user_id: &str,
    ) -> Result<Wallet, WalletError> {
        let record = self
            .db
            .get_wallet_by_address(address)?
            .ok_or_else(|| WalletError::NotFound(format!("wallet with address {address}")))?;
        if record.owner_user_id != requester_user_id {
            return Err(WalletError::Unauthorized(format!(
                "wallet with address {address} is not owned by the requester"
            )));
        }
        Ok(self.reconciled(record).await)
    }

    /// All wallets owned by the requester, newest-first, each with a
    /// reconciled balance.
    pub async fn list_wallets(
        &self,
        requester_user_id: &str,
    ) -> Result<Vec<Wallet>, WalletError> {
        let records = self.db.list_wallets_by_owner(requester_user_id)?;
        let mut wallets = Vec::with_capacity(records.len());
        for record in records {
            wallets.push(self.reconciled(record).await);
        }
        Ok(wallets)
    }

    // =========================================================================
    // Secret Material
    // =========================================================================

    /// Reveal the custodial private key.
    ///
    /// Permitted for the owner, or for a requester whose email appears in
    /// `shared_with` (a list the owner supplied). Every reveal, granted or
    /// denied, leaves an audit line.
    pub async fn reveal_secret(
        &self,
        wallet_id: &str,
        requester_user_id: &str,
        shared_with: &[String],
    ) -> Result<String, WalletError> {
        let record = self
            .db
            .get_wallet(wallet_id)?
            .ok_or_else(|| WalletError::NotFound(format!("wallet {wallet_id}")))?;

        let permitted = if record.owner_user_id == requester_user_id {
            true
        } else {
            match self.db.get_user(requester_user_id)? {
                Some(user) => shared_with
                    .iter()
                    .any(|email| email.eq_ignore_ascii_case(&user.email)),
                None => false,
            }
        };

        if !permitted {
            warn!(wallet_id, requester = requester_user_id, "Private key reveal denied");
            return Err(WalletError::Unauthorized(format!(
                "wallet {wallet_id} key is not shared with the requester"
            )));
        }

        info!(wallet_id, requester = requester_user_id, "Private key revealed");
        Ok(record.private_key)
    }

    // =========================================================================
    // Internals
    // =========================================================================

    pub(crate) fn owned_record(
        &self,
        wallet_id: &str,
        requester_user_id: &str,
    ) -> Result<WalletRecord, WalletError> {
        let record = self
            .db
            .get_wallet(wallet_id)?
            .ok_or_else(|| WalletError::NotFound(format!("wallet {wallet_id}")))?;
        if record.owner_user_id != requester_user_id {
            return Err(WalletError::Unauthorized(format!(
                "wallet {wallet_id} is not owned by the requester"
            )));
        }
        Ok(record)
    }

    /// Refresh a record's balance mirror against the ledger.
    ///
    /// Cache hit short-circuits the RPC. On a fresh read the whole
    /// query-then-write-back sequence runs under the address lock: a
    /// balance snapshot taken before a concurrent transfer settles must
    /// not land its stale value in the row or cache after the transfer's
    /// own write-back. An unreachable node degrades to the stored mirror.
    async fn reconciled(&self, mut record: WalletRecord) -> Wallet {
        let address = record.address.normalized();

        if let Some(balance) = self.cache.get(&address) {
            record.cached_balance = balance;
            return record.into();
        }

        let lock = self.locks.lock_for(&address).await;
        let _guard = lock.lock().await;

        // A transfer or another reader may have filled the cache while
        // this read waited on the lock.
        if let Some(balance) = self.cache.get(&address) {
            record.cached_balance = balance;
            return record.into();
        }

        match self.ledger.get_balance(&address).await {
            Ok(balance) => {
                if (balance - record.cached_balance).abs() > self.balance_epsilon {
                    if let Err(err) = self.db.set_cached_balance(&address, balance) {
                        warn!(address = %address, error = %err, "Balance write-back failed");
                    }
                }
                self.cache.put(&address, balance);
                record.cached_balance = balance;
            }
            Err(LedgerError::Unavailable(msg)) => {
                warn!(address = %address, error = %msg, "Ledger unreachable, serving stored balance");
            }
            Err(err) => {
                warn!(address = %address, error = %err, "Balance refresh failed, serving stored balance");
            }
        }
        record.into()
    }
}
