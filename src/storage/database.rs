// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Embedded wallet database backed by redb (pure Rust, ACID).
//!
//! ## Table Layout
//!
//! - `wallets`: wallet_id → serialized WalletRecord
//! - `wallet_address_index`: lowercase address → wallet_id (address
//!   uniqueness enforcement point)
//! - `transactions`: tx_id → serialized TransactionRecord
//! - `tx_hash_index`: ledger hash → tx_id (hash dedup enforcement point)
//! - `wallet_tx_index`: composite key (address|!timestamp|tx_id) → tx_id
//!   for newest-first per-address listing
//! - `users`: user_id → serialized UserRecord
//! - `user_email_index`: lowercase email → user_id
//!
//! All tables are created once at open time. Uniqueness checks happen
//! inside the same write transaction as the insert, so concurrent callers
//! cannot race a check-then-insert.

use std::path::Path;

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};

use crate::models::{TransactionRecord, TxKind, TxStatus, UserRecord, WalletRecord};

// =============================================================================
// Table Definitions
// =============================================================================

const WALLETS: TableDefinition<&str, &[u8]> = TableDefinition::new("wallets");
const WALLET_ADDRESS_INDEX: TableDefinition<&str, &str> =
    TableDefinition::new("wallet_address_index");
const TRANSACTIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("transactions");
const TX_HASH_INDEX: TableDefinition<&str, &str> = TableDefinition::new("tx_hash_index");
/// Key format: `address|!timestamp_be|tx_id` for descending-time range scans.
const WALLET_TX_INDEX: TableDefinition<&[u8], &str> = TableDefinition::new("wallet_tx_index");
const USERS: TableDefinition<&str, &[u8]> = TableDefinition::new("users");
const USER_EMAIL_INDEX: TableDefinition<&str, &str> = TableDefinition::new("user_email_index");

// =============================================================================
// Error Type
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("redb error: {0}")]
    Redb(#[from] redb::Error),

    #[error("redb database error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("redb transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("redb table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("redb storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("redb commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("not found: {0}")]
    NotFound(String),
}

pub type DbResult<T> = Result<T, DbError>;

/// What a scanner merge did with one ledger transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// No local row for this hash existed; one was inserted.
    Inserted,
    /// A stale local `failed` row was promoted to `completed`.
    Updated,
    /// A local row existed and stays authoritative.
    Unchanged,
}

// =============================================================================
// Index Key Helpers
// =============================================================================

/// Composite key for the wallet_tx_index table.
///
/// The inverted timestamp makes forward range scans yield newest-first.
fn make_index_key(address: &str, timestamp: i64, tx_id: &str) -> Vec<u8> {
    let addr = address.to_lowercase();
    let mut key = Vec::with_capacity(addr.len() + 1 + 8 + 1 + tx_id.len());
    key.extend_from_slice(addr.as_bytes());
    key.push(b'|');
    key.extend_from_slice(&(!timestamp as u64).to_be_bytes());
    key.push(b'|');
    key.extend_from_slice(tx_id.as_bytes());
    key
}

fn make_prefix(address: &str) -> Vec<u8> {
    let addr = address.to_lowercase();
    let mut prefix = Vec::with_capacity(addr.len() + 1);
    prefix.extend_from_slice(addr.as_bytes());
    prefix.push(b'|');
    prefix
}

fn make_prefix_end(address: &str) -> Vec<u8> {
    let mut end = make_prefix(address);
    end.extend_from_slice(&[0xFF; 20]);
    end
}

// =============================================================================
// WalletDatabase
// =============================================================================

/// Embedded ACID database holding wallets, transactions, and users.
pub struct WalletDatabase {
    db: Database,
}

impl WalletDatabase {
    /// Open (or create) the database at the given path.
    ///
    /// Schema setup runs exactly once here, idempotently — repositories
    /// never probe or alter tables afterwards.
    pub fn open(path: &Path) -> DbResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let db = Database::create(path)?;

        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(WALLETS)?;
            let _ = write_txn.open_table(WALLET_ADDRESS_INDEX)?;
            let _ = write_txn.open_table(TRANSACTIONS)?;
            let _ = write_txn.open_table(TX_HASH_INDEX)?;
            let _ = write_txn.open_table(WALLET_TX_INDEX)?;
            let _ = write_txn.open_table(USERS)?;
            let _ = write_txn.open_table(USER_EMAIL_INDEX)?;
        }
        write_txn.commit()?;

        Ok(Self { db })
    }

    // =========================================================================
    // Wallets
    // =========================================================================

    /// Insert a new wallet. Fails with `AlreadyExists` if the address is
    /// already registered — the check and the insert share one write
    /// transaction.
    pub(crate) fn insert_wallet(&self, wallet: &WalletRecord) -> DbResult<()> {
        let json = serde_json::to_vec(wallet)?;
        let addr_key = wallet.address.normalized();

        let write_txn = self.db.begin_write()?;
        {
            let mut addr_table = write_txn.open_table(WALLET_ADDRESS_INDEX)?;
            if addr_table.get(addr_key.as_str())?.is_some() {
                return Err(DbError::AlreadyExists(format!(
                    "wallet address {}",
                    wallet.address
                )));
            }
            addr_table.insert(addr_key.as_str(), wallet.wallet_id.as_str())?;

            let mut wallet_table = write_txn.open_table(WALLETS)?;
            wallet_table.insert(wallet.wallet_id.as_str(), json.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Whether any wallet already claims this address.
    pub fn address_exists(&self, address: &str) -> DbResult<bool> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(WALLET_ADDRESS_INDEX)?;
        Ok(table.get(address.to_lowercase().as_str())?.is_some())
    }

    pub(crate) fn get_wallet(&self, wallet_id: &str) -> DbResult<Option<WalletRecord>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(WALLETS)?;
        match table.get(wallet_id)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    pub(crate) fn get_wallet_by_address(&self, address: &str) -> DbResult<Option<WalletRecord>> {
        let read_txn = self.db.begin_read()?;
        let addr_table = read_txn.open_table(WALLET_ADDRESS_INDEX)?;
        let wallet_id = match addr_table.get(address.to_lowercase().as_str())? {
            Some(v) => v.value().to_string(),
            None => return Ok(None),
        };

        let wallet_table = read_txn.open_table(WALLETS)?;
        match wallet_table.get(wallet_id.as_str())? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// All wallets owned by a user, newest-first.
    pub(crate) fn list_wallets_by_owner(&self, owner_user_id: &str) -> DbResult<Vec<WalletRecord>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(WALLETS)?;

        let mut wallets = Vec::new();
        for entry in table.iter()? {
            let entry = entry?;
            let wallet: WalletRecord = serde_json::from_slice(entry.1.value())?;
            if wallet.owner_user_id == owner_user_id {
                wallets.push(wallet);
            }
        }
        wallets.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(wallets)
    }

    /// Overwrite an existing wallet row. The address is immutable; callers
    /// only change label and cached balance.
    pub(crate) fn update_wallet(&self, wallet: &WalletRecord) -> DbResult<()> {
        let json = serde_json::to_vec(wallet)?;

        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(WALLETS)?;
            if table.get(wallet.wallet_id.as_str())?.is_none() {
                return Err(DbError::NotFound(format!("wallet {}", wallet.wallet_id)));
            }
            table.insert(wallet.wallet_id.as_str(), json.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Write a reconciled balance for the wallet at `address`. Returns
    /// false when no local wallet holds that address.
    pub(crate) fn set_cached_balance(&self, address: &str, balance: f64) -> DbResult<bool> {
        let addr_key = address.to_lowercase();

        let write_txn = self.db.begin_write()?;
        let wallet_id = {
            let addr_table = write_txn.open_table(WALLET_ADDRESS_INDEX)?;
            let found = addr_table
                .get(addr_key.as_str())?
                .map(|v| v.value().to_string());
            found
        };
        let Some(wallet_id) = wallet_id else {
            write_txn.commit()?;
            return Ok(false);
        };

        {
            let mut wallet_table = write_txn.open_table(WALLETS)?;
            let existing = wallet_table
                .get(wallet_id.as_str())?
                .map(|v| v.value().to_vec())
                .ok_or_else(|| DbError::NotFound(format!("wallet {wallet_id}")))?;
            let mut wallet: WalletRecord = serde_json::from_slice(&existing)?;
            wallet.cached_balance = balance;
            let json = serde_json::to_vec(&wallet)?;
            wallet_table.insert(wallet_id.as_str(), json.as_slice())?;
        }
        write_txn.commit()?;
        Ok(true)
    }

    /// Hard-delete a wallet row and its address index entry. Local
    /// bookkeeping only: funds at that address remain on the ledger.
    pub(crate) fn delete_wallet(&self, wallet_id: &str) -> DbResult<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut wallet_table = write_txn.open_table(WALLETS)?;
            let wallet: WalletRecord = {
                let value = wallet_table
                    .get(wallet_id)?
                    .ok_or_else(|| DbError::NotFound(format!("wallet {wallet_id}")))?;
                serde_json::from_slice(value.value())?
            };
            wallet_table.remove(wallet_id)?;

            let mut addr_table = write_txn.open_table(WALLET_ADDRESS_INDEX)?;
            addr_table.remove(wallet.address.normalized().as_str())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    // =========================================================================
    // Transactions
    // =========================================================================

    /// Record a transaction this service itself submitted.
    ///
    /// Authoritative for its hash: if a scanner already backfilled a row
    /// for the same hash, that row is overwritten in place (keeping its
    /// id and index entries).
    pub fn record_transaction(&self, tx: &TransactionRecord) -> DbResult<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut hash_table = write_txn.open_table(TX_HASH_INDEX)?;
            let mut tx_table = write_txn.open_table(TRANSACTIONS)?;

            let existing_id = match &tx.hash {
                Some(hash) => hash_table.get(hash.as_str())?.map(|v| v.value().to_string()),
                None => None,
            };

            match existing_id {
                Some(tx_id) => {
                    // Preserve the surrogate id and the indexed timestamp.
                    let mut replacement = tx.clone();
                    replacement.tx_id = tx_id.clone();
                    if let Some(existing) = tx_table.get(tx_id.as_str())? {
                        let prior: TransactionRecord = serde_json::from_slice(existing.value())?;
                        replacement.timestamp = prior.timestamp;
                    }
                    let json = serde_json::to_vec(&replacement)?;
                    tx_table.insert(tx_id.as_str(), json.as_slice())?;
                }
                None => {
                    let json = serde_json::to_vec(tx)?;
                    tx_table.insert(tx.tx_id.as_str(), json.as_slice())?;
                    if let Some(hash) = &tx.hash {
                        hash_table.insert(hash.as_str(), tx.tx_id.as_str())?;
                    }

                    let mut idx_table = write_txn.open_table(WALLET_TX_INDEX)?;
                    let ts = tx.timestamp.timestamp();
                    for addr in [&tx.from_address, &tx.to_address] {
                        let key = make_index_key(&addr.normalized(), ts, &tx.tx_id);
                        idx_table.insert(key.as_slice(), tx.tx_id.as_str())?;
                    }
                }
            }
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Merge one scanner-observed ledger transaction.
    ///
    /// Insert if no row with this hash exists. An existing row is left
    /// untouched — the local submission path is authoritative — except
    /// that a local `failed` row is promoted to `completed` when the
    /// scanner observed the same hash confirmed on the ledger (the
    /// timed-out-then-confirmed case).
    pub fn merge_scanned(&self, tx: &TransactionRecord) -> DbResult<MergeOutcome> {
        let hash = tx
            .hash
            .as_deref()
            .ok_or_else(|| DbError::NotFound("scanned transaction without hash".to_string()))?;

        let write_txn = self.db.begin_write()?;
        let outcome = {
            let mut hash_table = write_txn.open_table(TX_HASH_INDEX)?;
            let mut tx_table = write_txn.open_table(TRANSACTIONS)?;

            // Bound separately so the lookup guard is released before the
            // arms mutate either table.
            let existing_id = hash_table.get(hash)?.map(|v| v.value().to_string());

            match existing_id {
                Some(tx_id) => {
                    let existing_bytes = tx_table
                        .get(tx_id.as_str())?
                        .map(|v| v.value().to_vec())
                        .ok_or_else(|| DbError::NotFound(format!("transaction {tx_id}")))?;
                    let mut existing: TransactionRecord = serde_json::from_slice(&existing_bytes)?;

                    if existing.status == TxStatus::Failed && tx.status == TxStatus::Completed {
                        existing.status = TxStatus::Completed;
                        existing.block_number = tx.block_number;
                        let json = serde_json::to_vec(&existing)?;
                        tx_table.insert(tx_id.as_str(), json.as_slice())?;
                        MergeOutcome::Updated
                    } else {
                        MergeOutcome::Unchanged
                    }
                }
                None => {
                    let json = serde_json::to_vec(tx)?;
                    tx_table.insert(tx.tx_id.as_str(), json.as_slice())?;
                    hash_table.insert(hash, tx.tx_id.as_str())?;

                    let mut idx_table = write_txn.open_table(WALLET_TX_INDEX)?;
                    let ts = tx.timestamp.timestamp();
                    for addr in [&tx.from_address, &tx.to_address] {
                        let key = make_index_key(&addr.normalized(), ts, &tx.tx_id);
                        idx_table.insert(key.as_slice(), tx.tx_id.as_str())?;
                    }
                    MergeOutcome::Inserted
                }
            }
        };
        write_txn.commit()?;
        Ok(outcome)
    }

    /// Look up a transaction by its ledger hash.
    pub fn get_transaction_by_hash(&self, hash: &str) -> DbResult<Option<TransactionRecord>> {
        let read_txn = self.db.begin_read()?;
        let hash_table = read_txn.open_table(TX_HASH_INDEX)?;
        let tx_id = match hash_table.get(hash)? {
            Some(v) => v.value().to_string(),
            None => return Ok(None),
        };

        let tx_table = read_txn.open_table(TRANSACTIONS)?;
        match tx_table.get(tx_id.as_str())? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// Newest-first transactions touching an address, via the composite
    /// index.
    pub fn list_transactions_by_address(
        &self,
        address: &str,
        limit: usize,
    ) -> DbResult<Vec<TransactionRecord>> {
        let read_txn = self.db.begin_read()?;
        let idx_table = read_txn.open_table(WALLET_TX_INDEX)?;
        let tx_table = read_txn.open_table(TRANSACTIONS)?;

        let prefix = make_prefix(address);
        let prefix_end = make_prefix_end(address);

        let mut results = Vec::new();
        for entry in idx_table.range(prefix.as_slice()..prefix_end.as_slice())? {
            let entry = entry?;
            let tx_id = entry.1.value().to_string();
            if let Some(value) = tx_table.get(tx_id.as_str())? {
                results.push(serde_json::from_slice(value.value())?);
            }
            if results.len() >= limit {
                break;
            }
        }
        Ok(results)
    }

    /// All transactions, newest-first, filtered by an optional status and
    /// kind. Full scan; intended for operator views, not hot paths.
    pub fn list_transactions(
        &self,
        status: Option<TxStatus>,
        kind: Option<TxKind>,
        limit: usize,
    ) -> DbResult<Vec<TransactionRecord>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(TRANSACTIONS)?;

        let mut results: Vec<TransactionRecord> = Vec::new();
        for entry in table.iter()? {
            let entry = entry?;
            let tx: TransactionRecord = serde_json::from_slice(entry.1.value())?;
            if status.is_some_and(|s| tx.status != s) {
                continue;
            }
            if kind.is_some_and(|k| tx.kind != k) {
                continue;
            }
            results.push(tx);
        }
        results.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        results.truncate(limit);
        Ok(results)
    }

    // =========================================================================
    // Users
    // =========================================================================

    /// Insert a new user. Email uniqueness is enforced in the same write
    /// transaction.
    pub fn insert_user(&self, user: &UserRecord) -> DbResult<()> {
        let json = serde_json::to_vec(user)?;
        let email_key = user.email.to_lowercase();

        let write_txn = self.db.begin_write()?;
        {
            let mut email_table = write_txn.open_table(USER_EMAIL_INDEX)?;
            if email_table.get(email_key.as_str())?.is_some() {
                return Err(DbError::AlreadyExists(format!("email {}", user.email)));
            }
            email_table.insert(email_key.as_str(), user.user_id.as_str())?;

            let mut user_table = write_txn.open_table(USERS)?;
            user_table.insert(user.user_id.as_str(), json.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    pub fn get_user(&self, user_id: &str) -> DbResult<Option<UserRecord>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(USERS)?;
        match table.get(user_id)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    pub fn get_user_by_email(&self, email: &str) -> DbResult<Option<UserRecord>> {
        let read_txn = self.db.begin_read()?;
        let email_table = read_txn.open_table(USER_EMAIL_INDEX)?;
        let user_id = match email_table.get(email.to_lowercase().as_str())? {
            Some(v) => v.value().to_string(),
            None => return Ok(None),
        };

        let user_table = read_txn.open_table(USERS)?;
        match user_table.get(user_id.as_str())? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
