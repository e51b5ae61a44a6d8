// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Custodial Wallet Core - Ledger-Backed Wallet and Transfer Service
//!
//! This crate manages custodial wallets whose funds live on an external
//! EVM-compatible ledger. The local database is a bookkeeping mirror, never
//! the source of truth: balances are reconciled against the node on every
//! read, and transaction history can be re-derived from the chain by the
//! reconciliation scanner.
//!
//! ## Modules
//!
//! - `ledger` - Blockchain node integration (Alloy)
//! - `storage` - Embedded database, balance cache, wallet repository
//! - `transfer` - Transfer and deposit orchestration
//! - `scanner` - Ledger history reconciliation
//! - `locks` - Per-address mutual exclusion

pub mod config;
pub mod error;
pub mod ledger;
pub mod locks;
pub mod models;
pub mod scanner;
pub mod storage;
pub mod transfer;

pub use config::Config;
pub use error::WalletError;
pub use ledger::{EvmLedgerClient, LedgerClient};
pub use models::{TransactionRecord, TxKind, TxStatus, Wallet, WalletAddress};
pub use scanner::ReconciliationScanner;
pub use storage::{BalanceCache, WalletDatabase, WalletStore};
pub use transfer::{TransferCoordinator, TransferReceipt, TransferRequest};
