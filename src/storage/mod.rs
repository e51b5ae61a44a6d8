// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Storage Layer
//!
//! Persistence and caching for the wallet core:
//!
//! - [`database`]: embedded redb database (wallets, transactions, users)
//! - [`balance_cache`]: short-TTL LRU in front of ledger balance queries
//! - [`wallets`]: wallet repository with balance reconciliation

pub mod balance_cache;
pub mod database;
pub mod wallets;

pub use balance_cache::BalanceCache;
pub use database::{DbError, DbResult, MergeOutcome, WalletDatabase};
pub use wallets::WalletStore;
