// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Per-address async mutual exclusion.
//!
//! Every operation that reads a ledger balance and then acts on it
//! (transfer submission, balance write-back) must run under the lock for
//! the addresses it touches. Without this, two concurrent transfers from
//! the same wallet can both pass the funds check against the same balance
//! and both reach the ledger.
//!
//! Locks are keyed by lowercase address and created on first use. The
//! registry never shrinks; the per-address footprint is one `Arc<Mutex>`
//! and custodial address counts are small.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

/// Registry of one async mutex per ledger address.
#[derive(Default)]
pub struct AddressLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl AddressLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// The lock guarding `address`, creating it if this is the first use.
    ///
    /// Callers hold the returned mutex across the whole check-then-act
    /// sequence. When two addresses must both be held, the second is
    /// taken only after the first is released or never while awaiting
    /// the first, so lock order cannot deadlock.
    pub async fn lock_for(&self, address: &str) -> Arc<Mutex<()>> {
        let key = address.to_lowercase();
        let mut locks = self.locks.lock().await;
        locks.entry(key).or_default().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn same_address_yields_same_lock() {
        let registry = AddressLocks::new();
        let a = registry.lock_for("0xAbC").await;
        let b = registry.lock_for("0xabc").await;
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn different_addresses_do_not_contend() {
        let registry = AddressLocks::new();
        let a = registry.lock_for("0xaaa").await;
        let b = registry.lock_for("0xbbb").await;
        assert!(!Arc::ptr_eq(&a, &b));

        let _ga = a.lock().await;
        // Must not block.
        let _gb = b.lock().await;
    }

    #[tokio::test]
    async fn lock_serializes_critical_sections() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let registry = Arc::new(AddressLocks::new());
        let peak = Arc::new(AtomicUsize::new(0));
        let inside = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let registry = registry.clone();
            let peak = peak.clone();
            let inside = inside.clone();
            handles.push(tokio::spawn(async move {
                let lock = registry.lock_for("0xshared").await;
                let _guard = lock.lock().await;
                let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::task::yield_now().await;
                inside.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }
}
