// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Short-TTL LRU cache for ledger balances.
//!
//! Sits in front of the ledger RPC on read paths. Entries expire after a
//! few seconds so a burst of wallet reads costs one RPC round trip instead
//! of one per read, while transfers still see a recent number. Writers
//! must call [`BalanceCache::invalidate`] after any operation that moves
//! funds.
//!
//! A cache miss, expiry, or lock failure is never an error; callers just
//! fall through to the ledger.

use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use lru::LruCache;

struct Entry {
    balance: f64,
    stored_at: Instant,
}

/// Thread-safe balance cache keyed by lowercase address.
pub struct BalanceCache {
    entries: Mutex<LruCache<String, Entry>>,
    ttl: Duration,
}

impl BalanceCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            ttl,
        }
    }

    /// Fresh balance for `address`, or `None` on miss or expiry.
    ///
    /// Expired entries are evicted on read rather than by a sweeper task.
    pub fn get(&self, address: &str) -> Option<f64> {
        let key = address.to_lowercase();
        let mut entries = self.entries.lock().ok()?;

        match entries.get(&key) {
            Some(entry) if entry.stored_at.elapsed() < self.ttl => Some(entry.balance),
            Some(_) => {
                entries.pop(&key);
                None
            }
            None => None,
        }
    }

    pub fn put(&self, address: &str, balance: f64) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.put(
                address.to_lowercase(),
                Entry {
                    balance,
                    stored_at: Instant::now(),
                },
            );
        }
    }

    /// Drop the entry for `address`, if any. Called after transfers and
    /// deposits so the next read goes to the ledger.
    pub fn invalidate(&self, address: &str) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.pop(&address.to_lowercase());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_then_get() {
        let cache = BalanceCache::new(8, Duration::from_secs(10));
        cache.put("0xAbC", 3.25);
        assert_eq!(cache.get("0xabc"), Some(3.25));
        assert_eq!(cache.get("0xABC"), Some(3.25));
    }

    #[test]
    fn miss_returns_none() {
        let cache = BalanceCache::new(8, Duration::from_secs(10));
        assert_eq!(cache.get("0xunknown"), None);
    }

    #[test]
    fn entries_expire_after_ttl() {
        let cache = BalanceCache::new(8, Duration::from_millis(0));
        cache.put("0xabc", 1.0);
        assert_eq!(cache.get("0xabc"), None);
    }

    #[test]
    fn invalidate_drops_entry() {
        let cache = BalanceCache::new(8, Duration::from_secs(10));
        cache.put("0xabc", 1.0);
        cache.invalidate("0xABC");
        assert_eq!(cache.get("0xabc"), None);
    }

    #[test]
    fn lru_evicts_oldest_at_capacity() {
        let cache = BalanceCache::new(2, Duration::from_secs(10));
        cache.put("0xa", 1.0);
        cache.put("0xb", 2.0);
        cache.put("0xc", 3.0);
        assert_eq!(cache.get("0xa"), None);
        assert_eq!(cache.get("0xc"), Some(3.0));
    }
}
