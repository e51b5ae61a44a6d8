// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! In-memory ledger double for tests.
//!
//! Tracks balances and per-address history behind a mutex, counts calls so
//! tests can assert "no ledger interaction happened", and can be switched
//! into unreachable / failing / timing-out modes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use chrono::Utc;

use super::{LedgerClient, LedgerError, LedgerTransaction, NewAccount, TransferOutcome};
use crate::models::TxStatus;

#[derive(Default)]
pub struct MockLedger {
    balances: Mutex<HashMap<String, f64>>,
    history: Mutex<Vec<LedgerTransaction>>,
    account_counter: AtomicUsize,
    next_block: AtomicUsize,

    pub balance_calls: AtomicUsize,
    pub submit_calls: AtomicUsize,
    pub scan_calls: AtomicUsize,

    unreachable: AtomicBool,
    fail_submission: AtomicBool,
    timeout_submission: AtomicBool,
    submit_delay: Mutex<Option<Duration>>,
    balance_delay_once: Mutex<Option<Duration>>,
}

impl MockLedger {
    pub fn new() -> Self {
        Self {
            next_block: AtomicUsize::new(100),
            ..Self::default()
        }
    }

    pub fn set_balance(&self, address: &str, balance: f64) {
        self.balances
            .lock()
            .unwrap()
            .insert(address.to_lowercase(), balance);
    }

    pub fn balance_of(&self, address: &str) -> f64 {
        *self
            .balances
            .lock()
            .unwrap()
            .get(&address.to_lowercase())
            .unwrap_or(&0.0)
    }

    pub fn push_history(&self, tx: LedgerTransaction) {
        self.history.lock().unwrap().push(tx);
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// All submissions fail at broadcast time (no hash).
    pub fn fail_submissions(&self, fail: bool) {
        self.fail_submission.store(fail, Ordering::SeqCst);
    }

    /// All submissions broadcast, then time out waiting for confirmation.
    pub fn timeout_submissions(&self, timeout: bool) {
        self.timeout_submission.store(timeout, Ordering::SeqCst);
    }

    /// Hold each submission open for `delay` to widen race windows.
    pub fn set_submit_delay(&self, delay: Duration) {
        *self.submit_delay.lock().unwrap() = Some(delay);
    }

    /// Stall the next balance query for `delay`. The returned value is
    /// snapshotted before the stall, like an RPC response already in
    /// flight when a concurrent write lands.
    pub fn delay_next_balance(&self, delay: Duration) {
        *self.balance_delay_once.lock().unwrap() = Some(delay);
    }

    fn check_reachable(&self) -> Result<(), LedgerError> {
        if self.unreachable.load(Ordering::SeqCst) {
            Err(LedgerError::Unavailable("mock node offline".to_string()))
        } else {
            Ok(())
        }
    }

    fn next_hash(&self) -> (String, u64) {
        let block = self.next_block.fetch_add(1, Ordering::SeqCst) as u64;
        (format!("0xhash{block:058}"), block)
    }
}

impl LedgerClient for MockLedger {
    fn validate_address(&self, address: &str) -> bool {
        address.starts_with("0x") && address.len() > 2
    }

    fn create_account(&self) -> Result<NewAccount, LedgerError> {
        let n = self.account_counter.fetch_add(1, Ordering::SeqCst);
        Ok(NewAccount {
            address: format!("0xmock{n:036}"),
            private_key: format!("0x{n:064}"),
        })
    }

    async fn get_balance(&self, address: &str) -> Result<f64, LedgerError> {
        self.balance_calls.fetch_add(1, Ordering::SeqCst);
        self.check_reachable()?;

        let snapshot = self.balance_of(address);
        let delay = self.balance_delay_once.lock().unwrap().take();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(snapshot)
    }

    async fn submit_transfer(
        &self,
        from: &str,
        to: &str,
        amount: f64,
        _private_key: &str,
    ) -> Result<TransferOutcome, LedgerError> {
        self.submit_calls.fetch_add(1, Ordering::SeqCst);
        self.check_reachable()?;

        if self.fail_submission.load(Ordering::SeqCst) {
            return Err(LedgerError::Submission("mock broadcast rejected".to_string()));
        }

        let delay = *self.submit_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let (hash, block) = self.next_hash();

        if self.timeout_submission.load(Ordering::SeqCst) {
            return Err(LedgerError::ConfirmationTimeout { hash });
        }

        {
            let mut balances = self.balances.lock().unwrap();
            let from_key = from.to_lowercase();
            let available = *balances.get(&from_key).unwrap_or(&0.0);
            if available < amount {
                return Err(LedgerError::Submission(format!(
                    "insufficient ledger funds: {available} < {amount}"
                )));
            }
            *balances.entry(from_key).or_insert(0.0) -= amount;
            *balances.entry(to.to_lowercase()).or_insert(0.0) += amount;
        }

        self.history.lock().unwrap().push(LedgerTransaction {
            hash: hash.clone(),
            from: from.to_string(),
            to: to.to_string(),
            amount,
            timestamp: Utc::now(),
            block_number: block,
        });

        Ok(TransferOutcome {
            hash,
            block_number: block,
            status: TxStatus::Completed,
        })
    }

    async fn scan_history(
        &self,
        address: &str,
        limit: usize,
    ) -> Result<Vec<LedgerTransaction>, LedgerError> {
        self.scan_calls.fetch_add(1, Ordering::SeqCst);
        self.check_reachable()?;

        let target = address.to_lowercase();
        let history = self.history.lock().unwrap();
        Ok(history
            .iter()
            .rev()
            .filter(|tx| {
                tx.from.to_lowercase() == target || tx.to.to_lowercase() == target
            })
            .take(limit)
            .cloned()
            .collect())
    }
}
