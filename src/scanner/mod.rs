// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Reconciliation Scanner
//!
//! Walks recent ledger history for an address and merges what it finds
//! into the local transaction mirror. The merge is idempotent: rows are
//! keyed by ledger hash, so re-scanning the same blocks changes nothing.
//!
//! Local submissions stay authoritative for their hash, with one
//! exception: a local `failed` row whose transaction the scanner observes
//! confirmed on the ledger is promoted to `completed`. That closes the
//! loop on submissions that timed out waiting for confirmation and then
//! confirmed anyway.
//!
//! Scans are bounded by the client's block-depth horizon and a result
//! cap; a merge is a best-effort catch-up, never a proof of completeness.

use std::sync::Arc;

use tracing::{info, warn};

use crate::config::Config;
use crate::error::WalletError;
use crate::ledger::{LedgerClient, LedgerTransaction};
use crate::models::{TransactionRecord, TxKind, TxStatus};
use crate::storage::{MergeOutcome, WalletDatabase};

/// What one merge pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeSummary {
    /// Ledger transactions examined.
    pub scanned: usize,
    /// New rows backfilled.
    pub inserted: usize,
    /// Stale `failed` rows promoted to `completed`.
    pub updated: usize,
}

/// Merges bounded ledger history into the local transaction mirror.
pub struct ReconciliationScanner<L: LedgerClient> {
    db: Arc<WalletDatabase>,
    ledger: Arc<L>,
    result_cap: usize,
}

impl<L: LedgerClient> ReconciliationScanner<L> {
    pub fn new(db: Arc<WalletDatabase>, ledger: Arc<L>, config: &Config) -> Self {
        Self {
            db,
            ledger,
            result_cap: config.scan_result_cap,
        }
    }

    /// Scan recent ledger history for `address` and merge it locally.
    pub async fn merge_history(&self, address: &str) -> Result<MergeSummary, WalletError> {
        let observed = self.ledger.scan_history(address, self.result_cap).await?;

        let mut summary = MergeSummary {
            scanned: observed.len(),
            ..MergeSummary::default()
        };

        for tx in &observed {
            match self.db.merge_scanned(&Self::to_record(tx)) {
                Ok(MergeOutcome::Inserted) => summary.inserted += 1,
                Ok(MergeOutcome::Updated) => {
                    info!(hash = %tx.hash, "Promoted timed-out transaction to completed");
                    summary.updated += 1;
                }
                Ok(MergeOutcome::Unchanged) => {}
                Err(err) => {
                    // Skip the row, keep merging; the next scan retries it.
                    warn!(hash = %tx.hash, error = %err, "Failed to merge scanned transaction");
                }
            }
        }

        info!(
            address = %address,
            scanned = summary.scanned,
            inserted = summary.inserted,
            updated = summary.updated,
            "History merge complete"
        );
        Ok(summary)
    }

    /// Merge history for every locally custodied wallet of one owner.
    pub async fn merge_owner_history(
        &self,
        owner_user_id: &str,
    ) -> Result<MergeSummary, WalletError> {
        let wallets = self.db.list_wallets_by_owner(owner_user_id)?;
        let mut total = MergeSummary::default();
        for wallet in wallets {
            let summary = self.merge_history(&wallet.address.normalized()).await?;
            total.scanned += summary.scanned;
            total.inserted += summary.inserted;
            total.updated += summary.updated;
        }
        Ok(total)
    }

    /// A scanner-observed transaction is confirmed by definition; it came
    /// out of a mined block. Kind defaults to transfer, the ledger does
    /// not distinguish deposits.
    fn to_record(tx: &LedgerTransaction) -> TransactionRecord {
        TransactionRecord {
            tx_id: uuid::Uuid::new_v4().to_string(),
            from_address: tx.from.clone().into(),
            to_address: tx.to.clone().into(),
            amount: tx.amount,
            timestamp: tx.timestamp,
            kind: TxKind::Transfer,
            status: TxStatus::Completed,
            hash: Some(tx.hash.clone()),
            block_number: Some(tx.block_number),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::mock::MockLedger;
    use crate::models::WalletAddress;
    use chrono::Utc;

    struct Fixture {
        scanner: ReconciliationScanner<MockLedger>,
        ledger: Arc<MockLedger>,
        db: Arc<WalletDatabase>,
        _dir: tempfile::TempDir,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let db = Arc::new(WalletDatabase::open(&dir.path().join("test.redb")).unwrap());
        let ledger = Arc::new(MockLedger::new());
        let scanner = ReconciliationScanner::new(db.clone(), ledger.clone(), &Config::default());
        Fixture {
            scanner,
            ledger,
            db,
            _dir: dir,
        }
    }

    fn ledger_tx(hash: &str, from: &str, to: &str, block: u64) -> LedgerTransaction {
        LedgerTransaction {
            hash: hash.to_string(),
            from: from.to_string(),
            to: to.to_string(),
            amount: 1.25,
            timestamp: Utc::now(),
            block_number: block,
        }
    }

    #[tokio::test]
    async fn merge_backfills_unknown_transactions() {
        let f = fixture();
        f.ledger.push_history(ledger_tx("0xh1", "0xext", "0xaaa", 10));
        f.ledger.push_history(ledger_tx("0xh2", "0xaaa", "0xext", 11));

        let summary = f.scanner.merge_history("0xaaa").await.unwrap();
        assert_eq!(summary.scanned, 2);
        assert_eq!(summary.inserted, 2);
        assert_eq!(summary.updated, 0);

        let row = f.db.get_transaction_by_hash("0xh1").unwrap().unwrap();
        assert_eq!(row.status, TxStatus::Completed);
        assert_eq!(row.block_number, Some(10));
    }

    #[tokio::test]
    async fn merge_is_idempotent() {
        let f = fixture();
        f.ledger.push_history(ledger_tx("0xh1", "0xext", "0xaaa", 10));

        f.scanner.merge_history("0xaaa").await.unwrap();
        let second = f.scanner.merge_history("0xaaa").await.unwrap();
        assert_eq!(second.inserted, 0);
        assert_eq!(second.updated, 0);

        let rows = f.db.list_transactions(None, None, 100).unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn concurrent_merges_still_dedup_by_hash() {
        let f = fixture();
        for i in 0..10u64 {
            f.ledger
                .push_history(ledger_tx(&format!("0xh{i}"), "0xext", "0xaaa", 10 + i));
        }
        let scanner_a = Arc::new(ReconciliationScanner::new(
            f.db.clone(),
            f.ledger.clone(),
            &Config::default(),
        ));
        let scanner_b = scanner_a.clone();

        let (a, b) = tokio::join!(
            async move { scanner_a.merge_history("0xaaa").await },
            async move { scanner_b.merge_history("0xaaa").await },
        );
        a.unwrap();
        b.unwrap();

        let rows = f.db.list_transactions(None, None, 100).unwrap();
        assert_eq!(rows.len(), 10);
    }

    #[tokio::test]
    async fn merge_leaves_local_submissions_authoritative() {
        let f = fixture();
        let local = TransactionRecord::completed(
            WalletAddress::from("0xaaa"),
            WalletAddress::from("0xbbb"),
            1.25,
            TxKind::Deposit,
            "0xh1".to_string(),
            10,
        );
        f.db.record_transaction(&local).unwrap();
        f.ledger.push_history(ledger_tx("0xh1", "0xaaa", "0xbbb", 10));

        let summary = f.scanner.merge_history("0xaaa").await.unwrap();
        assert_eq!(summary.inserted, 0);
        assert_eq!(summary.updated, 0);

        // Local kind survives the merge.
        let row = f.db.get_transaction_by_hash("0xh1").unwrap().unwrap();
        assert_eq!(row.kind, TxKind::Deposit);
    }

    #[tokio::test]
    async fn merge_promotes_timed_out_submission() {
        let f = fixture();
        let timed_out = TransactionRecord::failed(
            WalletAddress::from("0xaaa"),
            WalletAddress::from("0xbbb"),
            1.25,
            TxKind::Transfer,
            Some("0xh1".to_string()),
        );
        f.db.record_transaction(&timed_out).unwrap();

        // The transaction confirmed after the local timeout gave up.
        f.ledger.push_history(ledger_tx("0xh1", "0xaaa", "0xbbb", 42));

        let summary = f.scanner.merge_history("0xaaa").await.unwrap();
        assert_eq!(summary.updated, 1);

        let row = f.db.get_transaction_by_hash("0xh1").unwrap().unwrap();
        assert_eq!(row.status, TxStatus::Completed);
        assert_eq!(row.block_number, Some(42));
    }

    #[tokio::test]
    async fn unreachable_node_propagates() {
        let f = fixture();
        f.ledger.set_unreachable(true);
        let result = f.scanner.merge_history("0xaaa").await;
        assert!(matches!(result, Err(WalletError::LedgerUnavailable(_))));
    }

    #[tokio::test]
    async fn owner_merge_covers_all_wallets() {
        let f = fixture();
        for (id, addr) in [("w-1", "0xaaa"), ("w-2", "0xbbb")] {
            f.db.insert_wallet(&crate::models::WalletRecord {
                wallet_id: id.to_string(),
                owner_user_id: "u-1".to_string(),
                address: addr.into(),
                label: id.to_string(),
                private_key: "0xkey".to_string(),
                cached_balance: 0.0,
                created_at: Utc::now(),
            })
            .unwrap();
        }
        f.ledger.push_history(ledger_tx("0xh1", "0xext", "0xaaa", 10));
        f.ledger.push_history(ledger_tx("0xh2", "0xext", "0xbbb", 11));

        let summary = f.scanner.merge_owner_history("u-1").await.unwrap();
        assert_eq!(summary.inserted, 2);
    }
}
