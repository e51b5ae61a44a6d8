// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! EVM-backed ledger client.
//!
//! Talks JSON-RPC to the configured node: balance queries, raw signed
//! transfer broadcast with a bounded confirmation wait, and a newest-first
//! block walk for history scans. Amounts cross this boundary in native
//! units (f64); wei conversion stays inside this module.

use std::str::FromStr;
use std::time::Duration;

use alloy::{
    consensus::Transaction as _,
    network::EthereumWallet,
    primitives::{Address, U256},
    providers::{Provider, ProviderBuilder, RootProvider},
    rpc::types::TransactionRequest,
    signers::local::PrivateKeySigner,
};
use chrono::{DateTime, Utc};

use super::{LedgerClient, LedgerError, LedgerTransaction, NewAccount, TransferOutcome};
use crate::config::Config;
use crate::models::TxStatus;

/// Gas limit for a plain value transfer.
const VALUE_TRANSFER_GAS: u64 = 21_000;

/// Ledger client speaking Ethereum JSON-RPC.
pub struct EvmLedgerClient {
    /// Read-only provider for queries and scans.
    provider: RootProvider,
    /// Endpoint kept for per-submission signing providers.
    rpc_url: url::Url,
    /// Bound on the confirmation wait.
    confirmation_timeout: Duration,
    /// How many blocks a history scan walks at most.
    scan_block_depth: u64,
}

impl EvmLedgerClient {
    /// Connect to the configured ledger endpoint.
    pub fn new(config: &Config) -> Result<Self, LedgerError> {
        let rpc_url: url::Url = config
            .ledger_url
            .parse()
            .map_err(|e: url::ParseError| LedgerError::Unavailable(e.to_string()))?;

        let provider = ProviderBuilder::new()
            .connect_http(rpc_url.clone())
            .root()
            .clone();

        Ok(Self {
            provider,
            rpc_url,
            confirmation_timeout: config.confirmation_timeout,
            scan_block_depth: config.scan_block_depth,
        })
    }

    /// Parse a 0x-prefixed hex private key into a signer.
    fn signer_from_hex(private_key: &str) -> Result<PrivateKeySigner, LedgerError> {
        let trimmed = private_key.trim();
        let hex_part = trimmed.strip_prefix("0x").unwrap_or(trimmed);

        if hex_part.len() != 64 {
            return Err(LedgerError::InvalidPrivateKey(format!(
                "expected 64 hex characters, got {}",
                hex_part.len()
            )));
        }

        let key_bytes = alloy::hex::decode(hex_part)
            .map_err(|e| LedgerError::InvalidPrivateKey(e.to_string()))?;

        PrivateKeySigner::from_slice(&key_bytes)
            .map_err(|e| LedgerError::InvalidPrivateKey(e.to_string()))
    }
}

impl LedgerClient for EvmLedgerClient {
    fn validate_address(&self, address: &str) -> bool {
        Address::from_str(address).is_ok()
    }

    fn create_account(&self) -> Result<NewAccount, LedgerError> {
        let signer = PrivateKeySigner::random();
        let address = format!("{:#x}", signer.address());
        let private_key = format!("0x{}", alloy::hex::encode(signer.credential().to_bytes()));

        tracing::info!(address = %address, "Generated new ledger account");

        Ok(NewAccount {
            address,
            private_key,
        })
    }

    async fn get_balance(&self, address: &str) -> Result<f64, LedgerError> {
        let addr = Address::from_str(address)
            .map_err(|e| LedgerError::InvalidAddress(e.to_string()))?;

        let balance_wei = self
            .provider
            .get_balance(addr)
            .await
            .map_err(|e| LedgerError::Unavailable(e.to_string()))?;

        Ok(wei_to_native(balance_wei))
    }

    async fn submit_transfer(
        &self,
        from: &str,
        to: &str,
        amount: f64,
        private_key: &str,
    ) -> Result<TransferOutcome, LedgerError> {
        let from_addr = Address::from_str(from)
            .map_err(|e| LedgerError::InvalidAddress(format!("from: {e}")))?;
        let to_addr = Address::from_str(to)
            .map_err(|e| LedgerError::InvalidAddress(format!("to: {e}")))?;

        let signer = Self::signer_from_hex(private_key)?;
        if signer.address() != from_addr {
            return Err(LedgerError::InvalidPrivateKey(
                "private key does not match sender address".to_string(),
            ));
        }

        // Signing provider built per submission; the key never outlives
        // this call.
        let wallet = EthereumWallet::from(signer);
        let provider = ProviderBuilder::new()
            .wallet(wallet)
            .connect_http(self.rpc_url.clone());

        let tx = TransactionRequest::default()
            .from(from_addr)
            .to(to_addr)
            .value(native_to_wei(amount))
            .gas_limit(VALUE_TRANSFER_GAS);

        let pending = provider
            .send_transaction(tx)
            .await
            .map_err(|e| LedgerError::Submission(e.to_string()))?;

        let hash = format!("{:#x}", *pending.tx_hash());
        tracing::info!(hash = %hash, from = %from, to = %to, amount, "Transfer broadcast");

        let receipt = tokio::time::timeout(self.confirmation_timeout, pending.get_receipt())
            .await
            .map_err(|_| LedgerError::ConfirmationTimeout { hash: hash.clone() })?
            .map_err(|e| LedgerError::Submission(e.to_string()))?;

        let status = if receipt.status() {
            TxStatus::Completed
        } else {
            TxStatus::Failed
        };

        Ok(TransferOutcome {
            hash,
            block_number: receipt.block_number.unwrap_or(0),
            status,
        })
    }

    async fn scan_history(
        &self,
        address: &str,
        limit: usize,
    ) -> Result<Vec<LedgerTransaction>, LedgerError> {
        let target = address.to_lowercase();

        let head = self
            .provider
            .get_block_number()
            .await
            .map_err(|e| LedgerError::Unavailable(e.to_string()))?;

        let floor = head.saturating_sub(self.scan_block_depth);
        let mut found = Vec::new();
        let mut number = head;

        // Newest-first walk, bounded by depth and result cap. Explicitly
        // not exhaustive.
        loop {
            let block = self
                .provider
                .get_block_by_number(number.into())
                .full()
                .await
                .map_err(|e| LedgerError::Unavailable(e.to_string()))?;

            if let Some(block) = block {
                let timestamp = DateTime::<Utc>::from_timestamp(block.header.timestamp as i64, 0)
                    .unwrap_or_else(Utc::now);

                for tx in block.transactions.txns() {
                    let from = format!("{:#x}", tx.inner.signer());
                    let to = match tx.to() {
                        Some(addr) => format!("{addr:#x}"),
                        // Contract creation; not a value transfer we track.
                        None => continue,
                    };

                    if from.to_lowercase() != target && to.to_lowercase() != target {
                        continue;
                    }

                    found.push(LedgerTransaction {
                        hash: format!("{:#x}", *tx.inner.tx_hash()),
                        from,
                        to,
                        amount: wei_to_native(tx.value()),
                        timestamp,
                        block_number: number,
                    });

                    if found.len() >= limit {
                        break;
                    }
                }
            }

            if found.len() >= limit || number <= floor || number == 0 {
                break;
            }
            number -= 1;
        }

        tracing::info!(address = %address, count = found.len(), "History scan complete");
        Ok(found)
    }
}

/// Convert wei to native units. Precision loss above 2^53 wei-fractions is
/// acceptable for the cached mirror; the ledger stays the source of truth.
pub(crate) fn wei_to_native(amount: U256) -> f64 {
    // Decimal rendering of U256 always parses as f64.
    amount.to_string().parse::<f64>().unwrap_or(0.0) / 1e18
}

/// Convert native units to wei.
pub(crate) fn native_to_wei(amount: f64) -> U256 {
    if amount <= 0.0 {
        return U256::ZERO;
    }
    U256::from((amount * 1e18) as u128)
}
