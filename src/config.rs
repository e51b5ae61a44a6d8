// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! Configuration is loaded from the environment at startup and passed into
//! each component at construction. No component reads the environment on its
//! own after boot.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `LEDGER_URL` | Ledger node RPC endpoint | `http://localhost:7545` |
//! | `BALANCE_EPSILON` | Drift tolerance for balance write-back (native units) | `0.0001` |
//! | `SCAN_BLOCK_DEPTH` | Max blocks walked per history scan | `1000` |
//! | `SCAN_RESULT_CAP` | Max transactions returned per history scan | `50` |
//! | `CONFIRMATION_TIMEOUT_SECS` | Bound on waiting for ledger confirmation | `60` |
//! | `BALANCE_CACHE_TTL_SECS` | Balance cache entry lifetime | `10` |
//! | `BALANCE_CACHE_CAPACITY` | Max addresses held in the balance cache | `256` |
//! | `FUNDING_ADDRESS` | Service funding account address (deposits) | unset |
//! | `FUNDING_PRIVATE_KEY` | Service funding account key (deposits) | unset |

use std::env;
use std::time::Duration;

/// Environment variable name for the ledger node RPC endpoint.
pub const LEDGER_URL_ENV: &str = "LEDGER_URL";
/// Environment variable name for the balance drift tolerance.
pub const BALANCE_EPSILON_ENV: &str = "BALANCE_EPSILON";
/// Environment variable name for the history scan block depth.
pub const SCAN_BLOCK_DEPTH_ENV: &str = "SCAN_BLOCK_DEPTH";
/// Environment variable name for the history scan result cap.
pub const SCAN_RESULT_CAP_ENV: &str = "SCAN_RESULT_CAP";
/// Environment variable name for the confirmation wait bound (seconds).
pub const CONFIRMATION_TIMEOUT_ENV: &str = "CONFIRMATION_TIMEOUT_SECS";
/// Environment variable name for the balance cache TTL (seconds).
pub const BALANCE_CACHE_TTL_ENV: &str = "BALANCE_CACHE_TTL_SECS";
/// Environment variable name for the balance cache capacity.
pub const BALANCE_CACHE_CAPACITY_ENV: &str = "BALANCE_CACHE_CAPACITY";
/// Environment variable name for the deposit funding account address.
pub const FUNDING_ADDRESS_ENV: &str = "FUNDING_ADDRESS";
/// Environment variable name for the deposit funding account key.
pub const FUNDING_PRIVATE_KEY_ENV: &str = "FUNDING_PRIVATE_KEY";

/// Wallet-core configuration, resolved once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Ledger node RPC endpoint URL.
    pub ledger_url: String,
    /// Balance differences at or below this are floating-point noise, not
    /// drift; no write-back happens for them.
    pub balance_epsilon: f64,
    /// How many blocks (newest-first) a history scan may walk.
    pub scan_block_depth: u64,
    /// Max transactions a single history scan returns.
    pub scan_result_cap: usize,
    /// How long a submission waits for ledger confirmation.
    pub confirmation_timeout: Duration,
    /// Lifetime of a balance cache entry.
    pub balance_cache_ttl: Duration,
    /// Max addresses held in the balance cache.
    pub balance_cache_capacity: usize,
    /// Service-controlled funding account for deposits, if configured.
    pub funding_address: Option<String>,
    /// Private key of the funding account, if configured.
    pub funding_private_key: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ledger_url: "http://localhost:7545".to_string(),
            balance_epsilon: 0.0001,
            scan_block_depth: 1000,
            scan_result_cap: 50,
            confirmation_timeout: Duration::from_secs(60),
            balance_cache_ttl: Duration::from_secs(10),
            balance_cache_capacity: 256,
            funding_address: None,
            funding_private_key: None,
        }
    }
}

impl Config {
    /// Load configuration from the environment, falling back to defaults
    /// for anything unset or unparseable.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            ledger_url: env::var(LEDGER_URL_ENV).unwrap_or(defaults.ledger_url),
            balance_epsilon: parse_env(BALANCE_EPSILON_ENV, defaults.balance_epsilon),
            scan_block_depth: parse_env(SCAN_BLOCK_DEPTH_ENV, defaults.scan_block_depth),
            scan_result_cap: parse_env(SCAN_RESULT_CAP_ENV, defaults.scan_result_cap),
            confirmation_timeout: Duration::from_secs(parse_env(
                CONFIRMATION_TIMEOUT_ENV,
                defaults.confirmation_timeout.as_secs(),
            )),
            balance_cache_ttl: Duration::from_secs(parse_env(
                BALANCE_CACHE_TTL_ENV,
                defaults.balance_cache_ttl.as_secs(),
            )),
            balance_cache_capacity: parse_env(
                BALANCE_CACHE_CAPACITY_ENV,
                defaults.balance_cache_capacity,
            ),
            funding_address: env::var(FUNDING_ADDRESS_ENV).ok(),
            funding_private_key: env::var(FUNDING_PRIVATE_KEY_ENV).ok(),
        }
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, default: T) -> T {
    match env::var(name) {
        Ok(raw) => match raw.parse() {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!(var = name, raw = %raw, "Unparseable config value, using default");
                default
            }
        },
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_bounds() {
        let config = Config::default();
        assert_eq!(config.balance_epsilon, 0.0001);
        assert_eq!(config.scan_block_depth, 1000);
        assert_eq!(config.confirmation_timeout, Duration::from_secs(60));
        assert_eq!(config.balance_cache_ttl, Duration::from_secs(10));
        assert!(config.funding_address.is_none());
    }
}
