//! Service configuration from environment variables
//!
//! Everything except the wallet address has a default, so a bare
//! `WALLET_ADDRESS=0x... cargo run` talks to BSC mainnet with the stock intervals.

use crate::wallet::{TokenAddress, WalletSyncError};
use crate::wallet::sync::strategies::{BalanceSyncConfig, NotificationSyncConfig};

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};

const DEFAULT_CHAIN_RPC_URL: &str = "https://bsc-dataseed.binance.org";
const DEFAULT_INDEXER_URL: &str = "https://api.krystal.app/bsc";
const DEFAULT_DATA_DIR: &str = "./wallet-data";

/// Refresh interval of each poller
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PollIntervals {
    pub balances: Duration,
    pub prices: Duration,
    pub supported_tokens: Duration,
    pub lending: Duration,
    pub referral: Duration,
    pub notifications: Duration,
    pub marketing_assets: Duration,
    pub transactions: Duration,
}

impl Default for PollIntervals {
    fn default() -> Self {
        Self {
            balances: Duration::from_secs(30),
            prices: Duration::from_secs(60),
            supported_tokens: Duration::from_secs(300),
            lending: Duration::from_secs(60),
            referral: Duration::from_secs(300),
            notifications: Duration::from_secs(60),
            marketing_assets: Duration::from_secs(300),
            transactions: Duration::from_secs(15),
        }
    }
}

#[derive(Clone, Debug)]
pub struct WalletSyncConfig {
    /// Wallet whose state is kept in sync
    pub wallet: TokenAddress,
    /// EVM JSON-RPC endpoint
    pub chain_rpc_url: String,
    /// Wallet indexer REST base URL
    pub indexer_url: String,
    /// Directory holding the JSON snapshots
    pub data_dir: PathBuf,
    pub intervals: PollIntervals,
    pub balance: BalanceSyncConfig,
    pub notifications: NotificationSyncConfig,
    /// Per-request timeout of both HTTP clients
    pub http_timeout: Duration,
}

impl WalletSyncConfig {
    /// Defaults for everything but the wallet.
    pub fn for_wallet(wallet: TokenAddress) -> Self {
        Self {
            wallet,
            chain_rpc_url: DEFAULT_CHAIN_RPC_URL.to_string(),
            indexer_url: DEFAULT_INDEXER_URL.to_string(),
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            intervals: PollIntervals::default(),
            balance: BalanceSyncConfig::default(),
            notifications: NotificationSyncConfig::default(),
            http_timeout: Duration::from_secs(30),
        }
    }

    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - `WALLET_ADDRESS`: wallet to sync (required)
    /// - `CHAIN_RPC_URL`, `INDEXER_URL`: remote endpoints
    /// - `DATA_DIR`: snapshot directory
    /// - `*_INTERVAL_SECS`: per-poller refresh interval
    /// - `BALANCE_CHUNK_SIZE`, `FALLBACK_DELAY_MS`: balance batching
    /// - `NOTIFICATION_PAGE_SIZE`, `NOTIFICATION_MAX_PAGES`: notification paging
    /// - `HTTP_TIMEOUT_SECS`: request timeout
    ///
    /// # Examples
    ///
    /// ```bash
    /// WALLET_ADDRESS=0x... BALANCE_INTERVAL_SECS=10 cargo run
    /// ```
    pub fn from_env() -> Result<Self, WalletSyncError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Same as `from_env`, reading variables through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, WalletSyncError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let raw_wallet = lookup("WALLET_ADDRESS")
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| WalletSyncError::ConfigError("WALLET_ADDRESS is not set".to_string()))?;
        let wallet = TokenAddress::parse(raw_wallet.trim()).map_err(|e| {
            WalletSyncError::ConfigError(format!("WALLET_ADDRESS is invalid: {}", e))
        })?;

        let mut config = Self::for_wallet(wallet);

        if let Some(url) = lookup("CHAIN_RPC_URL") {
            config.chain_rpc_url = url;
        }
        if let Some(url) = lookup("INDEXER_URL") {
            config.indexer_url = url;
        }
        if let Some(dir) = lookup("DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }

        let secs = |name: &str, default: Duration| {
            Duration::from_secs(parse_or(&lookup, name, default.as_secs()))
        };
        let defaults = PollIntervals::default();
        config.intervals = PollIntervals {
            balances: secs("BALANCE_INTERVAL_SECS", defaults.balances),
            prices: secs("PRICE_INTERVAL_SECS", defaults.prices),
            supported_tokens: secs("TOKEN_LIST_INTERVAL_SECS", defaults.supported_tokens),
            lending: secs("LENDING_INTERVAL_SECS", defaults.lending),
            referral: secs("REFERRAL_INTERVAL_SECS", defaults.referral),
            notifications: secs("NOTIFICATION_INTERVAL_SECS", defaults.notifications),
            marketing_assets: secs("MARKETING_INTERVAL_SECS", defaults.marketing_assets),
            transactions: secs("TX_RECONCILE_INTERVAL_SECS", defaults.transactions),
        };

        let balance = BalanceSyncConfig::default();
        config.balance = BalanceSyncConfig {
            chunk_size: parse_or(&lookup, "BALANCE_CHUNK_SIZE", balance.chunk_size),
            fallback_delay: Duration::from_millis(parse_or(
                &lookup,
                "FALLBACK_DELAY_MS",
                balance.fallback_delay.as_millis() as u64,
            )),
        };

        let notifications = NotificationSyncConfig::default();
        config.notifications = NotificationSyncConfig {
            page_size: parse_or(&lookup, "NOTIFICATION_PAGE_SIZE", notifications.page_size),
            max_pages: parse_or(&lookup, "NOTIFICATION_MAX_PAGES", notifications.max_pages),
        };

        config.http_timeout = secs("HTTP_TIMEOUT_SECS", config.http_timeout);

        info!("Wallet: {}", config.wallet);
        info!("Chain RPC URL: {}", config.chain_rpc_url);
        info!("Indexer URL: {}", config.indexer_url);
        info!("Data directory: {}", config.data_dir.display());

        Ok(config)
    }
}

/// Positive number from `name`, or `default` when unset or malformed.
fn parse_or<F, T>(lookup: &F, name: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + PartialOrd + Default + Copy + std::fmt::Display,
{
    let Some(raw) = lookup(name) else {
        return default;
    };
    match raw.trim().parse::<T>() {
        Ok(value) if value > T::default() => value,
        _ => {
            warn!("Invalid value '{}' for {}, using {}", raw, name, default);
            default
        }
    }
}
