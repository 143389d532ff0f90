//! Wallet sync orchestrator and integration point for all sync services.
//!
//! This module defines the `WalletSyncOrchestrator`, which owns everything involved in keeping one
//! wallet's local state in step with the chain and the indexer:
//! - the shared stores and the snapshot persistence behind them
//! - the event bus and its default logging handler
//! - one `Poller` per data category, each wrapping its `SyncStrategy`
//! - the `TransactionSender`, wired to nudge the balance poller after every broadcast
//!
//! The orchestrator restores snapshots before the pollers start, starts and stops all pollers as
//! one unit, and flushes every store to disk on shutdown.

use crate::config::WalletSyncConfig;
use crate::indexer::{ChainRpc, ChainRpcClient, IndexerApi, WalletIndexerClient};
use crate::transaction::{NATIVE_TOKEN_DECIMALS, TransactionSender};
use crate::utils::token_value;
use crate::wallet::store::WalletStores;
use crate::wallet::sync::{
    events::{EventBus, LoggingEventHandler, SyncEventHandler},
    poller::Poller,
    progress_tracker::PollerStats,
    state_persistence::StatePersistenceService,
    strategies::{
        BalanceSync, LendingBalanceSync, MarketingAssetSync, NotificationSync, PriceSync,
        ReferralSync, SupportedTokenSync, SyncStrategy, TransactionReconcileSync,
    },
};
use crate::wallet::{TokenAddress, WalletSyncError};

use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Main wallet sync orchestrator that coordinates all sync components.
pub struct WalletSyncOrchestrator {
    wallet: TokenAddress,
    stores: WalletStores,
    persistence: Arc<StatePersistenceService>,
    events: Arc<EventBus>,
    pollers: Vec<Arc<Poller>>,
    balance_poller: Arc<Poller>,
    sender: Arc<TransactionSender>,
}

impl WalletSyncOrchestrator {
    /// Build the HTTP clients from `config` and wire every service.
    pub fn new(config: &WalletSyncConfig) -> Self {
        let rpc: Arc<dyn ChainRpc> = Arc::new(ChainRpcClient::new(
            config.chain_rpc_url.clone(),
            config.http_timeout,
        ));
        let indexer: Arc<dyn IndexerApi> = Arc::new(WalletIndexerClient::new(
            config.indexer_url.clone(),
            config.http_timeout,
        ));
        let persistence = Arc::new(StatePersistenceService::new(
            config.data_dir.clone(),
            config.wallet.clone(),
        ));
        Self::with_clients(config, rpc, indexer, persistence)
    }

    /// Wire every service around the given remote clients and persistence.
    pub fn with_clients(
        config: &WalletSyncConfig,
        rpc: Arc<dyn ChainRpc>,
        indexer: Arc<dyn IndexerApi>,
        persistence: Arc<StatePersistenceService>,
    ) -> Self {
        let wallet = config.wallet.clone();
        let stores = WalletStores::new(wallet.clone());

        let events = Arc::new(EventBus::new());
        events.register_handler(Arc::new(LoggingEventHandler));

        let intervals = &config.intervals;
        let poller = |strategy: Arc<dyn SyncStrategy>, interval: Duration| {
            Arc::new(Poller::new(strategy, interval, events.clone()))
        };

        let balance_poller = poller(
            Arc::new(BalanceSync::new(
                wallet.clone(),
                rpc.clone(),
                stores.tokens.clone(),
                stores.balances.clone(),
                persistence.clone(),
                config.balance.clone(),
            )),
            intervals.balances,
        );

        let pollers = vec![
            balance_poller.clone(),
            poller(
                Arc::new(SupportedTokenSync::new(
                    indexer.clone(),
                    stores.tokens.clone(),
                    persistence.clone(),
                )),
                intervals.supported_tokens,
            ),
            poller(
                Arc::new(PriceSync::new(
                    indexer.clone(),
                    stores.tokens.clone(),
                    stores.prices.clone(),
                    persistence.clone(),
                )),
                intervals.prices,
            ),
            poller(
                Arc::new(LendingBalanceSync::new(
                    wallet.clone(),
                    indexer.clone(),
                    stores.lending.clone(),
                    stores.lending_rewards.clone(),
                    persistence.clone(),
                )),
                intervals.lending,
            ),
            poller(
                Arc::new(ReferralSync::new(
                    wallet.clone(),
                    indexer.clone(),
                    stores.referral.clone(),
                    stores.claims.clone(),
                    persistence.clone(),
                )),
                intervals.referral,
            ),
            poller(
                Arc::new(NotificationSync::new(
                    wallet.clone(),
                    indexer.clone(),
                    stores.notifications.clone(),
                    persistence.clone(),
                    config.notifications.clone(),
                )),
                intervals.notifications,
            ),
            poller(
                Arc::new(MarketingAssetSync::new(
                    indexer.clone(),
                    stores.marketing.clone(),
                    persistence.clone(),
                )),
                intervals.marketing_assets,
            ),
            poller(
                Arc::new(TransactionReconcileSync::new(
                    rpc.clone(),
                    stores.transactions.clone(),
                    persistence.clone(),
                )),
                intervals.transactions,
            ),
        ];

        let sender = Arc::new(TransactionSender::new(
            rpc,
            stores.transactions.clone(),
            events.clone(),
            persistence.clone(),
        ));
        sender.set_balance_poller(balance_poller.clone());

        Self {
            wallet,
            stores,
            persistence,
            events,
            pollers,
            balance_poller,
            sender,
        }
    }

    pub fn wallet(&self) -> &TokenAddress {
        &self.wallet
    }

    pub fn stores(&self) -> &WalletStores {
        &self.stores
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn sender(&self) -> &Arc<TransactionSender> {
        &self.sender
    }

    pub fn pollers(&self) -> &[Arc<Poller>] {
        &self.pollers
    }

    /// Poller by strategy name, e.g. `"balances"`.
    pub fn poller(&self, name: &str) -> Option<&Arc<Poller>> {
        self.pollers.iter().find(|p| p.name() == name)
    }

    /// Add a subscriber to the event bus.
    pub fn register_handler(&self, handler: Arc<dyn SyncEventHandler>) {
        self.events.register_handler(handler);
    }

    /// Hydrate every store from its snapshot. Returns how many snapshots were loaded.
    pub fn restore(&self) -> usize {
        let restored = self.persistence.restore_all(&self.stores);
        info!(
            "Restored {} cached snapshots for wallet {}",
            restored, self.wallet
        );
        restored
    }

    /// Start every poller. Each one fetches immediately, then on its interval.
    pub fn start(&self) {
        info!(
            "Starting {} pollers for wallet {}",
            self.pollers.len(),
            self.wallet
        );
        for poller in &self.pollers {
            poller.resume();
        }
    }

    /// Pause every poller and cancel in-flight fetches.
    pub fn stop(&self) {
        for poller in &self.pollers {
            poller.pause();
        }
        info!("All pollers paused");
    }

    /// Refresh balances now, outside the regular schedule.
    pub fn refresh_balances(&self) -> bool {
        self.balance_poller.trigger()
    }

    /// Write every non-empty store to disk. Returns how many snapshots were written.
    pub async fn flush(&self) -> Result<usize, WalletSyncError> {
        let written = self.persistence.flush_all(&self.stores).await?;
        info!("Flushed {} snapshots", written);
        Ok(written)
    }

    pub fn stats(&self) -> Vec<PollerStats> {
        self.pollers.iter().map(|p| p.stats()).collect()
    }

    /// USD value of every held balance with a known price and decimals.
    pub fn total_usd_value(&self) -> f64 {
        self.stores
            .balances
            .held_tokens()
            .into_iter()
            .filter_map(|address| {
                let decimals = if address.is_native() {
                    NATIVE_TOKEN_DECIMALS
                } else {
                    self.stores.tokens.token(&address)?.decimals
                };
                let amount = self.stores.balances.balance_for_address(&address)?;
                let price = self.stores.prices.usd_for_address(&address);
                Some(token_value(amount, decimals, price))
            })
            .sum()
    }
}
