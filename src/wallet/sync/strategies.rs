use crate::indexer::{ChainRpc, IndexerApi, IndexerError, TokenBalance};
use crate::transaction::TransactionTracker;
use crate::wallet::store::{
	BalanceStore, ClaimHistoryStore, LendingRewardStore, LendingStore, MarketingAssetStore,
	NotificationStore, PriceStore, ReferralStore, TokenStore,
};
use crate::wallet::sync::events::SyncEvent;
use crate::wallet::sync::state_persistence::{SnapshotKey, StatePersistenceService};
use crate::wallet::{TokenAddress, WalletSyncError};

use futures::future::join_all;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Trait for the per-category fetch performed on every poll cycle
#[async_trait::async_trait]
pub trait SyncStrategy: Send + Sync {
	/// Fetch, merge into the store and persist. Returns the events to announce.
	///
	/// Implementations must not mutate any store once `cancel` has fired.
	async fn sync(&self, cancel: &CancellationToken) -> Result<Vec<SyncEvent>, WalletSyncError>;

	/// Get the name of this strategy
	fn name(&self) -> &'static str;
}

fn ensure_active(cancel: &CancellationToken) -> Result<(), WalletSyncError> {
	if cancel.is_cancelled() {
		Err(WalletSyncError::Cancelled)
	} else {
		Ok(())
	}
}

/// Native coin first, then every supported token.
fn tracked_addresses(tokens: &TokenStore) -> Vec<TokenAddress> {
	let mut addresses = vec![TokenAddress::native()];
	addresses.extend(tokens.addresses().into_iter().filter(|a| !a.is_native()));
	addresses
}

/// Configuration for the balance strategy
#[derive(Debug, Clone)]
pub struct BalanceSyncConfig {
	/// Contracts per batched multi-call
	pub chunk_size: usize,
	/// Delay step between per-address fallback lookups
	pub fallback_delay: Duration,
}

impl Default for BalanceSyncConfig {
	fn default() -> Self {
		Self {
			chunk_size: 20,
			fallback_delay: Duration::from_millis(250),
		}
	}
}

/// Strategy for refreshing on-chain balances in concurrent batches
pub struct BalanceSync {
	wallet: TokenAddress,
	rpc: Arc<dyn ChainRpc>,
	tokens: Arc<TokenStore>,
	balances: Arc<BalanceStore>,
	persistence: Arc<StatePersistenceService>,
	config: BalanceSyncConfig,
}

impl BalanceSync {
	pub fn new(
		wallet: TokenAddress,
		rpc: Arc<dyn ChainRpc>,
		tokens: Arc<TokenStore>,
		balances: Arc<BalanceStore>,
		persistence: Arc<StatePersistenceService>,
		config: BalanceSyncConfig,
	) -> Self {
		Self {
			wallet,
			rpc,
			tokens,
			balances,
			persistence,
			config,
		}
	}

	async fn fetch_single(&self, address: &TokenAddress) -> Result<alloy_primitives::U256, IndexerError> {
		if address.is_native() {
			self.rpc.get_native_balance(&self.wallet).await
		} else {
			self.rpc.get_token_balance(&self.wallet, address).await
		}
	}

	/// Per-address lookups, the i-th one delayed by `i * fallback_delay`.
	async fn fallback(
		&self,
		addresses: Vec<TokenAddress>,
		cancel: &CancellationToken,
	) -> Result<usize, WalletSyncError> {
		info!("Falling back to {} individual balance lookups", addresses.len());

		let lookups = addresses.iter().enumerate().map(|(i, address)| {
			let delay = self.config.fallback_delay * i as u32;
			async move {
				tokio::time::sleep(delay).await;
				(address, self.fetch_single(address).await)
			}
		});
		let results = join_all(lookups).await;

		let mut updated = 0;
		for (address, result) in results {
			match result {
				Ok(amount) => {
					ensure_active(cancel)?;
					if self.balances.update_balance(address.clone(), amount) {
						updated += 1;
					}
				}
				Err(e) => debug!("Fallback balance lookup for {} failed: {}", address, e),
			}
		}
		Ok(updated)
	}
}

#[async_trait::async_trait]
impl SyncStrategy for BalanceSync {
	async fn sync(&self, cancel: &CancellationToken) -> Result<Vec<SyncEvent>, WalletSyncError> {
		let addresses = tracked_addresses(&self.tokens);
		let chunks: Vec<&[TokenAddress]> = addresses.chunks(self.config.chunk_size.max(1)).collect();

		debug!(
			"Fetching {} balances in {} batches",
			addresses.len(),
			chunks.len()
		);

		let results = join_all(
			chunks
				.iter()
				.map(|chunk| self.rpc.get_multiple_erc20_balances(&self.wallet, chunk)),
		)
		.await;

		if results
			.iter()
			.any(|r| matches!(r, Err(e) if e.is_not_connected()))
		{
			return Err(IndexerError::NotConnected.into());
		}

		let mut updated = 0;
		let mut fallback: Vec<TokenAddress> = Vec::new();

		for (chunk, result) in chunks.iter().zip(results) {
			match result {
				Ok(balances) if balances.len() == chunk.len() => {
					ensure_active(cancel)?;
					updated += self.balances.merge_balances(balances);
				}
				Ok(balances) => {
					// Incomplete batch: keep nothing from it, retry only what is missing
					let returned: HashSet<&TokenAddress> =
						balances.iter().map(|b: &TokenBalance| &b.address).collect();
					let missing: Vec<TokenAddress> = chunk
						.iter()
						.filter(|a| !returned.contains(a))
						.cloned()
						.collect();
					warn!(
						"Balance batch returned {}/{} results, {} queued for fallback",
						balances.len(),
						chunk.len(),
						missing.len()
					);
					fallback.extend(missing);
				}
				Err(e) => {
					warn!("Balance batch of {} failed: {}", chunk.len(), e);
					fallback.extend(chunk.iter().cloned());
				}
			}
		}

		if !fallback.is_empty() {
			ensure_active(cancel)?;
			updated += self.fallback(fallback, cancel).await?;
		}

		if updated == 0 {
			return Ok(Vec::new());
		}

		ensure_active(cancel)?;
		self.persistence
			.persist_snapshot(SnapshotKey::Balances, &*self.balances);
		Ok(vec![SyncEvent::BalancesChanged { updated }])
	}

	fn name(&self) -> &'static str {
		"balances"
	}
}

/// Strategy for refreshing the supported token list
pub struct SupportedTokenSync {
	indexer: Arc<dyn IndexerApi>,
	tokens: Arc<TokenStore>,
	persistence: Arc<StatePersistenceService>,
}

impl SupportedTokenSync {
	pub fn new(
		indexer: Arc<dyn IndexerApi>,
		tokens: Arc<TokenStore>,
		persistence: Arc<StatePersistenceService>,
	) -> Self {
		Self {
			indexer,
			tokens,
			persistence,
		}
	}
}

#[async_trait::async_trait]
impl SyncStrategy for SupportedTokenSync {
	async fn sync(&self, cancel: &CancellationToken) -> Result<Vec<SyncEvent>, WalletSyncError> {
		let tokens = self.indexer.supported_tokens().await?;

		ensure_active(cancel)?;
		if !self.tokens.set_tokens(tokens) {
			return Ok(Vec::new());
		}

		self.persistence
			.persist_snapshot(SnapshotKey::SupportedTokens, &*self.tokens);
		Ok(vec![SyncEvent::SupportedTokensChanged {
			count: self.tokens.len(),
		}])
	}

	fn name(&self) -> &'static str {
		"supported_tokens"
	}
}

/// Addresses per price request.
const PRICE_CHUNK_SIZE: usize = 50;

/// Strategy for refreshing token prices
pub struct PriceSync {
	indexer: Arc<dyn IndexerApi>,
	tokens: Arc<TokenStore>,
	prices: Arc<PriceStore>,
	persistence: Arc<StatePersistenceService>,
}

impl PriceSync {
	pub fn new(
		indexer: Arc<dyn IndexerApi>,
		tokens: Arc<TokenStore>,
		prices: Arc<PriceStore>,
		persistence: Arc<StatePersistenceService>,
	) -> Self {
		Self {
			indexer,
			tokens,
			prices,
			persistence,
		}
	}
}

#[async_trait::async_trait]
impl SyncStrategy for PriceSync {
	async fn sync(&self, cancel: &CancellationToken) -> Result<Vec<SyncEvent>, WalletSyncError> {
		let addresses = tracked_addresses(&self.tokens);
		let results = join_all(
			addresses
				.chunks(PRICE_CHUNK_SIZE)
				.map(|chunk| self.indexer.token_prices(chunk)),
		)
		.await;

		let mut prices = Vec::with_capacity(addresses.len());
		for result in results {
			prices.extend(result?);
		}

		ensure_active(cancel)?;
		if !self.prices.set_prices(prices) {
			return Ok(Vec::new());
		}

		self.persistence
			.persist_snapshot(SnapshotKey::Prices, &*self.prices);
		Ok(vec![SyncEvent::PricesChanged {
			count: self.prices.len(),
		}])
	}

	fn name(&self) -> &'static str {
		"prices"
	}
}

/// Strategy for refreshing lending positions and unclaimed rewards
pub struct LendingBalanceSync {
	wallet: TokenAddress,
	indexer: Arc<dyn IndexerApi>,
	lending: Arc<LendingStore>,
	rewards: Arc<LendingRewardStore>,
	persistence: Arc<StatePersistenceService>,
}

impl LendingBalanceSync {
	pub fn new(
		wallet: TokenAddress,
		indexer: Arc<dyn IndexerApi>,
		lending: Arc<LendingStore>,
		rewards: Arc<LendingRewardStore>,
		persistence: Arc<StatePersistenceService>,
	) -> Self {
		Self {
			wallet,
			indexer,
			lending,
			rewards,
			persistence,
		}
	}
}

#[async_trait::async_trait]
impl SyncStrategy for LendingBalanceSync {
	async fn sync(&self, cancel: &CancellationToken) -> Result<Vec<SyncEvent>, WalletSyncError> {
		let (platforms, distribution) = futures::join!(
			self.indexer.lending_balances(&self.wallet),
			self.indexer.lending_distribution_balance(&self.wallet)
		);
		let platforms = platforms?;
		let distribution = distribution?;

		ensure_active(cancel)?;
		let platforms_changed = self.lending.set_platforms(platforms);
		let rewards_changed = self.rewards.set_distribution(distribution);

		if platforms_changed {
			self.persistence
				.persist_snapshot(SnapshotKey::Lending, &*self.lending);
		}
		if rewards_changed {
			self.persistence
				.persist_snapshot(SnapshotKey::LendingDistribution, &*self.rewards);
		}

		if platforms_changed || rewards_changed {
			Ok(vec![SyncEvent::LendingBalancesChanged])
		} else {
			Ok(Vec::new())
		}
	}

	fn name(&self) -> &'static str {
		"lending"
	}
}

/// Strategy for refreshing the referral overview and claim history
pub struct ReferralSync {
	wallet: TokenAddress,
	indexer: Arc<dyn IndexerApi>,
	referral: Arc<ReferralStore>,
	claims: Arc<ClaimHistoryStore>,
	persistence: Arc<StatePersistenceService>,
}

impl ReferralSync {
	pub fn new(
		wallet: TokenAddress,
		indexer: Arc<dyn IndexerApi>,
		referral: Arc<ReferralStore>,
		claims: Arc<ClaimHistoryStore>,
		persistence: Arc<StatePersistenceService>,
	) -> Self {
		Self {
			wallet,
			indexer,
			referral,
			claims,
			persistence,
		}
	}
}

#[async_trait::async_trait]
impl SyncStrategy for ReferralSync {
	async fn sync(&self, cancel: &CancellationToken) -> Result<Vec<SyncEvent>, WalletSyncError> {
		let (overview, claims) = futures::join!(
			self.indexer.referral_overview(&self.wallet),
			self.indexer.claim_history(&self.wallet)
		);
		let overview = overview?;
		let claims = claims?;

		ensure_active(cancel)?;
		let overview_changed = self.referral.set_overview(overview);
		let claims_changed = self.claims.set_claims(claims);

		if overview_changed {
			self.persistence
				.persist_snapshot(SnapshotKey::Referral, &*self.referral);
		}
		if claims_changed {
			self.persistence
				.persist_snapshot(SnapshotKey::ClaimHistory, &*self.claims);
		}

		if overview_changed || claims_changed {
			Ok(vec![SyncEvent::ReferralOverviewChanged])
		} else {
			Ok(Vec::new())
		}
	}

	fn name(&self) -> &'static str {
		"referral"
	}
}

/// Configuration for notification paging
#[derive(Debug, Clone)]
pub struct NotificationSyncConfig {
	pub page_size: usize,
	pub max_pages: usize,
}

impl Default for NotificationSyncConfig {
	fn default() -> Self {
		Self {
			page_size: 20,
			max_pages: 5,
		}
	}
}

/// Strategy for refreshing the notification feed page by page
pub struct NotificationSync {
	wallet: TokenAddress,
	indexer: Arc<dyn IndexerApi>,
	notifications: Arc<NotificationStore>,
	persistence: Arc<StatePersistenceService>,
	config: NotificationSyncConfig,
}

impl NotificationSync {
	pub fn new(
		wallet: TokenAddress,
		indexer: Arc<dyn IndexerApi>,
		notifications: Arc<NotificationStore>,
		persistence: Arc<StatePersistenceService>,
		config: NotificationSyncConfig,
	) -> Self {
		Self {
			wallet,
			indexer,
			notifications,
			persistence,
			config,
		}
	}
}

#[async_trait::async_trait]
impl SyncStrategy for NotificationSync {
	async fn sync(&self, cancel: &CancellationToken) -> Result<Vec<SyncEvent>, WalletSyncError> {
		let page_size = self.config.page_size.max(1);
		let mut items = Vec::new();
		let mut before_id = None;

		for page in 0..self.config.max_pages.max(1) {
			ensure_active(cancel)?;
			let batch = self
				.indexer
				.notifications(&self.wallet, before_id, page_size)
				.await?;
			let fetched = batch.len();
			// Pages are newest first, so the oldest id of this page bounds the next one
			let oldest = batch.iter().map(|n| n.id).min();
			items.extend(batch);

			debug!("Notification page {} returned {} items", page, fetched);
			match oldest {
				Some(id) if fetched >= page_size => before_id = Some(id),
				_ => break,
			}
		}

		ensure_active(cancel)?;
		if !self.notifications.set_notifications(items) {
			return Ok(Vec::new());
		}

		self.persistence
			.persist_snapshot(SnapshotKey::Notifications, &*self.notifications);
		Ok(vec![SyncEvent::NotificationsChanged {
			count: self.notifications.len(),
			unread: self.notifications.unread_count(),
		}])
	}

	fn name(&self) -> &'static str {
		"notifications"
	}
}

/// Strategy for refreshing marketing assets
pub struct MarketingAssetSync {
	indexer: Arc<dyn IndexerApi>,
	assets: Arc<MarketingAssetStore>,
	persistence: Arc<StatePersistenceService>,
}

impl MarketingAssetSync {
	pub fn new(
		indexer: Arc<dyn IndexerApi>,
		assets: Arc<MarketingAssetStore>,
		persistence: Arc<StatePersistenceService>,
	) -> Self {
		Self {
			indexer,
			assets,
			persistence,
		}
	}
}

#[async_trait::async_trait]
impl SyncStrategy for MarketingAssetSync {
	async fn sync(&self, cancel: &CancellationToken) -> Result<Vec<SyncEvent>, WalletSyncError> {
		let assets = self.indexer.marketing_assets().await?;
		let count = assets.len();

		ensure_active(cancel)?;
		if !self.assets.set_assets(assets) {
			return Ok(Vec::new());
		}

		self.persistence
			.persist_snapshot(SnapshotKey::MarketingAssets, &*self.assets);
		Ok(vec![SyncEvent::MarketingAssetsChanged { count }])
	}

	fn name(&self) -> &'static str {
		"marketing_assets"
	}
}

/// Strategy for reconciling locally submitted transactions with the chain
pub struct TransactionReconcileSync {
	rpc: Arc<dyn ChainRpc>,
	tracker: Arc<TransactionTracker>,
	persistence: Arc<StatePersistenceService>,
}

impl TransactionReconcileSync {
	pub fn new(
		rpc: Arc<dyn ChainRpc>,
		tracker: Arc<TransactionTracker>,
		persistence: Arc<StatePersistenceService>,
	) -> Self {
		Self {
			rpc,
			tracker,
			persistence,
		}
	}
}

#[async_trait::async_trait]
impl SyncStrategy for TransactionReconcileSync {
	async fn sync(&self, cancel: &CancellationToken) -> Result<Vec<SyncEvent>, WalletSyncError> {
		let outcome = self.tracker.reconcile(&*self.rpc, cancel).await?;
		if outcome.is_empty() {
			return Ok(Vec::new());
		}

		self.persistence
			.persist_snapshot(SnapshotKey::InternalHistory, &*self.tracker);

		let mut events: Vec<SyncEvent> = outcome
			.transitions
			.into_iter()
			.map(|(hash, state)| SyncEvent::TransactionStateChanged { hash, state })
			.collect();
		if !outcome.purged.is_empty() {
			events.push(SyncEvent::TransactionsPurged {
				hashes: outcome.purged,
			});
		}
		Ok(events)
	}

	fn name(&self) -> &'static str {
		"transactions"
	}
}
