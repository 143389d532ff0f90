//!
//! REST client for the wallet indexer service.
//!
//! This module provides an async client for the indexer endpoints the sync core polls: the
//! supported token list, token prices, lending balances, referral data, marketing assets and the
//! notification feed. Every endpoint answers with a JSON envelope carrying a `timestamp` next to
//! its payload. All methods are async and designed for use with Tokio.

use super::types::*;
use crate::wallet::TokenAddress;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

/// The indexer operations consumed by the sync strategies.
#[async_trait]
pub trait IndexerApi: Send + Sync {
	async fn supported_tokens(&self) -> Result<Vec<Token>, IndexerError>;

	async fn token_prices(&self, addresses: &[TokenAddress])
	-> Result<Vec<TokenPrice>, IndexerError>;

	async fn lending_balances(
		&self,
		wallet: &TokenAddress,
	) -> Result<Vec<LendingPlatformBalance>, IndexerError>;

	async fn lending_distribution_balance(
		&self,
		wallet: &TokenAddress,
	) -> Result<Option<LendingDistributionBalance>, IndexerError>;

	async fn referral_overview(&self, wallet: &TokenAddress)
	-> Result<ReferralOverview, IndexerError>;

	async fn claim_history(&self, wallet: &TokenAddress) -> Result<Vec<ClaimHistory>, IndexerError>;

	async fn marketing_assets(&self) -> Result<Vec<MarketingAsset>, IndexerError>;

	/// One page of notifications, newest first, strictly older than `before_id` when given.
	async fn notifications(
		&self,
		wallet: &TokenAddress,
		before_id: Option<u64>,
		limit: usize,
	) -> Result<Vec<NotificationItem>, IndexerError>;
}

/// Wallet indexer REST client
#[derive(Clone)]
pub struct WalletIndexerClient {
	/// The underlying HTTP client.
	http_client: Client,
	/// Base URL including the chain segment, e.g. `https://api.example.app/bsc`.
	base_url: String,
}

impl WalletIndexerClient {
	/// Create a new indexer client.
	///
	/// # Arguments
	/// * `base_url` - The chain-scoped base URL of the indexer.
	/// * `timeout` - Per-request timeout.
	pub fn new(base_url: String, timeout: Duration) -> Self {
		let http_client = Client::builder()
			.timeout(timeout)
			.build()
			.expect("Failed to create HTTP client");

		Self {
			http_client,
			base_url: base_url.trim_end_matches('/').to_string(),
		}
	}

	/// Execute a GET request and decode the JSON envelope.
	///
	/// # Arguments
	/// * `path` - Endpoint path relative to the base URL.
	/// * `query` - Query string pairs.
	///
	/// # Returns
	/// The decoded envelope, or an `IndexerError` if the request or decoding fails.
	pub async fn get_json<T: DeserializeOwned>(
		&self,
		path: &str,
		query: &[(&str, String)],
	) -> Result<T, IndexerError> {
		let url = format!("{}/{}", self.base_url, path);
		debug!("GET {} {:?}", url, query);

		let response = self.http_client.get(&url).query(query).send().await?;

		if !response.status().is_success() {
			return Err(IndexerError::StatusError(response.status().as_u16()));
		}

		let body = response.text().await?;
		let decoded = serde_json::from_str::<T>(&body)?;
		Ok(decoded)
	}
}

#[async_trait]
impl IndexerApi for WalletIndexerClient {
	async fn supported_tokens(&self) -> Result<Vec<Token>, IndexerError> {
		let response: TokenListResponse = self.get_json("v1/token/supportedTokens", &[]).await?;
		debug!(
			"Fetched {} supported tokens (timestamp {})",
			response.tokens.len(),
			response.timestamp
		);
		Ok(response.tokens)
	}

	async fn token_prices(
		&self,
		addresses: &[TokenAddress],
	) -> Result<Vec<TokenPrice>, IndexerError> {
		if addresses.is_empty() {
			return Ok(Vec::new());
		}

		let joined = addresses
			.iter()
			.map(|a| a.as_str())
			.collect::<Vec<_>>()
			.join(",");
		let response: TokenPriceResponse = self
			.get_json("v1/market/priceSeries", &[("addresses", joined)])
			.await?;
		Ok(response.data)
	}

	async fn lending_balances(
		&self,
		wallet: &TokenAddress,
	) -> Result<Vec<LendingPlatformBalance>, IndexerError> {
		let response: LendingBalanceResponse = self
			.get_json(
				"v1/lending/balances",
				&[("address", wallet.as_str().to_string())],
			)
			.await?;
		Ok(response.result)
	}

	async fn lending_distribution_balance(
		&self,
		wallet: &TokenAddress,
	) -> Result<Option<LendingDistributionBalance>, IndexerError> {
		let response: LendingDistributionResponse = self
			.get_json(
				"v1/lending/distributionBalance",
				&[("address", wallet.as_str().to_string())],
			)
			.await?;
		Ok(response.balance)
	}

	async fn referral_overview(
		&self,
		wallet: &TokenAddress,
	) -> Result<ReferralOverview, IndexerError> {
		let response: ReferralOverviewResponse = self
			.get_json(
				"v1/account/referralOverview",
				&[("address", wallet.as_str().to_string())],
			)
			.await?;
		Ok(response.overview)
	}

	async fn claim_history(&self, wallet: &TokenAddress) -> Result<Vec<ClaimHistory>, IndexerError> {
		let response: ClaimHistoryResponse = self
			.get_json(
				"v1/account/claimHistory",
				&[("address", wallet.as_str().to_string())],
			)
			.await?;
		Ok(response.claims)
	}

	async fn marketing_assets(&self) -> Result<Vec<MarketingAsset>, IndexerError> {
		let response: MarketingAssetResponse =
			self.get_json("v1/marketing/assets", &[]).await?;
		Ok(response.assets)
	}

	async fn notifications(
		&self,
		wallet: &TokenAddress,
		before_id: Option<u64>,
		limit: usize,
	) -> Result<Vec<NotificationItem>, IndexerError> {
		let mut query = vec![
			("address", wallet.as_str().to_string()),
			("limit", limit.to_string()),
		];
		if let Some(id) = before_id {
			query.push(("beforeId", id.to_string()));
		}

		let response: NotificationResponse =
			self.get_json("v1/notification/list", &query).await?;
		Ok(response.notifications)
	}
}
