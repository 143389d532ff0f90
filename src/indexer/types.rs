//! Types for the chain RPC and REST indexer integrations

use crate::wallet::TokenAddress;

use alloy_primitives::U256;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use tracing::warn;

/// A token the indexer reports as supported on the current chain.
///
/// Immutable once fetched; the whole list is replaced on refresh.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Token {
    /// The token contract address.
    pub address: TokenAddress,
    /// Display name.
    pub name: String,
    /// Ticker symbol.
    pub symbol: String,
    /// Number of decimal places used by the contract.
    pub decimals: u8,
    /// Logo URL or asset reference.
    #[serde(default)]
    pub logo: String,
}

/// A raw on-chain balance for a single token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenBalance {
    pub address: TokenAddress,
    pub balance: U256,
}

/// Multi-currency spot price for a token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TokenPrice {
    pub address: TokenAddress,
    #[serde(default)]
    pub usd: f64,
    #[serde(default)]
    pub usd_24h_change: f64,
    #[serde(default)]
    pub usd_market_cap: f64,
    #[serde(default)]
    pub usd_24h_volume: f64,
    #[serde(default)]
    pub eth: f64,
    #[serde(default)]
    pub eth_24h_change: f64,
    #[serde(default)]
    pub btc: f64,
    #[serde(default)]
    pub btc_24h_change: f64,
    /// Unix seconds of the indexer's last price update.
    #[serde(default)]
    pub last_updated: i64,
}

impl TokenPrice {
    /// A USD-only quote, other currencies zeroed.
    pub fn usd_only(address: TokenAddress, usd: f64) -> Self {
        Self {
            address,
            usd,
            usd_24h_change: 0.0,
            usd_market_cap: 0.0,
            usd_24h_volume: 0.0,
            eth: 0.0,
            eth_24h_change: 0.0,
            btc: 0.0,
            btc_24h_change: 0.0,
            last_updated: 0,
        }
    }
}

/// Supply/borrow position for one token on one lending platform.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LendingBalance {
    pub address: TokenAddress,
    pub symbol: String,
    #[serde(default)]
    pub decimals: u8,
    #[serde(default)]
    pub supply_balance: String,
    #[serde(default)]
    pub stable_borrow_balance: String,
    #[serde(default)]
    pub variable_borrow_balance: String,
    #[serde(default)]
    pub supply_rate: f64,
    #[serde(default)]
    pub stable_borrow_rate: f64,
    #[serde(default)]
    pub variable_borrow_rate: f64,
}

/// All positions held on a single lending platform (e.g. Compound, Venus).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LendingPlatformBalance {
    pub name: String,
    pub balances: Vec<LendingBalance>,
}

/// Unclaimed lending rewards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LendingDistributionBalance {
    pub token_address: TokenAddress,
    pub symbol: String,
    #[serde(default)]
    pub decimals: u8,
    #[serde(default)]
    pub unclaimed: String,
}

/// Per-code referral statistics.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReferralCode {
    pub total_refer: u64,
    pub total_point: f64,
    pub ratio: f64,
}

/// Referral totals plus the per-code breakdown.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ReferralOverview {
    #[serde(default)]
    pub total_point: f64,
    #[serde(default)]
    pub total_cashback: f64,
    #[serde(default)]
    pub codes: HashMap<String, ReferralCode>,
}

/// A past reward claim made by the wallet.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClaimHistory {
    pub tx_hash: String,
    pub amount: f64,
    pub status: String,
    pub timestamp: i64,
}

/// A notification feed entry. Ids increase monotonically.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NotificationItem {
    pub id: u64,
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub link: String,
    #[serde(default)]
    pub read: bool,
    /// Unix seconds.
    #[serde(default)]
    pub created_at: i64,
}

/// A banner or promotional asset shown by the wallet.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MarketingAsset {
    pub id: u64,
    #[serde(rename = "type", default)]
    pub asset_type: String,
    pub image_url: String,
    #[serde(default)]
    pub link: String,
    #[serde(default)]
    pub priority: i64,
}

/// Decode a list row by row, skipping rows that do not decode.
fn lenient_rows<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let rows = Vec::<serde_json::Value>::deserialize(deserializer)?;
    let total = rows.len();
    let decoded: Vec<T> = rows
        .into_iter()
        .enumerate()
        .filter_map(|(index, row)| match serde_json::from_value(row) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Skipping malformed row {}: {}", index, e);
                None
            }
        })
        .collect();

    if decoded.len() < total {
        warn!("Kept {} of {} rows", decoded.len(), total);
    }
    Ok(decoded)
}

/// Response envelope for the supported token list.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenListResponse {
    pub timestamp: i64,
    #[serde(deserialize_with = "lenient_rows")]
    pub tokens: Vec<Token>,
}

/// Response envelope for token prices.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenPriceResponse {
    pub timestamp: i64,
    #[serde(deserialize_with = "lenient_rows")]
    pub data: Vec<TokenPrice>,
}

/// Response envelope for lending balances.
#[derive(Debug, Clone, Deserialize)]
pub struct LendingBalanceResponse {
    pub timestamp: i64,
    #[serde(deserialize_with = "lenient_rows")]
    pub result: Vec<LendingPlatformBalance>,
}

/// Response envelope for lending reward balances.
#[derive(Debug, Clone, Deserialize)]
pub struct LendingDistributionResponse {
    pub timestamp: i64,
    pub balance: Option<LendingDistributionBalance>,
}

/// Response envelope for the referral overview.
#[derive(Debug, Clone, Deserialize)]
pub struct ReferralOverviewResponse {
    pub timestamp: i64,
    pub overview: ReferralOverview,
}

/// Response envelope for the claim history.
#[derive(Debug, Clone, Deserialize)]
pub struct ClaimHistoryResponse {
    pub timestamp: i64,
    #[serde(deserialize_with = "lenient_rows")]
    pub claims: Vec<ClaimHistory>,
}

/// Response envelope for marketing assets.
#[derive(Debug, Clone, Deserialize)]
pub struct MarketingAssetResponse {
    pub timestamp: i64,
    #[serde(deserialize_with = "lenient_rows")]
    pub assets: Vec<MarketingAsset>,
}

/// Response envelope for one page of notifications (newest first).
#[derive(Debug, Clone, Deserialize)]
pub struct NotificationResponse {
    pub timestamp: i64,
    pub notifications: Vec<NotificationItem>,
}

/// Outcome of a mined transaction as reported by its receipt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiptStatus {
    Success,
    Failed,
}

/// JSON-RPC 2.0 request body.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: &'static str,
    pub params: serde_json::Value,
}

impl JsonRpcRequest {
    pub fn new(id: u64, method: &'static str, params: serde_json::Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            method,
            params,
        }
    }
}

/// JSON-RPC 2.0 error object.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
}

/// JSON-RPC 2.0 response body.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcResponse {
    pub id: Option<u64>,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<JsonRpcError>,
}

/// Error types for chain RPC and indexer operations
#[derive(Debug, thiserror::Error)]
pub enum IndexerError {
    #[error("Not connected to the internet")]
    NotConnected,

    #[error("Request timed out")]
    Timeout,

    #[error("HTTP error: {0}")]
    HttpError(reqwest::Error),

    #[error("Unexpected HTTP status: {0}")]
    StatusError(u16),

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("RPC error {code}: {message}")]
    RpcError { code: i64, message: String },

    #[error("No data returned")]
    NoData,

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl IndexerError {
    /// Whether this is the "no network" condition.
    pub fn is_not_connected(&self) -> bool {
        matches!(self, IndexerError::NotConnected)
    }

    /// Transport failures that are worth retrying right away.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            IndexerError::Timeout | IndexerError::HttpError(_) | IndexerError::StatusError(500..)
        )
    }

    /// The node rejected a broadcast because it already holds the same transaction.
    pub fn is_already_known(&self) -> bool {
        match self {
            IndexerError::RpcError { message, .. } => {
                let message = message.to_ascii_lowercase();
                message.contains("already known")
                    || message.contains("known transaction")
                    || message.contains("already imported")
            }
            _ => false,
        }
    }
}

impl From<reqwest::Error> for IndexerError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_connect() {
            IndexerError::NotConnected
        } else if e.is_timeout() {
            IndexerError::Timeout
        } else if let Some(status) = e.status() {
            IndexerError::StatusError(status.as_u16())
        } else if e.is_decode() {
            IndexerError::InvalidResponse(e.to_string())
        } else {
            IndexerError::HttpError(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_list_envelope_decodes_mixed_case_addresses() {
        let body = r#"{
            "timestamp": 1700000000,
            "tokens": [
                {"address": "0x55d398326f99059fF775485246999027B3197955", "name": "Tether USD", "symbol": "USDT", "decimals": 18, "logo": "usdt.png"},
                {"address": "0xeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeee", "name": "BNB", "symbol": "BNB", "decimals": 18}
            ]
        }"#;

        let response: TokenListResponse = serde_json::from_str(body).unwrap();
        assert_eq!(response.tokens.len(), 2);
        assert_eq!(
            response.tokens[0].address.as_str(),
            "0x55d398326f99059ff775485246999027b3197955"
        );
        assert!(response.tokens[1].address.is_native());
        assert_eq!(response.tokens[1].logo, "");
    }

    #[test]
    fn malformed_token_row_is_skipped() {
        let body = r#"{
            "timestamp": 1700000000,
            "tokens": [
                {"address": "0x55d398326f99059fF775485246999027B3197955", "name": "Tether USD", "symbol": "USDT", "decimals": 18},
                {"address": "0x1234", "name": "Broken", "symbol": "BRK", "decimals": 18},
                {"address": "0xe9e7cea3dedca5984780bafc599bd69add087d56", "name": "BUSD", "symbol": "BUSD", "decimals": "eighteen"},
                {"address": "0xeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeee", "name": "BNB", "symbol": "BNB", "decimals": 18}
            ]
        }"#;

        let response: TokenListResponse = serde_json::from_str(body).unwrap();
        let symbols: Vec<&str> = response.tokens.iter().map(|t| t.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["USDT", "BNB"]);
    }

    #[test]
    fn envelope_without_row_list_is_still_an_error() {
        let body = r#"{"timestamp": 1, "data": "unavailable"}"#;
        assert!(serde_json::from_str::<TokenPriceResponse>(body).is_err());
    }

    #[test]
    fn price_envelope_uses_camel_case_fields() {
        let body = r#"{
            "timestamp": 1,
            "data": [{"address": "0x55d398326f99059ff775485246999027b3197955", "usd": 1.0, "usd24hChange": -0.1, "btc": 0.00003, "lastUpdated": 42}]
        }"#;
        let response: TokenPriceResponse = serde_json::from_str(body).unwrap();
        assert_eq!(response.data[0].usd_24h_change, -0.1);
        assert_eq!(response.data[0].last_updated, 42);
        assert_eq!(response.data[0].eth, 0.0);
    }

    #[test]
    fn rpc_response_with_error_object() {
        let body = r#"{"jsonrpc":"2.0","id":7,"error":{"code":-32000,"message":"execution reverted"}}"#;
        let response: JsonRpcResponse = serde_json::from_str(body).unwrap();
        assert_eq!(response.id, Some(7));
        assert!(response.result.is_none());
        assert_eq!(response.error.unwrap().code, -32000);
    }

    #[test]
    fn transient_classification() {
        assert!(IndexerError::Timeout.is_transient());
        assert!(IndexerError::StatusError(503).is_transient());
        assert!(!IndexerError::StatusError(404).is_transient());
        assert!(!IndexerError::NotConnected.is_transient());
        assert!(IndexerError::NotConnected.is_not_connected());
    }

    #[test]
    fn already_known_detection() {
        let known = IndexerError::RpcError {
            code: -32000,
            message: "Already Known".to_string(),
        };
        assert!(known.is_already_known());
        assert!(
            !IndexerError::RpcError {
                code: -32000,
                message: "nonce too low".to_string()
            }
            .is_already_known()
        );
        assert!(!IndexerError::Timeout.is_already_known());
    }
}
