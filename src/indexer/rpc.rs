//!
//! JSON-RPC client for an EVM node.
//!
//! Covers the handful of calls the sync core needs: native and ERC-20 balances (single and
//! batched), raw transaction broadcast, receipts and account nonces. Batched balance lookups are
//! sent as one JSON-RPC batch and matched back to their contracts by request id, so an answer with
//! missing or failed entries is reported as a shorter result list rather than an error.

use super::types::*;
use crate::wallet::TokenAddress;

use alloy_primitives::U256;
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::json;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

/// `balanceOf(address)` selector.
const BALANCE_OF_SELECTOR: &str = "70a08231";

/// Chain operations consumed by the balance poller, the reconciler and the sender.
#[async_trait]
pub trait ChainRpc: Send + Sync {
	async fn get_native_balance(&self, owner: &TokenAddress) -> Result<U256, IndexerError>;

	async fn get_token_balance(
		&self,
		owner: &TokenAddress,
		contract: &TokenAddress,
	) -> Result<U256, IndexerError>;

	/// Balances for many contracts in one round trip. Entries the node failed to answer are
	/// omitted, so the result may be shorter than `contracts`.
	async fn get_multiple_erc20_balances(
		&self,
		owner: &TokenAddress,
		contracts: &[TokenAddress],
	) -> Result<Vec<TokenBalance>, IndexerError>;

	/// Broadcast a signed transaction and return its hash.
	async fn send_raw_transaction(&self, signed: &[u8]) -> Result<String, IndexerError>;

	/// `None` while the transaction is not mined.
	async fn get_transaction_receipt(
		&self,
		hash: &str,
	) -> Result<Option<ReceiptStatus>, IndexerError>;

	/// Number of transactions mined from `owner` (the next usable nonce).
	async fn get_transaction_count(&self, owner: &TokenAddress) -> Result<u64, IndexerError>;
}

/// EVM JSON-RPC client
#[derive(Clone)]
pub struct ChainRpcClient {
	http_client: Client,
	rpc_url: String,
}

impl ChainRpcClient {
	pub fn new(rpc_url: String, timeout: Duration) -> Self {
		let http_client = Client::builder()
			.timeout(timeout)
			.build()
			.expect("Failed to create HTTP client");

		Self {
			http_client,
			rpc_url,
		}
	}

	async fn post<B: Serialize + ?Sized>(&self, body: &B) -> Result<serde_json::Value, IndexerError> {
		let response = self
			.http_client
			.post(&self.rpc_url)
			.header("Content-Type", "application/json")
			.json(body)
			.send()
			.await?;

		if !response.status().is_success() {
			return Err(IndexerError::StatusError(response.status().as_u16()));
		}

		let text = response.text().await?;
		Ok(serde_json::from_str(&text)?)
	}

	/// Execute a single JSON-RPC call and return its `result`.
	pub async fn call(
		&self,
		method: &'static str,
		params: serde_json::Value,
	) -> Result<serde_json::Value, IndexerError> {
		let request = JsonRpcRequest::new(1, method, params);
		let raw = self.post(&request).await?;
		let response: JsonRpcResponse = serde_json::from_value(raw)?;

		if let Some(error) = response.error {
			return Err(IndexerError::RpcError {
				code: error.code,
				message: error.message,
			});
		}

		response.result.ok_or(IndexerError::NoData)
	}

	fn balance_request(id: u64, owner: &TokenAddress, contract: &TokenAddress) -> JsonRpcRequest {
		if contract.is_native() {
			JsonRpcRequest::new(id, "eth_getBalance", json!([owner.as_str(), "latest"]))
		} else {
			JsonRpcRequest::new(
				id,
				"eth_call",
				json!([
					{
						"to": contract.as_str(),
						"data": format!("0x{}{}", BALANCE_OF_SELECTOR, owner.abi_word()),
					},
					"latest"
				]),
			)
		}
	}
}

#[async_trait]
impl ChainRpc for ChainRpcClient {
	async fn get_native_balance(&self, owner: &TokenAddress) -> Result<U256, IndexerError> {
		let result = self
			.call("eth_getBalance", json!([owner.as_str(), "latest"]))
			.await?;
		parse_quantity(&result)
	}

	async fn get_token_balance(
		&self,
		owner: &TokenAddress,
		contract: &TokenAddress,
	) -> Result<U256, IndexerError> {
		let request = Self::balance_request(1, owner, contract);
		let result = self.call(request.method, request.params).await?;
		parse_quantity(&result)
	}

	async fn get_multiple_erc20_balances(
		&self,
		owner: &TokenAddress,
		contracts: &[TokenAddress],
	) -> Result<Vec<TokenBalance>, IndexerError> {
		if contracts.is_empty() {
			return Ok(Vec::new());
		}

		let batch: Vec<JsonRpcRequest> = contracts
			.iter()
			.enumerate()
			.map(|(id, contract)| Self::balance_request(id as u64, owner, contract))
			.collect();

		let raw = self.post(&batch).await?;
		if !raw.is_array() {
			// Some nodes answer a rejected batch with a single error object
			let single: JsonRpcResponse = serde_json::from_value(raw)?;
			return match single.error {
				Some(error) => Err(IndexerError::RpcError {
					code: error.code,
					message: error.message,
				}),
				None => Err(IndexerError::InvalidResponse(
					"Batch request answered with a single response".to_string(),
				)),
			};
		}
		let responses: Vec<JsonRpcResponse> = serde_json::from_value(raw)?;

		let mut by_id: HashMap<u64, JsonRpcResponse> = HashMap::new();
		for response in responses {
			if let Some(id) = response.id {
				by_id.insert(id, response);
			}
		}

		let mut balances = Vec::with_capacity(contracts.len());
		for (id, contract) in contracts.iter().enumerate() {
			match by_id.remove(&(id as u64)) {
				Some(JsonRpcResponse {
					result: Some(value),
					..
				}) => match parse_quantity(&value) {
					Ok(balance) => balances.push(TokenBalance {
						address: contract.clone(),
						balance,
					}),
					Err(e) => warn!("Unparseable balance for {}: {}", contract, e),
				},
				Some(JsonRpcResponse {
					error: Some(error), ..
				}) => {
					debug!("Balance call for {} failed: {}", contract, error.message);
				}
				_ => debug!("No balance answer for {}", contract),
			}
		}

		Ok(balances)
	}

	async fn send_raw_transaction(&self, signed: &[u8]) -> Result<String, IndexerError> {
		let payload = format!("0x{}", hex::encode(signed));
		let result = self
			.call("eth_sendRawTransaction", json!([payload]))
			.await?;

		result
			.as_str()
			.map(|hash| hash.to_ascii_lowercase())
			.ok_or_else(|| IndexerError::InvalidResponse(format!("Unexpected hash: {}", result)))
	}

	async fn get_transaction_receipt(
		&self,
		hash: &str,
	) -> Result<Option<ReceiptStatus>, IndexerError> {
		let request = JsonRpcRequest::new(1, "eth_getTransactionReceipt", json!([hash]));
		let raw = self.post(&request).await?;
		let response: JsonRpcResponse = serde_json::from_value(raw)?;

		if let Some(error) = response.error {
			return Err(IndexerError::RpcError {
				code: error.code,
				message: error.message,
			});
		}

		match response.result {
			None | Some(serde_json::Value::Null) => Ok(None),
			Some(receipt) => {
				let status = receipt
					.get("status")
					.ok_or_else(|| IndexerError::InvalidResponse("Receipt without status".to_string()))?;
				if parse_quantity(status)? == U256::from(1u64) {
					Ok(Some(ReceiptStatus::Success))
				} else {
					Ok(Some(ReceiptStatus::Failed))
				}
			}
		}
	}

	async fn get_transaction_count(&self, owner: &TokenAddress) -> Result<u64, IndexerError> {
		let result = self
			.call("eth_getTransactionCount", json!([owner.as_str(), "latest"]))
			.await?;
		let count = parse_quantity(&result)?;
		u64::try_from(count)
			.map_err(|_| IndexerError::InvalidResponse(format!("Nonce out of range: {}", count)))
	}
}

/// Parse a hex quantity (`0x...`) as returned by the node. `0x` alone is zero.
fn parse_quantity(value: &serde_json::Value) -> Result<U256, IndexerError> {
	let text = value
		.as_str()
		.ok_or_else(|| IndexerError::InvalidResponse(format!("Expected hex string, got {}", value)))?;
	let body = text.strip_prefix("0x").unwrap_or(text);
	if body.is_empty() {
		return Ok(U256::ZERO);
	}

	U256::from_str_radix(body, 16)
		.map_err(|e| IndexerError::InvalidResponse(format!("Invalid quantity {}: {}", text, e)))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parse_quantity_handles_padding_and_empty() {
		let padded = json!("0x00000000000000000000000000000000000000000000000000000000000003e8");
		assert_eq!(parse_quantity(&padded).unwrap(), U256::from(1000u64));
		assert_eq!(parse_quantity(&json!("0x")).unwrap(), U256::ZERO);
		assert_eq!(parse_quantity(&json!("0x1")).unwrap(), U256::from(1u64));
	}

	#[test]
	fn parse_quantity_rejects_non_strings() {
		assert!(parse_quantity(&json!(12)).is_err());
		assert!(parse_quantity(&json!("0xzz")).is_err());
	}

	#[test]
	fn erc20_balance_request_encodes_balance_of() {
		let owner = TokenAddress::parse("0x1111111111111111111111111111111111111111").unwrap();
		let contract = TokenAddress::parse("0x2222222222222222222222222222222222222222").unwrap();

		let request = ChainRpcClient::balance_request(3, &owner, &contract);
		assert_eq!(request.method, "eth_call");
		assert_eq!(request.id, 3);

		let data = request.params[0]["data"].as_str().unwrap();
		assert!(data.starts_with("0x70a08231"));
		assert!(data.ends_with("1111111111111111111111111111111111111111"));
		assert_eq!(data.len(), 2 + 8 + 64);
	}

	#[test]
	fn native_balance_request_uses_get_balance() {
		let owner = TokenAddress::parse("0x1111111111111111111111111111111111111111").unwrap();
		let request = ChainRpcClient::balance_request(0, &owner, &TokenAddress::native());
		assert_eq!(request.method, "eth_getBalance");
		assert_eq!(request.params[1], "latest");
	}
}
