use crate::indexer::IndexerError;
use crate::transaction::TransactionState;

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Placeholder contract address used by the indexer for the chain's native coin.
pub const NATIVE_TOKEN_ADDRESS: &str = "0xeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeee";

/// A contract or account address, always stored lower-cased with a `0x` prefix.
///
/// The only way to build one is through parsing, so every store key and every
/// lookup goes through the same normalization and mixed-case input can never
/// cause a cache miss.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TokenAddress(String);

impl TokenAddress {
	pub fn parse(raw: &str) -> Result<Self, WalletSyncError> {
		let trimmed = raw.trim();
		let body = trimmed
			.strip_prefix("0x")
			.or_else(|| trimmed.strip_prefix("0X"))
			.unwrap_or(trimmed);
		let normalized = format!("0x{}", body.to_ascii_lowercase());

		Address::from_str(&normalized)
			.map_err(|e| WalletSyncError::InvalidAddress(format!("{}: {}", raw, e)))?;

		Ok(Self(normalized))
	}

	/// The native coin placeholder address.
	pub fn native() -> Self {
		Self(NATIVE_TOKEN_ADDRESS.to_string())
	}

	pub fn is_native(&self) -> bool {
		self.0 == NATIVE_TOKEN_ADDRESS
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}

	/// The 32-byte left-padded ABI encoding of this address, without `0x`.
	pub fn abi_word(&self) -> String {
		format!("{:0>64}", &self.0[2..])
	}
}

impl fmt::Display for TokenAddress {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl FromStr for TokenAddress {
	type Err = WalletSyncError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::parse(s)
	}
}

impl TryFrom<String> for TokenAddress {
	type Error = WalletSyncError;

	fn try_from(value: String) -> Result<Self, Self::Error> {
		Self::parse(&value)
	}
}

impl From<TokenAddress> for String {
	fn from(value: TokenAddress) -> Self {
		value.0
	}
}

/// Error types for the wallet sync core
#[allow(clippy::enum_variant_names)]
#[derive(Debug, thiserror::Error)]
pub enum WalletSyncError {
	#[error("Indexer error: {0}")]
	IndexerError(#[from] IndexerError),

	#[error("Persistence error: {0}")]
	PersistenceError(String),

	#[error("IO error: {0}")]
	IoError(#[from] std::io::Error),

	#[error("Invalid address: {0}")]
	InvalidAddress(String),

	#[error("Invalid transaction transition for {hash}: {from:?} -> {to:?}")]
	InvalidTransition {
		hash: String,
		from: TransactionState,
		to: TransactionState,
	},

	#[error("Transaction {0} is already tracked")]
	DuplicateTransaction(String),

	#[error("Transaction {0} is not tracked")]
	UnknownTransaction(String),

	#[error("Fetch cancelled")]
	Cancelled,

	#[error("Configuration error: {0}")]
	ConfigError(String),

	#[error("Event handler error: {0}")]
	EventHandlerError(String),
}

impl WalletSyncError {
	/// Whether the failure is the "no network" condition that ends a fetch cycle
	/// without any fallback.
	pub fn is_not_connected(&self) -> bool {
		matches!(self, WalletSyncError::IndexerError(e) if e.is_not_connected())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parse_lowercases_and_prefixes() {
		let mixed = TokenAddress::parse("0xA0b86991C6218b36c1d19D4a2e9Eb0cE3606eB48").unwrap();
		let bare = TokenAddress::parse("a0b86991c6218b36c1d19d4a2e9eb0ce3606eb48").unwrap();
		assert_eq!(mixed, bare);
		assert_eq!(mixed.as_str(), "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48");
	}

	#[test]
	fn parse_rejects_garbage() {
		assert!(TokenAddress::parse("0x1234").is_err());
		assert!(TokenAddress::parse("not-an-address").is_err());
	}

	#[test]
	fn native_placeholder_is_recognized() {
		let native = TokenAddress::parse("0xEeeeeEeeeEeEeeEeEeEeeEEEeeeeEeeeeeeeEEeE").unwrap();
		assert!(native.is_native());
		assert_eq!(native, TokenAddress::native());
	}

	#[test]
	fn abi_word_is_left_padded() {
		let addr = TokenAddress::parse("0x00000000000000000000000000000000000000ff").unwrap();
		let word = addr.abi_word();
		assert_eq!(word.len(), 64);
		assert!(word.ends_with("ff"));
		assert!(word.starts_with("000000000000000000000000"));
	}

	#[test]
	fn serde_round_trip_keeps_normalized_form() {
		let json = "\"0xDAC17F958D2EE523A2206206994597C13D831EC7\"";
		let addr: TokenAddress = serde_json::from_str(json).unwrap();
		assert_eq!(
			serde_json::to_string(&addr).unwrap(),
			"\"0xdac17f958d2ee523a2206206994597c13d831ec7\""
		);
	}
}
