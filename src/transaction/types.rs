use crate::wallet::TokenAddress;

use alloy_primitives::keccak256;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What a locally submitted transaction does, as shown in the history list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
	Transfer,
	Swap,
	Earn,
	Withdraw,
	ContractInteraction,
	Allowance,
	SelfTransfer,
}

/// Lifecycle state of a locally submitted transaction.
///
/// `Done`, `Error` and `Drop` are terminal. `Speedup` and `Cancel` mark an entry whose nonce was
/// re-broadcast with a bumped fee; they resolve to a terminal state or fall back to `Pending` if the
/// replacement could not be broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionState {
	Pending,
	Speedup,
	Cancel,
	Done,
	Error,
	Drop,
}

impl TransactionState {
	pub fn is_terminal(&self) -> bool {
		matches!(
			self,
			TransactionState::Done | TransactionState::Error | TransactionState::Drop
		)
	}

	/// Whether the entry's nonce is known to be consumed on chain.
	pub fn is_confirmed(&self) -> bool {
		matches!(self, TransactionState::Done | TransactionState::Error)
	}

	pub fn can_transition_to(&self, next: TransactionState) -> bool {
		use TransactionState::*;

		match (self, next) {
			(Done | Error | Drop, _) => false,
			(Pending, Pending) => false,
			(Pending, _) => true,
			(Speedup | Cancel, Pending | Done | Error | Drop) => true,
			(Speedup | Cancel, Speedup | Cancel) => false,
		}
	}
}

/// A transaction the wallet itself submitted, tracked until it resolves.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InternalHistoryTransaction {
	/// Lower-cased transaction hash; primary key.
	pub hash: String,
	pub nonce: u64,
	pub from: TokenAddress,
	pub tx_type: TransactionType,
	pub state: TransactionState,
	/// Human readable summary, e.g. "Swap 1 BNB to 300 USDT".
	pub description: String,
	/// Hex encoded signed payload as broadcast.
	pub signed_payload: String,
	pub created_at: DateTime<Utc>,
	/// Hash of the entry this one re-broadcasts, for speed-up and cancel replacements.
	#[serde(default)]
	pub replaces: Option<String>,
}

impl InternalHistoryTransaction {
	pub fn new_pending(
		hash: &str,
		nonce: u64,
		from: TokenAddress,
		tx_type: TransactionType,
		description: impl Into<String>,
		signed: &[u8],
	) -> Self {
		Self {
			hash: hash.to_ascii_lowercase(),
			nonce,
			from,
			tx_type,
			state: TransactionState::Pending,
			description: description.into(),
			signed_payload: hex::encode(signed),
			created_at: Utc::now(),
			replaces: None,
		}
	}
}

/// Hash of a signed raw transaction, lower-case and `0x`-prefixed.
pub fn transaction_hash(signed: &[u8]) -> String {
	format!("0x{}", hex::encode(keccak256(signed)))
}

/// Caller-supplied details for a transaction about to be broadcast.
#[derive(Debug, Clone)]
pub struct SubmissionRequest {
	pub nonce: u64,
	pub tx_type: TransactionType,
	pub description: String,
	pub signed: Vec<u8>,
}

#[cfg(test)]
mod tests {
	use super::TransactionState::*;

	#[test]
	fn terminal_states_never_transition() {
		for terminal in [Done, Error, Drop] {
			for next in [Pending, Speedup, Cancel, Done, Error, Drop] {
				assert!(!terminal.can_transition_to(next));
			}
		}
	}

	#[test]
	fn pending_branches() {
		for next in [Speedup, Cancel, Done, Error, Drop] {
			assert!(Pending.can_transition_to(next));
		}
		assert!(!Pending.can_transition_to(Pending));
	}

	#[test]
	fn replacement_states_resolve_or_reenter_pending() {
		for state in [Speedup, Cancel] {
			assert!(state.can_transition_to(Pending));
			assert!(state.can_transition_to(Done));
			assert!(state.can_transition_to(Error));
			assert!(state.can_transition_to(Drop));
			assert!(!state.can_transition_to(Speedup));
			assert!(!state.can_transition_to(Cancel));
		}
	}

	#[test]
	fn hash_is_keccak_of_raw_payload() {
		// keccak256 of the empty input
		assert_eq!(
			super::transaction_hash(&[]),
			"0xc5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
		);
	}

	#[test]
	fn state_serializes_lowercase() {
		assert_eq!(serde_json::to_string(&Speedup).unwrap(), "\"speedup\"");
	}
}
