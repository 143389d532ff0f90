//! Remote data sources for the wallet sync core
//!
//! This module provides the clients and types for the two remote collaborators the pollers talk
//! to: an EVM JSON-RPC node (balances, broadcast, receipts) and the wallet indexer REST service
//! (token lists, prices, lending, referral, notifications, marketing assets).

/// REST client for the wallet indexer
mod client;
/// JSON-RPC client for the chain node
mod rpc;
/// Type definitions for indexer and RPC data structures
mod types;

pub use client::{IndexerApi, WalletIndexerClient};
pub use rpc::{ChainRpc, ChainRpcClient};
pub use types::*;
