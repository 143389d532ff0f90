//! Wallet State Sync: local balance, price and transaction state for one EVM wallet
//!
//! The crate keeps a wallet's view of the chain current by polling a JSON-RPC node and a wallet
//! indexer, merging the results into in-memory stores and snapshotting them to disk.
//!
//! # Architecture
//!
//! - **Indexer and RPC clients** (`indexer`): typed access to the REST indexer and the EVM node
//! - **Stores** (`wallet::store`): balances, prices, tokens and the other per-category state
//! - **Sync** (`wallet::sync`): pollers, strategies, events and snapshot persistence
//! - **Transactions** (`transaction`): submission, speed-up, cancel and reconcile of wallet transactions
//!
//! # Example
//!
//! ```ignore
//! use wallet_state_sync::config::WalletSyncConfig;
//! use wallet_state_sync::transaction::SubmissionRequest;
//! use wallet_state_sync::wallet::sync::WalletSyncOrchestrator;
//!
//! let config = WalletSyncConfig::from_env()?;
//! let orchestrator = WalletSyncOrchestrator::new(&config);
//! orchestrator.restore();
//! orchestrator.start();
//!
//! let hash = orchestrator.sender().submit(SubmissionRequest {
//!     nonce,
//!     tx_type: TransactionType::Transfer,
//!     description: "Send 1 BNB".to_string(),
//!     signed,
//! }).await?;
//! ```

pub mod config;
pub mod indexer;
pub mod transaction;
pub mod utils;
pub mod wallet;
