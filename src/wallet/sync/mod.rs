//! Wallet Synchronization Module
//!
//! This module provides the services that keep a wallet's local state consistent with the chain
//! and the wallet indexer. It is composed of several submodules, each responsible for a specific
//! aspect of the sync process:
//!
//! - `orchestrator`: The main entry point. It wires stores, pollers, persistence and the sender.
//! - `events`: Typed change events and the bus that fans them out to subscribers.
//! - `poller`: The single-flight timer and state machine that drives one strategy.
//! - `strategies`: One fetch-and-merge strategy per data category.
//! - `progress_tracker`: Per-poller cycle statistics and periodic progress logging.
//! - `repositories`: Raw key-value file cache with atomic writes.
//! - `state_persistence`: Typed snapshots of every store on top of the cache.

/// Event system for decoupled communication during sync
pub mod events;
/// Main coordinator for the wallet sync process
pub mod orchestrator;
/// Periodic single-flight polling
pub mod poller;
/// Tracks poll cycle statistics
pub mod progress_tracker;
/// File-backed key-value cache
pub mod repositories;
/// Typed snapshot persistence for the wallet stores
pub mod state_persistence;
/// Pluggable synchronization strategies
pub mod strategies;

pub use orchestrator::*;
