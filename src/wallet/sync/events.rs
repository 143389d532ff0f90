//! Event system for wallet synchronization.
//!
//! This module defines the typed events announced whenever a poller or the transaction sender
//! changes a store, the handler trait consumers implement, and the `EventBus` that fans events out
//! to every registered handler. Pollers never call consumers directly; they dispatch events and
//! the bus delivers them, which keeps the sync logic decoupled from whatever reacts to it.
//!
//! Delivery is synchronous with respect to the dispatching task: every handler registered at the
//! time of dispatch is called once, in registration order. Late subscribers get no replay.

use crate::transaction::TransactionState;
use crate::wallet::WalletSyncError;

use std::sync::{Arc, RwLock};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Events announced by the sync layer
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    /// Token balances changed; `updated` entries differ from before
    BalancesChanged { updated: usize },
    /// The supported token list was replaced
    SupportedTokensChanged { count: usize },
    /// Token prices were replaced
    PricesChanged { count: usize },
    /// Lending positions or rewards changed
    LendingBalancesChanged,
    /// Referral overview or claim history changed
    ReferralOverviewChanged,
    /// The notification feed changed
    NotificationsChanged { count: usize, unread: usize },
    /// Marketing assets were replaced
    MarketingAssetsChanged { count: usize },
    /// A signed transaction was broadcast and is now tracked
    TransactionSubmitted { hash: String },
    /// A tracked transaction moved to a new state
    TransactionStateChanged {
        hash: String,
        state: TransactionState,
    },
    /// Superseded entries were removed from the history list
    TransactionsPurged { hashes: Vec<String> },
    /// A poll cycle failed
    PollerFailed { poller: &'static str, error: String },
}

/// Trait for handling sync events.
///
/// Implementors receive every dispatched event and can perform side effects.
#[async_trait::async_trait]
pub trait SyncEventHandler: Send + Sync {
    /// Handle a sync event.
    async fn handle(&self, event: &SyncEvent) -> Result<(), WalletSyncError>;

    /// Get the name of this handler for logging and diagnostics.
    fn name(&self) -> &'static str;
}

/// Event bus that manages multiple event handlers.
///
/// Handlers may be registered at any time from any task; each dispatch uses the handlers
/// registered at that moment.
#[derive(Default)]
pub struct EventBus {
    handlers: RwLock<Vec<Arc<dyn SyncEventHandler>>>,
}

impl EventBus {
    /// Create a new, empty event bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new event handler.
    ///
    /// Handlers are called in the order they are registered.
    pub fn register_handler(&self, handler: Arc<dyn SyncEventHandler>) {
        debug!("Registering event handler {}", handler.name());
        self.handlers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(handler);
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Dispatch an event to all registered handlers.
    ///
    /// Errors from handlers are logged, but do not stop other handlers from running.
    pub async fn dispatch(&self, event: &SyncEvent) {
        let handlers = self
            .handlers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();

        for handler in handlers {
            if let Err(e) = handler.handle(event).await {
                tracing::error!("Handler {} failed to process event: {}", handler.name(), e);
            }
        }
    }
}

/// Logs every event.
pub struct LoggingEventHandler;

#[async_trait::async_trait]
impl SyncEventHandler for LoggingEventHandler {
    async fn handle(&self, event: &SyncEvent) -> Result<(), WalletSyncError> {
        match event {
            SyncEvent::BalancesChanged { updated } => {
                info!("Balances updated ({} changed)", updated)
            }
            SyncEvent::SupportedTokensChanged { count } => {
                info!("Supported token list refreshed ({} tokens)", count)
            }
            SyncEvent::PricesChanged { count } => info!("Prices refreshed ({} tokens)", count),
            SyncEvent::LendingBalancesChanged => info!("Lending balances refreshed"),
            SyncEvent::ReferralOverviewChanged => info!("Referral overview refreshed"),
            SyncEvent::NotificationsChanged { count, unread } => {
                info!("Notifications refreshed ({} total, {} unread)", count, unread)
            }
            SyncEvent::MarketingAssetsChanged { count } => {
                info!("Marketing assets refreshed ({} assets)", count)
            }
            SyncEvent::TransactionSubmitted { hash } => info!("Transaction {} submitted", hash),
            SyncEvent::TransactionStateChanged { hash, state } => {
                info!("Transaction {} is now {:?}", hash, state)
            }
            SyncEvent::TransactionsPurged { hashes } => {
                info!("Purged {} superseded transactions", hashes.len())
            }
            SyncEvent::PollerFailed { poller, error } => {
                warn!("Poller {} failed: {}", poller, error)
            }
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "LoggingEventHandler"
    }
}

/// Forwards events into an unbounded channel for consumers that prefer a receiver.
pub struct ChannelEventHandler {
    sender: mpsc::UnboundedSender<SyncEvent>,
}

impl ChannelEventHandler {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SyncEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

#[async_trait::async_trait]
impl SyncEventHandler for ChannelEventHandler {
    async fn handle(&self, event: &SyncEvent) -> Result<(), WalletSyncError> {
        self.sender
            .send(event.clone())
            .map_err(|_| WalletSyncError::EventHandlerError("receiver dropped".to_string()))
    }

    fn name(&self) -> &'static str {
        "ChannelEventHandler"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Recorder {
        label: &'static str,
        seen: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait::async_trait]
    impl SyncEventHandler for Recorder {
        async fn handle(&self, event: &SyncEvent) -> Result<(), WalletSyncError> {
            self.seen
                .lock()
                .unwrap()
                .push(format!("{}:{:?}", self.label, event));
            Ok(())
        }

        fn name(&self) -> &'static str {
            self.label
        }
    }

    struct Failing;

    #[async_trait::async_trait]
    impl SyncEventHandler for Failing {
        async fn handle(&self, _event: &SyncEvent) -> Result<(), WalletSyncError> {
            Err(WalletSyncError::EventHandlerError("boom".to_string()))
        }

        fn name(&self) -> &'static str {
            "Failing"
        }
    }

    #[tokio::test]
    async fn handlers_run_in_registration_order() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        bus.register_handler(Arc::new(Recorder {
            label: "first",
            seen: seen.clone(),
        }));
        bus.register_handler(Arc::new(Failing));
        bus.register_handler(Arc::new(Recorder {
            label: "second",
            seen: seen.clone(),
        }));

        bus.dispatch(&SyncEvent::LendingBalancesChanged).await;

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert!(seen[0].starts_with("first:"));
        assert!(seen[1].starts_with("second:"));
    }

    #[tokio::test]
    async fn late_subscriber_gets_no_replay() {
        let bus = EventBus::new();
        bus.dispatch(&SyncEvent::PricesChanged { count: 1 }).await;

        let (handler, mut receiver) = ChannelEventHandler::new();
        bus.register_handler(Arc::new(handler));
        bus.dispatch(&SyncEvent::PricesChanged { count: 2 }).await;

        assert_eq!(
            receiver.try_recv().unwrap(),
            SyncEvent::PricesChanged { count: 2 }
        );
        assert!(receiver.try_recv().is_err());
    }
}
