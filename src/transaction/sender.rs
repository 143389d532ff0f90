//!
//! Transaction submission for the active wallet.
//!
//! The sender broadcasts already-signed payloads, retrying transient transport failures with
//! exponential backoff, and hands every accepted transaction to the tracker so the reconcile
//! poller can follow it to a terminal state. Speed-up and cancel re-broadcast a replacement at the
//! same nonce and roll the tracker back if the replacement is rejected.
//!
//! Transactions are tracked under the keccak hash of their raw payload. A retry that the node
//! answers with "already known", or a failed retry after an attempt whose outcome was unknown while
//! a receipt exists for that hash, counts as accepted.

use crate::indexer::{ChainRpc, IndexerError};
use crate::transaction::tracker::TransactionTracker;
use crate::transaction::types::{
    InternalHistoryTransaction, SubmissionRequest, TransactionState, TransactionType,
    transaction_hash,
};
use crate::wallet::WalletSyncError;
use crate::wallet::sync::events::{EventBus, SyncEvent};
use crate::wallet::sync::poller::Poller;
use crate::wallet::sync::state_persistence::{SnapshotKey, StatePersistenceService};

use backoff::ExponentialBackoff;
use backoff::future::retry;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Upper bound on the time spent retrying one broadcast.
const BROADCAST_RETRY_WINDOW: Duration = Duration::from_secs(30);

/// Broadcasts signed transactions and records them for tracking
pub struct TransactionSender {
    rpc: Arc<dyn ChainRpc>,
    tracker: Arc<TransactionTracker>,
    events: Arc<EventBus>,
    persistence: Arc<StatePersistenceService>,
    balance_poller: RwLock<Option<Arc<Poller>>>,
    retry_window: Duration,
}

impl TransactionSender {
    pub fn new(
        rpc: Arc<dyn ChainRpc>,
        tracker: Arc<TransactionTracker>,
        events: Arc<EventBus>,
        persistence: Arc<StatePersistenceService>,
    ) -> Self {
        Self {
            rpc,
            tracker,
            events,
            persistence,
            balance_poller: RwLock::new(None),
            retry_window: BROADCAST_RETRY_WINDOW,
        }
    }

    pub fn with_retry_window(mut self, window: Duration) -> Self {
        self.retry_window = window;
        self
    }

    /// Poller to nudge after every successful broadcast.
    pub fn set_balance_poller(&self, poller: Arc<Poller>) {
        *self
            .balance_poller
            .write()
            .unwrap_or_else(|e| e.into_inner()) = Some(poller);
    }

    /// Send the payload, retrying only errors the transport reports as transient. Returns the
    /// locally computed hash of the accepted transaction.
    async fn broadcast(&self, signed: &[u8]) -> Result<String, IndexerError> {
        let policy = ExponentialBackoff {
            max_elapsed_time: Some(self.retry_window),
            ..Default::default()
        };

        let local_hash = transaction_hash(signed);
        let outcome_unknown = AtomicBool::new(false);
        let rpc = Arc::clone(&self.rpc);
        let result = retry(policy, || {
            let rpc = Arc::clone(&rpc);
            let outcome_unknown = &outcome_unknown;
            async move {
                match rpc.send_raw_transaction(signed).await {
                    Ok(hash) => Ok(Some(hash)),
                    Err(e) if e.is_already_known() => {
                        debug!("Node already holds the transaction: {}", e);
                        Ok(None)
                    }
                    Err(e) if e.is_transient() => {
                        warn!("Broadcast failed, retrying: {}", e);
                        outcome_unknown.store(true, Ordering::Release);
                        Err(backoff::Error::transient(e))
                    }
                    Err(e) => Err(backoff::Error::permanent(e)),
                }
            }
        })
        .await;

        match result {
            Ok(Some(hash)) => {
                if !hash.eq_ignore_ascii_case(&local_hash) {
                    warn!(
                        "Node reported hash {} for transaction {}, tracking the local hash",
                        hash, local_hash
                    );
                }
                Ok(local_hash)
            }
            Ok(None) => Ok(local_hash),
            Err(e) if outcome_unknown.load(Ordering::Acquire) => {
                // An earlier attempt may have reached the node before it failed
                match self.rpc.get_transaction_receipt(&local_hash).await {
                    Ok(Some(_)) => {
                        info!(
                            "Transaction {} was mined despite broadcast error: {}",
                            local_hash, e
                        );
                        Ok(local_hash)
                    }
                    _ => Err(e),
                }
            }
            Err(e) => Err(e),
        }
    }

    async fn after_broadcast(&self, hash: &str) {
        self.persistence
            .persist_snapshot(SnapshotKey::InternalHistory, &*self.tracker);
        self.events
            .dispatch(&SyncEvent::TransactionSubmitted {
                hash: hash.to_string(),
            })
            .await;

        let poller = self
            .balance_poller
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        if let Some(poller) = poller {
            poller.trigger();
        }
    }

    fn pending_entry(&self, hash: &str, request: &SubmissionRequest) -> InternalHistoryTransaction {
        InternalHistoryTransaction::new_pending(
            hash,
            request.nonce,
            self.tracker.wallet().clone(),
            request.tx_type,
            request.description.clone(),
            &request.signed,
        )
    }

    /// Broadcast a new transaction and start tracking it. Returns the transaction hash.
    pub async fn submit(&self, request: SubmissionRequest) -> Result<String, WalletSyncError> {
        let hash = self.broadcast(&request.signed).await?;
        info!("Broadcast transaction {} (nonce {})", hash, request.nonce);

        self.tracker.record_pending(self.pending_entry(&hash, &request))?;
        self.after_broadcast(&hash).await;
        Ok(hash)
    }

    /// Re-broadcast `original` with a higher fee. `signed` must reuse the original nonce.
    pub async fn speed_up(&self, original: &str, signed: Vec<u8>) -> Result<String, WalletSyncError> {
        self.replace(original, signed, false).await
    }

    /// Replace `original` with a zero-value self transfer at the same nonce.
    pub async fn cancel(&self, original: &str, signed: Vec<u8>) -> Result<String, WalletSyncError> {
        self.replace(original, signed, true).await
    }

    async fn replace(
        &self,
        original: &str,
        signed: Vec<u8>,
        cancel: bool,
    ) -> Result<String, WalletSyncError> {
        let entry = self
            .tracker
            .get(original)
            .ok_or_else(|| WalletSyncError::UnknownTransaction(original.to_string()))?;

        let (branch, tx_type, description) = if cancel {
            (
                TransactionState::Cancel,
                TransactionType::SelfTransfer,
                format!("Cancel {}", entry.description),
            )
        } else {
            (
                TransactionState::Speedup,
                entry.tx_type,
                entry.description.clone(),
            )
        };

        // Mark the original before broadcasting; rejects terminal entries up front
        self.tracker.transition(original, branch)?;

        let hash = match self.broadcast(&signed).await {
            Ok(hash) => hash,
            Err(e) => {
                warn!("Replacement for {} rejected: {}", original, e);
                match self.tracker.revert_replacement(original, None) {
                    // Reconcile resolved the original meanwhile; nothing to roll back
                    Ok(()) | Err(WalletSyncError::InvalidTransition { .. }) => {}
                    Err(revert) => return Err(revert),
                }
                return Err(e.into());
            }
        };

        let request = SubmissionRequest {
            nonce: entry.nonce,
            tx_type,
            description,
            signed,
        };
        let replacement = self.pending_entry(&hash, &request);
        let attached = if cancel {
            self.tracker.cancel(original, replacement.clone())
        } else {
            self.tracker.speed_up(original, replacement.clone())
        };
        match attached {
            Ok(()) => {}
            Err(WalletSyncError::InvalidTransition { from, .. }) => {
                // The original resolved while the replacement was in flight. Track the
                // replacement on its own so reconcile can drop or purge it.
                info!(
                    "Original {} became {:?} during replacement, tracking {} separately",
                    original, from, hash
                );
                let mut orphan = replacement;
                orphan.replaces = Some(entry.hash.clone());
                self.tracker.record_pending(orphan)?;
            }
            Err(e) => return Err(e),
        }

        info!("Replaced {} with {}", original, hash);
        self.after_broadcast(&hash).await;
        Ok(hash)
    }
}
