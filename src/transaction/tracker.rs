//! Lifecycle tracking for locally submitted transactions.
//!
//! The tracker keeps the wallet's active history list keyed by hash. Entries enter as `pending`,
//! may branch into `speedup`/`cancel` when their nonce is re-broadcast, and resolve to `done`,
//! `error` or `drop`. Reconciliation compares the non-terminal entries against receipts and the
//! account nonce, then garbage-collects entries whose nonce was consumed by a sibling.

use crate::indexer::{ChainRpc, ReceiptStatus};
use crate::transaction::types::{InternalHistoryTransaction, TransactionState};
use crate::wallet::store::SnapshotStore;
use crate::wallet::{TokenAddress, WalletSyncError};

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// What a reconciliation pass changed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcileOutcome {
    /// `(hash, new state)` for every entry that moved.
    pub transitions: Vec<(String, TransactionState)>,
    /// Hashes removed because a sibling with the same nonce confirmed.
    pub purged: Vec<String>,
}

impl ReconcileOutcome {
    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty() && self.purged.is_empty()
    }
}

/// Active history list for one wallet.
pub struct TransactionTracker {
    wallet: TokenAddress,
    entries: RwLock<Vec<InternalHistoryTransaction>>,
}

impl TransactionTracker {
    pub fn new(wallet: TokenAddress) -> Self {
        Self {
            wallet,
            entries: RwLock::new(Vec::new()),
        }
    }

    pub fn wallet(&self) -> &TokenAddress {
        &self.wallet
    }

    /// Start tracking a freshly broadcast transaction.
    pub fn record_pending(&self, tx: InternalHistoryTransaction) -> Result<(), WalletSyncError> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        if entries.iter().any(|e| e.hash == tx.hash) {
            return Err(WalletSyncError::DuplicateTransaction(tx.hash));
        }

        info!("Tracking pending transaction {} (nonce {})", tx.hash, tx.nonce);
        entries.push(tx);
        Ok(())
    }

    pub fn get(&self, hash: &str) -> Option<InternalHistoryTransaction> {
        let hash = hash.to_ascii_lowercase();
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .find(|e| e.hash == hash)
            .cloned()
    }

    /// All tracked entries, newest first.
    pub fn transactions(&self) -> Vec<InternalHistoryTransaction> {
        let mut all = self.entries.read().unwrap_or_else(|e| e.into_inner()).clone();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        all
    }

    /// Entries that have not reached a terminal state.
    pub fn unresolved(&self) -> Vec<InternalHistoryTransaction> {
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|e| !e.state.is_terminal())
            .cloned()
            .collect()
    }

    /// Move an entry to `next`, returning its previous state.
    pub fn transition(
        &self,
        hash: &str,
        next: TransactionState,
    ) -> Result<TransactionState, WalletSyncError> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        Self::transition_locked(&mut entries, hash, next)
    }

    fn transition_locked(
        entries: &mut [InternalHistoryTransaction],
        hash: &str,
        next: TransactionState,
    ) -> Result<TransactionState, WalletSyncError> {
        let hash = hash.to_ascii_lowercase();
        let entry = entries
            .iter_mut()
            .find(|e| e.hash == hash)
            .ok_or_else(|| WalletSyncError::UnknownTransaction(hash.clone()))?;

        let previous = entry.state;
        if !previous.can_transition_to(next) {
            return Err(WalletSyncError::InvalidTransition {
                hash,
                from: previous,
                to: next,
            });
        }

        debug!("Transaction {}: {:?} -> {:?}", entry.hash, previous, next);
        entry.state = next;
        Ok(previous)
    }

    /// Record a fee-bumped re-broadcast of `original`.
    pub fn speed_up(
        &self,
        original: &str,
        replacement: InternalHistoryTransaction,
    ) -> Result<(), WalletSyncError> {
        self.replace(original, replacement, TransactionState::Speedup)
    }

    /// Record a cancellation (zero-value self transfer at the same nonce) of `original`.
    pub fn cancel(
        &self,
        original: &str,
        replacement: InternalHistoryTransaction,
    ) -> Result<(), WalletSyncError> {
        self.replace(original, replacement, TransactionState::Cancel)
    }

    fn replace(
        &self,
        original: &str,
        mut replacement: InternalHistoryTransaction,
        branch: TransactionState,
    ) -> Result<(), WalletSyncError> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        if entries.iter().any(|e| e.hash == replacement.hash) {
            return Err(WalletSyncError::DuplicateTransaction(replacement.hash));
        }

        let original = original.to_ascii_lowercase();
        let (nonce, state) = entries
            .iter()
            .find(|e| e.hash == original)
            .map(|e| (e.nonce, e.state))
            .ok_or_else(|| WalletSyncError::UnknownTransaction(original.clone()))?;

        // Already marked when the replacement broadcast started
        if state != branch {
            Self::transition_locked(&mut entries, &original, branch)?;
        }

        replacement.nonce = nonce;
        replacement.state = TransactionState::Pending;
        replacement.replaces = Some(original.clone());
        info!(
            "Transaction {} replaced by {} ({:?})",
            original, replacement.hash, branch
        );
        entries.push(replacement);
        Ok(())
    }

    /// Undo a replacement whose broadcast failed: drop the replacement, if it was recorded, and
    /// put the original back to `pending`.
    pub fn revert_replacement(
        &self,
        original: &str,
        replacement: Option<&str>,
    ) -> Result<(), WalletSyncError> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        if let Some(replacement) = replacement {
            let replacement = replacement.to_ascii_lowercase();
            entries.retain(|e| e.hash != replacement);
        }
        Self::transition_locked(&mut entries, original, TransactionState::Pending)?;
        Ok(())
    }

    /// Remove unresolved entries whose nonce was consumed by a confirmed sibling.
    pub fn purge_superseded(&self) -> Vec<String> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        Self::purge_locked(&mut entries)
    }

    fn purge_locked(entries: &mut Vec<InternalHistoryTransaction>) -> Vec<String> {
        let confirmed_nonces: HashSet<u64> = entries
            .iter()
            .filter(|e| e.state.is_confirmed())
            .map(|e| e.nonce)
            .collect();

        let mut purged = Vec::new();
        entries.retain(|e| {
            let stale = !e.state.is_terminal() && confirmed_nonces.contains(&e.nonce);
            if stale {
                purged.push(e.hash.clone());
            }
            !stale
        });

        if !purged.is_empty() {
            info!("Purged {} superseded transactions", purged.len());
        }
        purged
    }

    /// Compare unresolved entries with chain state and apply the resulting transitions.
    ///
    /// Receipts decide `done`/`error`. An entry without a receipt whose nonce the account has
    /// already moved past becomes `drop`, unless a sibling with the same nonce confirmed, in which
    /// case it is purged instead. Nothing is mutated once `cancel` fires.
    pub async fn reconcile(
        &self,
        rpc: &dyn ChainRpc,
        cancel: &CancellationToken,
    ) -> Result<ReconcileOutcome, WalletSyncError> {
        let unresolved = self.unresolved();
        if unresolved.is_empty() {
            let purged = self.purge_superseded();
            return Ok(ReconcileOutcome {
                transitions: Vec::new(),
                purged,
            });
        }

        let account_nonce = rpc.get_transaction_count(&self.wallet).await?;

        let mut receipts: HashMap<String, Option<ReceiptStatus>> = HashMap::new();
        for tx in &unresolved {
            if cancel.is_cancelled() {
                return Err(WalletSyncError::Cancelled);
            }
            let receipt = rpc.get_transaction_receipt(&tx.hash).await?;
            receipts.insert(tx.hash.clone(), receipt);
        }

        if cancel.is_cancelled() {
            return Err(WalletSyncError::Cancelled);
        }

        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        let mut outcome = ReconcileOutcome::default();

        // Nonces confirmed either earlier or by a receipt found in this pass
        let mut confirmed_nonces: HashSet<u64> = entries
            .iter()
            .filter(|e| e.state.is_confirmed())
            .map(|e| e.nonce)
            .collect();
        for tx in &unresolved {
            if matches!(receipts.get(&tx.hash), Some(Some(_))) {
                confirmed_nonces.insert(tx.nonce);
            }
        }

        for tx in &unresolved {
            let next = match receipts.get(&tx.hash) {
                Some(Some(ReceiptStatus::Success)) => Some(TransactionState::Done),
                Some(Some(ReceiptStatus::Failed)) => Some(TransactionState::Error),
                _ if account_nonce > tx.nonce && !confirmed_nonces.contains(&tx.nonce) => {
                    Some(TransactionState::Drop)
                }
                _ => None,
            };

            if let Some(next) = next {
                match Self::transition_locked(&mut entries, &tx.hash, next) {
                    Ok(_) => outcome.transitions.push((tx.hash.clone(), next)),
                    // Entry changed or vanished while receipts were in flight
                    Err(e) => debug!("Skipping reconcile transition: {}", e),
                }
            }
        }

        outcome.purged = Self::purge_locked(&mut entries);
        Ok(outcome)
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl SnapshotStore for TransactionTracker {
    type Snapshot = Vec<InternalHistoryTransaction>;

    fn snapshot(&self) -> Self::Snapshot {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Replace the list with a restored snapshot, dropping duplicate hashes.
    fn restore(&self, snapshot: Self::Snapshot) {
        let mut seen = HashSet::new();
        let restored: Vec<_> = snapshot
            .into_iter()
            .filter(|tx| seen.insert(tx.hash.clone()))
            .collect();
        *self.entries.write().unwrap_or_else(|e| e.into_inner()) = restored;
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexer::{IndexerError, TokenBalance};
    use crate::transaction::types::TransactionType;
    use alloy_primitives::U256;
    use async_trait::async_trait;
    use std::sync::Mutex;

    fn wallet() -> TokenAddress {
        TokenAddress::parse("0x1111111111111111111111111111111111111111").unwrap()
    }

    fn tx(hash: &str, nonce: u64) -> InternalHistoryTransaction {
        InternalHistoryTransaction::new_pending(
            hash,
            nonce,
            wallet(),
            TransactionType::Transfer,
            "Transfer 1 BNB",
            &[0xde, 0xad],
        )
    }

    /// Chain double answering receipts from a table.
    struct MockChain {
        nonce: u64,
        receipts: Mutex<HashMap<String, ReceiptStatus>>,
    }

    impl MockChain {
        fn new(nonce: u64, receipts: &[(&str, ReceiptStatus)]) -> Self {
            Self {
                nonce,
                receipts: Mutex::new(
                    receipts
                        .iter()
                        .map(|(h, s)| (h.to_string(), *s))
                        .collect(),
                ),
            }
        }
    }

    #[async_trait]
    impl ChainRpc for MockChain {
        async fn get_native_balance(&self, _owner: &TokenAddress) -> Result<U256, IndexerError> {
            Ok(U256::ZERO)
        }

        async fn get_token_balance(
            &self,
            _owner: &TokenAddress,
            _contract: &TokenAddress,
        ) -> Result<U256, IndexerError> {
            Ok(U256::ZERO)
        }

        async fn get_multiple_erc20_balances(
            &self,
            _owner: &TokenAddress,
            _contracts: &[TokenAddress],
        ) -> Result<Vec<TokenBalance>, IndexerError> {
            Ok(Vec::new())
        }

        async fn send_raw_transaction(&self, _signed: &[u8]) -> Result<String, IndexerError> {
            Err(IndexerError::NoData)
        }

        async fn get_transaction_receipt(
            &self,
            hash: &str,
        ) -> Result<Option<ReceiptStatus>, IndexerError> {
            Ok(self.receipts.lock().unwrap().get(hash).copied())
        }

        async fn get_transaction_count(&self, _owner: &TokenAddress) -> Result<u64, IndexerError> {
            Ok(self.nonce)
        }
    }

    #[test]
    fn duplicate_hash_is_rejected() {
        let tracker = TransactionTracker::new(wallet());
        tracker.record_pending(tx("0xaa", 1)).unwrap();
        let err = tracker.record_pending(tx("0xAA", 1)).unwrap_err();
        assert!(matches!(err, WalletSyncError::DuplicateTransaction(_)));
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn terminal_entry_cannot_move() {
        let tracker = TransactionTracker::new(wallet());
        tracker.record_pending(tx("0xaa", 1)).unwrap();
        tracker.transition("0xaa", TransactionState::Done).unwrap();

        let err = tracker
            .transition("0xaa", TransactionState::Pending)
            .unwrap_err();
        assert!(matches!(err, WalletSyncError::InvalidTransition { .. }));
        assert_eq!(tracker.get("0xaa").unwrap().state, TransactionState::Done);
    }

    #[test]
    fn speed_up_branches_and_inherits_nonce() {
        let tracker = TransactionTracker::new(wallet());
        tracker.record_pending(tx("0xaa", 7)).unwrap();
        tracker.speed_up("0xaa", tx("0xbb", 0)).unwrap();

        assert_eq!(tracker.get("0xaa").unwrap().state, TransactionState::Speedup);
        let replacement = tracker.get("0xbb").unwrap();
        assert_eq!(replacement.state, TransactionState::Pending);
        assert_eq!(replacement.nonce, 7);
        assert_eq!(replacement.replaces.as_deref(), Some("0xaa"));
    }

    #[test]
    fn revert_replacement_restores_pending() {
        let tracker = TransactionTracker::new(wallet());
        tracker.record_pending(tx("0xaa", 7)).unwrap();
        tracker.cancel("0xaa", tx("0xbb", 7)).unwrap();
        assert_eq!(tracker.get("0xaa").unwrap().state, TransactionState::Cancel);

        tracker.revert_replacement("0xaa", Some("0xbb")).unwrap();
        assert_eq!(tracker.get("0xaa").unwrap().state, TransactionState::Pending);
        assert!(tracker.get("0xbb").is_none());
    }

    #[test]
    fn replacing_a_terminal_entry_fails() {
        let tracker = TransactionTracker::new(wallet());
        tracker.record_pending(tx("0xaa", 7)).unwrap();
        tracker.transition("0xaa", TransactionState::Drop).unwrap();

        assert!(tracker.speed_up("0xaa", tx("0xbb", 7)).is_err());
        assert!(tracker.get("0xbb").is_none());
    }

    #[tokio::test]
    async fn reconcile_marks_receipts_done_and_error() {
        let tracker = TransactionTracker::new(wallet());
        tracker.record_pending(tx("0xaa", 1)).unwrap();
        tracker.record_pending(tx("0xbb", 2)).unwrap();
        tracker.record_pending(tx("0xcc", 3)).unwrap();

        let chain = MockChain::new(
            3,
            &[("0xaa", ReceiptStatus::Success), ("0xbb", ReceiptStatus::Failed)],
        );
        let outcome = tracker
            .reconcile(&chain, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.transitions.len(), 2);
        assert_eq!(tracker.get("0xaa").unwrap().state, TransactionState::Done);
        assert_eq!(tracker.get("0xbb").unwrap().state, TransactionState::Error);
        assert_eq!(tracker.get("0xcc").unwrap().state, TransactionState::Pending);
    }

    #[tokio::test]
    async fn reconcile_drops_when_nonce_passed_without_receipt() {
        let tracker = TransactionTracker::new(wallet());
        tracker.record_pending(tx("0xaa", 4)).unwrap();

        let chain = MockChain::new(5, &[]);
        let outcome = tracker
            .reconcile(&chain, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(
            outcome.transitions,
            vec![("0xaa".to_string(), TransactionState::Drop)]
        );
        assert!(outcome.purged.is_empty());
    }

    #[tokio::test]
    async fn confirmed_replacement_purges_superseded_original() {
        let tracker = TransactionTracker::new(wallet());
        tracker.record_pending(tx("0xaa", 9)).unwrap();
        tracker.speed_up("0xaa", tx("0xbb", 9)).unwrap();

        let chain = MockChain::new(10, &[("0xbb", ReceiptStatus::Success)]);
        let outcome = tracker
            .reconcile(&chain, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.purged, vec!["0xaa".to_string()]);
        assert_eq!(tracker.get("0xbb").unwrap().state, TransactionState::Done);
        assert!(tracker.get("0xaa").is_none());
        assert_eq!(tracker.len(), 1);
    }

    #[tokio::test]
    async fn cancelled_reconcile_mutates_nothing() {
        let tracker = TransactionTracker::new(wallet());
        tracker.record_pending(tx("0xaa", 1)).unwrap();

        let token = CancellationToken::new();
        token.cancel();
        let chain = MockChain::new(2, &[("0xaa", ReceiptStatus::Success)]);

        let result = tracker.reconcile(&chain, &token).await;
        assert!(matches!(result, Err(WalletSyncError::Cancelled)));
        assert_eq!(tracker.get("0xaa").unwrap().state, TransactionState::Pending);
    }

    #[test]
    fn restore_drops_duplicate_hashes() {
        let tracker = TransactionTracker::new(wallet());
        tracker.restore(vec![tx("0xaa", 1), tx("0xaa", 1), tx("0xbb", 2)]);
        assert_eq!(tracker.len(), 2);
    }
}
