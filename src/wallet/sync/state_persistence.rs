//! State persistence service for wallet synchronization.
//!
//! This module provides the `StatePersistenceService`, which saves store snapshots to the
//! persistent cache after every successful refresh and hydrates the stores from it at startup. It
//! uses the `CacheRepository` trait to abstract file handling; this layer adds typed keys and JSON
//! (de)serialization.
//!
//! Persistence is best effort. Reads never fail: a missing, unreadable or schema-mismatched
//! document yields `None` and the store keeps starting empty. Detached writes log their failures
//! instead of returning them.
//!
//! All writes go through one writer task in the order they were submitted, so an older snapshot
//! never overwrites a newer one. An awaited write also waits for every detached write queued
//! before it.

use crate::wallet::store::{SnapshotStore, WalletStores};
use crate::wallet::sync::repositories::{CacheRepository, FileCacheRepository};
use crate::wallet::{TokenAddress, WalletSyncError};

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

/// Cache documents maintained by the sync layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotKey {
    Balances,
    Prices,
    SupportedTokens,
    Lending,
    LendingDistribution,
    Referral,
    ClaimHistory,
    Notifications,
    MarketingAssets,
    InternalHistory,
}

impl SnapshotKey {
    pub const ALL: [SnapshotKey; 10] = [
        SnapshotKey::Balances,
        SnapshotKey::Prices,
        SnapshotKey::SupportedTokens,
        SnapshotKey::Lending,
        SnapshotKey::LendingDistribution,
        SnapshotKey::Referral,
        SnapshotKey::ClaimHistory,
        SnapshotKey::Notifications,
        SnapshotKey::MarketingAssets,
        SnapshotKey::InternalHistory,
    ];

    /// Cache key; wallet-scoped documents carry the wallet address as a suffix.
    pub fn cache_key(&self, wallet: &TokenAddress) -> String {
        match self {
            SnapshotKey::Balances => format!("balances_{}", wallet),
            SnapshotKey::Prices => "prices".to_string(),
            SnapshotKey::SupportedTokens => "supported_tokens".to_string(),
            SnapshotKey::Lending => format!("lending_{}", wallet),
            SnapshotKey::LendingDistribution => format!("lending_distribution_{}", wallet),
            SnapshotKey::Referral => format!("referral_{}", wallet),
            SnapshotKey::ClaimHistory => format!("claim_history_{}", wallet),
            SnapshotKey::Notifications => format!("notifications_{}", wallet),
            SnapshotKey::MarketingAssets => "marketing_assets".to_string(),
            SnapshotKey::InternalHistory => format!("internal_history_{}", wallet),
        }
    }
}

type WriteAck = oneshot::Sender<Result<(), WalletSyncError>>;

/// One queued cache write.
struct WriteJob {
    key: String,
    contents: String,
    ack: Option<WriteAck>,
}

/// Drain `WriteJob`s one at a time until every sender is gone.
fn spawn_writer(repo: Arc<dyn CacheRepository>) -> mpsc::UnboundedSender<WriteJob> {
    let (tx, mut rx) = mpsc::unbounded_channel::<WriteJob>();
    tokio::spawn(async move {
        while let Some(job) = rx.recv().await {
            let result = repo.write(&job.key, job.contents).await;
            match job.ack {
                Some(ack) => {
                    let _ = ack.send(result);
                }
                None => {
                    if let Err(e) = result {
                        warn!("Failed to persist {}: {}", job.key, e);
                    }
                }
            }
        }
        debug!("Cache writer stopped");
    });
    tx
}

fn serialize<T: Serialize + ?Sized>(key: &str, value: &T) -> Result<String, WalletSyncError> {
    serde_json::to_string(value).map_err(|e| {
        WalletSyncError::PersistenceError(format!("Failed to serialize {}: {}", key, e))
    })
}

/// Service for managing state persistence operations.
///
/// Owns the cache repository and the wallet whose documents it manages.
pub struct StatePersistenceService {
    cache_repo: Arc<dyn CacheRepository>,
    wallet: TokenAddress,
    /// Queue of the writer task, started on first write.
    writer: Mutex<Option<mpsc::UnboundedSender<WriteJob>>>,
}

impl StatePersistenceService {
    /// Create a file-backed persistence service for the given data directory.
    pub fn new(data_dir: PathBuf, wallet: TokenAddress) -> Self {
        Self::with_repository(Arc::new(FileCacheRepository::new(data_dir)), wallet)
    }

    pub fn with_repository(cache_repo: Arc<dyn CacheRepository>, wallet: TokenAddress) -> Self {
        Self {
            cache_repo,
            wallet,
            writer: Mutex::new(None),
        }
    }

    pub fn key(&self, key: SnapshotKey) -> String {
        key.cache_key(&self.wallet)
    }

    /// Render the contents and queue the write. The queue stays locked while rendering so queue
    /// order matches the order in which contents were captured.
    fn submit_write<F>(
        &self,
        key: &str,
        render: F,
        ack: Option<WriteAck>,
    ) -> Result<(), WalletSyncError>
    where
        F: FnOnce() -> Result<String, WalletSyncError>,
    {
        let mut writer = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        let job = WriteJob {
            key: key.to_string(),
            contents: render()?,
            ack,
        };

        let job = match writer.as_ref() {
            Some(tx) => match tx.send(job) {
                Ok(()) => return Ok(()),
                // Writer went away with its runtime; start a new one
                Err(mpsc::error::SendError(job)) => job,
            },
            None => job,
        };

        let tx = spawn_writer(Arc::clone(&self.cache_repo));
        tx.send(job).map_err(|_| {
            WalletSyncError::PersistenceError(format!("Cache writer unavailable for {}", key))
        })?;
        *writer = Some(tx);
        Ok(())
    }

    /// Serialize `value` and write it under `key`, after any write queued before it.
    pub async fn store<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
    ) -> Result<(), WalletSyncError> {
        let (ack, done) = oneshot::channel();
        self.submit_write(key, || serialize(key, value), Some(ack))?;
        done.await.map_err(|_| {
            WalletSyncError::PersistenceError(format!("Cache writer stopped before writing {}", key))
        })?
    }

    /// Serialize `value` now and queue its write; failures are logged.
    pub fn store_detached<T: Serialize + ?Sized>(&self, key: &str, value: &T) {
        if let Err(e) = self.submit_write(key, || serialize(key, value), None) {
            error!("{}", e);
        }
    }

    /// Read and decode the document under `key`. Any failure is logged and yields `None`.
    pub fn retrieve<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let contents = self.cache_repo.read(key)?;
        match serde_json::from_str(&contents) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Ignoring unreadable cache entry {}: {}", key, e);
                None
            }
        }
    }

    pub fn exists(&self, key: &str) -> bool {
        self.cache_repo.exists(key)
    }

    pub async fn remove(&self, key: &str) -> Result<(), WalletSyncError> {
        self.cache_repo.remove(key).await
    }

    /// Persist a store's current contents in the background.
    pub fn persist_snapshot<S: SnapshotStore + ?Sized>(&self, key: SnapshotKey, store: &S) {
        let key = self.key(key);
        // Snapshot under the queue lock so concurrent refreshes land in capture order
        if let Err(e) = self.submit_write(&key, || serialize(&key, &store.snapshot()), None) {
            error!("{}", e);
        }
    }

    /// Persist a store's current contents and wait for the write.
    pub async fn save_snapshot<S: SnapshotStore + ?Sized>(
        &self,
        key: SnapshotKey,
        store: &S,
    ) -> Result<(), WalletSyncError> {
        self.store(&self.key(key), &store.snapshot()).await
    }

    /// Hydrate a store from its cached snapshot. Returns whether a snapshot was applied.
    pub fn restore_snapshot<S: SnapshotStore + ?Sized>(&self, key: SnapshotKey, store: &S) -> bool {
        match self.retrieve::<S::Snapshot>(&self.key(key)) {
            Some(snapshot) => {
                store.restore(snapshot);
                debug!("Restored {:?} from cache", key);
                true
            }
            None => false,
        }
    }

    /// Hydrate every store, returning how many snapshots were restored.
    pub fn restore_all(&self, stores: &WalletStores) -> usize {
        let restored = [
            self.restore_snapshot(SnapshotKey::Balances, &*stores.balances),
            self.restore_snapshot(SnapshotKey::Prices, &*stores.prices),
            self.restore_snapshot(SnapshotKey::SupportedTokens, &*stores.tokens),
            self.restore_snapshot(SnapshotKey::Lending, &*stores.lending),
            self.restore_snapshot(SnapshotKey::LendingDistribution, &*stores.lending_rewards),
            self.restore_snapshot(SnapshotKey::Referral, &*stores.referral),
            self.restore_snapshot(SnapshotKey::ClaimHistory, &*stores.claims),
            self.restore_snapshot(SnapshotKey::Notifications, &*stores.notifications),
            self.restore_snapshot(SnapshotKey::MarketingAssets, &*stores.marketing),
            self.restore_snapshot(SnapshotKey::InternalHistory, &*stores.transactions),
        ]
        .into_iter()
        .filter(|restored| *restored)
        .count();

        info!(
            "Restored {} of {} cached snapshots for {}",
            restored,
            SnapshotKey::ALL.len(),
            self.wallet
        );
        restored
    }

    /// Write every non-empty store and wait for completion. Returns how many were written.
    pub async fn flush_all(&self, stores: &WalletStores) -> Result<usize, WalletSyncError> {
        let mut written = 0;

        macro_rules! flush {
            ($key:expr, $store:expr) => {
                if !$store.is_empty() {
                    self.save_snapshot($key, &*$store).await?;
                    written += 1;
                }
            };
        }

        flush!(SnapshotKey::Balances, stores.balances);
        flush!(SnapshotKey::Prices, stores.prices);
        flush!(SnapshotKey::SupportedTokens, stores.tokens);
        flush!(SnapshotKey::Lending, stores.lending);
        flush!(SnapshotKey::LendingDistribution, stores.lending_rewards);
        flush!(SnapshotKey::Referral, stores.referral);
        flush!(SnapshotKey::ClaimHistory, stores.claims);
        flush!(SnapshotKey::Notifications, stores.notifications);
        flush!(SnapshotKey::MarketingAssets, stores.marketing);
        flush!(SnapshotKey::InternalHistory, stores.transactions);

        info!("Flushed {} snapshots to cache", written);
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexer::{NotificationItem, Token, TokenBalance, TokenPrice};
    use crate::transaction::{InternalHistoryTransaction, TransactionType};
    use alloy_primitives::U256;
    use tempfile::TempDir;

    fn wallet() -> TokenAddress {
        TokenAddress::parse("0x1111111111111111111111111111111111111111").unwrap()
    }

    fn service(dir: &TempDir) -> StatePersistenceService {
        StatePersistenceService::new(dir.path().to_path_buf(), wallet())
    }

    #[tokio::test]
    async fn payload_types_round_trip() {
        let dir = TempDir::new().unwrap();
        let persistence = service(&dir);

        let balances = vec![TokenBalance {
            address: TokenAddress::native(),
            balance: U256::from(1_500_000_000_000_000_000u128),
        }];
        let prices = vec![TokenPrice::usd_only(TokenAddress::native(), 301.25)];
        let tokens = vec![Token {
            address: TokenAddress::native(),
            name: "BNB".to_string(),
            symbol: "BNB".to_string(),
            decimals: 18,
            logo: "bnb.png".to_string(),
        }];
        let history = vec![InternalHistoryTransaction::new_pending(
            "0xABC",
            3,
            wallet(),
            TransactionType::Swap,
            "Swap",
            &[1, 2, 3],
        )];

        persistence.store("balances", &balances).await.unwrap();
        persistence.store("prices", &prices).await.unwrap();
        persistence.store("tokens", &tokens).await.unwrap();
        persistence.store("history", &history).await.unwrap();

        assert_eq!(persistence.retrieve::<Vec<TokenBalance>>("balances"), Some(balances));
        assert_eq!(persistence.retrieve::<Vec<TokenPrice>>("prices"), Some(prices));
        assert_eq!(persistence.retrieve::<Vec<Token>>("tokens"), Some(tokens));
        assert_eq!(
            persistence.retrieve::<Vec<InternalHistoryTransaction>>("history"),
            Some(history)
        );
    }

    #[test]
    fn absent_document_is_none() {
        let dir = TempDir::new().unwrap();
        let persistence = service(&dir);
        assert!(persistence.retrieve::<Vec<Token>>("supported_tokens").is_none());
    }

    #[test]
    fn invalid_json_is_none_and_left_in_place() {
        let dir = TempDir::new().unwrap();
        let persistence = service(&dir);
        let path = dir.path().join("prices.json");
        std::fs::write(&path, "{not json").unwrap();

        assert!(persistence.retrieve::<Vec<TokenPrice>>("prices").is_none());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{not json");
    }

    #[test]
    fn schema_mismatch_is_none() {
        let dir = TempDir::new().unwrap();
        let persistence = service(&dir);
        std::fs::write(dir.path().join("prices.json"), "{\"unexpected\":true}").unwrap();
        assert!(persistence.retrieve::<Vec<TokenPrice>>("prices").is_none());
    }

    #[tokio::test]
    async fn flush_then_restore_hydrates_stores() {
        let dir = TempDir::new().unwrap();
        let persistence = service(&dir);

        let stores = WalletStores::new(wallet());
        stores.balances.update_balance(TokenAddress::native(), U256::from(7u64));
        stores.notifications.set_notifications(vec![NotificationItem {
            id: 4,
            title: "hello".to_string(),
            content: String::new(),
            image: String::new(),
            link: String::new(),
            read: false,
            created_at: 0,
        }]);

        assert_eq!(persistence.flush_all(&stores).await.unwrap(), 2);
        assert!(persistence.exists("balances_0x1111111111111111111111111111111111111111"));

        let fresh = WalletStores::new(wallet());
        assert_eq!(persistence.restore_all(&fresh), 2);
        assert_eq!(
            fresh.balances.balance_for_address(&TokenAddress::native()),
            Some(U256::from(7u64))
        );
        assert_eq!(fresh.notifications.unread_count(), 1);
    }

    #[tokio::test]
    async fn detached_writes_land_in_submission_order() {
        let dir = TempDir::new().unwrap();
        let persistence = service(&dir);

        for value in 0..50u32 {
            persistence.store_detached("counter", &value);
        }
        // Awaited write queues behind every detached one
        persistence.store("barrier", &true).await.unwrap();

        assert_eq!(persistence.retrieve::<u32>("counter"), Some(49));
    }

    #[tokio::test]
    async fn awaited_write_reports_serialization_failure() {
        let dir = TempDir::new().unwrap();
        let persistence = service(&dir);
        let mut unserializable = std::collections::HashMap::new();
        unserializable.insert((1u8, 2u8), 3u8);

        let result = persistence.store("bad", &unserializable).await;

        assert!(matches!(result, Err(WalletSyncError::PersistenceError(_))));
        assert!(!persistence.exists("bad"));
    }

    #[test]
    fn wallet_scoped_keys_carry_the_address() {
        let w = wallet();
        assert_eq!(
            SnapshotKey::InternalHistory.cache_key(&w),
            "internal_history_0x1111111111111111111111111111111111111111"
        );
        assert_eq!(SnapshotKey::Prices.cache_key(&w), "prices");
    }
}
