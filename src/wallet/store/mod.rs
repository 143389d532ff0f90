//! In-memory stores for synchronized wallet data
//!
//! Each store owns one data category behind a `std::sync::RwLock` and is shared as an `Arc` between
//! the pollers that write it and the consumers that read it. Locks are never held across an
//! `.await`. Every store can be snapshotted for the persistent cache and hydrated from it.

/// Lending positions, lending rewards, referral data and claim history
pub mod account;
/// On-chain token balances
pub mod balance;
/// Notification feed and marketing assets
pub mod feed;
/// Token spot prices
pub mod price;
/// Supported token metadata
pub mod token;

pub use account::{ClaimHistoryStore, LendingRewardStore, LendingStore, ReferralStore};
pub use balance::BalanceStore;
pub use feed::{MarketingAssetStore, NotificationStore};
pub use price::PriceStore;
pub use token::TokenStore;

use crate::transaction::TransactionTracker;
use crate::wallet::TokenAddress;

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;

/// A store whose full contents can be written to and read back from the cache.
pub trait SnapshotStore: Send + Sync {
    type Snapshot: Serialize + DeserializeOwned + Send + 'static;

    /// Clone the current contents.
    fn snapshot(&self) -> Self::Snapshot;

    /// Replace the current contents with a previously taken snapshot.
    fn restore(&self, snapshot: Self::Snapshot);

    fn is_empty(&self) -> bool;
}

/// Every store of one wallet, shared between pollers, the sender and consumers.
#[derive(Clone)]
pub struct WalletStores {
    pub balances: Arc<BalanceStore>,
    pub prices: Arc<PriceStore>,
    pub tokens: Arc<TokenStore>,
    pub lending: Arc<LendingStore>,
    pub lending_rewards: Arc<LendingRewardStore>,
    pub referral: Arc<ReferralStore>,
    pub claims: Arc<ClaimHistoryStore>,
    pub notifications: Arc<NotificationStore>,
    pub marketing: Arc<MarketingAssetStore>,
    pub transactions: Arc<TransactionTracker>,
}

impl WalletStores {
    pub fn new(wallet: TokenAddress) -> Self {
        Self {
            balances: Arc::new(BalanceStore::new()),
            prices: Arc::new(PriceStore::new()),
            tokens: Arc::new(TokenStore::new()),
            lending: Arc::new(LendingStore::new()),
            lending_rewards: Arc::new(LendingRewardStore::new()),
            referral: Arc::new(ReferralStore::new()),
            claims: Arc::new(ClaimHistoryStore::new()),
            notifications: Arc::new(NotificationStore::new()),
            marketing: Arc::new(MarketingAssetStore::new()),
            transactions: Arc::new(TransactionTracker::new(wallet)),
        }
    }
}
