//! Per-wallet account data fetched from the indexer: lending positions, unclaimed lending
//! rewards, the referral overview and reward claim history. All of it is replaced wholesale on
//! every successful refresh.

use super::SnapshotStore;
use crate::indexer::{ClaimHistory, LendingDistributionBalance, LendingPlatformBalance, ReferralOverview};

use std::sync::RwLock;

/// Replace `slot` with `next` when they differ.
fn replace_if_changed<T: PartialEq>(slot: &RwLock<T>, next: T) -> bool {
    let mut current = slot.write().unwrap_or_else(|e| e.into_inner());
    if *current == next {
        return false;
    }
    *current = next;
    true
}

fn read_cloned<T: Clone>(slot: &RwLock<T>) -> T {
    slot.read().unwrap_or_else(|e| e.into_inner()).clone()
}

/// Supply/borrow positions per lending platform.
#[derive(Default)]
pub struct LendingStore {
    platforms: RwLock<Vec<LendingPlatformBalance>>,
}

impl LendingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_platforms(&self, platforms: Vec<LendingPlatformBalance>) -> bool {
        replace_if_changed(&self.platforms, platforms)
    }

    pub fn platforms(&self) -> Vec<LendingPlatformBalance> {
        read_cloned(&self.platforms)
    }

    pub fn platform(&self, name: &str) -> Option<LendingPlatformBalance> {
        self.platforms
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
            .cloned()
    }
}

impl SnapshotStore for LendingStore {
    type Snapshot = Vec<LendingPlatformBalance>;

    fn snapshot(&self) -> Self::Snapshot {
        self.platforms()
    }

    fn restore(&self, snapshot: Self::Snapshot) {
        self.set_platforms(snapshot);
    }

    fn is_empty(&self) -> bool {
        self.platforms.read().unwrap_or_else(|e| e.into_inner()).is_empty()
    }
}

/// Unclaimed lending rewards, if the wallet has any.
#[derive(Default)]
pub struct LendingRewardStore {
    distribution: RwLock<Option<LendingDistributionBalance>>,
}

impl LendingRewardStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_distribution(&self, distribution: Option<LendingDistributionBalance>) -> bool {
        replace_if_changed(&self.distribution, distribution)
    }

    pub fn distribution(&self) -> Option<LendingDistributionBalance> {
        read_cloned(&self.distribution)
    }
}

impl SnapshotStore for LendingRewardStore {
    type Snapshot = Option<LendingDistributionBalance>;

    fn snapshot(&self) -> Self::Snapshot {
        self.distribution()
    }

    fn restore(&self, snapshot: Self::Snapshot) {
        self.set_distribution(snapshot);
    }

    fn is_empty(&self) -> bool {
        self.distribution.read().unwrap_or_else(|e| e.into_inner()).is_none()
    }
}

/// Referral totals and per-code statistics. Latest response wins.
#[derive(Default)]
pub struct ReferralStore {
    overview: RwLock<ReferralOverview>,
}

impl ReferralStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_overview(&self, overview: ReferralOverview) -> bool {
        replace_if_changed(&self.overview, overview)
    }

    pub fn overview(&self) -> ReferralOverview {
        read_cloned(&self.overview)
    }

    pub fn total_points(&self) -> f64 {
        self.overview.read().unwrap_or_else(|e| e.into_inner()).total_point
    }
}

impl SnapshotStore for ReferralStore {
    type Snapshot = ReferralOverview;

    fn snapshot(&self) -> Self::Snapshot {
        self.overview()
    }

    fn restore(&self, snapshot: Self::Snapshot) {
        self.set_overview(snapshot);
    }

    fn is_empty(&self) -> bool {
        *self.overview.read().unwrap_or_else(|e| e.into_inner()) == ReferralOverview::default()
    }
}

/// Past reward claims, newest first.
#[derive(Default)]
pub struct ClaimHistoryStore {
    claims: RwLock<Vec<ClaimHistory>>,
}

impl ClaimHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_claims(&self, mut claims: Vec<ClaimHistory>) -> bool {
        claims.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        replace_if_changed(&self.claims, claims)
    }

    pub fn claims(&self) -> Vec<ClaimHistory> {
        read_cloned(&self.claims)
    }
}

impl SnapshotStore for ClaimHistoryStore {
    type Snapshot = Vec<ClaimHistory>;

    fn snapshot(&self) -> Self::Snapshot {
        self.claims()
    }

    fn restore(&self, snapshot: Self::Snapshot) {
        self.set_claims(snapshot);
    }

    fn is_empty(&self) -> bool {
        self.claims.read().unwrap_or_else(|e| e.into_inner()).is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexer::ReferralCode;
    use std::collections::HashMap;

    #[test]
    fn referral_overview_latest_wins() {
        let store = ReferralStore::new();
        assert!(store.is_empty());

        let mut codes = HashMap::new();
        codes.insert(
            "ABC123".to_string(),
            ReferralCode {
                total_refer: 3,
                total_point: 12.5,
                ratio: 0.2,
            },
        );
        let overview = ReferralOverview {
            total_point: 12.5,
            total_cashback: 1.0,
            codes,
        };

        assert!(store.set_overview(overview.clone()));
        assert!(!store.set_overview(overview));
        assert_eq!(store.total_points(), 12.5);
        assert!(store.set_overview(ReferralOverview::default()));
        assert!(store.is_empty());
    }

    #[test]
    fn claims_sorted_newest_first() {
        let store = ClaimHistoryStore::new();
        let claim = |ts: i64| ClaimHistory {
            tx_hash: format!("0x{:x}", ts),
            amount: 1.0,
            status: "success".to_string(),
            timestamp: ts,
        };
        store.set_claims(vec![claim(1), claim(3), claim(2)]);
        let order: Vec<i64> = store.claims().iter().map(|c| c.timestamp).collect();
        assert_eq!(order, vec![3, 2, 1]);
    }

    #[test]
    fn platform_lookup_ignores_case() {
        let store = LendingStore::new();
        store.set_platforms(vec![LendingPlatformBalance {
            name: "Venus".to_string(),
            balances: Vec::new(),
        }]);
        assert!(store.platform("venus").is_some());
        assert!(store.platform("compound").is_none());
    }
}
