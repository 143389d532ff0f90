use super::SnapshotStore;
use crate::indexer::TokenPrice;
use crate::wallet::TokenAddress;

use std::collections::HashMap;
use std::sync::RwLock;

/// Spot prices keyed by token address. Replaced wholesale per refresh.
#[derive(Default)]
pub struct PriceStore {
    prices: RwLock<HashMap<TokenAddress, TokenPrice>>,
}

impl PriceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_prices(&self, prices: impl IntoIterator<Item = TokenPrice>) -> bool {
        let next: HashMap<TokenAddress, TokenPrice> = prices
            .into_iter()
            .map(|p| (p.address.clone(), p))
            .collect();

        let mut current = self.prices.write().unwrap_or_else(|e| e.into_inner());
        if *current == next {
            return false;
        }
        *current = next;
        true
    }

    pub fn update_price(&self, price: TokenPrice) -> bool {
        let mut current = self.prices.write().unwrap_or_else(|e| e.into_inner());
        if current.get(&price.address) == Some(&price) {
            return false;
        }
        current.insert(price.address.clone(), price);
        true
    }

    pub fn price_for_address(&self, address: &TokenAddress) -> Option<TokenPrice> {
        self.prices
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(address)
            .cloned()
    }

    pub fn usd_for_address(&self, address: &TokenAddress) -> f64 {
        self.price_for_address(address).map(|p| p.usd).unwrap_or(0.0)
    }

    pub fn len(&self) -> usize {
        self.prices.read().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl SnapshotStore for PriceStore {
    type Snapshot = Vec<TokenPrice>;

    fn snapshot(&self) -> Vec<TokenPrice> {
        let mut entries: Vec<TokenPrice> = self
            .prices
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect();
        entries.sort_by(|a, b| a.address.cmp(&b.address));
        entries
    }

    fn restore(&self, snapshot: Vec<TokenPrice>) {
        self.set_prices(snapshot);
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
