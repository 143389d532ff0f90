use super::SnapshotStore;
use crate::indexer::{MarketingAsset, NotificationItem};

use std::collections::HashSet;
use std::sync::RwLock;

/// Sort by id descending and keep the first occurrence of every id.
fn normalize_feed(mut items: Vec<NotificationItem>) -> Vec<NotificationItem> {
    items.sort_by(|a, b| b.id.cmp(&a.id));
    let mut seen = HashSet::new();
    items.retain(|item| seen.insert(item.id));
    items
}

/// The wallet's notification feed, newest (highest id) first, unique by id.
#[derive(Default)]
pub struct NotificationStore {
    items: RwLock<Vec<NotificationItem>>,
}

impl NotificationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the feed with freshly fetched pages.
    pub fn set_notifications(&self, items: Vec<NotificationItem>) -> bool {
        let next = normalize_feed(items);
        let mut current = self.items.write().unwrap_or_else(|e| e.into_inner());
        if *current == next {
            return false;
        }
        *current = next;
        true
    }

    pub fn notifications(&self) -> Vec<NotificationItem> {
        self.items.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn unread_count(&self) -> usize {
        self.items
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|item| !item.read)
            .count()
    }

    pub fn latest_id(&self) -> Option<u64> {
        self.items
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .first()
            .map(|item| item.id)
    }

    /// Flag one entry as read locally. Returns false for unknown ids.
    pub fn mark_read(&self, id: u64) -> bool {
        let mut items = self.items.write().unwrap_or_else(|e| e.into_inner());
        match items.iter_mut().find(|item| item.id == id) {
            Some(item) => {
                item.read = true;
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.items.read().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl SnapshotStore for NotificationStore {
    type Snapshot = Vec<NotificationItem>;

    fn snapshot(&self) -> Self::Snapshot {
        self.notifications()
    }

    fn restore(&self, snapshot: Self::Snapshot) {
        self.set_notifications(snapshot);
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Banners and promotional assets, highest priority first.
#[derive(Default)]
pub struct MarketingAssetStore {
    assets: RwLock<Vec<MarketingAsset>>,
}

impl MarketingAssetStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_assets(&self, mut assets: Vec<MarketingAsset>) -> bool {
        assets.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.id.cmp(&b.id)));
        let mut current = self.assets.write().unwrap_or_else(|e| e.into_inner());
        if *current == assets {
            return false;
        }
        *current = assets;
        true
    }

    pub fn assets(&self) -> Vec<MarketingAsset> {
        self.assets.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn assets_of_type(&self, asset_type: &str) -> Vec<MarketingAsset> {
        self.assets
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|a| a.asset_type == asset_type)
            .cloned()
            .collect()
    }
}

impl SnapshotStore for MarketingAssetStore {
    type Snapshot = Vec<MarketingAsset>;

    fn snapshot(&self) -> Self::Snapshot {
        self.assets()
    }

    fn restore(&self, snapshot: Self::Snapshot) {
        self.set_assets(snapshot);
    }

    fn is_empty(&self) -> bool {
        self.assets.read().unwrap_or_else(|e| e.into_inner()).is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: u64, read: bool) -> NotificationItem {
        NotificationItem {
            id,
            title: format!("n{}", id),
            content: String::new(),
            image: String::new(),
            link: String::new(),
            read,
            created_at: id as i64,
        }
    }

    #[test]
    fn pages_are_sorted_and_deduplicated() {
        let store = NotificationStore::new();
        // second page overlaps the first by one entry
        let mut pages = vec![item(9, false), item(8, true), item(7, false)];
        pages.extend(vec![item(7, false), item(5, false), item(6, true)]);
        store.set_notifications(pages);

        let ids: Vec<u64> = store.notifications().iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![9, 8, 7, 6, 5]);
        assert_eq!(store.unread_count(), 3);
        assert_eq!(store.latest_id(), Some(9));
    }

    #[test]
    fn mark_read_updates_unread_count() {
        let store = NotificationStore::new();
        store.set_notifications(vec![item(1, false), item(2, false)]);
        assert!(store.mark_read(2));
        assert!(!store.mark_read(42));
        assert_eq!(store.unread_count(), 1);
    }

    #[test]
    fn assets_ordered_by_priority() {
        let store = MarketingAssetStore::new();
        let asset = |id: u64, priority: i64, kind: &str| MarketingAsset {
            id,
            asset_type: kind.to_string(),
            image_url: format!("https://cdn.example/{}.png", id),
            link: String::new(),
            priority,
        };
        store.set_assets(vec![asset(1, 1, "banner"), asset(2, 5, "popup"), asset(3, 3, "banner")]);

        let ids: Vec<u64> = store.assets().iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![2, 3, 1]);
        assert_eq!(store.assets_of_type("banner").len(), 2);
    }
}
