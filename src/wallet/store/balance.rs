use super::SnapshotStore;
use crate::indexer::TokenBalance;
use crate::wallet::TokenAddress;

use alloy_primitives::U256;
use std::collections::HashMap;
use std::sync::RwLock;

/// Raw on-chain balances of the active wallet, keyed by token address.
///
/// Last write wins; no history is kept.
#[derive(Default)]
pub struct BalanceStore {
    balances: RwLock<HashMap<TokenAddress, U256>>,
}

impl BalanceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole map in one assignment. Returns whether the contents changed.
    pub fn set_balances(&self, balances: impl IntoIterator<Item = TokenBalance>) -> bool {
        let next: HashMap<TokenAddress, U256> = balances
            .into_iter()
            .map(|b| (b.address, b.balance))
            .collect();

        let mut current = self.balances.write().unwrap_or_else(|e| e.into_inner());
        if *current == next {
            return false;
        }
        *current = next;
        true
    }

    /// Write a batch of balances over the existing entries, leaving the others in place.
    /// Returns how many entries changed.
    pub fn merge_balances(&self, balances: impl IntoIterator<Item = TokenBalance>) -> usize {
        let mut current = self.balances.write().unwrap_or_else(|e| e.into_inner());
        let mut changed = 0;
        for b in balances {
            if current.get(&b.address) != Some(&b.balance) {
                current.insert(b.address, b.balance);
                changed += 1;
            }
        }
        changed
    }

    /// Mutate a single entry.
    pub fn update_balance(&self, address: TokenAddress, amount: U256) -> bool {
        let mut current = self.balances.write().unwrap_or_else(|e| e.into_inner());
        current.insert(address, amount) != Some(amount)
    }

    pub fn balance_for_address(&self, address: &TokenAddress) -> Option<U256> {
        self.balances
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(address)
            .copied()
    }

    /// Tokens with a positive balance.
    pub fn held_tokens(&self) -> Vec<TokenAddress> {
        let mut held: Vec<TokenAddress> = self
            .balances
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|(_, amount)| !amount.is_zero())
            .map(|(address, _)| address.clone())
            .collect();
        held.sort();
        held
    }

    pub fn len(&self) -> usize {
        self.balances.read().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl SnapshotStore for BalanceStore {
    type Snapshot = Vec<TokenBalance>;

    fn snapshot(&self) -> Vec<TokenBalance> {
        let mut entries: Vec<TokenBalance> = self
            .balances
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(address, balance)| TokenBalance {
                address: address.clone(),
                balance: *balance,
            })
            .collect();
        entries.sort_by(|a, b| a.address.cmp(&b.address));
        entries
    }

    fn restore(&self, snapshot: Vec<TokenBalance>) {
        self.set_balances(snapshot);
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(raw: &str) -> TokenAddress {
        TokenAddress::parse(raw).unwrap()
    }

    #[test]
    fn lookup_ignores_address_case() {
        let store = BalanceStore::new();
        store.set_balances(vec![TokenBalance {
            address: addr("0xAbCdEf0000000000000000000000000000000001"),
            balance: U256::from(42u64),
        }]);

        let lower = addr("0xabcdef0000000000000000000000000000000001");
        let upper = addr("0xABCDEF0000000000000000000000000000000001");
        assert_eq!(store.balance_for_address(&lower), Some(U256::from(42u64)));
        assert_eq!(store.balance_for_address(&upper), Some(U256::from(42u64)));
    }

    #[test]
    fn set_balances_replaces_whole_map() {
        let store = BalanceStore::new();
        let a = addr("0x0000000000000000000000000000000000000001");
        let b = addr("0x0000000000000000000000000000000000000002");

        store.update_balance(a.clone(), U256::from(1u64));
        store.set_balances(vec![TokenBalance {
            address: b.clone(),
            balance: U256::from(2u64),
        }]);

        assert_eq!(store.balance_for_address(&a), None);
        assert_eq!(store.balance_for_address(&b), Some(U256::from(2u64)));
    }

    #[test]
    fn replaying_the_same_result_changes_nothing() {
        let store = BalanceStore::new();
        let batch = vec![
            TokenBalance {
                address: addr("0x0000000000000000000000000000000000000001"),
                balance: U256::from(10u64),
            },
            TokenBalance {
                address: addr("0x0000000000000000000000000000000000000002"),
                balance: U256::ZERO,
            },
        ];

        assert_eq!(store.merge_balances(batch.clone()), 2);
        let before = store.snapshot();
        assert_eq!(store.merge_balances(batch), 0);
        assert_eq!(store.snapshot(), before);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn held_tokens_skips_zero_balances() {
        let store = BalanceStore::new();
        let a = addr("0x0000000000000000000000000000000000000001");
        store.update_balance(a.clone(), U256::from(5u64));
        store.update_balance(addr("0x0000000000000000000000000000000000000002"), U256::ZERO);
        assert_eq!(store.held_tokens(), vec![a]);
    }
}
