use super::SnapshotStore;
use crate::indexer::Token;
use crate::wallet::TokenAddress;

use std::collections::HashSet;
use std::sync::RwLock;

/// The indexer's supported token list, in the order the indexer returned it.
#[derive(Default)]
pub struct TokenStore {
    tokens: RwLock<Vec<Token>>,
}

impl TokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the list. Later duplicates of an address are dropped.
    pub fn set_tokens(&self, tokens: Vec<Token>) -> bool {
        let mut seen = HashSet::new();
        let next: Vec<Token> = tokens
            .into_iter()
            .filter(|t| seen.insert(t.address.clone()))
            .collect();

        let mut current = self.tokens.write().unwrap_or_else(|e| e.into_inner());
        if *current == next {
            return false;
        }
        *current = next;
        true
    }

    pub fn token(&self, address: &TokenAddress) -> Option<Token> {
        self.tokens
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .find(|t| &t.address == address)
            .cloned()
    }

    pub fn tokens(&self) -> Vec<Token> {
        self.tokens.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn addresses(&self) -> Vec<TokenAddress> {
        self.tokens
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|t| t.address.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tokens.read().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl SnapshotStore for TokenStore {
    type Snapshot = Vec<Token>;

    fn snapshot(&self) -> Vec<Token> {
        self.tokens()
    }

    fn restore(&self, snapshot: Vec<Token>) {
        self.set_tokens(snapshot);
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(address: &str, symbol: &str) -> Token {
        Token {
            address: TokenAddress::parse(address).unwrap(),
            name: symbol.to_string(),
            symbol: symbol.to_string(),
            decimals: 18,
            logo: String::new(),
        }
    }

    #[test]
    fn duplicate_addresses_keep_first_entry() {
        let store = TokenStore::new();
        store.set_tokens(vec![
            token("0x0000000000000000000000000000000000000001", "AAA"),
            token("0x0000000000000000000000000000000000000001", "BBB"),
            token("0x0000000000000000000000000000000000000002", "CCC"),
        ]);

        assert_eq!(store.len(), 2);
        let first = TokenAddress::parse("0x0000000000000000000000000000000000000001").unwrap();
        assert_eq!(store.token(&first).unwrap().symbol, "AAA");
    }

    #[test]
    fn addresses_follow_list_order() {
        let store = TokenStore::new();
        store.set_tokens(vec![
            token("0x0000000000000000000000000000000000000002", "B"),
            token("0x0000000000000000000000000000000000000001", "A"),
        ]);
        let addresses: Vec<String> = store.addresses().into_iter().map(String::from).collect();
        assert_eq!(
            addresses,
            vec![
                "0x0000000000000000000000000000000000000002",
                "0x0000000000000000000000000000000000000001"
            ]
        );
    }
}
