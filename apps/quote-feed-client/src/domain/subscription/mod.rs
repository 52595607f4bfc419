//! Subscription Tracking
//!
//! The set of symbols the server is asked to stream. It is the single source
//! of truth for subscriptions: registration and removal only reach the wire
//! when they actually change this set.

use std::collections::BTreeSet;

/// A symbol string (e.g. `NASDAQ:AAPL`).
pub type Symbol = String;

/// Unique, ordered set of subscribed symbols.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionSet {
    symbols: BTreeSet<Symbol>,
}

impl SubscriptionSet {
    /// Create an empty set.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            symbols: BTreeSet::new(),
        }
    }

    /// Add a symbol.
    ///
    /// Returns `true` if the symbol was not present before.
    pub fn insert(&mut self, symbol: impl Into<Symbol>) -> bool {
        self.symbols.insert(symbol.into())
    }

    /// Remove a symbol.
    ///
    /// Returns `true` if the symbol was present.
    pub fn remove(&mut self, symbol: &str) -> bool {
        self.symbols.remove(symbol)
    }

    /// Check whether a symbol is subscribed.
    #[must_use]
    pub fn contains(&self, symbol: &str) -> bool {
        self.symbols.contains(symbol)
    }

    /// Number of subscribed symbols.
    #[must_use]
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    /// Check if there are no subscriptions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Iterate over subscribed symbols in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols.iter()
    }

    /// Drop every subscription.
    pub fn clear(&mut self) {
        self.symbols.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_reports_first_registration_only() {
        let mut set = SubscriptionSet::new();
        assert!(set.insert("AAPL"));
        assert!(!set.insert("AAPL"));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn remove_reports_presence() {
        let mut set = SubscriptionSet::new();
        assert!(!set.remove("AAPL"));

        set.insert("AAPL");
        assert!(set.remove("AAPL"));
        assert!(set.is_empty());
    }

    #[test]
    fn iteration_is_sorted() {
        let mut set = SubscriptionSet::new();
        set.insert("MSFT");
        set.insert("AAPL");
        set.insert("GOOG");

        let symbols: Vec<_> = set.iter().cloned().collect();
        assert_eq!(symbols, vec!["AAPL", "GOOG", "MSFT"]);
    }

    #[test]
    fn clear_empties_set() {
        let mut set = SubscriptionSet::new();
        set.insert("AAPL");
        set.insert("TSLA");
        set.clear();
        assert!(set.is_empty());
        assert!(!set.contains("AAPL"));
    }
}
