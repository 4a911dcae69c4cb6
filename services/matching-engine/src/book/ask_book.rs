//! Ask (sell-side) order book
//!
//! Maintains sell orders keyed by price, traversed ascending so the
//! lowest ask comes first. Mirrors the bid book with the opposite
//! priority direction.

use alloy_primitives::U256;
use ringbook_types::ids::OrderKey;
use std::collections::BTreeMap;

use super::price_level::{OrderHandle, PriceLevel};
use crate::events::LevelSnapshot;

/// Ask (sell) side of a book.
#[derive(Default)]
pub struct AskBook {
    levels: BTreeMap<U256, PriceLevel>,
}

impl AskBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an order handle at its price level, creating the level if
    /// needed.
    pub fn insert(&mut self, price: U256, handle: OrderHandle, remaining: U256) {
        self.levels.entry(price).or_default().push(handle, remaining);
    }

    /// Best ask price (lowest).
    pub fn best_price(&self) -> Option<U256> {
        self.levels.keys().next().copied()
    }

    pub fn level(&self, price: &U256) -> Option<&PriceLevel> {
        self.levels.get(price)
    }

    pub fn level_mut(&mut self, price: &U256) -> Option<&mut PriceLevel> {
        self.levels.get_mut(price)
    }

    /// Remove the order with the given key at the given price.
    pub fn remove(&mut self, price: &U256, key: &OrderKey) -> Option<OrderHandle> {
        self.levels.get_mut(price)?.remove(key)
    }

    /// Drop the level at `price` if it holds no orders.
    pub fn drop_level_if_empty(&mut self, price: &U256) {
        if self.levels.get(price).is_some_and(|level| level.is_empty()) {
            self.levels.remove(price);
        }
    }

    /// Iterate levels in priority order (lowest price first).
    pub fn levels(&self) -> impl Iterator<Item = (&U256, &PriceLevel)> {
        self.levels.iter()
    }

    /// Top-N levels with running totals and full order counts.
    pub fn depth_snapshot(&self, depth: usize) -> Vec<LevelSnapshot> {
        self.levels()
            .take(depth)
            .map(|(price, level)| {
                LevelSnapshot::new(*price, level.total_remaining(), level.len())
            })
            .collect()
    }

    /// All levels with at least one active order, with remaining quantity
    /// and count derived from active orders only.
    pub fn active_snapshot(&self) -> Vec<LevelSnapshot> {
        self.levels()
            .filter_map(|(price, level)| {
                let (total, count) = level.active_totals();
                (count > 0).then(|| LevelSnapshot::new(*price, total, count))
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    pub fn level_count(&self) -> usize {
        self.levels.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{Address, Bytes};
    use parking_lot::Mutex;
    use ringbook_types::order::Order;
    use std::sync::Arc;

    fn handle(nonce: u64, amt_in: u64) -> OrderHandle {
        Arc::new(Mutex::new(Order::new(
            Address::repeat_byte(1),
            "AAA",
            "BBB",
            U256::from(amt_in),
            U256::from(amt_in),
            U256::from(nonce),
            Bytes::new(),
        )))
    }

    #[test]
    fn test_best_price_is_lowest() {
        let mut book = AskBook::new();
        book.insert(U256::from(50_000), handle(1, 10), U256::from(10));
        book.insert(U256::from(51_000), handle(2, 20), U256::from(20));
        book.insert(U256::from(49_000), handle(3, 15), U256::from(15));

        assert_eq!(book.best_price(), Some(U256::from(49_000)));
    }

    #[test]
    fn test_levels_iterate_ascending() {
        let mut book = AskBook::new();
        book.insert(U256::from(3), handle(1, 10), U256::from(10));
        book.insert(U256::from(1), handle(2, 10), U256::from(10));
        book.insert(U256::from(2), handle(3, 10), U256::from(10));

        let prices: Vec<U256> = book.levels().map(|(price, _)| *price).collect();
        assert_eq!(prices, vec![U256::from(1), U256::from(2), U256::from(3)]);
    }

    #[test]
    fn test_depth_snapshot_top_levels() {
        let mut book = AskBook::new();
        book.insert(U256::from(50_000), handle(1, 10), U256::from(10));
        book.insert(U256::from(51_000), handle(2, 20), U256::from(20));
        book.insert(U256::from(49_000), handle(3, 5), U256::from(5));

        let depth = book.depth_snapshot(2);
        assert_eq!(depth.len(), 2);
        assert_eq!(depth[0].price, U256::from(49_000));
        assert_eq!(depth[1].price, U256::from(50_000));
    }

    #[test]
    fn test_same_price_shares_level() {
        let mut book = AskBook::new();
        book.insert(U256::from(50_000), handle(1, 10), U256::from(10));
        book.insert(U256::from(50_000), handle(2, 20), U256::from(20));

        assert_eq!(book.level_count(), 1);
        let level = book.level(&U256::from(50_000)).unwrap();
        assert_eq!(level.total_remaining(), U256::from(30));
    }
}
