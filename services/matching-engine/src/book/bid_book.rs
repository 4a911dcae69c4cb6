//! Bid (buy-side) order book
//!
//! Maintains buy orders keyed by price, traversed descending so the
//! highest bid comes first. BTreeMap keys give deterministic iteration
//! and point deletion by price.

use alloy_primitives::U256;
use ringbook_types::ids::OrderKey;
use std::collections::BTreeMap;

use super::price_level::{OrderHandle, PriceLevel};
use crate::events::LevelSnapshot;

/// Bid (buy) side of a book.
///
/// The map iterates ascending, so best-bid access and priority traversal
/// walk it in reverse. At each price level orders are FIFO.
#[derive(Default)]
pub struct BidBook {
    levels: BTreeMap<U256, PriceLevel>,
}

impl BidBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an order handle at its price level, creating the level if
    /// needed.
    pub fn insert(&mut self, price: U256, handle: OrderHandle, remaining: U256) {
        self.levels.entry(price).or_default().push(handle, remaining);
    }

    /// Best bid price (highest).
    pub fn best_price(&self) -> Option<U256> {
        self.levels.keys().next_back().copied()
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

    /// Iterate levels in priority order (highest price first).
    pub fn levels(&self) -> impl Iterator<Item = (&U256, &PriceLevel)> {
        self.levels.iter().rev()
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
