//! Price level implementation with FIFO queue
//!
//! A price level holds every order resting at one price on one side of a
//! book, in arrival order. Matching always takes the oldest eligible
//! order first, which enforces time priority within the level.

use alloy_primitives::U256;
use parking_lot::Mutex;
use ringbook_types::ids::OrderKey;
use ringbook_types::order::Order;
use std::collections::VecDeque;
use std::sync::Arc;

/// Shared handle to an order.
///
/// Orders are referenced from price levels, matcher locals and
/// confirmation tasks at the same time. The mutex is a leaf lock: it is
/// only taken while the owning book's lock is already held (or, during
/// submission, after the order is marked pending and no matcher path will
/// touch it), and nothing else is acquired while it is held.
pub type OrderHandle = Arc<Mutex<Order>>;

/// All orders resting at a single price on one side of a book.
#[derive(Default)]
pub struct PriceLevel {
    /// Orders in FIFO order (time priority)
    orders: VecDeque<OrderHandle>,
    /// Running total of remaining quantity, in the orders' own amt-in
    /// currency (quote for bids, base for asks)
    total_remaining: U256,
}

impl PriceLevel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an order at the back of the queue and add its remaining
    /// quantity to the running total.
    pub fn push(&mut self, handle: OrderHandle, remaining: U256) {
        self.orders.push_back(handle);
        self.total_remaining += remaining;
    }

    /// Remove the order with the given key, preserving FIFO order of the
    /// rest. The running total is not adjusted here; callers subtract the
    /// amount that actually left the level.
    pub fn remove(&mut self, key: &OrderKey) -> Option<OrderHandle> {
        let position = self
            .orders
            .iter()
            .position(|handle| handle.lock().key() == *key)?;
        self.orders.remove(position)
    }

    /// Subtract a filled or cancelled quantity from the running total.
    pub fn subtract(&mut self, amount: U256) {
        self.total_remaining = self.total_remaining.saturating_sub(amount);
    }

    /// The oldest order at this level that is still active.
    pub fn oldest_active(&self) -> Option<OrderHandle> {
        self.orders
            .iter()
            .find(|handle| handle.lock().is_active())
            .cloned()
    }

    /// Whether any order at this level is part of an in-flight settlement.
    pub fn has_pending(&self) -> bool {
        self.orders.iter().any(|handle| handle.lock().is_pending())
    }

    /// Sum of remaining quantity and count over active orders only.
    pub fn active_totals(&self) -> (U256, usize) {
        let mut total = U256::ZERO;
        let mut count = 0;
        for handle in &self.orders {
            let order = handle.lock();
            if order.is_active() {
                total += order.remaining_in();
                count += 1;
            }
        }
        (total, count)
    }

    pub fn iter(&self) -> impl Iterator<Item = &OrderHandle> {
        self.orders.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn total_remaining(&self) -> U256 {
        self.total_remaining
    }
}
