//! Conditional (stop-limit) orders
//!
//! A parent order may carry a child that only enters its book once an
//! observed market price crosses the child's trigger. Children are
//! indexed here when the parent fully fills, and mature through two
//! paths with identical semantics: a periodic scan against the watched
//! pair's mid-price, and an edge trigger against a book's fresh last
//! price after every confirmed pairwise trade.

use alloy_primitives::{Address, U256};
use ringbook_types::errors::ConditionalError;
use ringbook_types::ids::TradingPair;
use ringbook_types::numeric::{invert_price, to_display};
use ringbook_types::order::Order;
use serde::Serialize;
use std::collections::HashMap;
use std::time::SystemTime;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::store::OrderBookStore;

/// Supported conditional order types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConditionalKind {
    #[serde(rename = "STOP_LIMIT")]
    StopLimit,
}

/// A stored conditional order with its trigger condition.
#[derive(Clone)]
pub struct ConditionalEntry {
    /// The child order to insert when the trigger fires.
    pub order: Order,
    /// `"creator-nonce"` of the fully filled parent.
    pub parent_id: String,
    pub kind: ConditionalKind,
    pub trigger_price: U256,
    /// Watched pair direction; prices are compared in this orientation.
    pub trigger_symbol_in: String,
    pub trigger_symbol_out: String,
    /// True fires on `price >= trigger`, false on `price <= trigger`.
    pub trigger_above: bool,
    pub created_at: SystemTime,
}

impl ConditionalEntry {
    /// Canonical form of the watched pair.
    pub fn watched_pair(&self) -> TradingPair {
        TradingPair::canonical(&self.trigger_symbol_in, &self.trigger_symbol_out)
    }

    /// Express an observed canonical-book price in the entry's watched
    /// direction: identical when the directions agree, integer-inverted
    /// when reversed, `None` when the book is not the watched pair.
    pub fn price_to_check(&self, book_pair: &TradingPair, observed: U256) -> Option<U256> {
        if observed.is_zero() {
            return None;
        }
        if self.trigger_symbol_in == book_pair.base && self.trigger_symbol_out == book_pair.quote {
            Some(observed)
        } else if self.trigger_symbol_in == book_pair.quote
            && self.trigger_symbol_out == book_pair.base
        {
            Some(invert_price(observed))
        } else {
            None
        }
    }

    /// Whether a price in the watched direction crosses the trigger.
    pub fn should_fire(&self, price: U256) -> bool {
        if self.trigger_above {
            price >= self.trigger_price
        } else {
            price <= self.trigger_price
        }
    }
}

/// Index of conditional orders awaiting their trigger, keyed by the
/// child's `"creator-nonce"`.
#[derive(Default)]
pub struct ConditionalStore {
    entries: RwLock<HashMap<String, ConditionalEntry>>,
}

impl ConditionalStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and index an entry.
    pub async fn add(&self, entry: ConditionalEntry) -> Result<(), ConditionalError> {
        let order = &entry.order;
        if order.symbol_in.is_empty() || order.symbol_out.is_empty() {
            return Err(ConditionalError::MissingSymbols);
        }
        if order.amt_in.is_zero() || order.amt_out.is_zero() {
            return Err(ConditionalError::InvalidAmounts);
        }
        if entry.trigger_price.is_zero() {
            return Err(ConditionalError::InvalidTriggerPrice);
        }

        let key = order.key().to_string();
        let mut entries = self.entries.write().await;
        if entries.contains_key(&key) {
            return Err(ConditionalError::AlreadyExists { key });
        }

        info!(
            order = %key,
            parent = %entry.parent_id,
            kind = ?entry.kind,
            watched = %entry.watched_pair(),
            trigger = to_display(entry.trigger_price),
            above = entry.trigger_above,
            "conditional order stored"
        );
        entries.insert(key, entry);
        Ok(())
    }

    /// Remove an entry, e.g. on manual cancellation.
    pub async fn remove(
        &self,
        creator: Address,
        nonce: U256,
    ) -> Result<ConditionalEntry, ConditionalError> {
        let key = ringbook_types::ids::OrderKey::new(creator, nonce).to_string();
        let mut entries = self.entries.write().await;
        entries
            .remove(&key)
            .ok_or(ConditionalError::NotFound { key })
    }

    /// Atomically claim an entry for firing; `None` when a concurrent
    /// path already fired it.
    pub(crate) async fn take(&self, key: &str) -> Option<ConditionalEntry> {
        self.entries.write().await.remove(key)
    }

    /// Put a claimed entry back for retry on the next tick.
    pub(crate) async fn restore(&self, key: String, entry: ConditionalEntry) {
        self.entries.write().await.insert(key, entry);
    }

    pub async fn get(&self, creator: Address, nonce: U256) -> Option<ConditionalEntry> {
        let key = ringbook_types::ids::OrderKey::new(creator, nonce).to_string();
        self.entries.read().await.get(&key).cloned()
    }

    pub async fn all(&self) -> Vec<ConditionalEntry> {
        self.entries.read().await.values().cloned().collect()
    }

    pub async fn by_creator(&self, creator: Address) -> Vec<ConditionalEntry> {
        self.entries
            .read()
            .await
            .values()
            .filter(|entry| entry.order.creator == creator)
            .cloned()
            .collect()
    }

    pub async fn count(&self) -> usize {
        self.entries.read().await.len()
    }
}

impl OrderBookStore {
    /// Index a fully filled parent's child order.
    ///
    /// The trigger direction follows the child's own orientation: a child
    /// selling base stops on a falling price, a child buying base stops
    /// on a rising one. Grandchildren are stripped; conditionals do not
    /// chain.
    pub(crate) async fn store_conditional_child(
        &self,
        mut child: Order,
        parent_id: String,
    ) -> Result<(), ConditionalError> {
        if child.conditional_child.take().is_some() {
            warn!(order = %child.key(), "stripping nested conditional from child order");
        }

        let trigger_price = child
            .trigger_price
            .filter(|price| !price.is_zero())
            .ok_or(ConditionalError::InvalidTriggerPrice)?;

        let pair = TradingPair::canonical(&child.symbol_in, &child.symbol_out);
        let trigger_above = if child.symbol_in == pair.base && child.symbol_out == pair.quote {
            // Ask-oriented child: stop-loss on a falling price
            false
        } else if child.symbol_in == pair.quote && child.symbol_out == pair.base {
            // Bid-oriented child: stop-loss on a rising price
            true
        } else {
            return Err(ConditionalError::UnknownPair);
        };

        let entry = ConditionalEntry {
            parent_id,
            kind: ConditionalKind::StopLimit,
            trigger_price,
            trigger_symbol_in: pair.base.clone(),
            trigger_symbol_out: pair.quote.clone(),
            trigger_above,
            created_at: SystemTime::now(),
            order: child,
        };
        self.conditional().add(entry).await
    }

    /// Periodic oracle pass: evaluate every entry against the current
    /// mid-price of its watched pair. Pairs without both sides quoted are
    /// skipped.
    pub async fn oracle_tick(&self) {
        let entries = self.conditional().all().await;
        if entries.is_empty() {
            return;
        }

        for entry in entries {
            let watched = entry.watched_pair();
            let Some(book) = self.book(&watched.base, &watched.quote).await else {
                continue;
            };
            let Some(mid) = book.market_price().await.mid else {
                continue;
            };
            let Some(price) = entry.price_to_check(book.pair(), mid) else {
                continue;
            };
            if entry.should_fire(price) {
                info!(
                    order = %entry.order.key(),
                    price = to_display(price),
                    trigger = to_display(entry.trigger_price),
                    above = entry.trigger_above,
                    "conditional order triggered by periodic scan"
                );
                self.fire_entry(&entry.order.key().to_string()).await;
            }
        }
    }

    /// Edge trigger: evaluate entries watching `pair` against its fresh
    /// last price.
    pub(crate) async fn check_price_triggers_for_book(
        &self,
        pair: &TradingPair,
        last_price: U256,
    ) {
        if last_price.is_zero() {
            return;
        }

        for entry in self.conditional().all().await {
            if entry.watched_pair() != *pair {
                continue;
            }
            let Some(price) = entry.price_to_check(pair, last_price) else {
                continue;
            };
            if entry.should_fire(price) {
                info!(
                    order = %entry.order.key(),
                    price = to_display(price),
                    trigger = to_display(entry.trigger_price),
                    above = entry.trigger_above,
                    "conditional order triggered by last price"
                );
                self.fire_entry(&entry.order.key().to_string()).await;
            }
        }
    }

    /// Move a matured entry into its book. Membership is re-checked
    /// atomically so concurrent trigger paths cannot double-fire; if
    /// insertion fails the entry is re-queued for the next tick.
    async fn fire_entry(&self, key: &str) {
        let Some(entry) = self.conditional().take(key).await else {
            return;
        };

        match self.insert_order(entry.order.clone()).await {
            Ok(()) => {
                info!(order = key, "conditional order added to book");
            }
            Err(err) => {
                warn!(order = key, %err, "failed to insert triggered conditional order, re-queueing");
                self.conditional().restore(key.to_string(), entry).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::Bytes;
    use ringbook_types::numeric::PRICE_FACTOR;

    fn child(give: &str, want: &str, trigger: U256) -> Order {
        let mut order = Order::new(
            Address::repeat_byte(5),
            give,
            want,
            U256::from(10),
            U256::from(10),
            U256::from(9),
            Bytes::new(),
        );
        order.trigger_price = Some(trigger);
        order
    }

    fn entry(give: &str, want: &str, trigger: U256, above: bool) -> ConditionalEntry {
        let pair = TradingPair::canonical(give, want);
        ConditionalEntry {
            order: child(give, want, trigger),
            parent_id: "parent".to_string(),
            kind: ConditionalKind::StopLimit,
            trigger_price: trigger,
            trigger_symbol_in: pair.base,
            trigger_symbol_out: pair.quote,
            trigger_above: above,
            created_at: SystemTime::now(),
        }
    }

    #[test]
    fn test_price_to_check_same_direction() {
        let two = PRICE_FACTOR * U256::from(2);
        let e = entry("AAA", "BBB", two, false);
        let pair = TradingPair::canonical("AAA", "BBB");
        assert_eq!(e.price_to_check(&pair, two), Some(two));
    }

    #[test]
    fn test_price_to_check_inverts_reversed_direction() {
        let two = PRICE_FACTOR * U256::from(2);
        let mut e = entry("AAA", "BBB", two, false);
        // Watch the reversed direction explicitly
        e.trigger_symbol_in = "BBB".to_string();
        e.trigger_symbol_out = "AAA".to_string();

        let pair = TradingPair::canonical("AAA", "BBB");
        assert_eq!(e.price_to_check(&pair, two), Some(PRICE_FACTOR / U256::from(2)));
    }

    #[test]
    fn test_price_to_check_foreign_pair() {
        let e = entry("AAA", "BBB", PRICE_FACTOR, false);
        let other = TradingPair::canonical("AAA", "CCC");
        assert_eq!(e.price_to_check(&other, PRICE_FACTOR), None);
    }

    #[test]
    fn test_should_fire_boundaries() {
        let two = PRICE_FACTOR * U256::from(2);

        let below = entry("AAA", "BBB", two, false);
        assert!(below.should_fire(two));
        assert!(below.should_fire(two - U256::from(1)));
        assert!(!below.should_fire(two + U256::from(1)));

        let above = entry("AAA", "BBB", two, true);
        assert!(above.should_fire(two));
        assert!(above.should_fire(two + U256::from(1)));
        assert!(!above.should_fire(two - U256::from(1)));
    }

    #[tokio::test]
    async fn test_store_validations() {
        let store = ConditionalStore::new();

        let mut bad = entry("AAA", "BBB", PRICE_FACTOR, false);
        bad.trigger_price = U256::ZERO;
        assert_eq!(
            store.add(bad).await.unwrap_err(),
            ConditionalError::InvalidTriggerPrice
        );

        let mut bad = entry("AAA", "BBB", PRICE_FACTOR, false);
        bad.order.amt_in = U256::ZERO;
        assert_eq!(
            store.add(bad).await.unwrap_err(),
            ConditionalError::InvalidAmounts
        );

        let good = entry("AAA", "BBB", PRICE_FACTOR, false);
        store.add(good.clone()).await.unwrap();
        assert_eq!(store.count().await, 1);

        // Duplicate key rejected
        assert!(matches!(
            store.add(good).await.unwrap_err(),
            ConditionalError::AlreadyExists { .. }
        ));
    }

    #[tokio::test]
    async fn test_store_take_and_restore() {
        let store = ConditionalStore::new();
        let e = entry("AAA", "BBB", PRICE_FACTOR, false);
        let key = e.order.key().to_string();
        store.add(e).await.unwrap();

        let taken = store.take(&key).await.unwrap();
        assert!(store.take(&key).await.is_none());

        store.restore(key.clone(), taken).await;
        assert_eq!(store.count().await, 1);
    }

    #[tokio::test]
    async fn test_store_queries_by_creator() {
        let store = ConditionalStore::new();
        store
            .add(entry("AAA", "BBB", PRICE_FACTOR, false))
            .await
            .unwrap();

        let mine = store.by_creator(Address::repeat_byte(5)).await;
        assert_eq!(mine.len(), 1);
        assert!(store.by_creator(Address::repeat_byte(6)).await.is_empty());

        let removed = store
            .remove(Address::repeat_byte(5), U256::from(9))
            .await
            .unwrap();
        assert_eq!(removed.order.nonce, U256::from(9));
        assert_eq!(store.count().await, 0);
    }
}
