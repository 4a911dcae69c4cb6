//! Top-level order book store
//!
//! Owns every book, the conditional index and the fill history, and runs
//! the two tickers: the match ticker (direct matching on every book, then
//! ring-search rounds) and the conditional oracle. Lock order throughout
//! the engine is store, then book(s) in canonical-pair order, then the
//! conditional index; history is never appended while a book lock is
//! held.

use alloy_primitives::{Address, U256};
use parking_lot::RwLock as ConfigLock;
use ringbook_types::errors::{ConditionalError, OrderError};
use ringbook_types::ids::TradingPair;
use ringbook_types::order::Order;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::book::{Book, MarketPrice};
use crate::conditional::{ConditionalEntry, ConditionalStore};
use crate::config::Config;
use crate::events::{BookEvent, BookEventKind, BookSnapshot, Notifier, OrderSnapshot, UserEvent, UserEventKind};
use crate::matching::direct::match_book;
use crate::matching::ring::{collect_unmatched, find_ring_from, price_ring};
use crate::settlement::Settlement;

/// Owner of all books, the conditional index and the fill history.
pub struct OrderBookStore {
    books: RwLock<HashMap<String, Arc<Book>>>,
    conditional: ConditionalStore,
    history: RwLock<HashMap<Address, HashMap<String, Vec<Order>>>>,
    pub(crate) settlement: Arc<dyn Settlement>,
    pub(crate) notifier: Arc<dyn Notifier>,
    config: ConfigLock<Config>,
}

impl OrderBookStore {
    /// Create a store seeded with one book per unordered pair of the
    /// given symbols.
    pub fn new(
        settlement: Arc<dyn Settlement>,
        notifier: Arc<dyn Notifier>,
        symbols: &[&str],
        config: Config,
    ) -> Self {
        let mut books = HashMap::new();
        for (i, token_a) in symbols.iter().enumerate() {
            for token_b in &symbols[i + 1..] {
                let pair = TradingPair::canonical(token_a, token_b);
                books.insert(pair.key(), Arc::new(Book::new(pair)));
            }
        }

        info!(
            books = books.len(),
            ring_enabled = config.ring_enabled,
            max_ring_depth = config.max_ring_depth,
            "order book store initialized"
        );

        Self {
            books: RwLock::new(books),
            conditional: ConditionalStore::new(),
            history: RwLock::new(HashMap::new()),
            settlement,
            notifier,
            config: ConfigLock::new(config),
        }
    }

    pub(crate) fn conditional(&self) -> &ConditionalStore {
        &self.conditional
    }

    /// Idempotently create the book for a pair at runtime.
    pub async fn initialize_book(&self, token_a: &str, token_b: &str) {
        let pair = TradingPair::canonical(token_a, token_b);
        let key = pair.key();
        let mut books = self.books.write().await;
        if books.contains_key(&key) {
            info!(pair = %key, "book already initialized");
            return;
        }
        books.insert(key.clone(), Arc::new(Book::new(pair)));
        info!(pair = %key, "book initialized");
    }

    /// Look up the book for two tokens in either order.
    pub async fn book(&self, token_a: &str, token_b: &str) -> Option<Arc<Book>> {
        let key = TradingPair::canonical(token_a, token_b).key();
        self.books.read().await.get(&key).cloned()
    }

    /// All books in canonical-pair-key order; the global traversal and
    /// lock order.
    pub async fn sorted_books(&self) -> Vec<Arc<Book>> {
        let books = self.books.read().await;
        let mut sorted: Vec<(String, Arc<Book>)> = books
            .iter()
            .map(|(key, book)| (key.clone(), Arc::clone(book)))
            .collect();
        sorted.sort_by(|a, b| a.0.cmp(&b.0));
        sorted.into_iter().map(|(_, book)| book).collect()
    }

    /// Ingest a signature-verified order into its book.
    pub async fn insert_order(&self, order: Order) -> Result<(), OrderError> {
        order.validate_amounts()?;

        let pair = TradingPair::canonical(&order.symbol_in, &order.symbol_out);
        let Some(book) = self.book(&pair.base, &pair.quote).await else {
            warn!(pair = %pair, "order rejected: book not initialized");
            return Err(OrderError::UnknownPair { pair: pair.key() });
        };

        let handle = book.insert(order).await?;

        let snapshot = book.snapshot().await;
        self.notifier.notify_book(BookEvent {
            pair: pair.key(),
            event: BookEventKind::OrderAdded,
            data: snapshot,
        });
        self.notify_order_handle(&handle, UserEventKind::OrderAdd);
        Ok(())
    }

    /// Cancel the order `(creator, nonce)` resting at `limit_price` on
    /// the pair's book. A miss is a warned no-op.
    pub async fn cancel_order(
        &self,
        creator: Address,
        nonce: U256,
        limit_price: U256,
        token_a: &str,
        token_b: &str,
    ) {
        let Some(book) = self.book(token_a, token_b).await else {
            warn!(
                pair = %TradingPair::canonical(token_a, token_b),
                "cancel rejected: book not initialized"
            );
            return;
        };

        let Some(snapshot) = book.cancel(creator, nonce, limit_price).await else {
            return;
        };

        self.append_history(vec![snapshot.clone()]).await;

        let book_snapshot = book.snapshot().await;
        self.notifier.notify_book(BookEvent {
            pair: book.pair().key(),
            event: BookEventKind::OrderRemoved,
            data: book_snapshot,
        });
        self.notify_order(&snapshot, UserEventKind::OrderRemove);
    }

    /// Append deep-copied order snapshots to the per-creator history.
    ///
    /// Callers buffer snapshots under book locks and flush them here
    /// afterwards; the history lock is never nested inside a book lock.
    pub(crate) async fn append_history(&self, snapshots: Vec<Order>) {
        if snapshots.is_empty() {
            return;
        }
        let mut history = self.history.write().await;
        for snapshot in snapshots {
            history
                .entry(snapshot.creator)
                .or_default()
                .entry(snapshot.nonce.to_string())
                .or_default()
                .push(snapshot);
        }
    }

    /// Every recorded snapshot of one order, oldest first.
    pub async fn order_history(&self, creator: Address, nonce: U256) -> Vec<Order> {
        self.history
            .read()
            .await
            .get(&creator)
            .and_then(|by_nonce| by_nonce.get(&nonce.to_string()))
            .cloned()
            .unwrap_or_default()
    }

    /// All recorded snapshots for a creator, keyed by nonce.
    pub async fn history_for_creator(&self, creator: Address) -> HashMap<String, Vec<Order>> {
        self.history
            .read()
            .await
            .get(&creator)
            .cloned()
            .unwrap_or_default()
    }

    /// Snapshots of every live order a creator has resting, across all
    /// books.
    pub async fn orders_by_creator(&self, creator: Address) -> Vec<Order> {
        let mut orders = Vec::new();
        for book in self.sorted_books().await {
            orders.extend(Self::orders_in_book(&book, creator).await);
        }
        orders
    }

    /// Snapshots of a creator's live orders in one book.
    pub async fn orders_by_creator_in_book(
        &self,
        creator: Address,
        token_a: &str,
        token_b: &str,
    ) -> Result<Vec<Order>, OrderError> {
        let pair = TradingPair::canonical(token_a, token_b);
        let book = self
            .book(&pair.base, &pair.quote)
            .await
            .ok_or(OrderError::UnknownPair { pair: pair.key() })?;
        Ok(Self::orders_in_book(&book, creator).await)
    }

    async fn orders_in_book(book: &Arc<Book>, creator: Address) -> Vec<Order> {
        let sides = book.state().read().await;
        let mut orders = Vec::new();
        for (_, level) in sides.bids.levels() {
            for handle in level.iter() {
                let order = handle.lock();
                if order.creator == creator {
                    orders.push(order.clone());
                }
            }
        }
        for (_, level) in sides.asks.levels() {
            for handle in level.iter() {
                let order = handle.lock();
                if order.creator == creator {
                    orders.push(order.clone());
                }
            }
        }
        orders
    }

    /// Best bid/ask, mid, spread and last price for a pair.
    pub async fn market_price(
        &self,
        token_a: &str,
        token_b: &str,
    ) -> Result<MarketPrice, OrderError> {
        let pair = TradingPair::canonical(token_a, token_b);
        let book = self
            .book(&pair.base, &pair.quote)
            .await
            .ok_or(OrderError::UnknownPair { pair: pair.key() })?;
        Ok(book.market_price().await)
    }

    /// Top-N levels per side of a pair's book.
    pub async fn book_snapshot(
        &self,
        token_a: &str,
        token_b: &str,
        depth: usize,
    ) -> Result<BookSnapshot, OrderError> {
        let pair = TradingPair::canonical(token_a, token_b);
        let book = self
            .book(&pair.base, &pair.quote)
            .await
            .ok_or(OrderError::UnknownPair { pair: pair.key() })?;
        Ok(book.depth_snapshot(depth).await)
    }

    pub fn set_ring_enabled(&self, enabled: bool) {
        self.config.write().ring_enabled = enabled;
        info!(enabled, "ring matching toggled");
    }

    pub fn set_max_ring_depth(&self, depth: usize) {
        self.config.write().max_ring_depth = depth;
        info!(depth, "max ring depth set");
    }

    pub fn config(&self) -> Config {
        self.config.read().clone()
    }

    /// Number of conditional orders awaiting their trigger.
    pub async fn conditional_count(&self) -> usize {
        self.conditional.count().await
    }

    pub async fn conditional_entries(&self) -> Vec<ConditionalEntry> {
        self.conditional.all().await
    }

    pub async fn conditional_by_creator(&self, creator: Address) -> Vec<ConditionalEntry> {
        self.conditional.by_creator(creator).await
    }

    /// Manually cancel a stored conditional order.
    pub async fn remove_conditional(
        &self,
        creator: Address,
        nonce: U256,
    ) -> Result<ConditionalEntry, ConditionalError> {
        self.conditional.remove(creator, nonce).await
    }

    /// One full matching pass: direct matching on every book, then ring
    /// rounds until no ring is found or the round cap is hit.
    ///
    /// Errors are local to a single match or ring; no book's failure
    /// stops another's.
    pub async fn match_all_books(self: &Arc<Self>) {
        let books = self.sorted_books().await;
        let (ring_enabled, max_depth, dust, round_cap) = {
            let config = self.config.read();
            (
                config.ring_enabled,
                config.max_ring_depth,
                config.dust(),
                config.ring_round_cap,
            )
        };

        // Phase 1: direct matching within each book. The matcher prepares
        // at most one pending match under the book lock; submission
        // happens after it is released.
        for book in &books {
            let prepared = {
                let mut sides = book.state().write().await;
                match_book(&mut sides, dust)
            };
            if let Some(prepared) = prepared {
                self.settle_match(Arc::clone(book), prepared).await;
            }
        }

        if !ring_enabled {
            return;
        }

        // Phase 2: ring rounds. Each round re-collects unmatched orders
        // (legs pending from earlier submissions drop out) and executes
        // at most one ring.
        for round in 1..=round_cap {
            let entries = collect_unmatched(&books).await;
            if entries.is_empty() {
                break;
            }

            let mut executed = false;
            for start in 0..entries.len() {
                let Some(path) = find_ring_from(&entries, start, max_depth) else {
                    continue;
                };
                let Some(ring) = price_ring(&entries, &path) else {
                    continue;
                };
                info!(path = %ring.path_string(), round, "ring found");
                match self.settle_ring(ring).await {
                    Ok(()) => {
                        executed = true;
                        break;
                    }
                    Err(err) => {
                        warn!(%err, "ring execution failed, trying next start");
                    }
                }
            }

            if !executed {
                break;
            }
            if round == round_cap {
                warn!(round_cap, "ring matching round cap reached");
            }
        }
    }

    /// Spawn the match ticker. It stops when the token is cancelled;
    /// in-flight confirmation tasks always run to completion.
    pub fn start_matching(self: &Arc<Self>, shutdown: CancellationToken) {
        let store = Arc::clone(self);
        let interval = self.config.read().match_interval();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            info!("match ticker started");
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        info!("match ticker stopped");
                        return;
                    }
                    _ = ticker.tick() => {
                        store.match_all_books().await;
                    }
                }
            }
        });
    }

    /// Spawn the conditional oracle ticker.
    pub fn start_oracle(self: &Arc<Self>, shutdown: CancellationToken) {
        let store = Arc::clone(self);
        let interval = self.config.read().oracle_interval();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            info!("conditional oracle started");
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        info!("conditional oracle stopped");
                        return;
                    }
                    _ = ticker.tick() => {
                        store.oracle_tick().await;
                    }
                }
            }
        });
    }

    pub(crate) fn notify_order(&self, order: &Order, event: UserEventKind) {
        self.notifier.notify_user(UserEvent {
            creator: order.creator,
            event,
            order: OrderSnapshot::from_order(order),
        });
    }

    pub(crate) fn notify_order_handle(
        &self,
        handle: &crate::book::OrderHandle,
        event: UserEventKind,
    ) {
        let order = handle.lock();
        self.notifier.notify_user(UserEvent {
            creator: order.creator,
            event,
            order: OrderSnapshot::from_order(&order),
        });
    }
}
