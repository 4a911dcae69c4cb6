//! Settlement coordination
//!
//! Wraps the on-chain settlement collaborator. Participants are marked
//! pending before submission, the submission itself happens outside any
//! book lock, and an independent task awaits the receipt and re-acquires
//! the book lock(s) to commit or revert. Per book at most one settlement
//! is ever in flight (the direct matcher's pending gate); across books
//! rings may interleave, but never share an order, because every
//! participant is pending before submission and all matcher paths skip
//! non-active orders.

use alloy_primitives::{B256, U256};
use async_trait::async_trait;
use ringbook_types::errors::{EngineError, RingError, SettlementError};
use ringbook_types::numeric::to_display;
use ringbook_types::order::{Order, OrderStatus, Side};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::OwnedRwLockWriteGuard;
use tracing::{error, info, warn};

use crate::book::{Book, BookSides, OrderHandle};
use crate::events::{BookEvent, BookEventKind, UserEventKind};
use crate::matching::direct::PreparedMatch;
use crate::matching::ring::PreparedRing;
use crate::store::OrderBookStore;

/// Opaque identifier of a submitted settlement transaction.
pub type TxHandle = B256;

/// Terminal outcome of a settlement transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Receipt {
    Confirmed,
    Reverted,
    Error(String),
}

/// On-chain settlement submission contract.
///
/// `submit_match` carries both orders with their signatures;
/// ring trades are trusted and need no signature re-verification.
/// `await_receipt` must eventually resolve; the coordinator has no
/// timeout of its own.
#[async_trait]
pub trait Settlement: Send + Sync {
    async fn submit_match(
        &self,
        ask: Order,
        bid: Order,
        base_fill: U256,
    ) -> Result<TxHandle, SettlementError>;

    async fn submit_ring(
        &self,
        orders: Vec<Order>,
        fills: Vec<U256>,
    ) -> Result<TxHandle, SettlementError>;

    async fn await_receipt(&self, tx: TxHandle) -> Receipt;
}

impl OrderBookStore {
    /// Submit a prepared direct match and spawn its confirmation waiter.
    ///
    /// On immediate submission error both participants return to active
    /// and the tick moves on.
    pub(crate) async fn settle_match(self: &Arc<Self>, book: Arc<Book>, prepared: PreparedMatch) {
        let ask_snapshot = prepared.ask.lock().clone();
        let bid_snapshot = prepared.bid.lock().clone();

        match self
            .settlement
            .submit_match(ask_snapshot.clone(), bid_snapshot.clone(), prepared.base_qty)
            .await
        {
            Err(err) => {
                warn!(%err, "match submission failed, reverting participants");
                prepared.ask.lock().status = OrderStatus::Active;
                prepared.bid.lock().status = OrderStatus::Active;
            }
            Ok(tx) => {
                info!(
                    tx = %tx,
                    ask = %ask_snapshot.key(),
                    bid = %bid_snapshot.key(),
                    base = %prepared.base_qty,
                    "match submitted"
                );
                self.notify_order(&ask_snapshot, UserEventKind::TransactionChange);
                self.notify_order(&bid_snapshot, UserEventKind::TransactionChange);

                let store = Arc::clone(self);
                tokio::spawn(async move {
                    store.finish_match(book, prepared, tx).await;
                });
            }
        }
    }

    async fn finish_match(self: Arc<Self>, book: Arc<Book>, prepared: PreparedMatch, tx: TxHandle) {
        match self.settlement.await_receipt(tx).await {
            Receipt::Confirmed => self.commit_match(book, prepared, tx).await,
            receipt => {
                warn!(tx = %tx, ?receipt, "match settlement failed, reverting participants");
                prepared.ask.lock().status = OrderStatus::Active;
                prepared.bid.lock().status = OrderStatus::Active;
                self.notify_order_handle(&prepared.ask, UserEventKind::TransactionChange);
                self.notify_order_handle(&prepared.bid, UserEventKind::TransactionChange);
            }
        }
    }

    async fn commit_match(&self, book: Arc<Book>, prepared: PreparedMatch, tx: TxHandle) {
        let mut history = Vec::new();
        let mut children = Vec::new();
        {
            let mut sides = book.state().write().await;
            // A confirmed pairwise trade defines the pair's last price
            sides.last_price = prepared.exec_price;
            commit_leg(
                &mut sides,
                Side::Bid,
                prepared.bid_price,
                &prepared.bid,
                prepared.quote_qty,
                tx,
                &mut history,
                &mut children,
            );
            commit_leg(
                &mut sides,
                Side::Ask,
                prepared.ask_price,
                &prepared.ask,
                prepared.base_qty,
                tx,
                &mut history,
                &mut children,
            );
        }

        info!(
            tx = %tx,
            pair = %book.pair(),
            price = to_display(prepared.exec_price),
            base = %prepared.base_qty,
            quote = %prepared.quote_qty,
            "match confirmed"
        );

        self.append_history(history).await;

        let snapshot = book.snapshot().await;
        self.notifier.notify_book(BookEvent {
            pair: book.pair().key(),
            event: BookEventKind::BookUpdated,
            data: snapshot,
        });
        self.notify_order_handle(&prepared.ask, UserEventKind::TransactionChange);
        self.notify_order_handle(&prepared.bid, UserEventKind::TransactionChange);

        for (child, parent_id) in children {
            if let Err(err) = self.store_conditional_child(child, parent_id).await {
                warn!(%err, "failed to store conditional child order");
            }
        }

        // The fresh last price may mature stop orders watching this pair
        self.check_price_triggers_for_book(book.pair(), prepared.exec_price)
            .await;
    }

    /// Re-validate, mark pending and submit a priced ring, spawning its
    /// confirmation waiter.
    pub(crate) async fn settle_ring(self: &Arc<Self>, ring: PreparedRing) -> Result<(), EngineError> {
        let books = ring_books(&ring);
        {
            let _guards = lock_books(&books).await;

            // Legs were collected without locks; anything may have traded
            // since. A stale leg drops the whole ring.
            for leg in &ring.legs {
                let order = leg.entry.order.lock();
                if !order.is_active() || order.remaining_in() < leg.fill {
                    return Err(RingError::StaleLeg {
                        key: order.key().to_string(),
                    }
                    .into());
                }
            }
            for leg in &ring.legs {
                leg.entry.order.lock().status = OrderStatus::Pending;
            }
        }

        let orders: Vec<Order> = ring
            .legs
            .iter()
            .map(|leg| leg.entry.order.lock().clone())
            .collect();
        let fills: Vec<U256> = ring.legs.iter().map(|leg| leg.fill).collect();

        info!(path = %ring.path_string(), legs = ring.legs.len(), "submitting ring trade");

        match self.settlement.submit_ring(orders.clone(), fills).await {
            Err(err) => {
                warn!(%err, "ring submission failed, reverting participants");
                for leg in &ring.legs {
                    leg.entry.order.lock().status = OrderStatus::Active;
                }
                Err(err.into())
            }
            Ok(tx) => {
                info!(tx = %tx, "ring trade submitted");
                for order in &orders {
                    self.notify_order(order, UserEventKind::TransactionChange);
                }
                let store = Arc::clone(self);
                tokio::spawn(async move {
                    store.finish_ring(ring, tx).await;
                });
                Ok(())
            }
        }
    }

    async fn finish_ring(self: Arc<Self>, ring: PreparedRing, tx: TxHandle) {
        match self.settlement.await_receipt(tx).await {
            Receipt::Confirmed => self.commit_ring(ring, tx).await,
            receipt => {
                warn!(tx = %tx, ?receipt, "ring settlement failed, reverting participants");
                for leg in &ring.legs {
                    leg.entry.order.lock().status = OrderStatus::Active;
                    self.notify_order_handle(&leg.entry.order, UserEventKind::TransactionChange);
                }
            }
        }
    }

    async fn commit_ring(&self, ring: PreparedRing, tx: TxHandle) {
        let books = ring_books(&ring);
        let mut history = Vec::new();
        let mut children = Vec::new();
        {
            let mut guards = lock_books(&books).await;
            for leg in &ring.legs {
                let book_key = leg.entry.book.pair().key();
                let Some(sides) = guards.get_mut(&book_key) else {
                    error!(book = %book_key, "ring leg book missing on confirmation");
                    continue;
                };
                commit_leg(
                    sides,
                    leg.entry.side,
                    leg.entry.price,
                    &leg.entry.order,
                    leg.fill,
                    tx,
                    &mut history,
                    &mut children,
                );
            }
        }

        info!(tx = %tx, path = %ring.path_string(), "ring settlement confirmed");

        self.append_history(history).await;

        for (key, book) in &books {
            let snapshot = book.snapshot().await;
            self.notifier.notify_book(BookEvent {
                pair: key.clone(),
                event: BookEventKind::RingMatch,
                data: snapshot,
            });
        }
        for leg in &ring.legs {
            self.notify_order_handle(&leg.entry.order, UserEventKind::TransactionChange);
        }

        for (child, parent_id) in children {
            if let Err(err) = self.store_conditional_child(child, parent_id).await {
                warn!(%err, "failed to store conditional child order");
            }
        }
    }
}

/// Apply a confirmed fill share to one participant under its book's
/// writer lock: append the tx handle, advance the cumulative fill, shrink
/// the level total, then either retire the order (full fill) or return it
/// to active (partial), snapshotting history either way with the
/// transient status.
#[allow(clippy::too_many_arguments)]
fn commit_leg(
    sides: &mut BookSides,
    side: Side,
    price: U256,
    handle: &OrderHandle,
    share: U256,
    tx: TxHandle,
    history: &mut Vec<Order>,
    children: &mut Vec<(Order, String)>,
) {
    let mut order = handle.lock();
    order.tx_hashes.push(tx);
    order.filled_amt_in += share;

    match sides.level_mut(side, &price) {
        Some(level) => level.subtract(share),
        None => {
            let err = SettlementError::MissingParticipant {
                key: order.key().to_string(),
            };
            error!(%err, %price, "confirmation hit a missing price level");
        }
    }

    if order.remaining_in().is_zero() {
        order.status = OrderStatus::FilledSnapshot;
        history.push(order.clone());
        order.status = OrderStatus::FullyFilled;

        let key = order.key();
        if let Some(child) = order.conditional_child.take() {
            children.push((*child, key.to_string()));
        }
        drop(order);

        if let Some(level) = sides.level_mut(side, &price) {
            level.remove(&key);
        }
        sides.drop_level_if_empty(side, &price);
        info!(order = %key, "order fully filled");
    } else {
        order.status = OrderStatus::PartialSnapshot;
        history.push(order.clone());
        order.status = OrderStatus::Active;
        info!(
            order = %order.key(),
            filled = %order.filled_amt_in,
            total = %order.amt_in,
            "order partially filled"
        );
    }
}

/// Unique books touched by a ring, keyed (and therefore locked) in
/// canonical-pair order.
fn ring_books(ring: &PreparedRing) -> BTreeMap<String, Arc<Book>> {
    ring.legs
        .iter()
        .map(|leg| (leg.entry.book.pair().key(), Arc::clone(&leg.entry.book)))
        .collect()
}

/// Acquire writer locks for a set of books. The input map is ordered by
/// canonical pair key, which is the global lock order; every multi-book
/// path uses it, so rings can never deadlock each other.
async fn lock_books(
    books: &BTreeMap<String, Arc<Book>>,
) -> BTreeMap<String, OwnedRwLockWriteGuard<BookSides>> {
    let mut guards = BTreeMap::new();
    for (key, book) in books {
        guards.insert(key.clone(), book.shared_state().write_owned().await);
    }
    guards
}
