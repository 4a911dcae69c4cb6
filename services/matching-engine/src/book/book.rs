//! Per-pair order book
//!
//! One `Book` exists per canonical trading pair. Both sides, the last
//! traded price and the FIFO levels live behind a single reader/writer
//! lock; writers are order insertion, cancellation, the direct matcher
//! and settlement commits, readers are snapshots, market-price queries
//! and the ring collector.

use alloy_primitives::{Address, U256};
use parking_lot::Mutex;
use ringbook_types::errors::OrderError;
use ringbook_types::ids::{OrderKey, TradingPair};
use ringbook_types::numeric::{ask_limit_price, bid_limit_price, mid_price, to_display, u256_dec, u256_dec_opt};
use ringbook_types::order::{Order, OrderStatus, Side};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

use super::ask_book::AskBook;
use super::bid_book::BidBook;
use super::price_level::{OrderHandle, PriceLevel};
use crate::events::BookSnapshot;

/// Both sides of a book plus the last traded price.
///
/// `last_price` is only ever written by a confirmed settlement commit.
#[derive(Default)]
pub struct BookSides {
    pub bids: BidBook,
    pub asks: AskBook,
    pub last_price: U256,
}

impl BookSides {
    pub fn level_mut(&mut self, side: Side, price: &U256) -> Option<&mut PriceLevel> {
        match side {
            Side::Bid => self.bids.level_mut(price),
            Side::Ask => self.asks.level_mut(price),
        }
    }

    pub fn drop_level_if_empty(&mut self, side: Side, price: &U256) {
        match side {
            Side::Bid => self.bids.drop_level_if_empty(price),
            Side::Ask => self.asks.drop_level_if_empty(price),
        }
    }
}

/// Current market prices of a pair, all scaled by `PRICE_FACTOR`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarketPrice {
    #[serde(with = "u256_dec_opt")]
    pub best_bid: Option<U256>,
    #[serde(with = "u256_dec_opt")]
    pub best_ask: Option<U256>,
    #[serde(with = "u256_dec_opt")]
    pub mid: Option<U256>,
    #[serde(with = "u256_dec_opt")]
    pub spread: Option<U256>,
    /// Zero until the first confirmed trade.
    #[serde(with = "u256_dec")]
    pub last: U256,
}

/// Float projection of a `MarketPrice` for display surfaces.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarketPriceDisplay {
    pub best_bid: Option<f64>,
    pub best_ask: Option<f64>,
    pub mid: Option<f64>,
    pub spread: Option<f64>,
    pub last: f64,
}

impl MarketPrice {
    pub fn to_display(&self) -> MarketPriceDisplay {
        MarketPriceDisplay {
            best_bid: self.best_bid.map(to_display),
            best_ask: self.best_ask.map(to_display),
            mid: self.mid.map(to_display),
            spread: self.spread.map(to_display),
            last: to_display(self.last),
        }
    }
}

/// Order book for one canonical trading pair.
pub struct Book {
    pair: TradingPair,
    state: Arc<RwLock<BookSides>>,
}

impl Book {
    pub fn new(pair: TradingPair) -> Self {
        Self {
            pair,
            state: Arc::new(RwLock::new(BookSides::default())),
        }
    }

    pub fn pair(&self) -> &TradingPair {
        &self.pair
    }

    /// Shared handle to the locked book state, for callers that must hold
    /// several book locks at once (ring execution).
    pub(crate) fn shared_state(&self) -> Arc<RwLock<BookSides>> {
        Arc::clone(&self.state)
    }

    pub(crate) fn state(&self) -> &RwLock<BookSides> {
        &self.state
    }

    /// Insert an order into this book.
    ///
    /// Resolves the side from the order's token direction relative to the
    /// canonical pair, derives the limit price by integer floor division,
    /// and appends to the FIFO level at that price.
    pub async fn insert(&self, mut order: Order) -> Result<OrderHandle, OrderError> {
        order.validate_amounts()?;

        let (side, price) = if order.symbol_in == self.pair.base
            && order.symbol_out == self.pair.quote
        {
            (Side::Ask, ask_limit_price(order.amt_in, order.amt_out))
        } else if order.symbol_in == self.pair.quote && order.symbol_out == self.pair.base {
            (Side::Bid, bid_limit_price(order.amt_in, order.amt_out))
        } else {
            return Err(OrderError::TokenMismatch {
                pair: self.pair.key(),
            });
        };

        order.limit_price = Some(price);
        let remaining = order.remaining_in();

        info!(
            order = %order.key(),
            pair = %self.pair,
            ?side,
            price = to_display(price),
            amt_in = %order.amt_in,
            amt_out = %order.amt_out,
            remaining = %remaining,
            "order added"
        );

        let handle: OrderHandle = Arc::new(Mutex::new(order));
        let mut sides = self.state.write().await;
        match side {
            Side::Bid => sides.bids.insert(price, Arc::clone(&handle), remaining),
            Side::Ask => sides.asks.insert(price, Arc::clone(&handle), remaining),
        }
        Ok(handle)
    }

    /// Cancel the order `(creator, nonce)` resting at `limit_price`.
    ///
    /// Searches both sides at that price. Returns a snapshot of the
    /// cancelled order for history, or `None` (with a warning) when no
    /// such order rests there.
    pub async fn cancel(
        &self,
        creator: Address,
        nonce: U256,
        limit_price: U256,
    ) -> Option<Order> {
        let key = OrderKey::new(creator, nonce);
        let mut sides = self.state.write().await;

        let found = [Side::Bid, Side::Ask].into_iter().find_map(|side| {
            let level = sides.level_mut(side, &limit_price)?;
            let handle = level
                .iter()
                .find(|handle| handle.lock().key() == key)
                .cloned()?;
            Some((side, handle))
        });

        let Some((side, handle)) = found else {
            warn!(order = %key, pair = %self.pair, price = %limit_price, "cancel: order not found at price level");
            return None;
        };

        let snapshot = {
            let mut order = handle.lock();
            order.status = OrderStatus::Cancelled;
            order.clone()
        };
        let remaining = snapshot.remaining_in();

        if let Some(level) = sides.level_mut(side, &limit_price) {
            level.remove(&key);
            level.subtract(remaining);
        }
        sides.drop_level_if_empty(side, &limit_price);

        info!(
            order = %key,
            pair = %self.pair,
            filled = %snapshot.filled_amt_in,
            total = %snapshot.amt_in,
            "order cancelled"
        );
        Some(snapshot)
    }

    /// Snapshot of all levels holding active orders, with per-order
    /// derived remaining quantities.
    pub async fn snapshot(&self) -> BookSnapshot {
        let sides = self.state.read().await;
        BookSnapshot {
            pair: self.pair.key(),
            base: self.pair.base.clone(),
            quote: self.pair.quote.clone(),
            last_price: sides.last_price,
            bids: sides.bids.active_snapshot(),
            asks: sides.asks.active_snapshot(),
        }
    }

    /// Top-N levels per side using the level running totals.
    pub async fn depth_snapshot(&self, depth: usize) -> BookSnapshot {
        let sides = self.state.read().await;
        BookSnapshot {
            pair: self.pair.key(),
            base: self.pair.base.clone(),
            quote: self.pair.quote.clone(),
            last_price: sides.last_price,
            bids: sides.bids.depth_snapshot(depth),
            asks: sides.asks.depth_snapshot(depth),
        }
    }

    /// Best bid/ask, mid, spread and last traded price.
    pub async fn market_price(&self) -> MarketPrice {
        let sides = self.state.read().await;
        let best_bid = sides.bids.best_price();
        let best_ask = sides.asks.best_price();
        let (mid, spread) = match (best_bid, best_ask) {
            (Some(bid), Some(ask)) => {
                (Some(mid_price(bid, ask)), Some(ask.saturating_sub(bid)))
            }
            _ => (None, None),
        };
        MarketPrice {
            best_bid,
            best_ask,
            mid,
            spread,
            last: sides.last_price,
        }
    }

    pub async fn last_price(&self) -> U256 {
        self.state.read().await.last_price
    }
}
