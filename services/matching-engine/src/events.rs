//! Broadcast events and snapshot serializers
//!
//! The engine pushes book-level and per-user updates to the edge through
//! the `Notifier` seam. Delivery is fire-and-forget with bounded
//! buffering; lagging subscribers lose messages rather than stalling the
//! engine. Every exposed entity has one explicit serializer here — no
//! reflection over internal state.

use alloy_primitives::{Address, B256, U256};
use ringbook_types::numeric::{to_display, u256_dec, u256_dec_opt};
use ringbook_types::order::{Order, OrderStatus};
use serde::Serialize;
use tokio::sync::broadcast;

/// Default capacity of the broadcast channels.
const CHANNEL_CAPACITY: usize = 256;

/// Book-level event labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BookEventKind {
    #[serde(rename = "Add")]
    OrderAdded,
    #[serde(rename = "Remove")]
    OrderRemoved,
    #[serde(rename = "orderbook_update")]
    BookUpdated,
    #[serde(rename = "RingMatch")]
    RingMatch,
}

/// Per-user event labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UserEventKind {
    OrderAdd,
    OrderRemove,
    TransactionChange,
}

/// One price level of a book snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LevelSnapshot {
    /// Scaled integer price, serialized as a decimal string.
    #[serde(with = "u256_dec")]
    pub price: U256,
    /// Float projection of the price for display.
    pub price_display: f64,
    /// Total remaining quantity across counted orders, in the orders' own
    /// amt-in currency.
    #[serde(with = "u256_dec")]
    pub total_remaining: U256,
    pub order_count: usize,
}

impl LevelSnapshot {
    pub fn new(price: U256, total_remaining: U256, order_count: usize) -> Self {
        Self {
            price,
            price_display: to_display(price),
            total_remaining,
            order_count,
        }
    }
}

/// Snapshot of one book, bids best-first and asks best-first.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BookSnapshot {
    pub pair: String,
    pub base: String,
    pub quote: String,
    #[serde(with = "u256_dec")]
    pub last_price: U256,
    pub bids: Vec<LevelSnapshot>,
    pub asks: Vec<LevelSnapshot>,
}

/// Snapshot of a single order for per-user broadcasts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderSnapshot {
    pub creator: Address,
    pub symbol_in: String,
    pub symbol_out: String,
    #[serde(with = "u256_dec")]
    pub amt_in: U256,
    #[serde(with = "u256_dec")]
    pub amt_out: U256,
    #[serde(with = "u256_dec")]
    pub nonce: U256,
    #[serde(with = "u256_dec_opt")]
    pub limit_price: Option<U256>,
    #[serde(with = "u256_dec_opt")]
    pub trigger_price: Option<U256>,
    #[serde(with = "u256_dec")]
    pub filled_amt_in: U256,
    pub status: OrderStatus,
    pub state_id: u8,
    pub tx_hashes: Vec<B256>,
}

impl OrderSnapshot {
    pub fn from_order(order: &Order) -> Self {
        Self {
            creator: order.creator,
            symbol_in: order.symbol_in.clone(),
            symbol_out: order.symbol_out.clone(),
            amt_in: order.amt_in,
            amt_out: order.amt_out,
            nonce: order.nonce,
            limit_price: order.limit_price,
            trigger_price: order.trigger_price,
            filled_amt_in: order.filled_amt_in,
            status: order.status,
            state_id: order.status.state_id(),
            tx_hashes: order.tx_hashes.clone(),
        }
    }
}

/// A book update pushed to subscribers of a pair.
#[derive(Debug, Clone, Serialize)]
pub struct BookEvent {
    pub pair: String,
    pub event: BookEventKind,
    pub data: BookSnapshot,
}

/// An order update pushed to its creator.
#[derive(Debug, Clone, Serialize)]
pub struct UserEvent {
    pub creator: Address,
    pub event: UserEventKind,
    pub order: OrderSnapshot,
}

/// Fire-and-forget broadcast seam toward the edge.
///
/// Implementations must never block the caller; dropping events under
/// load is permitted.
pub trait Notifier: Send + Sync {
    fn notify_book(&self, event: BookEvent);
    fn notify_user(&self, event: UserEvent);
}

/// Broadcast-channel notifier.
///
/// Subscribers that fall behind the channel capacity observe a lag error
/// and miss messages; the engine is never back-pressured.
pub struct ChannelNotifier {
    books: broadcast::Sender<BookEvent>,
    users: broadcast::Sender<UserEvent>,
}

impl ChannelNotifier {
    pub fn new() -> Self {
        let (books, _) = broadcast::channel(CHANNEL_CAPACITY);
        let (users, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { books, users }
    }

    pub fn subscribe_books(&self) -> broadcast::Receiver<BookEvent> {
        self.books.subscribe()
    }

    pub fn subscribe_users(&self) -> broadcast::Receiver<UserEvent> {
        self.users.subscribe()
    }
}

impl Default for ChannelNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Notifier for ChannelNotifier {
    fn notify_book(&self, event: BookEvent) {
        // Send fails only when no subscriber exists; either way the
        // engine moves on.
        let _ = self.books.send(event);
    }

    fn notify_user(&self, event: UserEvent) {
        let _ = self.users.send(event);
    }
}

/// Notifier that discards everything.
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn notify_book(&self, _event: BookEvent) {}
    fn notify_user(&self, _event: UserEvent) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::Bytes;
    use ringbook_types::numeric::PRICE_FACTOR;

    fn sample_order() -> Order {
        Order::new(
            Address::repeat_byte(0x22),
            "BBB",
            "AAA",
            U256::from(200),
            U256::from(100),
            U256::from(3),
            Bytes::new(),
        )
    }

    #[test]
    fn test_order_snapshot_fields() {
        let mut order = sample_order();
        order.limit_price = Some(PRICE_FACTOR * U256::from(2));
        order.filled_amt_in = U256::from(50);

        let snapshot = OrderSnapshot::from_order(&order);
        assert_eq!(snapshot.creator, order.creator);
        assert_eq!(snapshot.filled_amt_in, U256::from(50));
        assert_eq!(snapshot.state_id, 0);
    }

    #[test]
    fn test_snapshot_serializes_amounts_as_strings() {
        let snapshot = OrderSnapshot::from_order(&sample_order());
        let json = serde_json::to_string(&snapshot).unwrap();
        assert!(json.contains("\"amt_in\":\"200\""));
        assert!(json.contains("\"status\":\"ACTIVE\""));
    }

    #[test]
    fn test_level_snapshot_display_price() {
        let level = LevelSnapshot::new(
            PRICE_FACTOR * U256::from(3) / U256::from(2),
            U256::from(10),
            1,
        );
        assert!((level.price_display - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_book_event_kind_labels() {
        assert_eq!(
            serde_json::to_string(&BookEventKind::BookUpdated).unwrap(),
            "\"orderbook_update\""
        );
        assert_eq!(
            serde_json::to_string(&BookEventKind::RingMatch).unwrap(),
            "\"RingMatch\""
        );
    }

    #[test]
    fn test_channel_notifier_delivers() {
        let notifier = ChannelNotifier::new();
        let mut rx = notifier.subscribe_users();

        notifier.notify_user(UserEvent {
            creator: Address::repeat_byte(0x22),
            event: UserEventKind::OrderAdd,
            order: OrderSnapshot::from_order(&sample_order()),
        });

        let event = rx.try_recv().unwrap();
        assert_eq!(event.event, UserEventKind::OrderAdd);
    }

    #[test]
    fn test_channel_notifier_without_subscribers_does_not_panic() {
        let notifier = ChannelNotifier::new();
        notifier.notify_user(UserEvent {
            creator: Address::repeat_byte(0x22),
            event: UserEventKind::OrderRemove,
            order: OrderSnapshot::from_order(&sample_order()),
        });
    }
}
