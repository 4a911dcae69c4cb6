//! Ringbook matching engine
//!
//! The off-chain matching core of a token-swap DEX. Signed orders rest in
//! price-time priority books; a direct matcher pairs crossing bids and
//! asks with integer-exact fill math, a ring finder discovers closed
//! multi-hop arbitrage cycles across books, and a settlement coordinator
//! submits trades on-chain and reconciles book state on confirmation.
//! Stop-limit conditional orders activate through a price oracle fed by
//! confirmed trades.
//!
//! **Key invariants:**
//! - Price-time priority strictly enforced per book
//! - At most one in-flight settlement per book; no order is ever in two
//!   in-flight settlements
//! - Fills are proportional and never exceed an order's original amount
//! - No settlement pairs two orders from the same creator

pub mod book;
pub mod conditional;
pub mod config;
pub mod events;
pub mod matching;
pub mod settlement;
pub mod store;

pub use book::{Book, MarketPrice, OrderHandle};
pub use conditional::{ConditionalEntry, ConditionalKind};
pub use config::Config;
pub use events::{
    BookEvent, BookEventKind, BookSnapshot, ChannelNotifier, LevelSnapshot, Notifier,
    NullNotifier, OrderSnapshot, UserEvent, UserEventKind,
};
pub use settlement::{Receipt, Settlement, TxHandle};
pub use store::OrderBookStore;
