//! Order lifecycle types
//!
//! An order commits its creator to swap `amt_in` of `symbol_in` for
//! `amt_out` of `symbol_out`. Identity fields are immutable once the order
//! is ingested; the lifecycle fields (`filled_amt_in`, `status`,
//! `tx_hashes`) mutate under the owning book's lock.

use crate::errors::OrderError;
use crate::ids::OrderKey;
use crate::numeric::{self, mul_div};
use alloy_primitives::{Address, Bytes, B256, U256};
use serde::{Deserialize, Serialize};

/// Order side relative to the canonical pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    /// Buys base with quote
    Bid,
    /// Sells base for quote
    Ask,
}

impl Side {
    /// Get the opposite side
    pub fn opposite(&self) -> Self {
        match self {
            Side::Bid => Side::Ask,
            Side::Ask => Side::Bid,
        }
    }
}

/// Order status.
///
/// State IDs are fixed for wire and history compatibility. The two
/// snapshot states appear only inside history records, never on a live
/// order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// State 0: resting in a book, eligible for matching
    Active,
    /// State 1: participating in a settlement that is in flight
    Pending,
    /// State 2: completely filled (terminal)
    FullyFilled,
    /// State 3: history snapshot taken at the moment of full fill
    FilledSnapshot,
    /// State 4: cancelled by the creator (terminal)
    Cancelled,
    /// State 5: history snapshot taken after a partial fill
    PartialSnapshot,
}

impl OrderStatus {
    /// Check if status is terminal (no further transitions possible)
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::FullyFilled | OrderStatus::Cancelled)
    }

    /// Get the state ID for wire protocol and history records
    pub fn state_id(&self) -> u8 {
        match self {
            OrderStatus::Active => 0,
            OrderStatus::Pending => 1,
            OrderStatus::FullyFilled => 2,
            OrderStatus::FilledSnapshot => 3,
            OrderStatus::Cancelled => 4,
            OrderStatus::PartialSnapshot => 5,
        }
    }
}

/// A signed swap order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub creator: Address,
    pub symbol_in: String,
    pub symbol_out: String,
    #[serde(with = "numeric::u256_dec")]
    pub amt_in: U256,
    #[serde(with = "numeric::u256_dec")]
    pub amt_out: U256,
    #[serde(with = "numeric::u256_dec")]
    pub nonce: U256,
    /// Opaque signature blob; validated by the external verifier before
    /// ingestion.
    #[serde(default)]
    pub signature: Bytes,
    /// Quote-per-base price derived on insertion into a book.
    #[serde(default, with = "numeric::u256_dec_opt")]
    pub limit_price: Option<U256>,
    /// Trigger price; present only on conditional child orders.
    #[serde(default, with = "numeric::u256_dec_opt")]
    pub trigger_price: Option<U256>,
    /// Cumulative filled input, `0 <= filled_amt_in <= amt_in`.
    #[serde(default, with = "numeric::u256_dec")]
    pub filled_amt_in: U256,
    pub status: OrderStatus,
    /// Child order activated when this order fully fills.
    #[serde(default)]
    pub conditional_child: Option<Box<Order>>,
    /// Confirmed settlement transaction handles, append-only.
    #[serde(default)]
    pub tx_hashes: Vec<B256>,
}

impl Order {
    /// Create a new active order with no fills.
    pub fn new(
        creator: Address,
        symbol_in: impl Into<String>,
        symbol_out: impl Into<String>,
        amt_in: U256,
        amt_out: U256,
        nonce: U256,
        signature: Bytes,
    ) -> Self {
        Self {
            creator,
            symbol_in: symbol_in.into(),
            symbol_out: symbol_out.into(),
            amt_in,
            amt_out,
            nonce,
            signature,
            limit_price: None,
            trigger_price: None,
            filled_amt_in: U256::ZERO,
            status: OrderStatus::Active,
            conditional_child: None,
            tx_hashes: Vec::new(),
        }
    }

    /// The order's `(creator, nonce)` identity.
    pub fn key(&self) -> OrderKey {
        OrderKey::new(self.creator, self.nonce)
    }

    /// Reject non-positive amounts.
    pub fn validate_amounts(&self) -> Result<(), OrderError> {
        if self.amt_in.is_zero() || self.amt_out.is_zero() {
            return Err(OrderError::MalformedAmounts);
        }
        Ok(())
    }

    /// Unfilled input amount, in the order's own `amt_in` currency.
    pub fn remaining_in(&self) -> U256 {
        self.amt_in.saturating_sub(self.filled_amt_in)
    }

    /// Output still owed, proportional to the unfilled input:
    /// `amt_out * remaining_in / amt_in`.
    pub fn remaining_out(&self) -> U256 {
        mul_div(self.amt_out, self.remaining_in(), self.amt_in)
    }

    pub fn is_active(&self) -> bool {
        self.status == OrderStatus::Active
    }

    pub fn is_pending(&self) -> bool {
        self.status == OrderStatus::Pending
    }

    /// Quantity invariant: cumulative fill never exceeds the original
    /// amount.
    pub fn check_invariant(&self) -> bool {
        self.filled_amt_in <= self.amt_in
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_order() -> Order {
        Order::new(
            Address::repeat_byte(0xaa),
            "AAA",
            "BBB",
            U256::from(100),
            U256::from(200),
            U256::from(1),
            Bytes::new(),
        )
    }

    #[test]
    fn test_side_opposite() {
        assert_eq!(Side::Bid.opposite(), Side::Ask);
        assert_eq!(Side::Ask.opposite(), Side::Bid);
    }

    #[test]
    fn test_status_state_ids() {
        assert_eq!(OrderStatus::Active.state_id(), 0);
        assert_eq!(OrderStatus::Pending.state_id(), 1);
        assert_eq!(OrderStatus::FullyFilled.state_id(), 2);
        assert_eq!(OrderStatus::FilledSnapshot.state_id(), 3);
        assert_eq!(OrderStatus::Cancelled.state_id(), 4);
        assert_eq!(OrderStatus::PartialSnapshot.state_id(), 5);
    }

    #[test]
    fn test_status_terminal() {
        assert!(OrderStatus::FullyFilled.is_terminal());
        assert!(OrderStatus::Cancelled.is_terminal());
        assert!(!OrderStatus::Active.is_terminal());
        assert!(!OrderStatus::Pending.is_terminal());
    }

    #[test]
    fn test_new_order_defaults() {
        let order = sample_order();
        assert_eq!(order.status, OrderStatus::Active);
        assert_eq!(order.filled_amt_in, U256::ZERO);
        assert!(order.limit_price.is_none());
        assert!(order.tx_hashes.is_empty());
        assert!(order.check_invariant());
    }

    #[test]
    fn test_remaining_amounts() {
        let mut order = sample_order();
        assert_eq!(order.remaining_in(), U256::from(100));
        assert_eq!(order.remaining_out(), U256::from(200));

        order.filled_amt_in = U256::from(25);
        assert_eq!(order.remaining_in(), U256::from(75));
        // 200 * 75 / 100 = 150
        assert_eq!(order.remaining_out(), U256::from(150));
    }

    #[test]
    fn test_remaining_saturates() {
        let mut order = sample_order();
        order.filled_amt_in = U256::from(150);
        assert_eq!(order.remaining_in(), U256::ZERO);
        assert!(!order.check_invariant());
    }

    #[test]
    fn test_validate_amounts() {
        let mut order = sample_order();
        assert!(order.validate_amounts().is_ok());

        order.amt_in = U256::ZERO;
        assert_eq!(
            order.validate_amounts().unwrap_err(),
            OrderError::MalformedAmounts
        );
    }

    #[test]
    fn test_clone_is_deep() {
        let mut order = sample_order();
        order.conditional_child = Some(Box::new(sample_order()));

        let snapshot = order.clone();
        order.filled_amt_in = U256::from(50);
        order.tx_hashes.push(B256::repeat_byte(1));

        assert_eq!(snapshot.filled_amt_in, U256::ZERO);
        assert!(snapshot.tx_hashes.is_empty());
        assert!(snapshot.conditional_child.is_some());
    }

    #[test]
    fn test_order_serialization_roundtrip() {
        let order = sample_order();
        let json = serde_json::to_string(&order).unwrap();
        assert!(json.contains("\"amtIn\":\"100\"") || json.contains("\"amt_in\":\"100\""));

        let back: Order = serde_json::from_str(&json).unwrap();
        assert_eq!(order, back);
    }
}
