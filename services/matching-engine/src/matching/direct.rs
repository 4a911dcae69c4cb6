//! Direct two-sided matcher
//!
//! Pairs the best bid with the best ask while they cross, with
//! integer-exact fill math and dust handling. Runs under the book's
//! writer lock and prepares at most one match per invocation: the
//! participants are marked pending here, and the caller submits the
//! settlement after releasing the lock. Together with the pending gate
//! below, that guarantees at most one in-flight settlement per book.

use alloy_primitives::U256;
use ringbook_types::numeric::{mul_div, to_display, PRICE_FACTOR};
use ringbook_types::order::OrderStatus;
use tracing::{debug, info, warn};

use crate::book::{BookSides, OrderHandle};

/// A crossing pair ready for settlement, with both participants already
/// marked pending.
pub struct PreparedMatch {
    pub ask: OrderHandle,
    pub bid: OrderHandle,
    pub ask_price: U256,
    pub bid_price: U256,
    /// Execution price: the resting ask's limit price.
    pub exec_price: U256,
    /// Base units flowing from ask to bid.
    pub base_qty: U256,
    /// Quote units flowing from bid to ask.
    pub quote_qty: U256,
}

/// Run one matching pass over a book.
///
/// Returns the prepared match to submit, or `None` when nothing can
/// trade this tick. A pending order at either best level ends the pass
/// immediately: the book already has a settlement in flight.
pub fn match_book(sides: &mut BookSides, dust_threshold: U256) -> Option<PreparedMatch> {
    loop {
        let bid_price = sides.bids.best_price()?;
        let ask_price = sides.asks.best_price()?;

        // Orders match when bid price >= ask price
        if bid_price < ask_price {
            return None;
        }

        if sides.bids.level(&bid_price)?.has_pending()
            || sides.asks.level(&ask_price)?.has_pending()
        {
            debug!("best level has pending orders, waiting for confirmation");
            return None;
        }

        let bid_handle = sides.bids.level(&bid_price)?.oldest_active()?;
        let ask_handle = sides.asks.level(&ask_price)?.oldest_active()?;

        let bid = bid_handle.lock().clone();
        let ask = ask_handle.lock().clone();

        // Self-match prevention
        if bid.creator == ask.creator {
            debug!(creator = %bid.creator, "self-match prevented at top of book");
            return None;
        }

        // Purge anything already consumed before attempting a fill
        let bid_rem_in = bid.remaining_in();
        if bid_rem_in.is_zero() {
            bid_handle.lock().status = OrderStatus::FullyFilled;
            if let Some(level) = sides.bids.level_mut(&bid_price) {
                level.remove(&bid.key());
            }
            sides.bids.drop_level_if_empty(&bid_price);
            info!(order = %bid.key(), "purged fully consumed bid");
            continue;
        }
        let ask_rem_in = ask.remaining_in();
        if ask_rem_in.is_zero() {
            ask_handle.lock().status = OrderStatus::FullyFilled;
            if let Some(level) = sides.asks.level_mut(&ask_price) {
                level.remove(&ask.key());
            }
            sides.asks.drop_level_if_empty(&ask_price);
            info!(order = %ask.key(), "purged fully consumed ask");
            continue;
        }

        // Base the bid still wants, proportional to its remaining quote
        let bid_rem_out = mul_div(bid.amt_out, bid_rem_in, bid.amt_in);

        // Tradeable base is capped by what the ask still sells and what
        // the bid still wants
        let exec_price = ask_price;
        let mut base_qty = bid_rem_out.min(ask_rem_in);
        if base_qty.is_zero() {
            warn!("zero tradeable base quantity, skipping match");
            return None;
        }
        let mut quote_qty = mul_div(base_qty, exec_price, PRICE_FACTOR);

        // The bid may not be able to pay for that much base at the
        // execution price; shrink from its remaining quote and re-derive
        if quote_qty > bid_rem_in {
            quote_qty = bid_rem_in;
            base_qty = mul_div(quote_qty, PRICE_FACTOR, exec_price);
            if base_qty > ask_rem_in {
                base_qty = ask_rem_in;
                quote_qty = mul_div(base_qty, exec_price, PRICE_FACTOR);
            }
        }

        // Dust handling: a remainder at or below the threshold is consumed
        // into this trade instead of resting unmatchably. At most one side
        // extends; the re-derived opposite amount clamps to that side's
        // remaining.
        let bid_after = bid_rem_in.saturating_sub(quote_qty);
        let ask_after = ask_rem_in.saturating_sub(base_qty);

        if !bid_after.is_zero() && bid_after <= dust_threshold {
            warn!(dust = %bid_after, "bid dust detected, consuming full remaining");
            quote_qty = bid_rem_in;
            base_qty = mul_div(quote_qty, PRICE_FACTOR, exec_price);
            if base_qty > ask_rem_in {
                base_qty = ask_rem_in;
            }
        } else if !ask_after.is_zero() && ask_after <= dust_threshold {
            warn!(dust = %ask_after, "ask dust detected, consuming full remaining");
            base_qty = ask_rem_in;
            quote_qty = mul_div(base_qty, exec_price, PRICE_FACTOR);
            if quote_qty > bid_rem_in {
                quote_qty = bid_rem_in;
            }
        }

        if base_qty.is_zero() || quote_qty.is_zero() {
            warn!("trade quantities degenerate after adjustment, skipping match");
            return None;
        }

        info!(
            bid = %bid.key(),
            ask = %ask.key(),
            base = %base_qty,
            quote = %quote_qty,
            price = to_display(exec_price),
            "match prepared"
        );

        // Mark both pending before handing off; no other matcher path
        // touches a pending order
        bid_handle.lock().status = OrderStatus::Pending;
        ask_handle.lock().status = OrderStatus::Pending;

        return Some(PreparedMatch {
            ask: ask_handle,
            bid: bid_handle,
            ask_price,
            bid_price,
            exec_price,
            base_qty,
            quote_qty,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{Address, Bytes};
    use parking_lot::Mutex;
    use ringbook_types::order::{Order, Side};
    use std::sync::Arc;

    const DUST: u64 = 100;

    fn insert(sides: &mut BookSides, side: Side, creator: u8, nonce: u64, amt_in: u64, amt_out: u64) -> OrderHandle {
        let (symbol_in, symbol_out) = match side {
            Side::Ask => ("AAA", "BBB"),
            Side::Bid => ("BBB", "AAA"),
        };
        let mut order = Order::new(
            Address::repeat_byte(creator),
            symbol_in,
            symbol_out,
            U256::from(amt_in),
            U256::from(amt_out),
            U256::from(nonce),
            Bytes::new(),
        );
        let price = match side {
            Side::Ask => ringbook_types::numeric::ask_limit_price(order.amt_in, order.amt_out),
            Side::Bid => ringbook_types::numeric::bid_limit_price(order.amt_in, order.amt_out),
        };
        order.limit_price = Some(price);
        let remaining = order.remaining_in();
        let handle: OrderHandle = Arc::new(Mutex::new(order));
        match side {
            Side::Ask => sides.asks.insert(price, Arc::clone(&handle), remaining),
            Side::Bid => sides.bids.insert(price, Arc::clone(&handle), remaining),
        }
        handle
    }

    #[test]
    fn test_exact_match() {
        let mut sides = BookSides::default();
        insert(&mut sides, Side::Ask, 1, 1, 100, 200); // ask 2.0
        insert(&mut sides, Side::Bid, 2, 1, 200, 100); // bid 2.0

        let prepared = match_book(&mut sides, U256::from(DUST)).unwrap();
        assert_eq!(prepared.exec_price, PRICE_FACTOR * U256::from(2));
        assert_eq!(prepared.base_qty, U256::from(100));
        assert_eq!(prepared.quote_qty, U256::from(200));
        assert!(prepared.ask.lock().is_pending());
        assert!(prepared.bid.lock().is_pending());
    }

    #[test]
    fn test_no_cross_no_match() {
        let mut sides = BookSides::default();
        insert(&mut sides, Side::Ask, 1, 1, 100, 300); // ask 3.0
        insert(&mut sides, Side::Bid, 2, 1, 200, 100); // bid 2.0

        assert!(match_book(&mut sides, U256::from(DUST)).is_none());
    }

    #[test]
    fn test_partial_fill_at_maker_price_with_dust_extension() {
        let mut sides = BookSides::default();
        insert(&mut sides, Side::Ask, 1, 1, 100, 300); // ask 3.0, sells 100 base
        insert(&mut sides, Side::Bid, 2, 1, 150, 40); // bid 3.75, spends 150 quote

        let prepared = match_book(&mut sides, U256::from(DUST)).unwrap();
        // Executed at the ask's price. The bid's proportional demand is 40
        // base (120 quote); its 30 leftover quote is within the dust
        // threshold, so the trade extends to consume the full 150 quote
        // for 50 base.
        assert_eq!(prepared.exec_price, PRICE_FACTOR * U256::from(3));
        assert_eq!(prepared.base_qty, U256::from(50));
        assert_eq!(prepared.quote_qty, U256::from(150));
    }

    #[test]
    fn test_ask_dust_consumed() {
        let mut sides = BookSides::default();
        insert(&mut sides, Side::Ask, 1, 1, 1000, 1000); // ask 1.0
        insert(&mut sides, Side::Bid, 2, 1, 999, 999); // bid 1.0

        let prepared = match_book(&mut sides, U256::from(DUST)).unwrap();
        // Plain fill would leave the ask 1 base of dust; it extends to the
        // full 1000 base, and the quote leg clamps to the bid's 999.
        assert_eq!(prepared.base_qty, U256::from(1000));
        assert_eq!(prepared.quote_qty, U256::from(999));
    }

    #[test]
    fn test_pending_gate_stops_pass() {
        let mut sides = BookSides::default();
        let ask = insert(&mut sides, Side::Ask, 1, 1, 100, 200);
        insert(&mut sides, Side::Bid, 2, 1, 200, 100);

        ask.lock().status = OrderStatus::Pending;
        assert!(match_book(&mut sides, U256::from(DUST)).is_none());
    }

    #[test]
    fn test_self_match_prevention() {
        let mut sides = BookSides::default();
        insert(&mut sides, Side::Ask, 7, 1, 100, 200);
        insert(&mut sides, Side::Bid, 7, 2, 200, 100);

        assert!(match_book(&mut sides, U256::from(DUST)).is_none());
    }

    #[test]
    fn test_purges_consumed_order_then_matches_next() {
        let mut sides = BookSides::default();
        let stale = insert(&mut sides, Side::Ask, 1, 1, 100, 200);
        stale.lock().filled_amt_in = U256::from(100);
        insert(&mut sides, Side::Ask, 3, 2, 100, 200);
        insert(&mut sides, Side::Bid, 2, 1, 200, 100);

        let prepared = match_book(&mut sides, U256::from(DUST)).unwrap();
        assert_eq!(prepared.ask.lock().creator, Address::repeat_byte(3));
        assert_eq!(stale.lock().status, OrderStatus::FullyFilled);
    }

    #[test]
    fn test_time_priority_within_level() {
        let mut sides = BookSides::default();
        insert(&mut sides, Side::Ask, 1, 1, 100, 200);
        insert(&mut sides, Side::Ask, 3, 2, 100, 200);
        insert(&mut sides, Side::Bid, 2, 1, 200, 100);

        let prepared = match_book(&mut sides, U256::from(DUST)).unwrap();
        assert_eq!(prepared.ask.lock().creator, Address::repeat_byte(1));
    }

    #[test]
    fn test_bid_demand_limits_trade() {
        let mut sides = BookSides::default();
        // Ask sells 1_000_000 base at 2.0; bid spends 600_000 quote at 3.0
        // but only wants 200_000 base
        insert(&mut sides, Side::Ask, 1, 1, 1_000_000, 2_000_000);
        insert(&mut sides, Side::Bid, 2, 1, 600_000, 200_000);

        let prepared = match_book(&mut sides, U256::from(DUST)).unwrap();
        // The bid's demand caps the base leg; at the ask's 2.0 that is
        // 400_000 quote, well within the bid's remaining
        assert_eq!(prepared.base_qty, U256::from(200_000));
        assert_eq!(prepared.quote_qty, U256::from(400_000));
    }
}
