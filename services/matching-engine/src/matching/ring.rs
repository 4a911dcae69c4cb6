//! Cross-book ring finder
//!
//! Discovers closed cycles of orders whose chained token flows return to
//! the starting token, enabling multi-hop arbitrage no single book can
//! express. The collector snapshots every active order with remaining
//! quantity; the depth-first search then runs over that snapshot without
//! holding any book lock, and books are visited in canonical-pair order
//! so discovery is reproducible. Execution re-validates each leg under
//! the book locks before anything is marked pending.

use alloy_primitives::{Address, U256};
use ringbook_types::errors::RingError;
use ringbook_types::ids::OrderKey;
use ringbook_types::numeric::mul_div;
use ringbook_types::order::Side;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

use crate::book::{Book, OrderHandle};

/// Snapshot of one active order with remaining capacity, taken by the
/// collector. `remaining_out` is proportional to the unfilled input.
#[derive(Clone)]
pub struct UnmatchedEntry {
    pub order: OrderHandle,
    pub key: OrderKey,
    pub creator: Address,
    pub symbol_in: String,
    pub symbol_out: String,
    pub amt_in: U256,
    pub amt_out: U256,
    pub remaining_in: U256,
    pub remaining_out: U256,
    pub book: Arc<Book>,
    pub side: Side,
    pub price: U256,
}

/// One leg of a priced ring: the collected entry plus the input amount it
/// will fill.
#[derive(Clone)]
pub struct RingLeg {
    pub entry: UnmatchedEntry,
    pub fill: U256,
}

/// A validated, priced ring ready for settlement.
pub struct PreparedRing {
    pub legs: Vec<RingLeg>,
}

impl PreparedRing {
    /// Human-readable token path, `A -> B -> ... -> A`.
    pub fn path_string(&self) -> String {
        let mut out = match self.legs.first() {
            Some(leg) => leg.entry.symbol_in.clone(),
            None => return String::new(),
        };
        for leg in &self.legs {
            out.push_str(" -> ");
            out.push_str(&leg.entry.symbol_out);
        }
        out
    }
}

/// Collect every active order with positive remaining quantity across the
/// given books.
///
/// Books must be supplied in canonical-pair-key order; within a book,
/// bids are walked best-first, then asks, and FIFO within each level, so
/// the collection (and therefore ring discovery) is deterministic.
pub async fn collect_unmatched(books: &[Arc<Book>]) -> Vec<UnmatchedEntry> {
    let mut entries = Vec::new();

    for book in books {
        let sides = book.state().read().await;

        let mut collect = |price: &U256, handles: Vec<OrderHandle>, side: Side| {
            for handle in handles {
                let snapshot = handle.lock().clone();
                if !snapshot.is_active() {
                    continue;
                }
                let remaining_in = snapshot.remaining_in();
                if remaining_in.is_zero() {
                    continue;
                }
                let remaining_out = snapshot.remaining_out();
                entries.push(UnmatchedEntry {
                    key: snapshot.key(),
                    creator: snapshot.creator,
                    symbol_in: snapshot.symbol_in,
                    symbol_out: snapshot.symbol_out,
                    amt_in: snapshot.amt_in,
                    amt_out: snapshot.amt_out,
                    remaining_in,
                    remaining_out,
                    book: Arc::clone(book),
                    side,
                    price: *price,
                    order: handle,
                });
            }
        };

        for (price, level) in sides.bids.levels() {
            collect(price, level.iter().cloned().collect(), Side::Bid);
        }
        for (price, level) in sides.asks.levels() {
            collect(price, level.iter().cloned().collect(), Side::Ask);
        }
    }

    entries
}

/// Search for a closed ring starting from `entries[start]`.
///
/// Returns the entry indices of a validated ring path, or `None`. Legs
/// never repeat an order or a creator; the path closes when the chained
/// output token returns to the start order's input token.
pub fn find_ring_from(
    entries: &[UnmatchedEntry],
    start: usize,
    max_depth: usize,
) -> Option<Vec<usize>> {
    let first = &entries[start];
    if first.remaining_in.is_zero() {
        return None;
    }

    let mut path = vec![start];
    let mut visited: HashSet<OrderKey> = HashSet::from([first.key.clone()]);
    let mut users: HashSet<Address> = HashSet::from([first.creator]);

    let closed = dfs(
        entries,
        &first.symbol_out,
        &first.symbol_in,
        &mut path,
        &mut visited,
        &mut users,
        1,
        max_depth,
    );
    closed.then_some(path)
}

#[allow(clippy::too_many_arguments)]
fn dfs(
    entries: &[UnmatchedEntry],
    current_token: &str,
    target_token: &str,
    path: &mut Vec<usize>,
    visited: &mut HashSet<OrderKey>,
    users: &mut HashSet<Address>,
    depth: usize,
    max_depth: usize,
) -> bool {
    if depth > max_depth {
        return false;
    }

    if current_token == target_token && depth > 1 {
        return validate_ring(entries, path);
    }

    for (idx, entry) in entries.iter().enumerate() {
        // The next leg must give away the token we currently hold
        if entry.symbol_in != current_token {
            continue;
        }
        if users.contains(&entry.creator) || visited.contains(&entry.key) {
            continue;
        }
        if entry.remaining_in.is_zero() {
            continue;
        }
        // The live order may have left Active since collection
        if !entry.order.lock().is_active() {
            continue;
        }

        path.push(idx);
        visited.insert(entry.key.clone());
        users.insert(entry.creator);

        if dfs(
            entries,
            &entry.symbol_out,
            target_token,
            path,
            visited,
            users,
            depth + 1,
            max_depth,
        ) {
            return true;
        }

        path.pop();
        visited.remove(&entry.key);
        users.remove(&entry.creator);
    }

    false
}

/// Check a closed path is an executable ring.
fn validate_ring(entries: &[UnmatchedEntry], path: &[usize]) -> bool {
    match check_ring(entries, path) {
        Ok(()) => true,
        Err(err) => {
            debug!(%err, "ring rejected");
            false
        }
    }
}

fn check_ring(entries: &[UnmatchedEntry], path: &[usize]) -> Result<(), RingError> {
    if path.len() < 2 {
        return Err(RingError::NotClosed);
    }

    let first = &entries[path[0]];
    let last = &entries[path[path.len() - 1]];
    if last.symbol_out != first.symbol_in {
        return Err(RingError::NotClosed);
    }

    // A 2-order cycle over a single token pair is a pairwise match and
    // belongs to the direct matcher
    if path.len() == 2 {
        let second = &entries[path[1]];
        if second.symbol_in == first.symbol_out && second.symbol_out == first.symbol_in {
            return Err(RingError::SameBookPair);
        }
    }

    // Cross-market arbitrage needs at least three distinct tokens
    let mut tokens: HashSet<&str> = HashSet::new();
    for idx in path {
        tokens.insert(&entries[*idx].symbol_in);
        tokens.insert(&entries[*idx].symbol_out);
    }
    if tokens.len() < 3 {
        return Err(RingError::TooFewTokens);
    }

    if bottleneck(entries, path).is_none() {
        return Err(RingError::NoFlow);
    }
    Ok(())
}

/// Find the largest amount that can flow through the whole ring.
///
/// An anchor leg's full remaining capacity is feasible iff flowing it
/// around the cycle never exceeds any leg's remaining capacity and the
/// cycle returns at least the amount it started with. Returns the anchor
/// index and amount of the best feasible anchor.
fn bottleneck(entries: &[UnmatchedEntry], path: &[usize]) -> Option<(usize, U256)> {
    let legs: Vec<&UnmatchedEntry> = path.iter().map(|idx| &entries[*idx]).collect();
    let mut best: Option<(usize, U256)> = None;

    for anchor in 0..legs.len() {
        let start_amount = legs[anchor].remaining_in;
        if start_amount.is_zero() {
            continue;
        }

        let mut current = start_amount;
        let mut feasible = true;
        for step in 0..legs.len() {
            let leg = legs[(anchor + step) % legs.len()];
            if current > leg.remaining_in {
                feasible = false;
                break;
            }
            current = mul_div(current, leg.amt_out, leg.amt_in);
        }

        // The cycle must not be lossy for the flow that opens it
        if feasible && current >= start_amount {
            let improves = best.map_or(true, |(_, amount)| start_amount > amount);
            if improves {
                best = Some((anchor, start_amount));
            }
        }
    }

    best
}

/// Price a validated ring: compute per-leg fills by flowing the
/// bottleneck amount from the anchor leg around the cycle.
pub fn price_ring(entries: &[UnmatchedEntry], path: &[usize]) -> Option<PreparedRing> {
    let (anchor, amount) = bottleneck(entries, path)?;
    let legs: Vec<&UnmatchedEntry> = path.iter().map(|idx| &entries[*idx]).collect();

    let mut fills = vec![U256::ZERO; legs.len()];
    let mut current = amount;
    for step in 0..legs.len() {
        let position = (anchor + step) % legs.len();
        fills[position] = current;
        let leg = legs[position];
        current = mul_div(current, leg.amt_out, leg.amt_in);
    }

    Some(PreparedRing {
        legs: legs
            .into_iter()
            .zip(fills)
            .map(|(entry, fill)| RingLeg {
                entry: entry.clone(),
                fill,
            })
            .collect(),
    })
}
