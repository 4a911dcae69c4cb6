//! Matching logic module
//!
//! `direct` pairs crossing bids and asks within one book; `ring` finds
//! closed arbitrage cycles across books.

pub mod direct;
pub mod ring;

pub use direct::{match_book, PreparedMatch};
pub use ring::{
    collect_unmatched, find_ring_from, price_ring, PreparedRing, RingLeg, UnmatchedEntry,
};
