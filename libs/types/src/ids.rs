//! Order identity and canonical trading pairs
//!
//! Orders are identified by `(creator, nonce)`; nonces are allocated
//! per-creator by an external counter, so the pair is globally unique.
//! Trading pairs are canonicalized lexicographically so that any two
//! distinct token symbols key exactly one book.

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identity of an order: the signing account plus its per-creator
/// nonce.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderKey {
    pub creator: Address,
    #[serde(with = "crate::numeric::u256_dec")]
    pub nonce: U256,
}

impl OrderKey {
    pub fn new(creator: Address, nonce: U256) -> Self {
        Self { creator, nonce }
    }
}

impl fmt::Display for OrderKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.creator, self.nonce)
    }
}

/// A canonical trading pair.
///
/// `base` is the lexicographically smaller symbol, `quote` the larger.
/// Prices are always expressed in quote units per one base unit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TradingPair {
    pub base: String,
    pub quote: String,
}

impl TradingPair {
    /// Canonicalize two token symbols into a pair.
    ///
    /// The smaller symbol becomes the base, the larger the quote, so the
    /// same two tokens always map to the same pair regardless of order.
    pub fn canonical(token_a: &str, token_b: &str) -> Self {
        if token_a < token_b {
            Self {
                base: token_a.to_string(),
                quote: token_b.to_string(),
            }
        } else {
            Self {
                base: token_b.to_string(),
                quote: token_a.to_string(),
            }
        }
    }

    /// Map key for this pair, `"base/quote"`.
    pub fn key(&self) -> String {
        format!("{}/{}", self.base, self.quote)
    }

    /// Whether a symbol is one of the pair's two tokens.
    pub fn contains(&self, symbol: &str) -> bool {
        self.base == symbol || self.quote == symbol
    }
}

impl fmt::Display for TradingPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.quote)
    }
}
