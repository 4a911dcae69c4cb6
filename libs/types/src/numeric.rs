//! Fixed-point price arithmetic over 256-bit integers
//!
//! Prices are unsigned 256-bit integers scaled by `PRICE_FACTOR` (10^18):
//! a stored price `p` means `p / 10^18` quote units per base unit. Token
//! amounts are raw integers in the token's smallest unit. All price and
//! quantity math is integer; intermediate products widen to 512 bits
//! before division and truncate toward zero. Floating point appears only
//! in the display helpers.

use alloy_primitives::{U256, U512};

/// Scaling factor for fixed-point prices: 10^18.
pub const PRICE_FACTOR: U256 = U256::from_limbs([1_000_000_000_000_000_000, 0, 0, 0]);

/// Compute `a * b / denom` with full 512-bit intermediate precision.
///
/// Truncates toward zero, matching on-chain integer division.
///
/// # Panics
/// Panics if `denom` is zero, or in debug builds if the quotient does not
/// fit in 256 bits.
pub fn mul_div(a: U256, b: U256, denom: U256) -> U256 {
    assert!(!denom.is_zero(), "mul_div: division by zero");
    let wide = U512::from(a) * U512::from(b) / U512::from(denom);
    let limbs = wide.as_limbs();
    debug_assert!(
        limbs[4..].iter().all(|limb| *limb == 0),
        "mul_div: quotient exceeds 256 bits"
    );
    U256::from_limbs([limbs[0], limbs[1], limbs[2], limbs[3]])
}

/// Limit price of an ask (sells base for quote): `amt_out * PRICE_FACTOR / amt_in`.
pub fn ask_limit_price(amt_in: U256, amt_out: U256) -> U256 {
    mul_div(amt_out, PRICE_FACTOR, amt_in)
}

/// Limit price of a bid (buys base with quote): `amt_in * PRICE_FACTOR / amt_out`.
pub fn bid_limit_price(amt_in: U256, amt_out: U256) -> U256 {
    mul_div(amt_in, PRICE_FACTOR, amt_out)
}

/// Integer mid-price of a bid/ask pair.
pub fn mid_price(best_bid: U256, best_ask: U256) -> U256 {
    (best_bid + best_ask) / U256::from(2)
}

/// Invert a price: the price of the reversed pair direction,
/// `PRICE_FACTOR^2 / price`.
///
/// # Panics
/// Panics if `price` is zero.
pub fn invert_price(price: U256) -> U256 {
    mul_div(PRICE_FACTOR, PRICE_FACTOR, price)
}

/// Lossy float projection of a scaled price or 18-decimal amount, for
/// display and logging only.
pub fn to_display(value: U256) -> f64 {
    value.to_string().parse::<f64>().unwrap_or(f64::MAX) / 1e18
}

/// Serde adapter serializing a `U256` as a decimal string, so wire
/// payloads never lose precision to JSON numbers.
pub mod u256_dec {
    use alloy_primitives::U256;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &U256, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<U256, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse::<U256>().map_err(serde::de::Error::custom)
    }
}

/// Serde adapter for `Option<U256>` as an optional decimal string.
pub mod u256_dec_opt {
    use alloy_primitives::U256;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Option<U256>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(v) => serializer.serialize_some(&v.to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<U256>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s: Option<String> = Option::deserialize(deserializer)?;
        match s {
            Some(s) => s
                .parse::<U256>()
                .map(Some)
                .map_err(serde::de::Error::custom),
            None => Ok(None),
        }
    }
}
