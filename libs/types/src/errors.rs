//! Error taxonomy for the matching core
//!
//! Comprehensive error taxonomy using thiserror. Validation errors surface
//! to the caller; everything else is recovered in place by the engine.

use thiserror::Error;

/// Top-level engine error
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("Order error: {0}")]
    Order(#[from] OrderError),

    #[error("Ring error: {0}")]
    Ring(#[from] RingError),

    #[error("Settlement error: {0}")]
    Settlement(#[from] SettlementError),

    #[error("Conditional order error: {0}")]
    Conditional(#[from] ConditionalError),

    #[error("System error: {message}")]
    System { message: String },
}

/// Order ingestion and book errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OrderError {
    #[error("No order book exists for pair {pair}")]
    UnknownPair { pair: String },

    #[error("Order tokens do not match book {pair}")]
    TokenMismatch { pair: String },

    #[error("Order amounts must be positive")]
    MalformedAmounts,

    #[error("Order signature does not verify against its creator")]
    InvalidSignature,
}

/// Ring discovery and execution errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RingError {
    #[error("Ring path is not a closed cycle")]
    NotClosed,

    #[error("Two-order ring over a single pair belongs to direct matching")]
    SameBookPair,

    #[error("Ring spans fewer than three distinct tokens")]
    TooFewTokens,

    #[error("No amount can flow through the ring")]
    NoFlow,

    #[error("Ring leg {key} changed before execution")]
    StaleLeg { key: String },
}

/// Settlement submission and confirmation errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SettlementError {
    #[error("Settlement submission failed: {reason}")]
    Submission { reason: String },

    #[error("Participant {key} missing from its price level on confirmation")]
    MissingParticipant { key: String },
}

/// Conditional order errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConditionalError {
    #[error("Conditional order has empty token symbols")]
    MissingSymbols,

    #[error("Conditional order amounts must be positive")]
    InvalidAmounts,

    #[error("Conditional order trigger price must be positive")]
    InvalidTriggerPrice,

    #[error("Unsupported conditional type: {kind}")]
    UnsupportedType { kind: String },

    #[error("Conditional order tokens do not match any book")]
    UnknownPair,

    #[error("Conditional order already stored: {key}")]
    AlreadyExists { key: String },

    #[error("Conditional order not found: {key}")]
    NotFound { key: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_error_display() {
        let err = OrderError::UnknownPair {
            pair: "AAA/BBB".to_string(),
        };
        assert_eq!(err.to_string(), "No order book exists for pair AAA/BBB");
    }

    #[test]
    fn test_ring_error_display() {
        let err = RingError::StaleLeg {
            key: "0xabc-1".to_string(),
        };
        assert!(err.to_string().contains("0xabc-1"));
    }

    #[test]
    fn test_engine_error_from_order_error() {
        let err: EngineError = OrderError::MalformedAmounts.into();
        assert!(matches!(err, EngineError::Order(_)));
    }

    #[test]
    fn test_engine_error_from_settlement_error() {
        let err: EngineError = SettlementError::Submission {
            reason: "rpc unreachable".to_string(),
        }
        .into();
        assert!(err.to_string().contains("rpc unreachable"));
    }
}
