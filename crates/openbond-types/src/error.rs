//! Error types for the OpenBond settlement engine.
//!
//! All errors use the `BD_ERR_` prefix convention for easy grepping in logs.
//! Error codes are grouped by subsystem:
//! - 1xx: Validation / registry errors
//! - 2xx: Order admission errors
//! - 3xx: Ledger errors
//! - 4xx: Engine / lookup errors
//! - 5xx: Pricing errors
//! - 9xx: General / internal errors

use rust_decimal::Decimal;
use thiserror::Error;

use crate::{BatchSeq, BondDid, FunctionType};

/// Central error enum for all OpenBond operations.
#[derive(Debug, Error)]
pub enum BondsError {
    // =================================================================
    // Validation / Registry Errors (1xx)
    // =================================================================
    /// A message or field failed basic validation.
    #[error("BD_ERR_100: Validation failed: {reason}")]
    Validation { reason: String },

    /// The function parameters or reserve tokens don't fit the function type.
    #[error("BD_ERR_101: Invalid function parameters: {reason}")]
    InvalidFunctionParameters { reason: String },

    /// Transaction and exit fees together must stay below 100%.
    #[error("BD_ERR_102: Fees cannot be or exceed 100%: tx {tx} + exit {exit}")]
    FeeConfig { tx: Decimal, exit: Decimal },

    /// Another bond already issues this token.
    #[error("BD_ERR_103: Bond token already registered: {0}")]
    DuplicateToken(String),

    /// A bond with this DID already exists.
    #[error("BD_ERR_104: Bond already exists: {0}")]
    BondAlreadyExists(BondDid),

    /// Curve identity (token, function type, reserve tokens) is immutable.
    #[error("BD_ERR_105: Field cannot be edited after creation: {field}")]
    ImmutableField { field: &'static str },

    /// Only the bond creator may edit it.
    #[error("BD_ERR_106: Editor is not the bond creator")]
    Unauthorized,

    /// An edit message that changes nothing.
    #[error("BD_ERR_107: Edit did not change any field")]
    NothingToEdit,

    /// The operation is not defined for this function type.
    #[error("BD_ERR_108: {operation} not available for {function_type}")]
    FunctionNotAvailable {
        function_type: FunctionType,
        operation: &'static str,
    },

    // =================================================================
    // Order Admission Errors (2xx)
    // =================================================================
    /// Order amount is above the bond's per-denomination cap.
    #[error("BD_ERR_200: Order quantity limit exceeded: {amount}{denom} > {limit}{denom}")]
    OrderLimitExceeded {
        denom: String,
        amount: Decimal,
        limit: Decimal,
    },

    /// Accepting the buy could push supply past `MaxSupply`.
    #[error("BD_ERR_201: Cannot mint more than max supply: requested supply {requested}, max {max}")]
    MaxSupplyExceeded { requested: Decimal, max: Decimal },

    /// The bond does not allow sells.
    #[error("BD_ERR_202: Sells are not allowed for this bond")]
    SellsNotAllowed,

    /// Selling would drive supply below zero.
    #[error("BD_ERR_203: Cannot burn more than supply: requested {requested}, available {available}")]
    SupplyUnderflow {
        requested: Decimal,
        available: Decimal,
    },

    /// The expected price is above the buyer's maximum.
    #[error("BD_ERR_204: Price exceeds max prices: price {price}, max {max}")]
    SlippageExceeded { price: String, max: String },

    /// Price would leave the configured sanity band.
    #[error("BD_ERR_205: Price {price} outside sanity band {rate} ± {margin}%")]
    SanityBound {
        price: Decimal,
        rate: Decimal,
        margin: Decimal,
    },

    /// The open batch is at capacity.
    #[error("BD_ERR_206: Batch is full")]
    BatchFull,

    /// The denomination is not one of the bond's reserve tokens.
    #[error("BD_ERR_207: Not a reserve token of this bond: {0}")]
    UnknownReserveToken(String),

    // =================================================================
    // Ledger Errors (3xx)
    // =================================================================
    /// A bond reserve (or escrow) would go negative.
    #[error("BD_ERR_300: Insufficient reserve: need {needed}{denom}, have {available}{denom}")]
    InsufficientReserve {
        denom: String,
        needed: Decimal,
        available: Decimal,
    },

    /// A trader account lacks the funds for the operation.
    #[error("BD_ERR_301: Insufficient balance for {holder}: need {needed}{denom}, have {available}{denom}")]
    InsufficientBalance {
        holder: String,
        denom: String,
        needed: Decimal,
        available: Decimal,
    },

    /// Supply or reserve conservation broken: critical safety alert.
    #[error("BD_ERR_302: Conservation violation: {reason}")]
    ConservationViolation { reason: String },

    // =================================================================
    // Engine / Lookup Errors (4xx)
    // =================================================================
    /// No bond with this DID.
    #[error("BD_ERR_400: Unknown bond: {0}")]
    UnknownBond(BondDid),

    /// The bond was halted after an invariant breach.
    #[error("BD_ERR_401: Bond halted: {0}")]
    BondHalted(BondDid),

    /// No settlement report for this batch (never settled or evicted).
    #[error("BD_ERR_402: Settlement report not found: {bond_did} {seq}")]
    ReportNotFound { bond_did: BondDid, seq: BatchSeq },

    // =================================================================
    // Pricing Errors (5xx)
    // =================================================================
    /// Curve arithmetic overflowed the decimal range.
    #[error("BD_ERR_500: Pricing overflow: {reason}")]
    PricingOverflow { reason: String },

    /// The operation needs a non-zero current supply.
    #[error("BD_ERR_501: Function requires non-zero current supply")]
    ZeroSupply,

    // =================================================================
    // General / Internal (9xx)
    // =================================================================
    /// Unrecoverable internal error.
    #[error("BD_ERR_900: Internal error: {0}")]
    Internal(String),

    /// Configuration error (invalid config file, out-of-range values).
    #[error("BD_ERR_902: Configuration error: {0}")]
    Configuration(String),
}

impl BondsError {
    /// Shorthand for a [`BondsError::Validation`].
    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation {
            reason: reason.into(),
        }
    }

    /// Shorthand for a [`BondsError::PricingOverflow`].
    pub fn overflow(reason: impl Into<String>) -> Self {
        Self::PricingOverflow {
            reason: reason.into(),
        }
    }

    /// Whether this error is an internal invariant breach. Fatal errors halt
    /// the affected bond instead of being reported back to a trader.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::ConservationViolation { .. } | Self::Internal(_))
    }
}

/// Crate-wide `Result` alias.
pub type Result<T> = std::result::Result<T, BondsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_contains_prefix() {
        let err = BondsError::UnknownBond(BondDid::new("did:sov:bond1"));
        let msg = format!("{err}");
        assert!(msg.starts_with("BD_ERR_400"), "Got: {msg}");
        assert!(msg.contains("did:sov:bond1"));
    }

    #[test]
    fn fee_config_display() {
        let err = BondsError::FeeConfig {
            tx: Decimal::new(60, 0),
            exit: Decimal::new(40, 0),
        };
        let msg = format!("{err}");
        assert!(msg.contains("BD_ERR_102"));
        assert!(msg.contains("60"));
        assert!(msg.contains("40"));
    }

    #[test]
    fn only_invariant_breaches_are_fatal() {
        assert!(
            BondsError::ConservationViolation {
                reason: "x".into()
            }
            .is_fatal()
        );
        assert!(BondsError::Internal("x".into()).is_fatal());
        assert!(!BondsError::SellsNotAllowed.is_fatal());
        assert!(
            !BondsError::InsufficientReserve {
                denom: "res".into(),
                needed: Decimal::ONE,
                available: Decimal::ZERO,
            }
            .is_fatal()
        );
    }

    #[test]
    fn all_errors_have_bd_err_prefix() {
        let errors: Vec<Box<dyn std::error::Error>> = vec![
            Box::new(BondsError::SellsNotAllowed),
            Box::new(BondsError::BatchFull),
            Box::new(BondsError::ZeroSupply),
            Box::new(BondsError::NothingToEdit),
            Box::new(BondsError::ImmutableField { field: "token" }),
            Box::new(BondsError::Internal("test".into())),
            Box::new(BondsError::FunctionNotAvailable {
                function_type: FunctionType::Power,
                operation: "swap",
            }),
        ];
        for err in errors {
            let msg = format!("{err}");
            assert!(
                msg.starts_with("BD_ERR_"),
                "Error missing BD_ERR_ prefix: {msg}"
            );
        }
    }
}
