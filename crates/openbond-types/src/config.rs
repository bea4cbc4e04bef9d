//! Engine configuration.

use serde::{Deserialize, Serialize};

use crate::{BondsError, Result, constants};

/// Configuration shared by every replica running the engine.
///
/// All replicas must use identical values; precision settings change the
/// rounding grid and therefore the settled amounts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Decimal places allowed in bond-token amounts.
    pub token_precision: u32,
    /// Decimal places reserve amounts, prices and fees are rounded to.
    pub reserve_precision: u32,
    /// Maximum orders held in one batch.
    pub max_orders_per_batch: usize,
    /// Settlement reports retained per engine before the oldest is evicted.
    pub report_history_limit: usize,
    /// Largest integral exponent accepted for power-style curves.
    pub max_curve_exponent: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            token_precision: constants::TOKEN_PRECISION,
            reserve_precision: constants::RESERVE_PRECISION,
            max_orders_per_batch: constants::MAX_ORDERS_PER_BATCH,
            report_history_limit: constants::DEFAULT_REPORT_HISTORY,
            max_curve_exponent: constants::MAX_CURVE_EXPONENT,
        }
    }
}

impl EngineConfig {
    /// Parse a JSON config. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| BondsError::Configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        // rust_decimal carries at most 28 fractional digits
        if self.token_precision > 18 {
            return Err(BondsError::Configuration(format!(
                "token_precision {} out of range 0..=18",
                self.token_precision
            )));
        }
        if self.reserve_precision > 18 {
            return Err(BondsError::Configuration(format!(
                "reserve_precision {} out of range 0..=18",
                self.reserve_precision
            )));
        }
        if self.max_orders_per_batch == 0 {
            return Err(BondsError::Configuration(
                "max_orders_per_batch must be positive".into(),
            ));
        }
        if self.report_history_limit == 0 {
            return Err(BondsError::Configuration(
                "report_history_limit must be positive".into(),
            ));
        }
        if !(1..=16).contains(&self.max_curve_exponent) {
            return Err(BondsError::Configuration(format!(
                "max_curve_exponent {} out of range 1..=16",
                self.max_curve_exponent
            )));
        }
        Ok(())
    }
}
