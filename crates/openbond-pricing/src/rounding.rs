//! Rounding to the reserve grid.
//!
//! Amounts paid into a bond round up, amounts paid out (and fees) round
//! down, so every rounding remainder stays with the reserve.

use openbond_types::{Coins, Result};
use rust_decimal::{Decimal, RoundingStrategy};

use crate::checked;

/// Smallest grid value `≥ x`.
#[must_use]
pub fn round_up(x: Decimal, dp: u32) -> Decimal {
    x.round_dp_with_strategy(dp, RoundingStrategy::ToPositiveInfinity)
        .normalize()
}

/// Largest grid value `≤ x`.
#[must_use]
pub fn round_down(x: Decimal, dp: u32) -> Decimal {
    x.round_dp_with_strategy(dp, RoundingStrategy::ToNegativeInfinity)
        .normalize()
}

/// `pct`% of `amount`, rounded down.
pub fn percentage_of(amount: Decimal, pct: Decimal, dp: u32) -> Result<Decimal> {
    let raw = checked::div(checked::mul(amount, pct)?, Decimal::ONE_HUNDRED)?;
    Ok(round_down(raw, dp))
}

/// `pct`% of every entry, rounded down.
pub fn percentage_of_coins(coins: &Coins, pct: Decimal, dp: u32) -> Result<Coins> {
    let mut out = Coins::new();
    for (denom, amount) in coins.iter() {
        out.add_amount(denom, percentage_of(amount, pct, dp)?)?;
    }
    Ok(out)
}

/// Whether `x` fits on a grid with `dp` decimal places.
#[must_use]
pub fn is_on_grid(x: Decimal, dp: u32) -> bool {
    x.normalize().scale() <= dp
}
