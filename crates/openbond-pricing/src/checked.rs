//! Checked decimal arithmetic mapping every failure to `PricingOverflow`.

use openbond_types::{BondsError, Result};
use rust_decimal::{Decimal, MathematicalOps};

pub fn add(a: Decimal, b: Decimal) -> Result<Decimal> {
    a.checked_add(b)
        .ok_or_else(|| BondsError::overflow(format!("{a} + {b}")))
}

pub fn sub(a: Decimal, b: Decimal) -> Result<Decimal> {
    a.checked_sub(b)
        .ok_or_else(|| BondsError::overflow(format!("{a} - {b}")))
}

pub fn mul(a: Decimal, b: Decimal) -> Result<Decimal> {
    a.checked_mul(b)
        .ok_or_else(|| BondsError::overflow(format!("{a} * {b}")))
}

pub fn div(a: Decimal, b: Decimal) -> Result<Decimal> {
    if b.is_zero() {
        return Err(BondsError::overflow(format!("{a} / 0")));
    }
    a.checked_div(b)
        .ok_or_else(|| BondsError::overflow(format!("{a} / {b}")))
}

pub fn powu(base: Decimal, exp: u64) -> Result<Decimal> {
    base.checked_powu(exp)
        .ok_or_else(|| BondsError::overflow(format!("{base} ^ {exp}")))
}

pub fn sqrt(x: Decimal) -> Result<Decimal> {
    x.sqrt()
        .ok_or_else(|| BondsError::overflow(format!("sqrt({x})")))
}
