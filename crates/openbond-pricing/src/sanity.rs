//! Sanity band: bounds how far a bond's price may drift from its
//! configured reference rate.

use openbond_types::{Bond, BondsError, Result};
use rust_decimal::Decimal;

use crate::{
    BondCurve, CurveState,
    checked::{add, div, mul, sub},
};

/// `rate·(100 − margin)/100 ≤ price ≤ rate·(100 + margin)/100`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SanityBand {
    pub rate: Decimal,
    pub margin_pct: Decimal,
}

impl SanityBand {
    /// The bond's band, or `None` when the sanity rate is zero (disabled).
    #[must_use]
    pub fn for_bond(bond: &Bond) -> Option<Self> {
        bond.sanity_enabled().then_some(Self {
            rate: bond.sanity_rate,
            margin_pct: bond.sanity_margin_percentage,
        })
    }

    pub fn bounds(&self) -> Result<(Decimal, Decimal)> {
        let lower = div(
            mul(self.rate, sub(Decimal::ONE_HUNDRED, self.margin_pct)?)?,
            Decimal::ONE_HUNDRED,
        )?;
        let upper = div(
            mul(self.rate, add(Decimal::ONE_HUNDRED, self.margin_pct)?)?,
            Decimal::ONE_HUNDRED,
        )?;
        Ok((lower.max(Decimal::ZERO), upper))
    }

    pub fn contains(&self, price: Decimal) -> Result<bool> {
        let (lower, upper) = self.bounds()?;
        Ok(price >= lower && price <= upper)
    }

    /// Fail with [`BondsError::SanityBound`] if `price` is outside the band.
    pub fn check(&self, price: Decimal) -> Result<()> {
        if self.contains(price)? {
            Ok(())
        } else {
            Err(BondsError::SanityBound {
                price,
                rate: self.rate,
                margin: self.margin_pct,
            })
        }
    }
}

/// Check the sanity price of `state` against the bond's band. Passes when
/// the band is disabled or the price is not yet defined.
pub fn check_sanity(bond: &Bond, curve: &BondCurve, state: &CurveState) -> Result<()> {
    let Some(band) = SanityBand::for_bond(bond) else {
        return Ok(());
    };
    match curve.sanity_price(state)? {
        Some(price) => band.check(price),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use openbond_types::{Coins, EngineConfig};

    use super::*;

    fn d(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn band_bounds() {
        let band = SanityBand {
            rate: d("10"),
            margin_pct: d("5"),
        };
        assert_eq!(band.bounds().unwrap(), (d("9.5"), d("10.5")));
        assert!(band.contains(d("9.5")).unwrap());
        assert!(band.contains(d("10.5")).unwrap());
        assert!(!band.contains(d("10.51")).unwrap());
        assert!(matches!(
            band.check(d("9")),
            Err(BondsError::SanityBound { .. })
        ));
    }

    #[test]
    fn disabled_when_rate_is_zero() {
        let bond = Bond::dummy_power();
        assert!(SanityBand::for_bond(&bond).is_none());
        let curve = BondCurve::for_bond(&bond, &EngineConfig::default()).unwrap();
        let state = CurveState::new(d("999"), Coins::new());
        check_sanity(&bond, &curve, &state).unwrap();
    }

    #[test]
    fn power_bond_checks_spot() {
        let bond = Bond {
            sanity_rate: d("10"),
            sanity_margin_percentage: d("20"),
            ..Bond::dummy_power()
        };
        let curve = BondCurve::for_bond(&bond, &EngineConfig::default()).unwrap();
        // spot == supply for price = x
        check_sanity(&bond, &curve, &CurveState::new(d("11"), Coins::new())).unwrap();
        assert!(check_sanity(&bond, &curve, &CurveState::new(d("13"), Coins::new())).is_err());
    }

    #[test]
    fn swapper_checks_reserve_ratio() {
        let bond = Bond {
            sanity_rate: d("0.5"),
            sanity_margin_percentage: d("10"),
            ..Bond::dummy_swapper()
        };
        let curve = BondCurve::for_bond(&bond, &EngineConfig::default()).unwrap();
        let empty = CurveState::new(Decimal::ZERO, Coins::new());
        check_sanity(&bond, &curve, &empty).unwrap();

        let ok = CurveState::new(
            d("10"),
            Coins::from_pairs([("resa", d("500")), ("resb", d("1000"))]),
        );
        check_sanity(&bond, &curve, &ok).unwrap();
        let skewed = CurveState::new(
            d("10"),
            Coins::from_pairs([("resa", d("700")), ("resb", d("1000"))]),
        );
        assert!(check_sanity(&bond, &curve, &skewed).is_err());
    }
}
