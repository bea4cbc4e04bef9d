//! Coin and multi-denomination amount types.
//!
//! A [`Coin`] is a single-denomination amount (an order's `Amount`).
//! [`Coins`] is a denomination-keyed vector used for reserves, max prices,
//! fees and price vectors. It is backed by a `BTreeMap` so iteration order
//! is the same on every replica.

use std::{collections::BTreeMap, fmt};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{BondsError, Denom, Result};

/// A single-denomination amount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coin {
    pub denom: Denom,
    pub amount: Decimal,
}

impl Coin {
    #[must_use]
    pub fn new(denom: impl Into<Denom>, amount: Decimal) -> Self {
        Self {
            denom: denom.into(),
            amount,
        }
    }

    /// A zero amount of `denom`.
    #[must_use]
    pub fn zero(denom: impl Into<Denom>) -> Self {
        Self::new(denom, Decimal::ZERO)
    }

    #[must_use]
    pub fn is_positive(&self) -> bool {
        self.amount > Decimal::ZERO
    }
}

impl fmt::Display for Coin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.amount, self.denom)
    }
}

/// Amounts keyed by denomination. Zero entries are dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coins(BTreeMap<Denom, Decimal>);

impl Coins {
    #[must_use]
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Build from `(denom, amount)` pairs. A repeated denom keeps its last
    /// amount.
    #[must_use]
    pub fn from_pairs<I, D>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (D, Decimal)>,
        D: Into<Denom>,
    {
        let mut coins = Self::new();
        for (denom, amount) in pairs {
            coins.set_amount(&denom.into(), amount);
        }
        coins
    }

    /// The same `amount` in each of `denoms`.
    #[must_use]
    pub fn uniform(denoms: &[Denom], amount: Decimal) -> Self {
        Self::from_pairs(denoms.iter().map(|d| (d.clone(), amount)))
    }

    #[must_use]
    pub fn amount_of(&self, denom: &str) -> Decimal {
        self.0.get(denom).copied().unwrap_or(Decimal::ZERO)
    }

    /// Add `amount` (which may be negative) to the `denom` entry.
    ///
    /// # Errors
    /// [`BondsError::PricingOverflow`] if the entry leaves the decimal
    /// range; the entry is unchanged.
    pub fn add_amount(&mut self, denom: &str, amount: Decimal) -> Result<()> {
        let current = self.amount_of(denom);
        let next = current
            .checked_add(amount)
            .ok_or_else(|| BondsError::overflow(format!("{current}{denom} + {amount}{denom}")))?;
        self.set_amount(denom, next);
        Ok(())
    }

    /// Set the `denom` entry, removing it when `amount` is zero.
    pub fn set_amount(&mut self, denom: &str, amount: Decimal) {
        if amount.is_zero() {
            self.0.remove(denom);
        } else {
            self.0.insert(denom.to_string(), amount);
        }
    }

    /// Element-wise sum.
    ///
    /// # Errors
    /// [`BondsError::PricingOverflow`] if any entry leaves the decimal range.
    pub fn checked_plus(&self, other: &Coins) -> Result<Coins> {
        let mut out = self.clone();
        for (denom, amount) in other.iter() {
            out.add_amount(denom, amount)?;
        }
        Ok(out)
    }

    /// Element-wise difference, or `None` if any entry would go negative.
    #[must_use]
    pub fn checked_minus(&self, other: &Coins) -> Option<Coins> {
        let mut out = self.clone();
        for (denom, amount) in other.iter() {
            let held = out.amount_of(denom);
            if held < amount {
                return None;
            }
            out.set_amount(denom, held - amount);
        }
        Some(out)
    }

    /// Apply the fallible `f` to every amount, dropping entries that become
    /// zero. Stops at the first error.
    pub fn try_map_amounts(&self, mut f: impl FnMut(Decimal) -> Result<Decimal>) -> Result<Coins> {
        let mut out = Coins::new();
        for (denom, amount) in self.iter() {
            out.set_amount(denom, f(amount)?);
        }
        Ok(out)
    }

    /// Whether every entry of `self` is ≤ the matching entry of `other`.
    #[must_use]
    pub fn is_all_lte(&self, other: &Coins) -> bool {
        self.iter().all(|(denom, amount)| amount <= other.amount_of(denom))
    }

    /// Whether every entry is strictly positive.
    #[must_use]
    pub fn is_all_positive(&self) -> bool {
        self.0.values().all(|a| *a > Decimal::ZERO)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Denominations present, in sorted order.
    pub fn denoms(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// `(denom, amount)` pairs in sorted denomination order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, Decimal)> {
        self.0.iter().map(|(d, a)| (d.as_str(), *a))
    }

    /// Whether the set of denominations equals `denoms` exactly.
    #[must_use]
    pub fn has_exact_denoms(&self, denoms: &[Denom]) -> bool {
        self.0.len() == denoms.len() && denoms.iter().all(|d| self.0.contains_key(d))
    }
}

impl From<Coin> for Coins {
    fn from(coin: Coin) -> Self {
        Coins::from_pairs([(coin.denom, coin.amount)])
    }
}

impl fmt::Display for Coins {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (denom, amount) in self.iter() {
            if !first {
                f.write_str(",")?;
            }
            write!(f, "{amount}{denom}")?;
            first = false;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(n: i64) -> Decimal {
        Decimal::new(n, 0)
    }

    #[test]
    fn zero_entries_are_dropped() {
        let mut coins = Coins::new();
        coins.add_amount("res", dec(5)).unwrap();
        coins.add_amount("res", dec(-5)).unwrap();
        assert!(coins.is_empty());
        assert_eq!(coins.amount_of("res"), Decimal::ZERO);
        assert!(Coins::from_pairs([("res", Decimal::ZERO)]).is_empty());
    }

    #[test]
    fn overflow_is_an_error() {
        let mut coins = Coins::from_pairs([("res", Decimal::MAX)]);
        assert!(matches!(
            coins.add_amount("res", dec(1)),
            Err(BondsError::PricingOverflow { .. })
        ));
        assert_eq!(coins.amount_of("res"), Decimal::MAX);
        assert!(coins.checked_plus(&coins.clone()).is_err());
    }

    #[test]
    fn plus_and_checked_minus() {
        let a = Coins::from_pairs([("res1", dec(10)), ("res2", dec(4))]);
        let b = Coins::from_pairs([("res1", dec(3))]);
        let sum = a.checked_plus(&b).unwrap();
        assert_eq!(sum.amount_of("res1"), dec(13));
        assert_eq!(sum.amount_of("res2"), dec(4));

        let diff = a.checked_minus(&b).unwrap();
        assert_eq!(diff.amount_of("res1"), dec(7));
        assert!(b.checked_minus(&a).is_none());
    }

    #[test]
    fn try_map_amounts_stops_at_the_first_error() {
        let coins = Coins::from_pairs([("res1", dec(10)), ("res2", dec(4))]);
        let halved = coins.try_map_amounts(|a| Ok(a / dec(2))).unwrap();
        assert_eq!(halved.amount_of("res1"), dec(5));
        assert_eq!(halved.amount_of("res2"), dec(2));
        let failed = coins.try_map_amounts(|a| {
            a.checked_mul(Decimal::MAX)
                .ok_or_else(|| BondsError::overflow("scale"))
        });
        assert!(matches!(failed, Err(BondsError::PricingOverflow { .. })));
    }

    #[test]
    fn is_all_lte_checks_every_denom() {
        let max = Coins::from_pairs([("res1", dec(10)), ("res2", dec(10))]);
        let ok = Coins::from_pairs([("res1", dec(10)), ("res2", dec(9))]);
        let over = Coins::from_pairs([("res1", dec(1)), ("res2", dec(11))]);
        let foreign = Coins::from_pairs([("res3", dec(1))]);
        assert!(ok.is_all_lte(&max));
        assert!(!over.is_all_lte(&max));
        assert!(!foreign.is_all_lte(&max));
    }

    #[test]
    fn exact_denoms() {
        let coins = Coins::from_pairs([("res1", dec(1)), ("res2", dec(1))]);
        assert!(coins.has_exact_denoms(&["res2".into(), "res1".into()]));
        assert!(!coins.has_exact_denoms(&["res1".into()]));
    }

    #[test]
    fn display_is_sorted() {
        let coins = Coins::from_pairs([("zzz", dec(2)), ("aaa", dec(1))]);
        assert_eq!(coins.to_string(), "1aaa,2zzz");
        assert_eq!(Coin::new("abc", dec(10)).to_string(), "10abc");
    }

    #[test]
    fn coins_serde_roundtrip() {
        let coins = Coins::from_pairs([("res1", Decimal::new(12345, 2))]);
        let json = serde_json::to_string(&coins).unwrap();
        let back: Coins = serde_json::from_str(&json).unwrap();
        assert_eq!(coins, back);
    }
}
