//! Supply conservation invariant checker.
//!
//! Invariants enforced after every settlement:
//! ```text
//! ∀ deposited denom: Σ ledger balances == Σ deposits − Σ withdrawals
//! ∀ bond:            ledger reserve == CurrentReserve
//!                    batch escrow   == ∅
//!                    Σ token balances == CurrentSupply
//! ```
//!
//! A violation is a [`BondsError::ConservationViolation`]: a correctness bug
//! that halts the affected bond.

use std::collections::BTreeMap;

use openbond_ingress::{Holder, ReserveLedger};
use openbond_types::{Bond, BondsError, Denom, Result};
use rust_decimal::Decimal;

/// Tracks external deposits and withdrawals per denomination and checks
/// the ledger against them.
#[derive(Debug, Clone, Default)]
pub struct SupplyConservation {
    /// Total deposits per denom since genesis.
    deposits: BTreeMap<Denom, Decimal>,
    /// Total withdrawals per denom since genesis.
    withdrawals: BTreeMap<Denom, Decimal>,
}

impl SupplyConservation {
    #[must_use]
    pub fn new() -> Self {
        Self {
            deposits: BTreeMap::new(),
            withdrawals: BTreeMap::new(),
        }
    }

    /// Add `amount` to the deposits of `denom`.
    ///
    /// # Errors
    /// `PricingOverflow` if the running total leaves the decimal range;
    /// nothing is recorded.
    pub fn record_deposit(&mut self, denom: &str, amount: Decimal) -> Result<()> {
        accumulate(&mut self.deposits, denom, amount)
    }

    /// Add `amount` to the withdrawals of `denom`. Errors as
    /// [`Self::record_deposit`].
    pub fn record_withdrawal(&mut self, denom: &str, amount: Decimal) -> Result<()> {
        accumulate(&mut self.withdrawals, denom, amount)
    }

    /// Expected ledger total for a denom: deposits − withdrawals. Both are
    /// non-negative, so the difference cannot overflow.
    #[must_use]
    pub fn expected_supply(&self, denom: &str) -> Decimal {
        self.total_deposits(denom) - self.total_withdrawals(denom)
    }

    /// Whether `denom` has ever been deposited.
    #[must_use]
    pub fn tracks(&self, denom: &str) -> bool {
        self.deposits.contains_key(denom)
    }

    #[must_use]
    pub fn total_deposits(&self, denom: &str) -> Decimal {
        self.deposits.get(denom).copied().unwrap_or(Decimal::ZERO)
    }

    #[must_use]
    pub fn total_withdrawals(&self, denom: &str) -> Decimal {
        self.withdrawals.get(denom).copied().unwrap_or(Decimal::ZERO)
    }

    /// Verify that the ledger total of `denom` matches deposits −
    /// withdrawals.
    ///
    /// # Errors
    /// Returns [`BondsError::ConservationViolation`] if actual ≠ expected.
    pub fn verify(&self, denom: &str, actual_supply: Decimal) -> Result<()> {
        let expected = self.expected_supply(denom);
        if actual_supply != expected {
            return Err(BondsError::ConservationViolation {
                reason: format!(
                    "denom {denom}: ledger total {actual_supply} != expected {expected} \
                     (deposits={}, withdrawals={})",
                    self.total_deposits(denom),
                    self.total_withdrawals(denom),
                ),
            });
        }
        Ok(())
    }

    /// Verify every deposited reserve denomination of `bond`.
    pub fn verify_reserves(&self, bond: &Bond, ledger: &ReserveLedger) -> Result<()> {
        for denom in bond.reserve_tokens.iter().filter(|d| self.tracks(d)) {
            self.verify(denom, ledger.total(denom))?;
        }
        Ok(())
    }

    /// Verify that the ledger agrees with the bond's recorded state after
    /// its batch settled.
    ///
    /// # Errors
    /// Returns [`BondsError::ConservationViolation`] if the reserve holder
    /// differs from `CurrentReserve`, the batch escrow is not empty, or the
    /// token total differs from `CurrentSupply`.
    pub fn verify_bond(bond: &Bond, ledger: &ReserveLedger) -> Result<()> {
        let reserve = ledger.holder_coins(&Holder::Reserve(bond.bond_did.clone()));
        if reserve != bond.current_reserve {
            return Err(BondsError::ConservationViolation {
                reason: format!(
                    "bond {}: ledger reserve {reserve} != current reserve {}",
                    bond.bond_did, bond.current_reserve
                ),
            });
        }

        let escrow = ledger.holder_coins(&Holder::Escrow(bond.bond_did.clone()));
        if !escrow.is_empty() {
            return Err(BondsError::ConservationViolation {
                reason: format!("bond {}: escrow not empty after settlement: {escrow}", bond.bond_did),
            });
        }

        let issued = ledger.total(&bond.token);
        if issued != bond.current_supply {
            return Err(BondsError::ConservationViolation {
                reason: format!(
                    "bond {}: {} issued {issued} != current supply {}",
                    bond.bond_did, bond.token, bond.current_supply
                ),
            });
        }
        Ok(())
    }
}

fn accumulate(totals: &mut BTreeMap<Denom, Decimal>, denom: &str, amount: Decimal) -> Result<()> {
    let current = totals.get(denom).copied().unwrap_or(Decimal::ZERO);
    let next = current
        .checked_add(amount)
        .ok_or_else(|| BondsError::overflow(format!("{denom} running total {current} + {amount}")))?;
    totals.insert(denom.to_string(), next);
    Ok(())
}
