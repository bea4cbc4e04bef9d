//! Reserve ledger: balances per (holder, denomination).
//!
//! Holders are trader accounts, bond reserves and per-bond batch escrows.
//! Every movement is a [`Posting`]; a set of postings is applied
//! atomically, so either all of them take effect or the ledger is
//! unchanged.

use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
};

use openbond_pricing::percentage_of_coins;
use openbond_types::{AccountDid, BondDid, BondsError, Coins, Denom, Result};
use rust_decimal::Decimal;

/// Owner of a ledger balance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Ord, PartialOrd)]
pub enum Holder {
    /// A trader, creator or fee collector account.
    Account(AccountDid),
    /// Reserve backing a bond's supply.
    Reserve(BondDid),
    /// Funds held for the orders of a bond's open batch.
    Escrow(BondDid),
}

impl fmt::Display for Holder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Account(did) => write!(f, "{did}"),
            Self::Reserve(did) => write!(f, "reserve({did})"),
            Self::Escrow(did) => write!(f, "escrow({did})"),
        }
    }
}

/// A single balance movement. `from: None` mints, `to: None` burns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Posting {
    pub from: Option<Holder>,
    pub to: Option<Holder>,
    pub denom: Denom,
    pub amount: Decimal,
}

impl Posting {
    #[must_use]
    pub fn transfer(from: &Holder, to: &Holder, denom: &str, amount: Decimal) -> Self {
        Self {
            from: Some(from.clone()),
            to: Some(to.clone()),
            denom: denom.to_string(),
            amount,
        }
    }

    #[must_use]
    pub fn mint(to: &Holder, denom: &str, amount: Decimal) -> Self {
        Self {
            from: None,
            to: Some(to.clone()),
            denom: denom.to_string(),
            amount,
        }
    }

    #[must_use]
    pub fn burn(from: &Holder, denom: &str, amount: Decimal) -> Self {
        Self {
            from: Some(from.clone()),
            to: None,
            denom: denom.to_string(),
            amount,
        }
    }

    /// One transfer per entry of `coins`.
    #[must_use]
    pub fn transfer_coins(from: &Holder, to: &Holder, coins: &Coins) -> Vec<Self> {
        coins
            .iter()
            .map(|(denom, amount)| Self::transfer(from, to, denom, amount))
            .collect()
    }
}

/// Reserve amounts split into the principal and the fee charged on them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeeSplit {
    pub principal: Coins,
    pub fee: Coins,
}

impl FeeSplit {
    /// Take `pct`% out of `amount` (sell returns, swap legs). The fee rounds
    /// down; the remainder stays with the principal.
    pub fn deducted(amount: &Coins, pct: Decimal, dp: u32) -> Result<Self> {
        let fee = percentage_of_coins(amount, pct, dp)?;
        let principal = amount.checked_minus(&fee).ok_or_else(|| {
            BondsError::Internal(format!("fee {fee} above amount {amount}"))
        })?;
        Ok(Self { principal, fee })
    }

    /// Charge `pct`% on top of `amount` (buy costs, buy escrow). The fee
    /// rounds down.
    pub fn added(amount: &Coins, pct: Decimal, dp: u32) -> Result<Self> {
        Ok(Self {
            principal: amount.clone(),
            fee: percentage_of_coins(amount, pct, dp)?,
        })
    }

    /// Principal plus fee.
    pub fn total(&self) -> Result<Coins> {
        self.principal.checked_plus(&self.fee)
    }

    /// Move the principal from `from` to `to` and the fee to `fee_to`.
    #[must_use]
    pub fn postings(&self, from: &Holder, to: &Holder, fee_to: &Holder) -> Vec<Posting> {
        let mut postings = Posting::transfer_coins(from, to, &self.principal);
        postings.extend(Posting::transfer_coins(from, fee_to, &self.fee));
        postings
    }
}

fn insufficient(holder: &Holder, denom: &str, needed: Decimal, available: Decimal) -> BondsError {
    match holder {
        Holder::Account(did) => BondsError::InsufficientBalance {
            holder: did.to_string(),
            denom: denom.to_string(),
            needed,
            available,
        },
        Holder::Reserve(_) | Holder::Escrow(_) => BondsError::InsufficientReserve {
            denom: denom.to_string(),
            needed,
            available,
        },
    }
}

fn checked_add(a: Decimal, b: Decimal) -> Result<Decimal> {
    a.checked_add(b)
        .ok_or_else(|| BondsError::overflow(format!("{a} + {b}")))
}

/// Balances of a set of holders, taken by [`ReserveLedger::snapshot`].
#[derive(Debug, Clone)]
pub struct LedgerSnapshot {
    holders: BTreeSet<Holder>,
    balances: Vec<((Holder, Denom), Decimal)>,
    totals: BTreeMap<Denom, Decimal>,
}

/// Per-(holder, denom) balance store with a running total per denom.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReserveLedger {
    balances: BTreeMap<(Holder, Denom), Decimal>,
    totals: BTreeMap<Denom, Decimal>,
}

impl ReserveLedger {
    #[must_use]
    pub fn new() -> Self {
        Self {
            balances: BTreeMap::new(),
            totals: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn balance(&self, holder: &Holder, denom: &str) -> Decimal {
        self.balances
            .get(&(holder.clone(), denom.to_string()))
            .copied()
            .unwrap_or(Decimal::ZERO)
    }

    fn holder_entries<'a>(
        &'a self,
        holder: &'a Holder,
    ) -> impl Iterator<Item = (&'a (Holder, Denom), &'a Decimal)> {
        self.balances
            .range((holder.clone(), Denom::new())..)
            .take_while(move |((h, _), _)| h == holder)
    }

    /// Every non-zero balance of `holder`.
    #[must_use]
    pub fn holder_coins(&self, holder: &Holder) -> Coins {
        Coins::from_pairs(
            self.holder_entries(holder)
                .map(|((_, denom), amount)| (denom.clone(), *amount)),
        )
    }

    /// Sum of all balances in `denom`.
    #[must_use]
    pub fn total(&self, denom: &str) -> Decimal {
        self.totals.get(denom).copied().unwrap_or(Decimal::ZERO)
    }

    /// Apply `postings` atomically.
    ///
    /// # Errors
    /// - `Validation` for a negative amount
    /// - `InsufficientBalance` / `InsufficientReserve` if any balance would
    ///   end up negative
    /// - `PricingOverflow` if a balance or a denom total leaves the decimal
    ///   range
    ///
    /// On error the ledger is unchanged.
    pub fn apply(&mut self, postings: &[Posting]) -> Result<()> {
        let mut deltas: BTreeMap<(Holder, Denom), Decimal> = BTreeMap::new();
        let mut total_deltas: BTreeMap<Denom, Decimal> = BTreeMap::new();
        for posting in postings {
            if posting.amount < Decimal::ZERO {
                return Err(BondsError::validation(format!(
                    "negative posting amount {}",
                    posting.amount
                )));
            }
            if posting.amount.is_zero() {
                continue;
            }
            let mut moves = Vec::with_capacity(2);
            if let Some(from) = &posting.from {
                moves.push((from, -posting.amount));
            }
            if let Some(to) = &posting.to {
                moves.push((to, posting.amount));
            }
            for (holder, amount) in moves {
                let delta = deltas
                    .entry((holder.clone(), posting.denom.clone()))
                    .or_insert(Decimal::ZERO);
                *delta = checked_add(*delta, amount)?;
            }
            // transfers leave the total alone
            let minted = match (&posting.from, &posting.to) {
                (None, Some(_)) => posting.amount,
                (Some(_), None) => -posting.amount,
                _ => continue,
            };
            let delta = total_deltas
                .entry(posting.denom.clone())
                .or_insert(Decimal::ZERO);
            *delta = checked_add(*delta, minted)?;
        }

        // Check every resulting balance and total before touching anything.
        let mut updated = Vec::with_capacity(deltas.len());
        for (key, delta) in deltas {
            let current = self.balances.get(&key).copied().unwrap_or(Decimal::ZERO);
            let next = checked_add(current, delta)?;
            if next < Decimal::ZERO {
                return Err(insufficient(&key.0, &key.1, -delta, current));
            }
            updated.push((key, next));
        }
        let mut totals = Vec::with_capacity(total_deltas.len());
        for (denom, delta) in total_deltas {
            let next = checked_add(self.total(&denom), delta)?;
            totals.push((denom, next));
        }

        for (key, next) in updated {
            if next.is_zero() {
                self.balances.remove(&key);
            } else {
                self.balances.insert(key, next);
            }
        }
        for (denom, next) in totals {
            if next.is_zero() {
                self.totals.remove(&denom);
            } else {
                self.totals.insert(denom, next);
            }
        }
        Ok(())
    }

    pub fn credit(&mut self, holder: &Holder, denom: &str, amount: Decimal) -> Result<()> {
        self.apply(&[Posting::mint(holder, denom, amount)])
    }

    pub fn debit(&mut self, holder: &Holder, denom: &str, amount: Decimal) -> Result<()> {
        self.apply(&[Posting::burn(holder, denom, amount)])
    }

    pub fn transfer(
        &mut self,
        from: &Holder,
        to: &Holder,
        denom: &str,
        amount: Decimal,
    ) -> Result<()> {
        self.apply(&[Posting::transfer(from, to, denom, amount)])
    }

    pub fn transfer_coins(&mut self, from: &Holder, to: &Holder, coins: &Coins) -> Result<()> {
        self.apply(&Posting::transfer_coins(from, to, coins))
    }

    /// Capture the balances of `holders` and the denom totals.
    ///
    /// [`Self::restore`] is exact only if every posting applied in between
    /// touched nothing but these holders.
    #[must_use]
    pub fn snapshot<'a>(&self, holders: impl IntoIterator<Item = &'a Holder>) -> LedgerSnapshot {
        let holders: BTreeSet<Holder> = holders.into_iter().cloned().collect();
        let balances: Vec<_> = holders
            .iter()
            .flat_map(|holder| self.holder_entries(holder))
            .map(|(key, amount)| (key.clone(), *amount))
            .collect();
        LedgerSnapshot {
            holders,
            balances,
            totals: self.totals.clone(),
        }
    }

    /// Put the snapshotted holders and totals back.
    pub fn restore(&mut self, snapshot: LedgerSnapshot) {
        for holder in &snapshot.holders {
            let stale: Vec<(Holder, Denom)> = self
                .holder_entries(holder)
                .map(|(key, _)| key.clone())
                .collect();
            for key in stale {
                self.balances.remove(&key);
            }
        }
        self.balances.extend(snapshot.balances);
        self.totals = snapshot.totals;
    }
}
