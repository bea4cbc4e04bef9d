//! Bond-level pricing: spot price, mint cost, burn return and swap output
//! in every reserve denomination.
//!
//! Costs and returns of integral curves run between grid points of the
//! curve. With `base = min(reserve, ⌈R(s)⌉)`, buying `Δ` costs
//! `⌈R(s+Δ)⌉ − base` and selling `Δ` returns `base − ⌈R(s−Δ)⌉`. Applied
//! sequentially this is exactly additive. Dust above `⌈R(s)⌉` stays in the
//! reserve; a shortfall below it is made up by the next buyer.

use openbond_types::{
    Bond, BondsError, Coins, Denom, EngineConfig, FunctionParameters, FunctionType, Result,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{
    checked::{add, div, mul, sub},
    curve::Curve,
    rounding::{round_down, round_up},
};

/// The `(supply, reserve)` pair pricing is evaluated against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurveState {
    pub supply: Decimal,
    pub reserve: Coins,
}

impl CurveState {
    #[must_use]
    pub fn new(supply: Decimal, reserve: Coins) -> Self {
        Self { supply, reserve }
    }

    /// The bond's current supply and reserve.
    #[must_use]
    pub fn of(bond: &Bond) -> Self {
        Self::new(bond.current_supply, bond.current_reserve.clone())
    }

    /// Record a mint of `delta` tokens paid for with `cost`.
    pub fn mint(&mut self, delta: Decimal, cost: &Coins) -> Result<()> {
        self.supply = add(self.supply, delta)?;
        self.reserve = self.reserve.checked_plus(cost)?;
        Ok(())
    }

    /// Record a burn of `delta` tokens paying out `ret`.
    pub fn burn(&mut self, delta: Decimal, ret: &Coins) -> Result<()> {
        if delta > self.supply {
            return Err(BondsError::SupplyUnderflow {
                requested: delta,
                available: self.supply,
            });
        }
        self.reserve = self
            .reserve
            .checked_minus(ret)
            .ok_or_else(|| insufficient(ret, &self.reserve))?;
        self.supply = sub(self.supply, delta)?;
        Ok(())
    }
}

fn insufficient(needed: &Coins, available: &Coins) -> BondsError {
    let (denom, amount) = needed
        .iter()
        .find(|(denom, amount)| *amount > available.amount_of(denom))
        .map_or((String::new(), Decimal::ZERO), |(d, a)| (d.to_string(), a));
    BondsError::InsufficientReserve {
        available: available.amount_of(&denom),
        denom,
        needed: amount,
    }
}

/// A bond's curve together with its reserve denominations and the
/// reserve rounding grid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BondCurve {
    curve: Curve,
    reserve_tokens: Vec<Denom>,
    precision: u32,
}

impl BondCurve {
    /// Validate and build a curve for the given reserve tokens.
    pub fn new(
        function_type: FunctionType,
        params: &FunctionParameters,
        reserve_tokens: &[Denom],
        config: &EngineConfig,
    ) -> Result<Self> {
        if !function_type.accepts_reserve_count(reserve_tokens.len()) {
            return Err(BondsError::InvalidFunctionParameters {
                reason: format!(
                    "{function_type} does not accept {} reserve token(s)",
                    reserve_tokens.len()
                ),
            });
        }
        let curve = Curve::from_parameters(function_type, params, config.max_curve_exponent)?;
        Ok(Self {
            curve,
            reserve_tokens: reserve_tokens.to_vec(),
            precision: config.reserve_precision,
        })
    }

    pub fn for_bond(bond: &Bond, config: &EngineConfig) -> Result<Self> {
        Self::new(
            bond.function_type,
            &bond.function_parameters,
            &bond.reserve_tokens,
            config,
        )
    }

    /// Reject curves that cannot be evaluated up to `max_supply`.
    pub fn check_max_supply(&self, max_supply: Decimal) -> Result<()> {
        if self.curve.is_swapper() {
            return Ok(());
        }
        self.curve
            .reserve_at(max_supply)
            .and_then(|_| self.curve.spot_at(max_supply))
            .map(|_| ())
            .map_err(|e| BondsError::InvalidFunctionParameters {
                reason: format!("curve cannot be evaluated at max supply {max_supply}: {e}"),
            })
    }

    #[must_use]
    pub fn curve(&self) -> &Curve {
        &self.curve
    }

    #[must_use]
    pub fn reserve_tokens(&self) -> &[Denom] {
        &self.reserve_tokens
    }

    #[must_use]
    pub fn precision(&self) -> u32 {
        self.precision
    }

    #[must_use]
    pub fn is_swapper(&self) -> bool {
        self.curve.is_swapper()
    }

    fn uniform(&self, amount: Decimal) -> Coins {
        Coins::uniform(&self.reserve_tokens, amount)
    }

    /// `⌈R(supply)⌉` in every reserve denomination.
    pub fn reserve_at_supply(&self, supply: Decimal) -> Result<Coins> {
        Ok(self.uniform(self.grid_reserve(supply)?))
    }

    fn grid_reserve(&self, supply: Decimal) -> Result<Decimal> {
        Ok(round_up(self.curve.reserve_at(supply)?, self.precision))
    }

    /// Per-token spot price in every reserve denomination.
    pub fn spot_price(&self, state: &CurveState) -> Result<Coins> {
        if self.is_swapper() {
            if state.supply.is_zero() {
                return Err(BondsError::ZeroSupply);
            }
            let mut out = Coins::new();
            for denom in &self.reserve_tokens {
                out.add_amount(denom, div(state.reserve.amount_of(denom), state.supply)?)?;
            }
            return Ok(out);
        }
        Ok(self.uniform(self.curve.spot_at(state.supply)?))
    }

    /// Reserve needed to mint `delta` tokens from `state`, rounded up.
    ///
    /// A zero-supply swapper has no price yet; its first buyer sets the
    /// reserves, so this returns [`BondsError::ZeroSupply`].
    pub fn buy_cost(&self, state: &CurveState, delta: Decimal) -> Result<Coins> {
        if delta.is_zero() {
            return Ok(Coins::new());
        }
        let mut out = Coins::new();
        if self.is_swapper() {
            if state.supply.is_zero() {
                return Err(BondsError::ZeroSupply);
            }
            for denom in &self.reserve_tokens {
                let share = div(mul(state.reserve.amount_of(denom), delta)?, state.supply)?;
                out.add_amount(denom, round_up(share, self.precision))?;
            }
            return Ok(out);
        }

        let target = self.grid_reserve(add(state.supply, delta)?)?;
        let base = self.grid_reserve(state.supply)?;
        for denom in &self.reserve_tokens {
            let held = state.reserve.amount_of(denom).min(base);
            out.add_amount(denom, sub(target, held)?.max(Decimal::ZERO))?;
        }
        Ok(out)
    }

    /// Reserve released by burning `delta` tokens from `state`. Swapper
    /// shares round down.
    pub fn sell_return(&self, state: &CurveState, delta: Decimal) -> Result<Coins> {
        if delta > state.supply {
            return Err(BondsError::SupplyUnderflow {
                requested: delta,
                available: state.supply,
            });
        }
        if delta.is_zero() {
            return Ok(Coins::new());
        }
        let mut out = Coins::new();
        if self.is_swapper() {
            for denom in &self.reserve_tokens {
                let share = div(mul(state.reserve.amount_of(denom), delta)?, state.supply)?;
                out.add_amount(denom, round_down(share, self.precision))?;
            }
            return Ok(out);
        }

        let target = self.grid_reserve(sub(state.supply, delta)?)?;
        let base = self.grid_reserve(state.supply)?;
        for denom in &self.reserve_tokens {
            let held = state.reserve.amount_of(denom);
            let ret = sub(held.min(base), target)?;
            if ret < Decimal::ZERO {
                return Err(BondsError::InsufficientReserve {
                    denom: denom.clone(),
                    needed: target,
                    available: held,
                });
            }
            out.add_amount(denom, ret)?;
        }
        Ok(out)
    }

    /// Constant-product output for swapping `amount_in` of `from` into `to`:
    /// `⌊reserve_to·in / (reserve_from + in)⌋`.
    pub fn swap_return(
        &self,
        state: &CurveState,
        from: &str,
        amount_in: Decimal,
        to: &str,
    ) -> Result<Decimal> {
        if !self.is_swapper() {
            return Err(BondsError::FunctionNotAvailable {
                function_type: self.curve.function_type(),
                operation: "swap",
            });
        }
        for denom in [from, to] {
            if !self.reserve_tokens.iter().any(|d| d == denom) {
                return Err(BondsError::UnknownReserveToken(denom.to_string()));
            }
        }
        let reserve_from = state.reserve.amount_of(from);
        let reserve_to = state.reserve.amount_of(to);
        if amount_in.is_zero() || reserve_to.is_zero() {
            return Ok(Decimal::ZERO);
        }
        let out = div(mul(reserve_to, amount_in)?, add(reserve_from, amount_in)?)?;
        Ok(round_down(out, self.precision))
    }

    /// The price the sanity band is checked against: the spot price in the
    /// first reserve token, or for swappers the ratio of the first reserve
    /// to the second. `None` while the price is undefined.
    pub fn sanity_price(&self, state: &CurveState) -> Result<Option<Decimal>> {
        if self.is_swapper() {
            let (Some(first), Some(second)) =
                (self.reserve_tokens.first(), self.reserve_tokens.get(1))
            else {
                return Ok(None);
            };
            let denominator = state.reserve.amount_of(second);
            if denominator.is_zero() {
                return Ok(None);
            }
            return div(state.reserve.amount_of(first), denominator).map(Some);
        }
        self.curve.spot_at(state.supply).map(Some)
    }
}
