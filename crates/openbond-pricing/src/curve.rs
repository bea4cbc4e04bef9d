//! Curve kinds and their closed-form reserve and price functions.
//!
//! For every integral curve `R(x)` is the reserve that backs a supply of
//! `x` tokens and `p(x) = R'(x)` is the spot price. Both are evaluated with
//! checked `Decimal` arithmetic only.

use openbond_types::{BondsError, FunctionParameters, FunctionType, Result};
use rust_decimal::{Decimal, prelude::ToPrimitive};
use serde::{Deserialize, Serialize};

use crate::checked::{add, div, mul, powu, sqrt, sub};

/// `p(x) = m·x^n + c`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PowerParams {
    pub m: Decimal,
    pub n: u64,
    pub c: Decimal,
}

/// `p(x) = a·((x−b)/√((x−b)²+c) + 1)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigmoidParams {
    pub a: Decimal,
    pub b: Decimal,
    pub c: Decimal,
}

/// `R(x) = R0·(x/S0)^kappa` with `R0 = d0·(1−theta)` and `S0 = d0/p0`.
///
/// `d0` is the initial raise, `p0` the initial price and `theta` the share
/// of the raise kept out of the reserve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AugmentedParams {
    pub d0: Decimal,
    pub p0: Decimal,
    pub theta: Decimal,
    pub kappa: u64,
}

impl AugmentedParams {
    fn r0(&self) -> Result<Decimal> {
        mul(self.d0, sub(Decimal::ONE, self.theta)?)
    }

    /// `x / S0 = x·p0/d0`
    fn scaled(&self, x: Decimal) -> Result<Decimal> {
        div(mul(x, self.p0)?, self.d0)
    }
}

/// A pricing curve. Swappers are not integral curves: they price against
/// the reserve they hold, so they carry no parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Curve {
    Power(PowerParams),
    Sigmoid(SigmoidParams),
    Augmented(AugmentedParams),
    Swapper,
}

fn invalid(reason: impl Into<String>) -> BondsError {
    BondsError::InvalidFunctionParameters {
        reason: reason.into(),
    }
}

fn param(params: &FunctionParameters, name: &str) -> Result<Decimal> {
    params
        .get(name)
        .ok_or_else(|| invalid(format!("missing parameter {name:?}")))
}

fn integral_param(params: &FunctionParameters, name: &str, range: (u64, u64)) -> Result<u64> {
    let value = param(params, name)?;
    let int = if value.fract().is_zero() {
        value.to_u64()
    } else {
        None
    };
    match int {
        Some(v) if (range.0..=range.1).contains(&v) => Ok(v),
        _ => Err(invalid(format!(
            "{name} must be an integer in {}..={}, got {value}",
            range.0, range.1
        ))),
    }
}

impl Curve {
    /// Build a curve from submitted parameters.
    ///
    /// The parameter names must match the function type exactly; unknown
    /// and missing names are both rejected.
    pub fn from_parameters(
        function_type: FunctionType,
        params: &FunctionParameters,
        max_exponent: u64,
    ) -> Result<Self> {
        let required = function_type.required_params();
        if let Some(unknown) = params.names().find(|n| !required.contains(n)) {
            return Err(invalid(format!(
                "unexpected parameter {unknown:?} for {function_type}"
            )));
        }

        match function_type {
            FunctionType::Power => {
                let m = param(params, "m")?;
                let n = integral_param(params, "n", (0, max_exponent))?;
                let c = param(params, "c")?;
                if m < Decimal::ZERO || c < Decimal::ZERO {
                    return Err(invalid("m and c must not be negative"));
                }
                if m.is_zero() && c.is_zero() {
                    return Err(invalid("m and c cannot both be zero"));
                }
                Ok(Self::Power(PowerParams { m, n, c }))
            }
            FunctionType::Sigmoid => {
                let a = param(params, "a")?;
                let b = param(params, "b")?;
                let c = param(params, "c")?;
                if a <= Decimal::ZERO || c <= Decimal::ZERO {
                    return Err(invalid("a and c must be positive"));
                }
                if b < Decimal::ZERO {
                    return Err(invalid("b must not be negative"));
                }
                Ok(Self::Sigmoid(SigmoidParams { a, b, c }))
            }
            FunctionType::Augmented => {
                let d0 = param(params, "d0")?;
                let p0 = param(params, "p0")?;
                let theta = param(params, "theta")?;
                let kappa = integral_param(params, "kappa", (1, max_exponent))?;
                if d0 <= Decimal::ZERO || p0 <= Decimal::ZERO {
                    return Err(invalid("d0 and p0 must be positive"));
                }
                if theta < Decimal::ZERO || theta >= Decimal::ONE {
                    return Err(invalid("theta must be in [0, 1)"));
                }
                Ok(Self::Augmented(AugmentedParams {
                    d0,
                    p0,
                    theta,
                    kappa,
                }))
            }
            FunctionType::Swapper => Ok(Self::Swapper),
        }
    }

    #[must_use]
    pub fn function_type(&self) -> FunctionType {
        match self {
            Self::Power(_) => FunctionType::Power,
            Self::Sigmoid(_) => FunctionType::Sigmoid,
            Self::Augmented(_) => FunctionType::Augmented,
            Self::Swapper => FunctionType::Swapper,
        }
    }

    #[must_use]
    pub fn is_swapper(&self) -> bool {
        matches!(self, Self::Swapper)
    }

    /// Reserve `R(x)` backing a supply of `x`.
    pub fn reserve_at(&self, x: Decimal) -> Result<Decimal> {
        match self {
            Self::Power(p) => {
                // m·x^(n+1)/(n+1) + c·x
                let exp = p.n + 1;
                let integral = div(mul(p.m, powu(x, exp)?)?, Decimal::from(exp))?;
                add(integral, mul(p.c, x)?)
            }
            Self::Sigmoid(p) => {
                let shifted = sub(x, p.b)?;
                let root = sqrt(add(mul(shifted, shifted)?, p.c)?)?;
                let root0 = sqrt(add(mul(p.b, p.b)?, p.c)?)?;
                let r = sub(mul(p.a, add(root, x)?)?, mul(p.a, root0)?)?;
                Ok(r.max(Decimal::ZERO))
            }
            Self::Augmented(p) => mul(p.r0()?, powu(p.scaled(x)?, p.kappa)?),
            Self::Swapper => Err(BondsError::FunctionNotAvailable {
                function_type: FunctionType::Swapper,
                operation: "reserve formula",
            }),
        }
    }

    /// Spot price `p(x)` per token.
    pub fn spot_at(&self, x: Decimal) -> Result<Decimal> {
        match self {
            Self::Power(p) => add(mul(p.m, powu(x, p.n)?)?, p.c),
            Self::Sigmoid(p) => {
                let shifted = sub(x, p.b)?;
                let root = sqrt(add(mul(shifted, shifted)?, p.c)?)?;
                mul(p.a, add(div(shifted, root)?, Decimal::ONE)?)
            }
            Self::Augmented(p) => {
                // kappa·R0/S0·(x/S0)^(kappa−1), with 1/S0 = p0/d0
                let slope = div(mul(mul(Decimal::from(p.kappa), p.r0()?)?, p.p0)?, p.d0)?;
                mul(slope, powu(p.scaled(x)?, p.kappa - 1)?)
            }
            Self::Swapper => Err(BondsError::FunctionNotAvailable {
                function_type: FunctionType::Swapper,
                operation: "spot formula",
            }),
        }
    }
}
