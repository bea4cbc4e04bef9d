//! Bond definition: curve identity, fee and limit configuration, and the
//! mutable supply/reserve state.

use std::{collections::BTreeMap, fmt};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{AccountDid, BondDid, Coins, Denom, constants};

/// The family of pricing curve a bond uses. Fixed at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FunctionType {
    /// `price = m·x^n + c`
    #[serde(rename = "power_function")]
    Power,
    /// `price = a·((x−b)/√((x−b)²+c) + 1)`
    #[serde(rename = "sigmoid_function")]
    Sigmoid,
    /// Power-law curve parameterised by an initial raise and price.
    #[serde(rename = "augmented_function")]
    Augmented,
    /// Two-reserve constant-product liquidity pool.
    #[serde(rename = "swapper_function")]
    Swapper,
}

impl FunctionType {
    /// Parameter names this function type requires (and accepts).
    #[must_use]
    pub fn required_params(self) -> &'static [&'static str] {
        match self {
            Self::Power => &constants::POWER_PARAMS,
            Self::Sigmoid => &constants::SIGMOID_PARAMS,
            Self::Augmented => &constants::AUGMENTED_PARAMS,
            Self::Swapper => &[],
        }
    }

    /// Whether `count` reserve tokens are allowed for this function type.
    #[must_use]
    pub fn accepts_reserve_count(self, count: usize) -> bool {
        match self {
            Self::Swapper => count == constants::SWAPPER_RESERVE_TOKENS,
            Self::Power | Self::Sigmoid | Self::Augmented => count >= 1,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Power => "power_function",
            Self::Sigmoid => "sigmoid_function",
            Self::Augmented => "augmented_function",
            Self::Swapper => "swapper_function",
        }
    }
}

impl fmt::Display for FunctionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Named curve parameters as submitted (`"m" → 12`, `"n" → 2`, ...).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionParameters(pub BTreeMap<String, Decimal>);

impl FunctionParameters {
    #[must_use]
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(mut self, name: &str, value: Decimal) -> Self {
        self.0.insert(name.to_string(), value);
        self
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<Decimal> {
        self.0.get(name).copied()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A bond: a token issued against one or more reserve denominations along
/// a pricing curve.
///
/// `token`, `function_type`, `function_parameters` and `reserve_tokens`
/// form the curve identity and never change after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bond {
    pub bond_did: BondDid,
    pub token: Denom,
    pub name: String,
    pub description: String,
    pub creator_did: AccountDid,
    pub function_type: FunctionType,
    pub function_parameters: FunctionParameters,
    /// Reserve denominations in creation order. For swappers the order
    /// defines the reserve ratio used by the sanity check (`first/second`).
    pub reserve_tokens: Vec<Denom>,
    pub tx_fee_percentage: Decimal,
    pub exit_fee_percentage: Decimal,
    pub fee_address: AccountDid,
    pub max_supply: Decimal,
    /// Per-denomination order caps. A missing entry means unlimited.
    pub order_quantity_limits: Coins,
    /// Reference price; zero disables the sanity check.
    pub sanity_rate: Decimal,
    pub sanity_margin_percentage: Decimal,
    pub allow_sells: bool,
    pub batch_blocks: u64,
    pub current_supply: Decimal,
    pub current_reserve: Coins,
}

impl Bond {
    /// Cap for orders in `denom`, if one is configured.
    #[must_use]
    pub fn order_quantity_limit(&self, denom: &str) -> Option<Decimal> {
        let limit = self.order_quantity_limits.amount_of(denom);
        (limit > Decimal::ZERO).then_some(limit)
    }

    #[must_use]
    pub fn has_reserve_token(&self, denom: &str) -> bool {
        self.reserve_tokens.iter().any(|d| d == denom)
    }

    #[must_use]
    pub fn sanity_enabled(&self) -> bool {
        self.sanity_rate > Decimal::ZERO
    }
}

/// Test helpers.
#[cfg(any(test, feature = "test-helpers"))]
impl Bond {
    /// `price = x` power curve (`m=1, n=1, c=0`) over one reserve `res`.
    pub fn dummy_power() -> Self {
        Self {
            bond_did: BondDid::new("did:sov:bond1"),
            token: "abc".to_string(),
            name: "A B C".to_string(),
            description: "test bond".to_string(),
            creator_did: AccountDid::new("did:sov:creator"),
            function_type: FunctionType::Power,
            function_parameters: FunctionParameters::new()
                .with("m", Decimal::ONE)
                .with("n", Decimal::ONE)
                .with("c", Decimal::ZERO),
            reserve_tokens: vec!["res".to_string()],
            tx_fee_percentage: Decimal::ONE,
            exit_fee_percentage: Decimal::ONE,
            fee_address: AccountDid::new("did:sov:fees"),
            max_supply: Decimal::new(1000, 0),
            order_quantity_limits: Coins::new(),
            sanity_rate: Decimal::ZERO,
            sanity_margin_percentage: Decimal::ZERO,
            allow_sells: true,
            batch_blocks: 1,
            current_supply: Decimal::ZERO,
            current_reserve: Coins::new(),
        }
    }

    /// Two-reserve swapper bond with no supply yet.
    pub fn dummy_swapper() -> Self {
        Self {
            bond_did: BondDid::new("did:sov:swap1"),
            token: "swp".to_string(),
            function_type: FunctionType::Swapper,
            function_parameters: FunctionParameters::new(),
            reserve_tokens: vec!["resa".to_string(), "resb".to_string()],
            max_supply: Decimal::new(1_000_000, 0),
            ..Self::dummy_power()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserve_cardinality_per_function_type() {
        assert!(FunctionType::Power.accepts_reserve_count(1));
        assert!(FunctionType::Power.accepts_reserve_count(3));
        assert!(!FunctionType::Sigmoid.accepts_reserve_count(0));
        assert!(FunctionType::Swapper.accepts_reserve_count(2));
        assert!(!FunctionType::Swapper.accepts_reserve_count(1));
        assert!(!FunctionType::Swapper.accepts_reserve_count(3));
    }

    #[test]
    fn required_params() {
        assert_eq!(FunctionType::Power.required_params(), &["m", "n", "c"]);
        assert!(FunctionType::Swapper.required_params().is_empty());
    }

    #[test]
    fn order_quantity_limits() {
        let mut bond = Bond::dummy_power();
        assert_eq!(bond.order_quantity_limit("abc"), None);
        bond.order_quantity_limits = Coins::from_pairs([("abc", Decimal::new(10, 0))]);
        assert_eq!(bond.order_quantity_limit("abc"), Some(Decimal::new(10, 0)));
        assert_eq!(bond.order_quantity_limit("res"), None);
    }

    #[test]
    fn function_type_serde_names() {
        let json = serde_json::to_string(&FunctionType::Swapper).unwrap();
        assert_eq!(json, "\"swapper_function\"");
        let back: FunctionType = serde_json::from_str("\"power_function\"").unwrap();
        assert_eq!(back, FunctionType::Power);
        assert_eq!(FunctionType::Sigmoid.to_string(), "sigmoid_function");
    }

    #[test]
    fn bond_serde_roundtrip() {
        let bond = Bond::dummy_swapper();
        let json = serde_json::to_string(&bond).unwrap();
        let back: Bond = serde_json::from_str(&json).unwrap();
        assert_eq!(bond, back);
    }
}
