//! Messages the engine consumes.
//!
//! Each message has a stateless `validate_basic` that runs before any state
//! is touched. Checks that need the registry, the ledger or the curve live
//! in the ingress crate.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{
    AccountDid, BondDid, BondsError, Coin, Coins, Denom, FunctionParameters, FunctionType, Result,
    is_valid_denom,
};

fn check_did(label: &str, valid: bool) -> Result<()> {
    if valid {
        Ok(())
    } else {
        Err(BondsError::validation(format!("invalid {label} DID")))
    }
}

fn check_denom(label: &str, denom: &str) -> Result<()> {
    if is_valid_denom(denom) {
        Ok(())
    } else {
        Err(BondsError::validation(format!("invalid {label} denom: {denom:?}")))
    }
}

fn check_non_negative(label: &str, value: Decimal) -> Result<()> {
    if value < Decimal::ZERO {
        Err(BondsError::validation(format!("{label} must not be negative")))
    } else {
        Ok(())
    }
}

fn check_positive_coin(label: &str, coin: &Coin) -> Result<()> {
    check_denom(label, &coin.denom)?;
    if coin.is_positive() {
        Ok(())
    } else {
        Err(BondsError::validation(format!("{label} must be positive")))
    }
}

fn check_order_limits(limits: &Coins) -> Result<()> {
    for (denom, amount) in limits.iter() {
        check_denom("order quantity limit", denom)?;
        if amount <= Decimal::ZERO {
            return Err(BondsError::validation(
                "order quantity limits must be positive",
            ));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// CreateBond
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgCreateBond {
    pub bond_did: BondDid,
    pub token: Denom,
    pub name: String,
    pub description: String,
    pub creator_did: AccountDid,
    pub function_type: FunctionType,
    pub function_parameters: FunctionParameters,
    pub reserve_tokens: Vec<Denom>,
    pub tx_fee_percentage: Decimal,
    pub exit_fee_percentage: Decimal,
    pub fee_address: AccountDid,
    pub max_supply: Decimal,
    pub order_quantity_limits: Coins,
    pub sanity_rate: Decimal,
    pub sanity_margin_percentage: Decimal,
    pub allow_sells: bool,
    pub batch_blocks: u64,
}

impl MsgCreateBond {
    pub fn validate_basic(&self) -> Result<()> {
        check_did("bond", self.bond_did.is_valid())?;
        check_did("creator", self.creator_did.is_valid())?;
        check_did("fee address", self.fee_address.is_valid())?;
        check_denom("token", &self.token)?;
        if self.name.trim().is_empty() {
            return Err(BondsError::validation("name must not be empty"));
        }

        for (i, denom) in self.reserve_tokens.iter().enumerate() {
            check_denom("reserve token", denom)?;
            if *denom == self.token {
                return Err(BondsError::validation(
                    "bond token cannot be a reserve token",
                ));
            }
            if self.reserve_tokens[..i].contains(denom) {
                return Err(BondsError::validation(format!(
                    "duplicate reserve token: {denom}"
                )));
            }
        }

        check_non_negative("tx fee percentage", self.tx_fee_percentage)?;
        check_non_negative("exit fee percentage", self.exit_fee_percentage)?;
        // each share is bounded before the sum is taken
        let below_100 = |pct: Decimal| pct < Decimal::ONE_HUNDRED;
        if !below_100(self.tx_fee_percentage)
            || !below_100(self.exit_fee_percentage)
            || !below_100(self.tx_fee_percentage + self.exit_fee_percentage)
        {
            return Err(BondsError::FeeConfig {
                tx: self.tx_fee_percentage,
                exit: self.exit_fee_percentage,
            });
        }

        if self.max_supply <= Decimal::ZERO {
            return Err(BondsError::validation("max supply must be positive"));
        }
        check_order_limits(&self.order_quantity_limits)?;
        check_non_negative("sanity rate", self.sanity_rate)?;
        check_non_negative("sanity margin percentage", self.sanity_margin_percentage)?;
        if self.batch_blocks == 0 {
            return Err(BondsError::validation("batch blocks must be at least 1"));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// EditBond
// ---------------------------------------------------------------------------

/// Edits the non-critical fields of a bond. `None` leaves a field as is.
///
/// `function_type` and `reserve_tokens` exist only so that attempts to
/// change the curve identity can be rejected explicitly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgEditBond {
    pub bond_did: BondDid,
    pub token: Denom,
    pub editor_did: AccountDid,
    pub name: Option<String>,
    pub description: Option<String>,
    pub order_quantity_limits: Option<Coins>,
    pub sanity_rate: Option<Decimal>,
    pub sanity_margin_percentage: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_type: Option<FunctionType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reserve_tokens: Option<Vec<Denom>>,
}

impl MsgEditBond {
    #[must_use]
    pub fn new(bond_did: BondDid, token: impl Into<Denom>, editor_did: AccountDid) -> Self {
        Self {
            bond_did,
            token: token.into(),
            editor_did,
            name: None,
            description: None,
            order_quantity_limits: None,
            sanity_rate: None,
            sanity_margin_percentage: None,
            function_type: None,
            reserve_tokens: None,
        }
    }

    pub fn validate_basic(&self) -> Result<()> {
        check_did("bond", self.bond_did.is_valid())?;
        check_did("editor", self.editor_did.is_valid())?;
        check_denom("token", &self.token)?;
        if self.function_type.is_some() {
            return Err(BondsError::ImmutableField {
                field: "function_type",
            });
        }
        if self.reserve_tokens.is_some() {
            return Err(BondsError::ImmutableField {
                field: "reserve_tokens",
            });
        }
        if self.name.is_none()
            && self.description.is_none()
            && self.order_quantity_limits.is_none()
            && self.sanity_rate.is_none()
            && self.sanity_margin_percentage.is_none()
        {
            return Err(BondsError::NothingToEdit);
        }
        if self.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
            return Err(BondsError::validation("name must not be empty"));
        }
        if let Some(limits) = &self.order_quantity_limits {
            check_order_limits(limits)?;
        }
        if let Some(rate) = self.sanity_rate {
            check_non_negative("sanity rate", rate)?;
        }
        if let Some(margin) = self.sanity_margin_percentage {
            check_non_negative("sanity margin percentage", margin)?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Orders
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgBuy {
    pub bond_did: BondDid,
    pub buyer_did: AccountDid,
    pub amount: Coin,
    pub max_prices: Coins,
}

impl MsgBuy {
    pub fn validate_basic(&self) -> Result<()> {
        check_did("bond", self.bond_did.is_valid())?;
        check_did("buyer", self.buyer_did.is_valid())?;
        check_positive_coin("amount", &self.amount)?;
        if self.max_prices.is_empty() || !self.max_prices.is_all_positive() {
            return Err(BondsError::validation("max prices must be positive"));
        }
        for denom in self.max_prices.denoms() {
            check_denom("max price", denom)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgSell {
    pub bond_did: BondDid,
    pub seller_did: AccountDid,
    pub amount: Coin,
}

impl MsgSell {
    pub fn validate_basic(&self) -> Result<()> {
        check_did("bond", self.bond_did.is_valid())?;
        check_did("seller", self.seller_did.is_valid())?;
        check_positive_coin("amount", &self.amount)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgSwap {
    pub bond_did: BondDid,
    pub swapper_did: AccountDid,
    pub from_amount: Decimal,
    pub from_token: Denom,
    pub to_token: Denom,
}

impl MsgSwap {
    pub fn validate_basic(&self) -> Result<()> {
        check_did("bond", self.bond_did.is_valid())?;
        check_did("swapper", self.swapper_did.is_valid())?;
        check_positive_coin("from amount", &self.from_coin())?;
        check_denom("to token", &self.to_token)?;
        if self.from_token == self.to_token {
            return Err(BondsError::validation(
                "from and to tokens must be different",
            ));
        }
        Ok(())
    }

    #[must_use]
    pub fn from_coin(&self) -> Coin {
        Coin::new(self.from_token.clone(), self.from_amount)
    }
}

/// Any message the engine accepts, in transaction order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BondsMsg {
    CreateBond(MsgCreateBond),
    EditBond(MsgEditBond),
    Buy(MsgBuy),
    Sell(MsgSell),
    Swap(MsgSwap),
}

impl BondsMsg {
    pub fn validate_basic(&self) -> Result<()> {
        match self {
            Self::CreateBond(msg) => msg.validate_basic(),
            Self::EditBond(msg) => msg.validate_basic(),
            Self::Buy(msg) => msg.validate_basic(),
            Self::Sell(msg) => msg.validate_basic(),
            Self::Swap(msg) => msg.validate_basic(),
        }
    }

    #[must_use]
    pub fn bond_did(&self) -> &BondDid {
        match self {
            Self::CreateBond(msg) => &msg.bond_did,
            Self::EditBond(msg) => &msg.bond_did,
            Self::Buy(msg) => &msg.bond_did,
            Self::Sell(msg) => &msg.bond_did,
            Self::Swap(msg) => &msg.bond_did,
        }
    }
}

/// Test helpers.
#[cfg(any(test, feature = "test-helpers"))]
impl MsgCreateBond {
    /// Power curve `price = x` (`m=1, n=1, c=0`), one reserve `res`,
    /// 1% tx fee, 1% exit fee, max supply 1000, one-block batches.
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
        }
    }

    /// Swapper bond over `resa`/`resb`.
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

    /// Sigmoid curve `a=3, b=5, c=1` over one reserve `res`.
    pub fn dummy_sigmoid() -> Self {
        Self {
            bond_did: BondDid::new("did:sov:sig1"),
            token: "sig".to_string(),
            function_type: FunctionType::Sigmoid,
            function_parameters: FunctionParameters::new()
                .with("a", Decimal::new(3, 0))
                .with("b", Decimal::new(5, 0))
                .with("c", Decimal::ONE),
            ..Self::dummy_power()
        }
    }
}

#[cfg(any(test, feature = "test-helpers"))]
impl MsgBuy {
    pub fn dummy(bond_did: &BondDid, buyer: &str, amount: Coin, max_prices: Coins) -> Self {
        Self {
            bond_did: bond_did.clone(),
            buyer_did: AccountDid::new(buyer),
            amount,
            max_prices,
        }
    }
}
