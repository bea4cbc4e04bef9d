//! Bond registry: owns every [`Bond`], keyed by [`BondDid`].
//!
//! Creation validates the curve and fee configuration; edits are limited to
//! fields that do not change the curve identity.

use std::collections::BTreeMap;

use openbond_pricing::{BondCurve, is_on_grid};
use openbond_types::{
    Bond, BondDid, BondsError, Coins, Denom, EngineConfig, MsgCreateBond, MsgEditBond, Result,
};
use rust_decimal::Decimal;
use tracing::info;

/// Store of bond definitions and their mutable supply/reserve state.
#[derive(Debug, Clone, Default)]
pub struct BondRegistry {
    bonds: BTreeMap<BondDid, Bond>,
    /// Bond token → issuing bond.
    tokens: BTreeMap<Denom, BondDid>,
    config: EngineConfig,
}

impl BondRegistry {
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        Self {
            bonds: BTreeMap::new(),
            tokens: BTreeMap::new(),
            config,
        }
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Register a new bond with zero supply and an empty reserve.
    ///
    /// # Errors
    /// - `Validation` / `FeeConfig` from the message's basic checks
    /// - `InvalidFunctionParameters` if the curve parameters or reserve
    ///   token count don't fit the function type, or the curve can't be
    ///   evaluated at max supply
    /// - `BondAlreadyExists`, `DuplicateToken`
    pub fn create_bond(&mut self, msg: &MsgCreateBond) -> Result<&Bond> {
        // 1. Stateless checks
        msg.validate_basic()?;
        if !is_on_grid(msg.max_supply, self.config.token_precision) {
            return Err(BondsError::validation(format!(
                "max supply {} has more than {} decimal places",
                msg.max_supply, self.config.token_precision
            )));
        }

        // 2. Uniqueness
        if self.bonds.contains_key(&msg.bond_did) {
            return Err(BondsError::BondAlreadyExists(msg.bond_did.clone()));
        }
        if self.tokens.contains_key(&msg.token) {
            return Err(BondsError::DuplicateToken(msg.token.clone()));
        }

        // 3. Curve
        let curve = BondCurve::new(
            msg.function_type,
            &msg.function_parameters,
            &msg.reserve_tokens,
            &self.config,
        )?;
        curve.check_max_supply(msg.max_supply)?;

        let bond = Bond {
            bond_did: msg.bond_did.clone(),
            token: msg.token.clone(),
            name: msg.name.clone(),
            description: msg.description.clone(),
            creator_did: msg.creator_did.clone(),
            function_type: msg.function_type,
            function_parameters: msg.function_parameters.clone(),
            reserve_tokens: msg.reserve_tokens.clone(),
            tx_fee_percentage: msg.tx_fee_percentage,
            exit_fee_percentage: msg.exit_fee_percentage,
            fee_address: msg.fee_address.clone(),
            max_supply: msg.max_supply,
            order_quantity_limits: msg.order_quantity_limits.clone(),
            sanity_rate: msg.sanity_rate,
            sanity_margin_percentage: msg.sanity_margin_percentage,
            allow_sells: msg.allow_sells,
            batch_blocks: msg.batch_blocks,
            current_supply: Decimal::ZERO,
            current_reserve: Coins::new(),
        };

        info!(
            bond = %bond.bond_did,
            token = %bond.token,
            function = %bond.function_type,
            reserves = ?bond.reserve_tokens,
            max_supply = %bond.max_supply,
            "Bond created"
        );

        let did = bond.bond_did.clone();
        self.tokens.insert(bond.token.clone(), did.clone());
        self.bonds.insert(did.clone(), bond);
        self.bond(&did)
    }

    /// Apply an edit from the bond's creator.
    ///
    /// # Errors
    /// - `ImmutableField` for attempts to change token, function type or
    ///   reserve tokens
    /// - `UnknownBond`, `Unauthorized`
    /// - `NothingToEdit` if every supplied value equals the current one
    pub fn edit_bond(&mut self, msg: &MsgEditBond) -> Result<&Bond> {
        msg.validate_basic()?;
        let bond = self
            .bonds
            .get_mut(&msg.bond_did)
            .ok_or_else(|| BondsError::UnknownBond(msg.bond_did.clone()))?;
        if msg.token != bond.token {
            return Err(BondsError::ImmutableField { field: "token" });
        }
        if msg.editor_did != bond.creator_did {
            return Err(BondsError::Unauthorized);
        }

        let mut edited = bond.clone();
        if let Some(name) = &msg.name {
            edited.name.clone_from(name);
        }
        if let Some(description) = &msg.description {
            edited.description.clone_from(description);
        }
        if let Some(limits) = &msg.order_quantity_limits {
            edited.order_quantity_limits = limits.clone();
        }
        if let Some(rate) = msg.sanity_rate {
            edited.sanity_rate = rate;
        }
        if let Some(margin) = msg.sanity_margin_percentage {
            edited.sanity_margin_percentage = margin;
        }
        if edited == *bond {
            return Err(BondsError::NothingToEdit);
        }

        *bond = edited;
        info!(bond = %bond.bond_did, editor = %msg.editor_did, "Bond edited");
        Ok(&*bond)
    }

    pub fn bond(&self, did: &BondDid) -> Result<&Bond> {
        self.bonds
            .get(did)
            .ok_or_else(|| BondsError::UnknownBond(did.clone()))
    }

    pub fn bond_mut(&mut self, did: &BondDid) -> Result<&mut Bond> {
        self.bonds
            .get_mut(did)
            .ok_or_else(|| BondsError::UnknownBond(did.clone()))
    }

    /// The pricing curve of a bond.
    pub fn curve(&self, did: &BondDid) -> Result<BondCurve> {
        BondCurve::for_bond(self.bond(did)?, &self.config)
    }

    /// Overwrite a bond's supply and reserve after settlement.
    pub fn set_state(&mut self, did: &BondDid, supply: Decimal, reserve: Coins) -> Result<()> {
        let bond = self.bond_mut(did)?;
        if supply > bond.max_supply {
            return Err(BondsError::MaxSupplyExceeded {
                requested: supply,
                max: bond.max_supply,
            });
        }
        bond.current_supply = supply;
        bond.current_reserve = reserve;
        Ok(())
    }

    /// Put back a previously taken copy of a bond (rollback).
    pub fn restore(&mut self, bond: Bond) {
        self.bonds.insert(bond.bond_did.clone(), bond);
    }

    #[must_use]
    pub fn contains(&self, did: &BondDid) -> bool {
        self.bonds.contains_key(did)
    }

    /// Whether `denom` is the token of some bond.
    #[must_use]
    pub fn is_bond_token(&self, denom: &str) -> bool {
        self.tokens.contains_key(denom)
    }

    /// Bond DIDs in ascending order.
    pub fn bond_dids(&self) -> impl Iterator<Item = &BondDid> {
        self.bonds.keys()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.bonds.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bonds.is_empty()
    }
}
