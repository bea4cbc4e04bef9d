//! Order accumulator: admits buy, sell and swap orders into each bond's
//! open [`Batch`] and counts down the batch window.
//!
//! ## Admission
//!
//! Every check runs before any state changes. An admitted order's funds
//! move from the trader's account into the bond's batch escrow, the order
//! is appended in submission order, and the batch's running totals and
//! price estimates are updated. A rejected order leaves no trace.

use std::collections::BTreeMap;

use openbond_pricing::{
    BondCurve, CurveState, check_sanity,
    checked::{add, div, mul, sub},
    is_on_grid, round_up,
};
use openbond_types::{
    BaseOrder, Batch, BatchSeq, Bond, BondDid, BondsError, BuyOrder, Coin, Coins, EngineConfig, MsgBuy,
    MsgSell, MsgSwap, Result, SellOrder, SwapOrder,
};
use rust_decimal::Decimal;
use tracing::debug;

use crate::{FeeSplit, Holder, ReserveLedger};

/// Per-token price estimate for a batch with the given totals: the average
/// surplus buy cost, the average surplus sell return, or spot when the
/// sides are equal. Empty when no price is defined yet.
pub fn estimate_batch_price(
    curve: &BondCurve,
    state: &CurveState,
    total_buy: Decimal,
    total_sell: Decimal,
) -> Result<Coins> {
    let estimate = if total_buy > total_sell {
        let surplus = total_buy - total_sell;
        curve
            .buy_cost(state, surplus)
            .and_then(|cost| cost.try_map_amounts(|a| div(a, surplus)))
    } else if total_sell > total_buy {
        let surplus = total_sell - total_buy;
        curve
            .sell_return(state, surplus)
            .and_then(|ret| ret.try_map_amounts(|a| div(a, surplus)))
    } else {
        curve.spot_price(state)
    };
    match estimate {
        Err(BondsError::ZeroSupply) => Ok(Coins::new()),
        other => other,
    }
}

/// Owns the open batch of every bond.
#[derive(Debug, Clone, Default)]
pub struct OrderAccumulator {
    batches: BTreeMap<BondDid, Batch>,
    config: EngineConfig,
}

impl OrderAccumulator {
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        Self {
            batches: BTreeMap::new(),
            config,
        }
    }

    /// Open the first batch of a newly created bond.
    pub fn open_batch(&mut self, bond: &Bond) {
        self.batches.insert(
            bond.bond_did.clone(),
            Batch::new(bond.bond_did.clone(), BatchSeq(0), bond.batch_blocks),
        );
    }

    pub fn batch(&self, did: &BondDid) -> Result<&Batch> {
        self.batches
            .get(did)
            .ok_or_else(|| BondsError::UnknownBond(did.clone()))
    }

    fn batch_mut(&mut self, did: &BondDid) -> Result<&mut Batch> {
        self.batches
            .get_mut(did)
            .ok_or_else(|| BondsError::UnknownBond(did.clone()))
    }

    fn check_capacity(&self, batch: &Batch) -> Result<()> {
        if batch.order_count() >= self.config.max_orders_per_batch {
            return Err(BondsError::BatchFull);
        }
        Ok(())
    }

    fn check_token_amount(&self, bond: &Bond, amount: &Coin) -> Result<()> {
        if amount.denom != bond.token {
            return Err(BondsError::validation(format!(
                "amount denom {} is not the bond token {}",
                amount.denom, bond.token
            )));
        }
        if !is_on_grid(amount.amount, self.config.token_precision) {
            return Err(BondsError::validation(format!(
                "amount {} has more than {} decimal places",
                amount.amount, self.config.token_precision
            )));
        }
        check_order_limit(bond, amount)
    }

    // -----------------------------------------------------------------------
    // Buy
    // -----------------------------------------------------------------------

    /// Admit a buy. Escrows `max_prices` plus the transaction fee on them.
    ///
    /// # Errors
    /// `Validation`, `OrderLimitExceeded`, `MaxSupplyExceeded`,
    /// `UnknownReserveToken`, `BatchFull`, `SlippageExceeded`,
    /// `SanityBound`, `InsufficientBalance`.
    pub fn submit_buy(
        &mut self,
        bond: &Bond,
        curve: &BondCurve,
        ledger: &mut ReserveLedger,
        msg: &MsgBuy,
    ) -> Result<u64> {
        // 1. Basic and token checks
        msg.validate_basic()?;
        self.check_token_amount(bond, &msg.amount)?;
        let amount = msg.amount.amount;

        // 2. Max supply, counting every buy already in the batch
        let batch = self.batch(&bond.bond_did)?;
        let requested = add(add(bond.current_supply, batch.total_buy_amount)?, amount)?;
        if requested > bond.max_supply {
            return Err(BondsError::MaxSupplyExceeded {
                requested,
                max: bond.max_supply,
            });
        }

        // 3. Max prices name exactly the reserve tokens
        if let Some(foreign) = msg.max_prices.denoms().find(|d| !bond.has_reserve_token(d)) {
            return Err(BondsError::UnknownReserveToken(foreign.to_string()));
        }
        if !msg.max_prices.has_exact_denoms(&bond.reserve_tokens) {
            return Err(BondsError::validation(
                "max prices must cover every reserve token",
            ));
        }
        if msg
            .max_prices
            .iter()
            .any(|(_, p)| !is_on_grid(p, self.config.reserve_precision))
        {
            return Err(BondsError::validation(format!(
                "max prices have more than {} decimal places",
                self.config.reserve_precision
            )));
        }
        self.check_capacity(batch)?;

        // 4. Price checks against the projected batch
        let state = CurveState::of(bond);
        let total_buy = add(batch.total_buy_amount, amount)?;
        let total_sell = batch.total_sell_amount;
        let first_swapper_buy = curve.is_swapper() && state.supply.is_zero();
        if first_swapper_buy {
            // the first buyer's max prices become the initial reserve
            let mut projected = state.clone();
            projected.mint(amount, &msg.max_prices)?;
            check_sanity(bond, curve, &projected)?;
        } else {
            let price = estimate_batch_price(curve, &state, total_buy, total_sell)?;
            let dp = self.config.reserve_precision;
            let expected = price.try_map_amounts(|p| Ok(round_up(mul(p, amount)?, dp)))?;
            if !expected.is_all_lte(&msg.max_prices) {
                return Err(BondsError::SlippageExceeded {
                    price: expected.to_string(),
                    max: msg.max_prices.to_string(),
                });
            }
            if total_buy > total_sell {
                let surplus = sub(total_buy, total_sell)?;
                let mut projected = state.clone();
                projected.mint(surplus, &curve.buy_cost(&state, surplus)?)?;
                check_sanity(bond, curve, &projected)?;
            }
        }

        // 5. Escrow
        let escrow = FeeSplit::added(
            &msg.max_prices,
            bond.tx_fee_percentage,
            self.config.reserve_precision,
        )?
        .total()?;
        ledger.transfer_coins(
            &Holder::Account(msg.buyer_did.clone()),
            &Holder::Escrow(bond.bond_did.clone()),
            &escrow,
        )?;

        // 6. Append
        let price = estimate_batch_price(curve, &state, total_buy, total_sell)?;
        let batch = self.batch_mut(&bond.bond_did)?;
        let sequence = batch.take_sequence();
        batch.buys.push(BuyOrder {
            base: BaseOrder::new(sequence, msg.buyer_did.clone(), msg.amount.clone()),
            max_prices: msg.max_prices.clone(),
            escrow: escrow.clone(),
        });
        batch.total_buy_amount = total_buy;
        batch.buy_prices = price.clone();
        batch.sell_prices = price;

        debug!(
            bond = %bond.bond_did,
            batch = %batch.seq,
            sequence,
            buyer = %msg.buyer_did,
            amount = %amount,
            escrow = %escrow,
            "Buy order admitted"
        );
        Ok(sequence)
    }

    // -----------------------------------------------------------------------
    // Sell
    // -----------------------------------------------------------------------

    /// Admit a sell. Escrows the bond tokens being sold.
    ///
    /// # Errors
    /// `Validation`, `SellsNotAllowed`, `OrderLimitExceeded`,
    /// `SupplyUnderflow`, `BatchFull`, `InsufficientReserve`, `SanityBound`,
    /// `InsufficientBalance`.
    pub fn submit_sell(
        &mut self,
        bond: &Bond,
        curve: &BondCurve,
        ledger: &mut ReserveLedger,
        msg: &MsgSell,
    ) -> Result<u64> {
        // 1. Basic and token checks
        msg.validate_basic()?;
        if !bond.allow_sells {
            return Err(BondsError::SellsNotAllowed);
        }
        self.check_token_amount(bond, &msg.amount)?;
        let amount = msg.amount.amount;

        // 2. Supply must cover every sell in the batch
        let batch = self.batch(&bond.bond_did)?;
        let total_sell = add(batch.total_sell_amount, amount)?;
        if total_sell > bond.current_supply {
            return Err(BondsError::SupplyUnderflow {
                requested: total_sell,
                available: bond.current_supply,
            });
        }
        self.check_capacity(batch)?;

        // 3. Projected curve state
        let state = CurveState::of(bond);
        let total_buy = batch.total_buy_amount;
        if total_sell > total_buy {
            let surplus = total_sell - total_buy;
            let mut projected = state.clone();
            projected.burn(surplus, &curve.sell_return(&state, surplus)?)?;
            check_sanity(bond, curve, &projected)?;
        }

        // 4. Escrow
        ledger.transfer(
            &Holder::Account(msg.seller_did.clone()),
            &Holder::Escrow(bond.bond_did.clone()),
            &bond.token,
            amount,
        )?;

        // 5. Append
        let price = estimate_batch_price(curve, &state, total_buy, total_sell)?;
        let batch = self.batch_mut(&bond.bond_did)?;
        let sequence = batch.take_sequence();
        batch.sells.push(SellOrder {
            base: BaseOrder::new(sequence, msg.seller_did.clone(), msg.amount.clone()),
        });
        batch.total_sell_amount = total_sell;
        batch.buy_prices = price.clone();
        batch.sell_prices = price;

        debug!(
            bond = %bond.bond_did,
            batch = %batch.seq,
            sequence,
            seller = %msg.seller_did,
            amount = %amount,
            "Sell order admitted"
        );
        Ok(sequence)
    }

    // -----------------------------------------------------------------------
    // Swap
    // -----------------------------------------------------------------------

    /// Admit a swap between two reserve tokens of a swapper bond. Escrows
    /// the source amount.
    ///
    /// # Errors
    /// `Validation`, `FunctionNotAvailable`, `UnknownReserveToken`,
    /// `OrderLimitExceeded`, `ZeroSupply`, `BatchFull`, `SanityBound`,
    /// `InsufficientBalance`.
    pub fn submit_swap(
        &mut self,
        bond: &Bond,
        curve: &BondCurve,
        ledger: &mut ReserveLedger,
        msg: &MsgSwap,
    ) -> Result<u64> {
        // 1. Basic checks
        msg.validate_basic()?;
        if !curve.is_swapper() {
            return Err(BondsError::FunctionNotAvailable {
                function_type: bond.function_type,
                operation: "swap",
            });
        }
        for denom in [&msg.from_token, &msg.to_token] {
            if !bond.has_reserve_token(denom) {
                return Err(BondsError::UnknownReserveToken(denom.clone()));
            }
        }
        let from = msg.from_coin();
        if !is_on_grid(from.amount, self.config.reserve_precision) {
            return Err(BondsError::validation(format!(
                "swap amount has more than {} decimal places",
                self.config.reserve_precision
            )));
        }
        check_order_limit(bond, &from)?;
        if bond.current_supply.is_zero() {
            return Err(BondsError::ZeroSupply);
        }
        let batch = self.batch(&bond.bond_did)?;
        self.check_capacity(batch)?;

        // 2. Projected reserve ratio
        let state = CurveState::of(bond);
        let out = curve.swap_return(&state, &from.denom, from.amount, &msg.to_token)?;
        let mut projected = state;
        projected.reserve.add_amount(&from.denom, from.amount)?;
        projected.reserve.add_amount(&msg.to_token, -out)?;
        check_sanity(bond, curve, &projected)?;

        // 3. Escrow
        ledger.transfer(
            &Holder::Account(msg.swapper_did.clone()),
            &Holder::Escrow(bond.bond_did.clone()),
            &from.denom,
            from.amount,
        )?;

        // 4. Append
        let batch = self.batch_mut(&bond.bond_did)?;
        let sequence = batch.take_sequence();
        batch.swaps.push(SwapOrder {
            base: BaseOrder::new(sequence, msg.swapper_did.clone(), from),
            to_token: msg.to_token.clone(),
        });

        debug!(
            bond = %bond.bond_did,
            batch = %batch.seq,
            sequence,
            swapper = %msg.swapper_did,
            from = %msg.from_token,
            to = %msg.to_token,
            amount = %msg.from_amount,
            "Swap order admitted"
        );
        Ok(sequence)
    }

    // -----------------------------------------------------------------------
    // Batch window
    // -----------------------------------------------------------------------

    /// Count one block down. Returns `true` when the batch is due.
    pub fn tick(&mut self, did: &BondDid) -> Result<bool> {
        let batch = self.batch_mut(did)?;
        batch.blocks_remaining = batch.blocks_remaining.saturating_sub(1);
        Ok(batch.blocks_remaining == 0)
    }

    /// Take a bond's batch for settlement, replacing it wholesale with a
    /// fresh batch for the next window.
    pub fn take_batch(&mut self, bond: &Bond) -> Result<Batch> {
        let batch = self.batch_mut(&bond.bond_did)?;
        let next = Batch::new(bond.bond_did.clone(), batch.seq.next(), bond.batch_blocks);
        Ok(std::mem::replace(batch, next))
    }

    /// Put a batch back (rollback of a failed settlement).
    pub fn restore(&mut self, batch: Batch) {
        self.batches.insert(batch.bond_did.clone(), batch);
    }

    /// Bond DIDs with an open batch, in ascending order.
    pub fn bond_dids(&self) -> impl Iterator<Item = &BondDid> {
        self.batches.keys()
    }
}

fn check_order_limit(bond: &Bond, amount: &Coin) -> Result<()> {
    match bond.order_quantity_limit(&amount.denom) {
        Some(limit) if amount.amount > limit => Err(BondsError::OrderLimitExceeded {
            denom: amount.denom.clone(),
            amount: amount.amount,
            limit,
        }),
        _ => Ok(()),
    }
}
