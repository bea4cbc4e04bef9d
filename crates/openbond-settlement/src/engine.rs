//! Batch settlement.
//!
//! Settlement is a fold over the batch's orders (buys, then sells, then
//! swaps, each in submission order) carrying the curve accumulator
//! `(supply, reserve)`:
//!
//! 1. The first `min(total buys, total sells)` units of each side clear
//!    against each other at the pre-batch spot price without moving the
//!    curve
//! 2. Remaining units are priced on the accumulator, so every order sees
//!    the supply change of the orders ahead of it
//! 3. The net matched flows are folded into the accumulator
//! 4. Swaps run against the resulting reserves
//!
//! An order that cannot be filled is cancelled with a [`CancelReason`] and
//! its escrow refunded; the rest of the batch proceeds. The postings of a
//! single order are applied atomically.

use openbond_ingress::{FeeSplit, Holder, Posting, ReserveLedger};
use openbond_pricing::{BondCurve, CurveState, check_sanity, round_down, round_up};
use openbond_types::{
    BaseOrder, Batch, Bond, BondsError, BuyOrder, CancelReason, Coin, Coins, EngineConfig, Fill,
    OrderKind, OrderOutcome, OrderReport, Result, SellOrder, SettlementReport, SwapOrder,
};
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use crate::determinism::compute_report_root;

/// Outcome of settling one batch: the report and the bond's new curve
/// state.
#[derive(Debug, Clone)]
pub struct SettledBatch {
    pub report: SettlementReport,
    pub state: CurveState,
}

/// Running state of the settlement fold.
struct Fold {
    acc: CurveState,
    spot: Coins,
    /// Matched units still open to the side being processed.
    slots: Decimal,
    matched_bought: Decimal,
    matched_sold: Decimal,
    /// Reserve paid in / out for matched units.
    matched_in: Coins,
    matched_out: Coins,
    fees: Coins,
    orders: Vec<OrderReport>,
}

/// Settles the batch of one bond against the ledger.
pub struct SettlementEngine<'a> {
    bond: &'a Bond,
    curve: &'a BondCurve,
    precision: u32,
}

impl<'a> SettlementEngine<'a> {
    #[must_use]
    pub fn new(bond: &'a Bond, curve: &'a BondCurve, config: &EngineConfig) -> Self {
        Self {
            bond,
            curve,
            precision: config.reserve_precision,
        }
    }

    /// Settle `batch` at block `height`.
    ///
    /// Cancelled orders are marked on `batch`. The ledger receives every
    /// fill and refund; the caller writes the returned state back to the
    /// bond.
    ///
    /// # Errors
    /// Only on internal failures (ledger shortfalls, pricing overflow).
    /// Constraint violations cancel the offending order instead.
    pub fn settle(
        &self,
        batch: &mut Batch,
        ledger: &mut ReserveLedger,
        height: u64,
    ) -> Result<SettledBatch> {
        let before = CurveState::of(self.bond);
        let spot = match self.curve.spot_price(&before) {
            Err(BondsError::ZeroSupply) => Coins::new(),
            other => other?,
        };
        let mut fold = Fold {
            acc: before.clone(),
            spot,
            slots: batch.matched_amount(),
            matched_bought: Decimal::ZERO,
            matched_sold: Decimal::ZERO,
            matched_in: Coins::new(),
            matched_out: Coins::new(),
            fees: Coins::new(),
            orders: Vec::with_capacity(batch.order_count()),
        };

        // 1. Buys
        for order in &mut batch.buys {
            let report = self.settle_buy(&mut fold, ledger, order)?;
            fold.orders.push(report);
        }

        // 2. Sells match only what the buys actually filled
        fold.slots = fold.matched_bought;
        for order in &mut batch.sells {
            let report = self.settle_sell(&mut fold, ledger, order)?;
            fold.orders.push(report);
        }

        // 3. Net matched flows
        let net_reserve = fold
            .matched_in
            .checked_minus(&fold.matched_out)
            .ok_or_else(|| {
                BondsError::Internal(format!(
                    "matched payouts {} exceed matched payments {}",
                    fold.matched_out, fold.matched_in
                ))
            })?;
        let net_supply = fold.matched_bought - fold.matched_sold;
        fold.acc.mint(net_supply, &net_reserve)?;

        // 4. Swaps
        for order in &mut batch.swaps {
            let report = self.settle_swap(&mut fold, ledger, order)?;
            fold.orders.push(report);
        }

        if fold.acc.supply > self.bond.max_supply {
            return Err(BondsError::Internal(format!(
                "settled supply {} above max supply {}",
                fold.acc.supply, self.bond.max_supply
            )));
        }

        // 5. Report
        let mut report = SettlementReport {
            bond_did: batch.bond_did.clone(),
            seq: batch.seq,
            height,
            branch: batch.branch(),
            spot_prices: fold.spot,
            buy_prices: batch.buy_prices.clone(),
            sell_prices: batch.sell_prices.clone(),
            orders: fold.orders,
            supply_before: before.supply,
            supply_after: fold.acc.supply,
            reserve_before: before.reserve,
            reserve_after: fold.acc.reserve.clone(),
            fees_collected: fold.fees,
            report_root: [0; 32],
        };
        report.report_root = compute_report_root(&report);

        info!(
            bond = %report.bond_did,
            batch = %report.seq,
            branch = %report.branch,
            filled = report.filled_count(),
            cancelled = report.cancelled_count(),
            supply = %report.supply_after,
            reserve = %report.reserve_after,
            report_root = hex::encode(report.report_root),
            "Batch settled"
        );

        Ok(SettledBatch {
            report,
            state: fold.acc,
        })
    }

    // -----------------------------------------------------------------------
    // Buys
    // -----------------------------------------------------------------------

    fn settle_buy(
        &self,
        fold: &mut Fold,
        ledger: &mut ReserveLedger,
        order: &mut BuyOrder,
    ) -> Result<OrderReport> {
        let amount = order.base.amount.amount;
        let matched = fold.slots.min(amount);
        let surplus = amount - matched;

        let matched_cost = self.at_spot(&fold.spot, matched, round_up)?;
        let curve_cost = if surplus.is_zero() {
            Coins::new()
        } else if self.curve.is_swapper() && fold.acc.supply.is_zero() {
            // the first buyer of a swapper sets its reserves
            order.max_prices.clone()
        } else {
            self.curve.buy_cost(&fold.acc, surplus)?
        };
        let cost = matched_cost.checked_plus(&curve_cost)?;
        let mut next = fold.acc.clone();
        next.mint(surplus, &curve_cost)?;

        let verdict = if cost.is_all_lte(&order.max_prices) {
            self.sanity_verdict(&next, surplus)?
        } else {
            Some(CancelReason::Slippage)
        };
        if let Some(reason) = verdict {
            let refund = order.escrow.clone();
            return self.cancel(ledger, OrderKind::Buy, &mut order.base, reason, refund);
        }

        let split = FeeSplit::added(&cost, self.bond.tx_fee_percentage, self.precision)?;
        let charged = split.total()?;
        let refund = order.escrow.checked_minus(&charged).ok_or_else(|| {
            BondsError::Internal(format!(
                "buy {}: escrow {} below cost plus fee {charged}",
                order.base.sequence, order.escrow
            ))
        })?;

        let buyer = Holder::Account(order.base.account_did.clone());
        let escrow = self.escrow();
        let mut postings = split.postings(&escrow, &self.reserve(), &self.fee_holder());
        postings.extend(Posting::transfer_coins(&escrow, &buyer, &refund));
        postings.push(Posting::mint(&buyer, &self.bond.token, amount));
        ledger.apply(&postings)?;

        fold.acc = next;
        fold.slots -= matched;
        fold.matched_bought += matched;
        fold.matched_in = fold.matched_in.checked_plus(&matched_cost)?;
        fold.fees = fold.fees.checked_plus(&split.fee)?;

        debug!(
            bond = %self.bond.bond_did,
            sequence = order.base.sequence,
            buyer = %order.base.account_did,
            matched = %matched,
            curve = %surplus,
            cost = %cost,
            fee = %split.fee,
            "Buy filled"
        );

        Ok(filled(
            OrderKind::Buy,
            &order.base,
            Fill {
                matched,
                curve: surplus,
                reserve: split.principal,
                fee: split.fee,
                received: Coin::new(self.bond.token.clone(), amount).into(),
                refund,
            },
        ))
    }

    // -----------------------------------------------------------------------
    // Sells
    // -----------------------------------------------------------------------

    fn settle_sell(
        &self,
        fold: &mut Fold,
        ledger: &mut ReserveLedger,
        order: &mut SellOrder,
    ) -> Result<OrderReport> {
        let amount = order.base.amount.amount;
        let escrowed: Coins = order.base.amount.clone().into();
        let matched = fold.slots.min(amount);
        let surplus = amount - matched;

        let matched_return = self.at_spot(&fold.spot, matched, round_down)?;
        let Some((curve_return, next)) = self.sell_on_curve(&fold.acc, surplus)? else {
            return self.cancel(
                ledger,
                OrderKind::Sell,
                &mut order.base,
                CancelReason::InsufficientReserve,
                escrowed,
            );
        };
        if let Some(reason) = self.sanity_verdict(&next, surplus)? {
            return self.cancel(ledger, OrderKind::Sell, &mut order.base, reason, escrowed);
        }

        let proceeds = matched_return.checked_plus(&curve_return)?;
        let split = FeeSplit::deducted(&proceeds, self.bond.exit_fee_percentage, self.precision)?;

        let seller = Holder::Account(order.base.account_did.clone());
        let mut postings = vec![Posting::burn(&self.escrow(), &self.bond.token, amount)];
        postings.extend(split.postings(&self.reserve(), &seller, &self.fee_holder()));
        ledger.apply(&postings)?;

        fold.acc = next;
        fold.slots -= matched;
        fold.matched_sold += matched;
        fold.matched_out = fold.matched_out.checked_plus(&matched_return)?;
        fold.fees = fold.fees.checked_plus(&split.fee)?;

        debug!(
            bond = %self.bond.bond_did,
            sequence = order.base.sequence,
            seller = %order.base.account_did,
            matched = %matched,
            curve = %surplus,
            proceeds = %proceeds,
            fee = %split.fee,
            "Sell filled"
        );

        Ok(filled(
            OrderKind::Sell,
            &order.base,
            Fill {
                matched,
                curve: surplus,
                reserve: proceeds,
                fee: split.fee,
                received: split.principal,
                refund: Coins::new(),
            },
        ))
    }

    /// Burn `delta` on the accumulator. `None` if the reserve cannot cover
    /// the return.
    fn sell_on_curve(
        &self,
        acc: &CurveState,
        delta: Decimal,
    ) -> Result<Option<(Coins, CurveState)>> {
        let attempt = self.curve.sell_return(acc, delta).and_then(|ret| {
            let mut next = acc.clone();
            next.burn(delta, &ret)?;
            Ok((ret, next))
        });
        match attempt {
            Ok(done) => Ok(Some(done)),
            Err(BondsError::InsufficientReserve { .. } | BondsError::SupplyUnderflow { .. }) => {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    // -----------------------------------------------------------------------
    // Swaps
    // -----------------------------------------------------------------------

    fn settle_swap(
        &self,
        fold: &mut Fold,
        ledger: &mut ReserveLedger,
        order: &mut SwapOrder,
    ) -> Result<OrderReport> {
        let from = order.base.amount.clone();
        let to = order.to_token.clone();
        let escrowed: Coins = from.clone().into();

        // Sell leg pays the exit fee on the input, buy leg the tx fee on
        // the output.
        let input = FeeSplit::deducted(&escrowed, self.bond.exit_fee_percentage, self.precision)?;
        let net_in = input.principal.amount_of(&from.denom);
        let out = self.curve.swap_return(&fold.acc, &from.denom, net_in, &to)?;
        if out.is_zero() {
            return self.cancel(
                ledger,
                OrderKind::Swap,
                &mut order.base,
                CancelReason::AmountTooSmall,
                escrowed,
            );
        }
        if out >= fold.acc.reserve.amount_of(&to) {
            return self.cancel(
                ledger,
                OrderKind::Swap,
                &mut order.base,
                CancelReason::InsufficientReserve,
                escrowed,
            );
        }

        let mut next = fold.acc.clone();
        next.reserve.add_amount(&from.denom, net_in)?;
        next.reserve.add_amount(&to, -out)?;
        if let Some(reason) = self.sanity_verdict(&next, from.amount)? {
            return self.cancel(ledger, OrderKind::Swap, &mut order.base, reason, escrowed);
        }

        let output = FeeSplit::deducted(
            &Coin::new(to.clone(), out).into(),
            self.bond.tx_fee_percentage,
            self.precision,
        )?;

        let swapper = Holder::Account(order.base.account_did.clone());
        let reserve = self.reserve();
        let fee_holder = self.fee_holder();
        let mut postings = input.postings(&self.escrow(), &reserve, &fee_holder);
        postings.extend(output.postings(&reserve, &swapper, &fee_holder));
        ledger.apply(&postings)?;

        let fee = input.fee.checked_plus(&output.fee)?;
        fold.acc = next;
        fold.fees = fold.fees.checked_plus(&fee)?;

        debug!(
            bond = %self.bond.bond_did,
            sequence = order.base.sequence,
            swapper = %order.base.account_did,
            from = %from,
            to = %to,
            out = %out,
            "Swap filled"
        );

        Ok(filled(
            OrderKind::Swap,
            &order.base,
            Fill {
                matched: Decimal::ZERO,
                curve: Decimal::ZERO,
                reserve: Coins::from_pairs([(from.denom.clone(), from.amount), (to.clone(), out)]),
                fee,
                received: output.principal,
                refund: Coins::new(),
            },
        ))
    }

    // -----------------------------------------------------------------------
    // Shared
    // -----------------------------------------------------------------------

    /// `Some(SanityBound)` if a fill that moved the curve leaves `next`
    /// outside the sanity band.
    fn sanity_verdict(&self, next: &CurveState, moved: Decimal) -> Result<Option<CancelReason>> {
        if moved.is_zero() {
            return Ok(None);
        }
        match check_sanity(self.bond, self.curve, next) {
            Ok(()) => Ok(None),
            Err(BondsError::SanityBound { .. }) => Ok(Some(CancelReason::SanityBound)),
            Err(e) => Err(e),
        }
    }

    /// Value of `units` at the spot price, rounded with `round`.
    fn at_spot(
        &self,
        spot: &Coins,
        units: Decimal,
        round: fn(Decimal, u32) -> Decimal,
    ) -> Result<Coins> {
        let mut out = Coins::new();
        if units.is_zero() {
            return Ok(out);
        }
        for (denom, price) in spot.iter() {
            let value = price
                .checked_mul(units)
                .ok_or_else(|| BondsError::overflow(format!("{price} * {units}")))?;
            out.add_amount(denom, round(value, self.precision))?;
        }
        Ok(out)
    }

    fn cancel(
        &self,
        ledger: &mut ReserveLedger,
        kind: OrderKind,
        base: &mut BaseOrder,
        reason: CancelReason,
        refund: Coins,
    ) -> Result<OrderReport> {
        ledger.transfer_coins(
            &self.escrow(),
            &Holder::Account(base.account_did.clone()),
            &refund,
        )?;
        base.cancel(reason);

        warn!(
            bond = %self.bond.bond_did,
            kind = %kind,
            sequence = base.sequence,
            account = %base.account_did,
            reason = %reason,
            "Order cancelled at settlement"
        );

        Ok(OrderReport {
            kind,
            sequence: base.sequence,
            account_did: base.account_did.clone(),
            amount: base.amount.clone(),
            outcome: OrderOutcome::Cancelled { reason, refund },
        })
    }

    fn escrow(&self) -> Holder {
        Holder::Escrow(self.bond.bond_did.clone())
    }

    fn reserve(&self) -> Holder {
        Holder::Reserve(self.bond.bond_did.clone())
    }

    fn fee_holder(&self) -> Holder {
        Holder::Account(self.bond.fee_address.clone())
    }
}

fn filled(kind: OrderKind, base: &BaseOrder, fill: Fill) -> OrderReport {
    OrderReport {
        kind,
        sequence: base.sequence,
        account_did: base.account_did.clone(),
        amount: base.amount.clone(),
        outcome: OrderOutcome::Filled(fill),
    }
}

#[cfg(test)]
mod tests {
    use openbond_ingress::{BondRegistry, OrderAccumulator};
    use openbond_types::{
        AccountDid, BondDid, ClearingBranch, FunctionParameters, MsgBuy, MsgCreateBond,
        MsgEditBond, MsgSell, MsgSwap,
    };

    use super::*;

    fn dec(n: i64) -> Decimal {
        Decimal::new(n, 0)
    }

    fn res(n: i64) -> Coins {
        Coins::from_pairs([("res", dec(n))])
    }

    fn account(who: &str) -> Holder {
        Holder::Account(AccountDid::new(who))
    }

    struct Fixture {
        config: EngineConfig,
        registry: BondRegistry,
        accumulator: OrderAccumulator,
        ledger: ReserveLedger,
        did: BondDid,
    }

    impl Fixture {
        fn new(msg: MsgCreateBond) -> Self {
            let config = EngineConfig::default();
            let mut registry = BondRegistry::new(config.clone());
            let mut accumulator = OrderAccumulator::new(config.clone());
            accumulator.open_batch(registry.create_bond(&msg).unwrap());
            Self {
                config,
                registry,
                accumulator,
                ledger: ReserveLedger::new(),
                did: msg.bond_did,
            }
        }

        fn bond(&self) -> Bond {
            self.registry.bond(&self.did).unwrap().clone()
        }

        /// Put the bond on its curve at `supply`, held by `holder`.
        fn seed(&mut self, supply: i64, holder: &str) {
            let curve = self.registry.curve(&self.did).unwrap();
            let reserve = curve.reserve_at_supply(dec(supply)).unwrap();
            for (denom, amount) in reserve.iter() {
                self.ledger
                    .credit(&Holder::Reserve(self.did.clone()), denom, amount)
                    .unwrap();
            }
            let token = self.bond().token;
            self.ledger.credit(&account(holder), &token, dec(supply)).unwrap();
            self.registry.set_state(&self.did, dec(supply), reserve).unwrap();
        }

        fn buy(&mut self, who: &str, amount: i64, max: Coins) {
            self.ledger
                .credit(&account(who), "res", max.amount_of("res") * dec(2))
                .unwrap();
            let bond = self.bond();
            let curve = self.registry.curve(&self.did).unwrap();
            let msg = MsgBuy::dummy(&self.did, who, Coin::new(bond.token.clone(), dec(amount)), max);
            self.accumulator
                .submit_buy(&bond, &curve, &mut self.ledger, &msg)
                .unwrap();
        }

        fn sell(&mut self, who: &str, amount: i64) {
            let bond = self.bond();
            let curve = self.registry.curve(&self.did).unwrap();
            let msg = MsgSell {
                bond_did: self.did.clone(),
                seller_did: AccountDid::new(who),
                amount: Coin::new(bond.token.clone(), dec(amount)),
            };
            self.accumulator
                .submit_sell(&bond, &curve, &mut self.ledger, &msg)
                .unwrap();
        }

        fn settle(&mut self) -> (Batch, SettledBatch) {
            let bond = self.bond();
            let curve = self.registry.curve(&self.did).unwrap();
            let mut batch = self.accumulator.take_batch(&bond).unwrap();
            let settled = SettlementEngine::new(&bond, &curve, &self.config)
                .settle(&mut batch, &mut self.ledger, 1)
                .unwrap();
            self.registry
                .set_state(&self.did, settled.state.supply, settled.state.reserve.clone())
                .unwrap();
            (batch, settled)
        }

        /// Settle a first swapper buy that sets the reserves to `max`.
        fn provide_liquidity(&mut self, max: &Coins) {
            for (denom, amount) in max.iter() {
                self.ledger.credit(&account("did:sov:lp"), denom, amount * dec(2)).unwrap();
            }
            let bond = self.bond();
            let curve = self.registry.curve(&self.did).unwrap();
            let msg = MsgBuy::dummy(&self.did, "did:sov:lp", Coin::new("swp", dec(100)), max.clone());
            self.accumulator
                .submit_buy(&bond, &curve, &mut self.ledger, &msg)
                .unwrap();
            self.settle();
        }

        fn swap(&mut self, who: &str, amount: Decimal, from: &str, to: &str) {
            self.ledger.credit(&account(who), from, amount).unwrap();
            let bond = self.bond();
            let curve = self.registry.curve(&self.did).unwrap();
            let msg = MsgSwap {
                bond_did: self.did.clone(),
                swapper_did: AccountDid::new(who),
                from_amount: amount,
                from_token: from.into(),
                to_token: to.into(),
            };
            self.accumulator
                .submit_swap(&bond, &curve, &mut self.ledger, &msg)
                .unwrap();
        }

        fn escrow_is_empty(&self) -> bool {
            self.ledger
                .holder_coins(&Holder::Escrow(self.did.clone()))
                .is_empty()
        }

        fn reserve_matches(&self) -> bool {
            self.ledger.holder_coins(&Holder::Reserve(self.did.clone()))
                == self.bond().current_reserve
        }
    }

    #[test]
    fn surplus_buys_reprice_sequentially() {
        let mut fx = Fixture::new(MsgCreateBond::dummy_power());
        fx.buy("did:sov:alice", 10, res(200));
        fx.buy("did:sov:bob", 10, res(200));
        fx.buy("did:sov:carol", 5, res(200));
        let (_, settled) = fx.settle();
        let report = &settled.report;

        let costs: Vec<Decimal> = report
            .orders
            .iter()
            .map(|o| o.outcome.fill().unwrap().reserve.amount_of("res"))
            .collect();
        assert_eq!(costs, vec![dec(50), dec(150), Decimal::new(1125, 1)]);
        assert_eq!(report.supply_after, dec(25));
        assert_eq!(report.reserve_after.amount_of("res"), Decimal::new(3125, 1));
        assert_eq!(report.fees_collected.amount_of("res"), Decimal::new(3125, 3));
        assert_eq!(
            fx.ledger.balance(&account("did:sov:fees"), "res"),
            Decimal::new(3125, 3)
        );
        assert_eq!(fx.ledger.balance(&account("did:sov:bob"), "abc"), dec(10));
        assert!(fx.escrow_is_empty());
        assert!(fx.reserve_matches());
    }

    #[test]
    fn slippage_cancels_and_refunds() {
        let mut fx = Fixture::new(MsgCreateBond::dummy_power());
        fx.buy("did:sov:alice", 10, res(60));
        // admitted at the batch average (10/token) but costs 150 in sequence
        fx.buy("did:sov:bob", 10, res(120));
        let (batch, settled) = fx.settle();

        let bob = settled.report.order(1).unwrap();
        assert_eq!(bob.outcome.cancel_reason(), Some(CancelReason::Slippage));
        assert!(batch.buys[1].base.cancelled);
        assert_eq!(fx.ledger.balance(&account("did:sov:bob"), "res"), dec(240));
        assert_eq!(fx.ledger.balance(&account("did:sov:bob"), "abc"), Decimal::ZERO);
        assert_eq!(settled.state.supply, dec(10));
        assert!(fx.escrow_is_empty());
    }

    #[test]
    fn equal_batch_moves_only_fees() {
        let mut fx = Fixture::new(MsgCreateBond::dummy_power());
        fx.seed(200, "did:sov:seller");
        fx.buy("did:sov:buyer", 100, res(30_000));
        fx.sell("did:sov:seller", 100);
        let (batch, settled) = fx.settle();

        assert_eq!(batch.branch(), ClearingBranch::Equal);
        assert_eq!(settled.state.supply, dec(200));
        assert_eq!(settled.state.reserve, res(20_000));
        // 100 units at spot 200 each way, 1% fee on both
        assert_eq!(settled.report.fees_collected, res(400));
        assert_eq!(fx.ledger.balance(&account("did:sov:seller"), "res"), dec(19_800));
        assert_eq!(fx.ledger.balance(&account("did:sov:buyer"), "abc"), dec(100));
        assert!(fx.escrow_is_empty());
        assert!(fx.reserve_matches());
    }

    #[test]
    fn more_sells_surplus_on_curve() {
        let mut fx = Fixture::new(MsgCreateBond::dummy_power());
        fx.seed(20, "did:sov:seller");
        fx.buy("did:sov:buyer", 5, res(1000));
        fx.sell("did:sov:seller", 15);
        let (_, settled) = fx.settle();

        let sell = settled.report.order(1).unwrap().outcome.fill().unwrap().clone();
        assert_eq!(sell.matched, dec(5));
        assert_eq!(sell.curve, dec(10));
        // 5 at spot 20, then R(20) - R(10) = 150 on the curve
        assert_eq!(sell.reserve, res(250));
        assert_eq!(settled.state.supply, dec(10));
        // R(10) plus the 100 matched in and out
        assert_eq!(settled.state.reserve, res(50));
        assert!(fx.escrow_is_empty());
        assert!(fx.reserve_matches());
        assert_eq!(fx.ledger.total("abc"), dec(10));
    }

    #[test]
    fn sell_short_of_reserve_is_cancelled() {
        let mut fx = Fixture::new(MsgCreateBond::dummy_power());
        fx.seed(20, "did:sov:seller");
        fx.sell("did:sov:seller", 5);
        // reserve drained below the curve after admission
        fx.registry.set_state(&fx.did, dec(20), res(100)).unwrap();
        let (_, settled) = fx.settle();

        assert_eq!(
            settled.report.order(0).unwrap().outcome.cancel_reason(),
            Some(CancelReason::InsufficientReserve)
        );
        assert_eq!(fx.ledger.balance(&account("did:sov:seller"), "abc"), dec(20));
        assert_eq!(settled.state.supply, dec(20));
        assert!(fx.escrow_is_empty());
    }

    #[test]
    fn sanity_band_cancels_curve_moves() {
        let mut fx = Fixture::new(MsgCreateBond::dummy_power());
        fx.seed(20, "did:sov:seller");
        fx.buy("did:sov:alice", 2, res(100));
        fx.buy("did:sov:bob", 1, res(100));

        // band tightened to [18, 22] while the batch is open
        let mut edit = MsgEditBond::new(fx.did.clone(), "abc", AccountDid::new("did:sov:creator"));
        edit.sanity_rate = Some(dec(20));
        edit.sanity_margin_percentage = Some(dec(10));
        fx.registry.edit_bond(&edit).unwrap();
        let (_, settled) = fx.settle();

        // spot reaches 22 after alice, 23 after bob
        assert!(settled.report.order(0).unwrap().outcome.is_filled());
        assert_eq!(
            settled.report.order(1).unwrap().outcome.cancel_reason(),
            Some(CancelReason::SanityBound)
        );
        assert_eq!(settled.state.supply, dec(22));
        assert!(fx.escrow_is_empty());
    }

    #[test]
    fn swapper_first_buy_sets_reserve_then_swaps() {
        let mut fx = Fixture::new(MsgCreateBond::dummy_swapper());
        let max = Coins::from_pairs([("resa", dec(1000)), ("resb", dec(4000))]);
        fx.provide_liquidity(&max);
        assert_eq!(fx.bond().current_reserve, max);
        assert_eq!(fx.bond().current_supply, dec(100));

        fx.swap("did:sov:trader", dec(100), "resa", "resb");
        let (_, settled) = fx.settle();

        let fill = settled.report.order(0).unwrap().outcome.fill().unwrap().clone();
        let out = fill.reserve.amount_of("resb");
        // 1% exit fee on the input, constant product on the rest
        assert_eq!(settled.state.reserve.amount_of("resa"), dec(1099));
        assert_eq!(settled.state.reserve.amount_of("resb"), dec(4000) - out);
        assert!(dec(1099) * (dec(4000) - out) >= dec(1000) * dec(4000));
        assert_eq!(
            fx.ledger.balance(&account("did:sov:trader"), "resb") + fill.fee.amount_of("resb"),
            out
        );
        assert_eq!(fill.fee.amount_of("resa"), dec(1));
        assert_eq!(settled.state.supply, dec(100));
        assert!(fx.escrow_is_empty());
        assert!(fx.reserve_matches());
    }

    #[test]
    fn swap_rounding_to_nothing_is_refunded() {
        let mut fx = Fixture::new(MsgCreateBond::dummy_swapper());
        let max = Coins::from_pairs([("resa", dec(1000)), ("resb", dec(4000))]);
        fx.provide_liquidity(&max);

        // 1000 * 0.00000001 / 4000 rounds down to zero
        let dust = Decimal::new(1, 8);
        fx.swap("did:sov:trader", dust, "resb", "resa");
        let (batch, settled) = fx.settle();

        assert_eq!(
            settled.report.order(0).unwrap().outcome.cancel_reason(),
            Some(CancelReason::AmountTooSmall)
        );
        assert!(batch.swaps[0].base.cancelled);
        assert_eq!(fx.ledger.balance(&account("did:sov:trader"), "resb"), dust);
        assert_eq!(fx.ledger.balance(&account("did:sov:trader"), "resa"), Decimal::ZERO);
        assert_eq!(settled.state.reserve, max);
        assert!(settled.report.fees_collected.is_empty());
        assert!(fx.escrow_is_empty());
        assert!(fx.reserve_matches());
    }

    #[test]
    fn swap_outside_sanity_band_is_refunded_in_full() {
        let mut fx = Fixture::new(MsgCreateBond::dummy_swapper());
        let max = Coins::from_pairs([("resa", dec(1000)), ("resb", dec(4000))]);
        fx.provide_liquidity(&max);
        fx.swap("did:sov:trader", dec(100), "resa", "resb");

        // resa/resb held to [0.225, 0.275] after admission; the swap would
        // take it to about 0.30
        let mut edit = MsgEditBond::new(fx.did.clone(), "swp", AccountDid::new("did:sov:creator"));
        edit.sanity_rate = Some(Decimal::new(25, 2));
        edit.sanity_margin_percentage = Some(dec(10));
        fx.registry.edit_bond(&edit).unwrap();
        let (_, settled) = fx.settle();

        assert_eq!(
            settled.report.order(0).unwrap().outcome.cancel_reason(),
            Some(CancelReason::SanityBound)
        );
        assert_eq!(fx.ledger.balance(&account("did:sov:trader"), "resa"), dec(100));
        assert_eq!(fx.ledger.balance(&account("did:sov:trader"), "resb"), Decimal::ZERO);
        assert_eq!(fx.ledger.balance(&account("did:sov:fees"), "resa"), Decimal::ZERO);
        assert_eq!(settled.state.reserve, max);
        assert!(fx.escrow_is_empty());
        assert!(fx.reserve_matches());
    }

    #[test]
    fn multi_reserve_power_bond_charges_every_reserve() {
        let mut fx = Fixture::new(MsgCreateBond {
            reserve_tokens: vec!["resa".into(), "resb".into()],
            ..MsgCreateBond::dummy_power()
        });
        let max = Coins::from_pairs([("resa", dec(100)), ("resb", dec(100))]);
        for denom in ["resa", "resb"] {
            fx.ledger.credit(&account("did:sov:alice"), denom, dec(200)).unwrap();
        }
        let bond = fx.bond();
        let curve = fx.registry.curve(&fx.did).unwrap();
        let msg = MsgBuy::dummy(&fx.did, "did:sov:alice", Coin::new("abc", dec(10)), max);
        fx.accumulator
            .submit_buy(&bond, &curve, &mut fx.ledger, &msg)
            .unwrap();
        let (_, settled) = fx.settle();

        let both = |amount: Decimal| Coins::from_pairs([("resa", amount), ("resb", amount)]);
        let fill = settled.report.order(0).unwrap().outcome.fill().unwrap().clone();
        // R(10) = 50 in each reserve, 1% fee on each, rest of the escrow back
        assert_eq!(fill.reserve, both(dec(50)));
        assert_eq!(fill.fee, both(Decimal::new(5, 1)));
        assert_eq!(fill.refund, both(Decimal::new(505, 1)));
        assert_eq!(settled.state.reserve, both(dec(50)));
        assert_eq!(settled.report.fees_collected, both(Decimal::new(5, 1)));
        assert_eq!(
            fx.ledger.holder_coins(&account("did:sov:alice")),
            Coins::from_pairs([
                ("abc", dec(10)),
                ("resa", Decimal::new(1495, 1)),
                ("resb", Decimal::new(1495, 1)),
            ])
        );
        assert_eq!(
            fx.ledger.holder_coins(&account("did:sov:fees")),
            both(Decimal::new(5, 1))
        );
        assert!(fx.escrow_is_empty());
        assert!(fx.reserve_matches());
    }

    #[test]
    fn fee_free_round_trip_after_matched_batch_cannot_profit() {
        let mut fx = Fixture::new(MsgCreateBond {
            function_parameters: FunctionParameters::new()
                .with("m", Decimal::new(333_333_333, 9))
                .with("n", Decimal::ONE)
                .with("c", Decimal::ZERO),
            tx_fee_percentage: Decimal::ZERO,
            exit_fee_percentage: Decimal::ZERO,
            ..MsgCreateBond::dummy_power()
        });
        fx.buy("did:sov:alice", 7, res(100));
        fx.settle();
        let on_curve = fx.bond().current_reserve.amount_of("res");

        // spot 2.333333331: the buyer pays 2.33333334, the seller gets
        // 2.33333333, and the difference stays in the reserve
        fx.buy("did:sov:bob", 1, res(100));
        fx.sell("did:sov:alice", 1);
        let (batch, _) = fx.settle();
        assert_eq!(batch.branch(), ClearingBranch::Equal);
        let dust = Decimal::new(1, 8);
        assert_eq!(fx.bond().current_reserve.amount_of("res"), on_curve + dust);

        fx.buy("did:sov:carol", 10, res(100));
        let (_, bought) = fx.settle();
        let cost = bought.report.order(0).unwrap().outcome.fill().unwrap().reserve.clone();
        fx.sell("did:sov:carol", 10);
        let (_, sold) = fx.settle();
        let proceeds = sold.report.order(0).unwrap().outcome.fill().unwrap().reserve.clone();

        assert!(proceeds.is_all_lte(&cost));
        assert_eq!(cost, Coins::from_pairs([("res", Decimal::new(3_999_999_995, 8))]));
        assert_eq!(proceeds, cost);
        assert_eq!(sold.state.reserve.amount_of("res"), on_curve + dust);
        assert!(fx.reserve_matches());
    }
}
