//! Host-facing engine: owns every store and drives the block loop.
//!
//! ## Block lifecycle
//!
//! ```text
//! deliver(msg)* → end_block() → [tick every batch → settle due batches]
//! ```
//!
//! Transactions either fully apply or fail with no state change. At the end
//! of each block every open batch counts down one block in `BondDid` order;
//! due batches settle before any order can enter the next batch.
//!
//! A settlement that fails (always an internal invariant breach) rolls the
//! ledger, bond and batch back to their pre-settlement state and halts the
//! bond; every later operation on it fails with
//! [`BondsError::BondHalted`].

use std::collections::{BTreeMap, BTreeSet};

use openbond_ingress::{BondRegistry, Holder, OrderAccumulator, ReserveLedger};
use openbond_pricing::{CurveState, is_on_grid};
use openbond_types::{
    AccountDid, Batch, BatchSeq, Bond, BondDid, BondsError, BondsMsg, Coins, EngineConfig,
    MsgBuy, MsgCreateBond, MsgEditBond, MsgSell, MsgSwap, Result, SettlementReport,
    is_valid_denom,
};
use rust_decimal::Decimal;
use tracing::{debug, error, info};

use crate::{
    engine::SettlementEngine, history::ReportHistory, supply_conservation::SupplyConservation,
};

/// The bonding-curve batch settlement engine.
pub struct BondsEngine {
    config: EngineConfig,
    registry: BondRegistry,
    ledger: ReserveLedger,
    accumulator: OrderAccumulator,
    conservation: SupplyConservation,
    history: ReportHistory,
    /// Most recently settled batch per bond, with cancellations marked.
    last_batches: BTreeMap<BondDid, Batch>,
    halted: BTreeSet<BondDid>,
    height: u64,
}

impl BondsEngine {
    /// Create an engine with a validated config.
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        info!(
            token_precision = config.token_precision,
            reserve_precision = config.reserve_precision,
            max_orders = config.max_orders_per_batch,
            "Bonds engine started"
        );
        Ok(Self {
            registry: BondRegistry::new(config.clone()),
            ledger: ReserveLedger::new(),
            accumulator: OrderAccumulator::new(config.clone()),
            conservation: SupplyConservation::new(),
            history: ReportHistory::new(config.report_history_limit),
            last_batches: BTreeMap::new(),
            halted: BTreeSet::new(),
            height: 0,
            config,
        })
    }

    // -----------------------------------------------------------------------
    // Funding
    // -----------------------------------------------------------------------

    /// Credit an account from outside the engine.
    ///
    /// # Errors
    /// `Validation` for a malformed denom, a non-positive or off-grid
    /// amount, or a bond token (bond tokens are only minted by buys).
    pub fn deposit(&mut self, account: &AccountDid, denom: &str, amount: Decimal) -> Result<()> {
        self.check_funding(account, denom, amount)?;
        let holder = Holder::Account(account.clone());
        self.ledger.credit(&holder, denom, amount)?;
        if let Err(err) = self.conservation.record_deposit(denom, amount) {
            self.ledger.debit(&holder, denom, amount)?;
            return Err(err);
        }
        debug!(account = %account, denom, amount = %amount, "Deposit");
        Ok(())
    }

    /// Debit an account to outside the engine.
    ///
    /// # Errors
    /// As [`Self::deposit`], plus `InsufficientBalance`.
    pub fn withdraw(&mut self, account: &AccountDid, denom: &str, amount: Decimal) -> Result<()> {
        self.check_funding(account, denom, amount)?;
        let holder = Holder::Account(account.clone());
        self.ledger.debit(&holder, denom, amount)?;
        if let Err(err) = self.conservation.record_withdrawal(denom, amount) {
            self.ledger.credit(&holder, denom, amount)?;
            return Err(err);
        }
        debug!(account = %account, denom, amount = %amount, "Withdrawal");
        Ok(())
    }

    fn check_funding(&self, account: &AccountDid, denom: &str, amount: Decimal) -> Result<()> {
        if !account.is_valid() {
            return Err(BondsError::validation(format!("invalid account DID: {account}")));
        }
        if !is_valid_denom(denom) {
            return Err(BondsError::validation(format!("invalid denom: {denom}")));
        }
        if self.registry.is_bond_token(denom) {
            return Err(BondsError::validation(format!(
                "{denom} is a bond token and cannot be funded externally"
            )));
        }
        if amount <= Decimal::ZERO || !is_on_grid(amount, self.config.reserve_precision) {
            return Err(BondsError::validation(format!("invalid amount: {amount}")));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Transactions
    // -----------------------------------------------------------------------

    /// Register a bond and open its first batch.
    pub fn create_bond(&mut self, msg: &MsgCreateBond) -> Result<()> {
        if self.conservation.tracks(&msg.token) {
            return Err(BondsError::DuplicateToken(msg.token.clone()));
        }
        let bond = self.registry.create_bond(msg)?;
        self.accumulator.open_batch(bond);
        Ok(())
    }

    pub fn edit_bond(&mut self, msg: &MsgEditBond) -> Result<()> {
        self.ensure_active(&msg.bond_did)?;
        self.registry.edit_bond(msg)?;
        Ok(())
    }

    /// Admit a buy into the bond's open batch. Returns its sequence.
    pub fn buy(&mut self, msg: &MsgBuy) -> Result<u64> {
        self.ensure_active(&msg.bond_did)?;
        let bond = self.registry.bond(&msg.bond_did)?;
        let curve = self.registry.curve(&msg.bond_did)?;
        self.accumulator
            .submit_buy(bond, &curve, &mut self.ledger, msg)
    }

    /// Admit a sell into the bond's open batch. Returns its sequence.
    pub fn sell(&mut self, msg: &MsgSell) -> Result<u64> {
        self.ensure_active(&msg.bond_did)?;
        let bond = self.registry.bond(&msg.bond_did)?;
        let curve = self.registry.curve(&msg.bond_did)?;
        self.accumulator
            .submit_sell(bond, &curve, &mut self.ledger, msg)
    }

    /// Admit a swap into the bond's open batch. Returns its sequence.
    pub fn swap(&mut self, msg: &MsgSwap) -> Result<u64> {
        self.ensure_active(&msg.bond_did)?;
        let bond = self.registry.bond(&msg.bond_did)?;
        let curve = self.registry.curve(&msg.bond_did)?;
        self.accumulator
            .submit_swap(bond, &curve, &mut self.ledger, msg)
    }

    /// Dispatch any message. Orders return their batch sequence.
    pub fn deliver(&mut self, msg: &BondsMsg) -> Result<Option<u64>> {
        match msg {
            BondsMsg::CreateBond(m) => self.create_bond(m).map(|()| None),
            BondsMsg::EditBond(m) => self.edit_bond(m).map(|()| None),
            BondsMsg::Buy(m) => self.buy(m).map(Some),
            BondsMsg::Sell(m) => self.sell(m).map(Some),
            BondsMsg::Swap(m) => self.swap(m).map(Some),
        }
    }

    fn ensure_active(&self, did: &BondDid) -> Result<()> {
        if self.halted.contains(did) {
            return Err(BondsError::BondHalted(did.clone()));
        }
        self.registry.bond(did).map(|_| ())
    }

    // -----------------------------------------------------------------------
    // Block loop
    // -----------------------------------------------------------------------

    /// Close the current block: count every open batch down and settle the
    /// due ones. Returns the reports of the batches settled.
    pub fn end_block(&mut self) -> Vec<SettlementReport> {
        self.height += 1;
        let dids: Vec<BondDid> = self
            .accumulator
            .bond_dids()
            .filter(|did| !self.halted.contains(*did))
            .cloned()
            .collect();

        let mut reports = Vec::new();
        for did in dids {
            match self.advance(&did) {
                Ok(Some(report)) => reports.push(report),
                Ok(None) => {}
                Err(err) => {
                    error!(
                        bond = %did,
                        height = self.height,
                        error = %err,
                        fatal = err.is_fatal(),
                        "Settlement failed, bond halted"
                    );
                    self.halted.insert(did);
                }
            }
        }
        reports
    }

    fn advance(&mut self, did: &BondDid) -> Result<Option<SettlementReport>> {
        if !self.accumulator.tick(did)? {
            return Ok(None);
        }
        let bond = self.registry.bond(did)?.clone();
        let batch = self.accumulator.take_batch(&bond)?;
        if batch.is_empty() {
            return Ok(None);
        }

        let snapshot = self.ledger.snapshot(&settlement_holders(&bond, &batch));
        let mut settling = batch.clone();
        match self.settle(&bond, &mut settling) {
            Ok(report) => {
                self.last_batches.insert(did.clone(), settling);
                Ok(Some(report))
            }
            Err(err) => {
                self.ledger.restore(snapshot);
                self.registry.restore(bond);
                self.accumulator.restore(batch);
                Err(err)
            }
        }
    }

    fn settle(&mut self, bond: &Bond, batch: &mut Batch) -> Result<SettlementReport> {
        let curve = self.registry.curve(&bond.bond_did)?;
        let settled = SettlementEngine::new(bond, &curve, &self.config).settle(
            batch,
            &mut self.ledger,
            self.height,
        )?;

        self.registry
            .set_state(&bond.bond_did, settled.state.supply, settled.state.reserve)?;
        let updated = self.registry.bond(&bond.bond_did)?;
        SupplyConservation::verify_bond(updated, &self.ledger)?;
        self.conservation.verify_reserves(updated, &self.ledger)?;

        self.history.record(settled.report.clone())?;
        Ok(settled.report)
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn bond(&self, did: &BondDid) -> Result<&Bond> {
        self.registry.bond(did)
    }

    /// The bond's open batch.
    pub fn batch(&self, did: &BondDid) -> Result<&Batch> {
        self.accumulator.batch(did)
    }

    /// The bond's most recently settled batch.
    #[must_use]
    pub fn last_batch(&self, did: &BondDid) -> Option<&Batch> {
        self.last_batches.get(did)
    }

    pub fn report(&self, did: &BondDid, seq: BatchSeq) -> Result<&SettlementReport> {
        self.history.get(did, seq)
    }

    /// The bond's most recent settlement report still held.
    #[must_use]
    pub fn latest_report(&self, did: &BondDid) -> Option<&SettlementReport> {
        self.history.latest(did)
    }

    #[must_use]
    pub fn balance(&self, account: &AccountDid, denom: &str) -> Decimal {
        self.ledger.balance(&Holder::Account(account.clone()), denom)
    }

    #[must_use]
    pub fn ledger(&self) -> &ReserveLedger {
        &self.ledger
    }

    #[must_use]
    pub fn is_halted(&self, did: &BondDid) -> bool {
        self.halted.contains(did)
    }

    #[must_use]
    pub fn height(&self) -> u64 {
        self.height
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Current per-token spot price.
    pub fn spot_price(&self, did: &BondDid) -> Result<Coins> {
        let bond = self.registry.bond(did)?;
        self.registry.curve(did)?.spot_price(&CurveState::of(bond))
    }

    /// Reserve needed to mint `amount` tokens now, before fees.
    pub fn buy_price(&self, did: &BondDid, amount: Decimal) -> Result<Coins> {
        let bond = self.registry.bond(did)?;
        self.registry
            .curve(did)?
            .buy_cost(&CurveState::of(bond), amount)
    }

    /// Reserve released by burning `amount` tokens now, before fees.
    pub fn sell_return(&self, did: &BondDid, amount: Decimal) -> Result<Coins> {
        let bond = self.registry.bond(did)?;
        self.registry
            .curve(did)?
            .sell_return(&CurveState::of(bond), amount)
    }

    /// Output of swapping `amount` of `from` into `to` now, before fees.
    pub fn swap_return(
        &self,
        did: &BondDid,
        from: &str,
        amount: Decimal,
        to: &str,
    ) -> Result<Decimal> {
        let bond = self.registry.bond(did)?;
        self.registry
            .curve(did)?
            .swap_return(&CurveState::of(bond), from, amount, to)
    }
}

/// Every ledger holder a settlement of `batch` can post to.
fn settlement_holders(bond: &Bond, batch: &Batch) -> Vec<Holder> {
    let mut holders = vec![
        Holder::Reserve(bond.bond_did.clone()),
        Holder::Escrow(bond.bond_did.clone()),
        Holder::Account(bond.fee_address.clone()),
    ];
    holders.extend(batch.accounts().into_iter().cloned().map(Holder::Account));
    holders
}

#[cfg(test)]
mod tests {
    use openbond_types::Coin;

    use super::*;

    fn dec(n: i64) -> Decimal {
        Decimal::new(n, 0)
    }

    fn alice() -> AccountDid {
        AccountDid::new("did:sov:alice")
    }

    fn engine_with_bond() -> (BondsEngine, BondDid) {
        let mut engine = BondsEngine::new(EngineConfig::default()).unwrap();
        let msg = MsgCreateBond::dummy_power();
        engine.create_bond(&msg).unwrap();
        engine.deposit(&alice(), "res", dec(10_000)).unwrap();
        (engine, msg.bond_did)
    }

    fn buy(did: &BondDid, amount: i64, max: i64) -> MsgBuy {
        MsgBuy::dummy(
            did,
            "did:sov:alice",
            Coin::new("abc", dec(amount)),
            Coins::from_pairs([("res", dec(max))]),
        )
    }

    #[test]
    fn invalid_config_rejected() {
        let config = EngineConfig {
            max_orders_per_batch: 0,
            ..EngineConfig::default()
        };
        assert!(matches!(
            BondsEngine::new(config),
            Err(BondsError::Configuration(_))
        ));
    }

    #[test]
    fn bond_tokens_cannot_be_deposited() {
        let (mut engine, _) = engine_with_bond();
        assert!(matches!(
            engine.deposit(&alice(), "abc", dec(1)),
            Err(BondsError::Validation { .. })
        ));
        // a deposited denom cannot later become a bond token
        let msg = MsgCreateBond {
            bond_did: BondDid::new("did:sov:bond2"),
            token: "res".into(),
            reserve_tokens: vec!["xyz".into()],
            ..MsgCreateBond::dummy_power()
        };
        assert!(matches!(
            engine.create_bond(&msg),
            Err(BondsError::DuplicateToken(_))
        ));
    }

    #[test]
    fn empty_batches_roll_over_silently() {
        let (mut engine, did) = engine_with_bond();
        assert!(engine.end_block().is_empty());
        assert_eq!(engine.batch(&did).unwrap().seq, BatchSeq(1));
        assert!(engine.last_batch(&did).is_none());
    }

    #[test]
    fn deliver_dispatches() {
        let (mut engine, did) = engine_with_bond();
        let seq = engine.deliver(&BondsMsg::Buy(buy(&did, 10, 100))).unwrap();
        assert_eq!(seq, Some(0));
        let reports = engine.end_block();
        assert_eq!(reports.len(), 1);
        assert_eq!(engine.bond(&did).unwrap().current_supply, dec(10));
        assert_eq!(engine.balance(&alice(), "abc"), dec(10));
        assert_eq!(engine.report(&did, BatchSeq(0)).unwrap(), &reports[0]);
        assert_eq!(engine.last_batch(&did).unwrap().buys.len(), 1);
        assert_eq!(engine.height(), 1);
    }

    #[test]
    fn price_queries() {
        let (mut engine, did) = engine_with_bond();
        engine.buy(&buy(&did, 10, 100)).unwrap();
        engine.end_block();
        let res = |n| Coins::from_pairs([("res", dec(n))]);
        assert_eq!(engine.spot_price(&did).unwrap(), res(10));
        assert_eq!(engine.buy_price(&did, dec(10)).unwrap(), res(150));
        assert_eq!(engine.sell_return(&did, dec(10)).unwrap(), res(50));
        assert!(matches!(
            engine.swap_return(&did, "res", dec(1), "abc"),
            Err(BondsError::FunctionNotAvailable { .. })
        ));
    }

    #[test]
    fn fatal_settlement_halts_and_rolls_back() {
        let (mut engine, did) = engine_with_bond();
        engine.buy(&buy(&did, 10, 100)).unwrap();
        // reserve credited behind the engine's back
        engine
            .ledger
            .credit(&Holder::Reserve(did.clone()), "res", dec(1))
            .unwrap();
        let before = engine.ledger.clone();

        assert!(engine.end_block().is_empty());
        assert!(engine.is_halted(&did));
        assert_eq!(engine.ledger, before);
        assert_eq!(engine.bond(&did).unwrap().current_supply, Decimal::ZERO);
        assert_eq!(engine.batch(&did).unwrap().buys.len(), 1);
        assert!(matches!(
            engine.buy(&buy(&did, 1, 100)),
            Err(BondsError::BondHalted(_))
        ));

        // halted bonds no longer tick
        engine.end_block();
        assert_eq!(engine.batch(&did).unwrap().seq, BatchSeq(0));
    }

    #[test]
    fn rollback_restores_participants_and_leaves_others_alone() {
        let (mut engine, did) = engine_with_bond();
        let bob = AccountDid::new("did:sov:bob");
        let fees = AccountDid::new("did:sov:fees");
        engine.deposit(&bob, "res", dec(500)).unwrap();
        engine.buy(&buy(&did, 10, 100)).unwrap();
        engine
            .ledger
            .credit(&Holder::Reserve(did.clone()), "res", dec(1))
            .unwrap();

        assert!(engine.end_block().is_empty());
        assert!(engine.is_halted(&did));
        // escrow of 100 plus the 1% fee still held for the buy
        assert_eq!(engine.balance(&alice(), "res"), dec(9899));
        assert_eq!(engine.balance(&alice(), "abc"), Decimal::ZERO);
        assert_eq!(engine.balance(&fees, "res"), Decimal::ZERO);
        assert_eq!(engine.balance(&bob, "res"), dec(500));
        assert_eq!(engine.ledger().total("abc"), Decimal::ZERO);
        assert_eq!(engine.ledger().total("res"), dec(10_501));
    }

    #[test]
    fn deposit_overflow_leaves_no_trace() {
        let (mut engine, _) = engine_with_bond();
        engine.deposit(&alice(), "xyz", Decimal::MAX).unwrap();
        engine.withdraw(&alice(), "xyz", Decimal::MAX).unwrap();
        // the ledger could hold it but the running deposit total cannot
        assert!(matches!(
            engine.deposit(&alice(), "xyz", dec(1)),
            Err(BondsError::PricingOverflow { .. })
        ));
        assert_eq!(engine.balance(&alice(), "xyz"), Decimal::ZERO);
        assert_eq!(engine.ledger().total("xyz"), Decimal::ZERO);
    }

    #[test]
    fn withdraw_respects_balance() {
        let (mut engine, _) = engine_with_bond();
        engine.withdraw(&alice(), "res", dec(4000)).unwrap();
        assert_eq!(engine.balance(&alice(), "res"), dec(6000));
        assert!(matches!(
            engine.withdraw(&alice(), "res", dec(6001)),
            Err(BondsError::InsufficientBalance { .. })
        ));
    }
}
