//! Batch and order types.
//!
//! Every bond has exactly one open [`Batch`]. Orders are appended in
//! submission order and stay there, with stable indices, until the batch
//! settles; the whole batch is then replaced by a fresh one.

use std::{collections::BTreeSet, fmt};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{AccountDid, BatchSeq, BondDid, Coin, Coins, Denom};

/// Why an order was cancelled at settlement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelReason {
    /// The buy would have cost more than its `max_prices`.
    Slippage,
    /// The reserve could not cover the return.
    InsufficientReserve,
    /// The fill would have moved the price out of the sanity band.
    SanityBound,
    /// The swap output rounds to nothing.
    AmountTooSmall,
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Slippage => write!(f, "slippage"),
            Self::InsufficientReserve => write!(f, "insufficient reserve"),
            Self::SanityBound => write!(f, "sanity bound"),
            Self::AmountTooSmall => write!(f, "amount too small"),
        }
    }
}

/// Which clearing path a batch takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClearingBranch {
    Equal,
    MoreBuys,
    MoreSells,
}

impl fmt::Display for ClearingBranch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Equal => write!(f, "EQUAL"),
            Self::MoreBuys => write!(f, "MORE_BUYS"),
            Self::MoreSells => write!(f, "MORE_SELLS"),
        }
    }
}

// ---------------------------------------------------------------------------
// Orders
// ---------------------------------------------------------------------------

/// Fields shared by every order kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaseOrder {
    /// Position in the batch across all order kinds (submission order).
    pub sequence: u64,
    pub account_did: AccountDid,
    pub amount: Coin,
    pub cancelled: bool,
    pub cancel_reason: Option<CancelReason>,
}

impl BaseOrder {
    #[must_use]
    pub fn new(sequence: u64, account_did: AccountDid, amount: Coin) -> Self {
        Self {
            sequence,
            account_did,
            amount,
            cancelled: false,
            cancel_reason: None,
        }
    }

    pub fn cancel(&mut self, reason: CancelReason) {
        self.cancelled = true;
        self.cancel_reason = Some(reason);
    }
}

/// A buy of `base.amount` bond tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuyOrder {
    pub base: BaseOrder,
    /// Ceiling on the total reserve cost, per reserve denomination.
    pub max_prices: Coins,
    /// Funds taken from the buyer at admission (`max_prices` plus tx fee).
    pub escrow: Coins,
}

/// A sell of `base.amount` bond tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SellOrder {
    pub base: BaseOrder,
}

/// A swap of `base.amount` (a reserve coin) into `to_token`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapOrder {
    pub base: BaseOrder,
    pub to_token: Denom,
}

// ---------------------------------------------------------------------------
// Batch
// ---------------------------------------------------------------------------

/// The open order batch of a bond.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Batch {
    pub bond_did: BondDid,
    pub seq: BatchSeq,
    pub blocks_remaining: u64,
    pub total_buy_amount: Decimal,
    pub total_sell_amount: Decimal,
    /// Estimated per-token reserve price for buyers in this batch.
    pub buy_prices: Coins,
    /// Estimated per-token reserve price for sellers in this batch.
    pub sell_prices: Coins,
    pub buys: Vec<BuyOrder>,
    pub sells: Vec<SellOrder>,
    pub swaps: Vec<SwapOrder>,
    next_sequence: u64,
}

impl Batch {
    #[must_use]
    pub fn new(bond_did: BondDid, seq: BatchSeq, blocks: u64) -> Self {
        Self {
            bond_did,
            seq,
            blocks_remaining: blocks,
            total_buy_amount: Decimal::ZERO,
            total_sell_amount: Decimal::ZERO,
            buy_prices: Coins::new(),
            sell_prices: Coins::new(),
            buys: Vec::new(),
            sells: Vec::new(),
            swaps: Vec::new(),
            next_sequence: 0,
        }
    }

    /// Hand out the next submission sequence number.
    pub fn take_sequence(&mut self) -> u64 {
        let seq = self.next_sequence;
        self.next_sequence += 1;
        seq
    }

    #[must_use]
    pub fn more_buys_than_sells(&self) -> bool {
        self.total_buy_amount > self.total_sell_amount
    }

    #[must_use]
    pub fn more_sells_than_buys(&self) -> bool {
        self.total_sell_amount > self.total_buy_amount
    }

    #[must_use]
    pub fn equal_buys_and_sells(&self) -> bool {
        self.total_buy_amount == self.total_sell_amount
    }

    #[must_use]
    pub fn branch(&self) -> ClearingBranch {
        if self.more_buys_than_sells() {
            ClearingBranch::MoreBuys
        } else if self.more_sells_than_buys() {
            ClearingBranch::MoreSells
        } else {
            ClearingBranch::Equal
        }
    }

    /// Volume that clears buy-against-sell at spot.
    #[must_use]
    pub fn matched_amount(&self) -> Decimal {
        self.total_buy_amount.min(self.total_sell_amount)
    }

    #[must_use]
    pub fn order_count(&self) -> usize {
        self.buys.len() + self.sells.len() + self.swaps.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order_count() == 0
    }

    /// Every account with an order in the batch.
    #[must_use]
    pub fn accounts(&self) -> BTreeSet<&AccountDid> {
        self.buys
            .iter()
            .map(|o| &o.base)
            .chain(self.sells.iter().map(|o| &o.base))
            .chain(self.swaps.iter().map(|o| &o.base))
            .map(|base| &base.account_did)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch() -> Batch {
        Batch::new(BondDid::new("did:sov:bond1"), BatchSeq(0), 5)
    }

    #[test]
    fn branch_selection() {
        let mut b = batch();
        assert_eq!(b.branch(), ClearingBranch::Equal);
        b.total_buy_amount = Decimal::new(10, 0);
        assert_eq!(b.branch(), ClearingBranch::MoreBuys);
        assert_eq!(b.matched_amount(), Decimal::ZERO);
        b.total_sell_amount = Decimal::new(15, 0);
        assert_eq!(b.branch(), ClearingBranch::MoreSells);
        assert_eq!(b.matched_amount(), Decimal::new(10, 0));
        b.total_buy_amount = Decimal::new(15, 0);
        assert!(b.equal_buys_and_sells());
    }

    #[test]
    fn sequences_are_monotonic() {
        let mut b = batch();
        assert_eq!(b.take_sequence(), 0);
        assert_eq!(b.take_sequence(), 1);
        assert_eq!(b.take_sequence(), 2);
    }

    #[test]
    fn accounts_are_deduplicated() {
        let mut b = batch();
        let order = |who: &str| {
            BaseOrder::new(0, AccountDid::new(who), Coin::new("abc", Decimal::ONE))
        };
        b.buys.push(BuyOrder {
            base: order("did:sov:bob"),
            max_prices: Coins::new(),
            escrow: Coins::new(),
        });
        b.sells.push(SellOrder {
            base: order("did:sov:alice"),
        });
        b.swaps.push(SwapOrder {
            base: order("did:sov:bob"),
            to_token: "res".into(),
        });
        let accounts: Vec<_> = b.accounts().into_iter().map(ToString::to_string).collect();
        assert_eq!(accounts, vec!["did:sov:alice", "did:sov:bob"]);
    }

    #[test]
    fn cancel_records_reason() {
        let mut order = BaseOrder::new(
            0,
            AccountDid::new("did:sov:alice"),
            Coin::new("abc", Decimal::ONE),
        );
        order.cancel(CancelReason::Slippage);
        assert!(order.cancelled);
        assert_eq!(order.cancel_reason, Some(CancelReason::Slippage));
        assert_eq!(CancelReason::InsufficientReserve.to_string(), "insufficient reserve");
    }
}
