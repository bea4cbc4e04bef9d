//! Settlement report types.
//!
//! A [`SettlementReport`] is emitted for every settled batch. It records the
//! outcome of each order and the bond state on both sides of the batch, and
//! commits to all of it with a SHA-256 `report_root`.

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{AccountDid, BatchSeq, BondDid, CancelReason, ClearingBranch, Coin, Coins};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderKind {
    Buy,
    Sell,
    Swap,
}

impl fmt::Display for OrderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
            Self::Swap => write!(f, "SWAP"),
        }
    }
}

/// What a filled order moved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fill {
    /// Token units cleared against the opposite side at spot.
    pub matched: Decimal,
    /// Token units priced on the curve.
    pub curve: Decimal,
    /// Reserve paid in (buys, swap input) or out (sells, swap output)
    /// before fees.
    pub reserve: Coins,
    /// Fees credited to the fee address.
    pub fee: Coins,
    /// What the trader received (bond tokens or reserve).
    pub received: Coins,
    /// Unused escrow returned to the trader.
    pub refund: Coins,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderOutcome {
    Filled(Fill),
    Cancelled { reason: CancelReason, refund: Coins },
}

impl OrderOutcome {
    #[must_use]
    pub fn is_filled(&self) -> bool {
        matches!(self, Self::Filled(_))
    }

    #[must_use]
    pub fn fill(&self) -> Option<&Fill> {
        match self {
            Self::Filled(fill) => Some(fill),
            Self::Cancelled { .. } => None,
        }
    }

    #[must_use]
    pub fn cancel_reason(&self) -> Option<CancelReason> {
        match self {
            Self::Filled(_) => None,
            Self::Cancelled { reason, .. } => Some(*reason),
        }
    }
}

/// Outcome of one order, in processing order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderReport {
    pub kind: OrderKind,
    /// Submission sequence within the batch.
    pub sequence: u64,
    pub account_did: AccountDid,
    pub amount: Coin,
    pub outcome: OrderOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementReport {
    pub bond_did: BondDid,
    pub seq: BatchSeq,
    /// Block height at which the batch settled.
    pub height: u64,
    pub branch: ClearingBranch,
    /// Spot price at the pre-batch state, used for matched volume.
    pub spot_prices: Coins,
    pub buy_prices: Coins,
    pub sell_prices: Coins,
    pub orders: Vec<OrderReport>,
    pub supply_before: Decimal,
    pub supply_after: Decimal,
    pub reserve_before: Coins,
    pub reserve_after: Coins,
    pub fees_collected: Coins,
    /// SHA-256 commitment over the canonical report contents.
    pub report_root: [u8; 32],
}

impl SettlementReport {
    #[must_use]
    pub fn filled_count(&self) -> usize {
        self.orders.iter().filter(|o| o.outcome.is_filled()).count()
    }

    #[must_use]
    pub fn cancelled_count(&self) -> usize {
        self.orders.len() - self.filled_count()
    }

    /// The report for the order with submission `sequence`.
    #[must_use]
    pub fn order(&self, sequence: u64) -> Option<&OrderReport> {
        self.orders.iter().find(|o| o.sequence == sequence)
    }
}
