//! Determinism verification for settlement reports.
//!
//! Every replica settling the same batch against the same state must emit
//! the same [`SettlementReport`]. The `report_root` is a SHA-256 commitment
//! over the report's canonical contents so replicas can compare results
//! without exchanging full payloads.

use openbond_types::{Coin, Coins, OrderOutcome, SettlementReport};
use rust_decimal::Decimal;
use sha2::{Digest, Sha256};

const DOMAIN: &[u8] = b"openbond:report:v1:";

fn hash_decimal(hasher: &mut Sha256, value: Decimal) {
    // 5 and 5.00 must hash alike
    hasher.update(value.normalize().to_string().as_bytes());
    hasher.update(b";");
}

fn hash_coins(hasher: &mut Sha256, coins: &Coins) {
    hasher.update((coins.len() as u64).to_le_bytes());
    for (denom, amount) in coins.iter() {
        hasher.update(denom.as_bytes());
        hasher.update(b"=");
        hash_decimal(hasher, amount);
    }
}

fn hash_coin(hasher: &mut Sha256, coin: &Coin) {
    hasher.update(coin.denom.as_bytes());
    hasher.update(b"=");
    hash_decimal(hasher, coin.amount);
}

/// Compute the report root over everything in `report` except the
/// `report_root` field itself.
///
/// The root depends on:
/// - Bond, batch sequence, height and clearing branch
/// - Spot and estimated batch prices
/// - Every order outcome, in processing order
/// - Supply, reserve and fees on both sides of the batch
#[must_use]
pub fn compute_report_root(report: &SettlementReport) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(DOMAIN);
    hasher.update(report.bond_did.as_str().as_bytes());
    hasher.update(b";");
    hasher.update(report.seq.0.to_le_bytes());
    hasher.update(report.height.to_le_bytes());
    hasher.update(report.branch.to_string().as_bytes());
    hash_coins(&mut hasher, &report.spot_prices);
    hash_coins(&mut hasher, &report.buy_prices);
    hash_coins(&mut hasher, &report.sell_prices);

    hasher.update((report.orders.len() as u64).to_le_bytes());
    for order in &report.orders {
        hasher.update(order.kind.to_string().as_bytes());
        hasher.update(order.sequence.to_le_bytes());
        hasher.update(order.account_did.as_str().as_bytes());
        hasher.update(b";");
        hash_coin(&mut hasher, &order.amount);
        match &order.outcome {
            OrderOutcome::Filled(fill) => {
                hasher.update(b"F");
                hash_decimal(&mut hasher, fill.matched);
                hash_decimal(&mut hasher, fill.curve);
                hash_coins(&mut hasher, &fill.reserve);
                hash_coins(&mut hasher, &fill.fee);
                hash_coins(&mut hasher, &fill.received);
                hash_coins(&mut hasher, &fill.refund);
            }
            OrderOutcome::Cancelled { reason, refund } => {
                hasher.update(b"C");
                hasher.update(reason.to_string().as_bytes());
                hasher.update(b";");
                hash_coins(&mut hasher, refund);
            }
        }
    }

    hash_decimal(&mut hasher, report.supply_before);
    hash_decimal(&mut hasher, report.supply_after);
    hash_coins(&mut hasher, &report.reserve_before);
    hash_coins(&mut hasher, &report.reserve_after);
    hash_coins(&mut hasher, &report.fees_collected);

    let result = hasher.finalize();
    let mut root = [0u8; 32];
    root.copy_from_slice(&result);
    root
}

/// Recompute the root of `report` and compare it with the one it carries.
#[must_use]
pub fn verify_report_root(report: &SettlementReport) -> bool {
    compute_report_root(report) == report.report_root
}

#[cfg(test)]
mod tests {
    use openbond_types::*;

    use super::*;

    fn dec(n: i64) -> Decimal {
        Decimal::new(n, 0)
    }

    fn make_report() -> SettlementReport {
        let fill = Fill {
            matched: Decimal::ZERO,
            curve: dec(10),
            reserve: Coins::from_pairs([("res", dec(50))]),
            fee: Coins::from_pairs([("res", Decimal::new(5, 1))]),
            received: Coins::from_pairs([("abc", dec(10))]),
            refund: Coins::from_pairs([("res", Decimal::new(1515, 1))]),
        };
        let mut report = SettlementReport {
            bond_did: BondDid::new("did:sov:bond1"),
            seq: BatchSeq(0),
            height: 5,
            branch: ClearingBranch::MoreBuys,
            spot_prices: Coins::new(),
            buy_prices: Coins::from_pairs([("res", dec(5))]),
            sell_prices: Coins::from_pairs([("res", dec(5))]),
            orders: vec![
                OrderReport {
                    kind: OrderKind::Buy,
                    sequence: 0,
                    account_did: AccountDid::new("did:sov:alice"),
                    amount: Coin::new("abc", dec(10)),
                    outcome: OrderOutcome::Filled(fill),
                },
                OrderReport {
                    kind: OrderKind::Buy,
                    sequence: 1,
                    account_did: AccountDid::new("did:sov:bob"),
                    amount: Coin::new("abc", dec(10)),
                    outcome: OrderOutcome::Cancelled {
                        reason: CancelReason::Slippage,
                        refund: Coins::from_pairs([("res", dec(101))]),
                    },
                },
            ],
            supply_before: Decimal::ZERO,
            supply_after: dec(10),
            reserve_before: Coins::new(),
            reserve_after: Coins::from_pairs([("res", dec(50))]),
            fees_collected: Coins::from_pairs([("res", Decimal::new(5, 1))]),
            report_root: [0; 32],
        };
        report.report_root = compute_report_root(&report);
        report
    }

    #[test]
    fn same_report_same_root() {
        assert_eq!(
            compute_report_root(&make_report()),
            compute_report_root(&make_report())
        );
    }

    #[test]
    fn root_ignores_its_own_field() {
        let mut report = make_report();
        let root = report.report_root;
        report.report_root = [7; 32];
        assert_eq!(compute_report_root(&report), root);
    }

    #[test]
    fn outcome_changes_root() {
        let report = make_report();
        let mut changed = report.clone();
        changed.orders[1].outcome = OrderOutcome::Cancelled {
            reason: CancelReason::SanityBound,
            refund: Coins::from_pairs([("res", dec(101))]),
        };
        assert_ne!(compute_report_root(&report), compute_report_root(&changed));
    }

    #[test]
    fn order_matters() {
        let report = make_report();
        let mut swapped = report.clone();
        swapped.orders.reverse();
        assert_ne!(compute_report_root(&report), compute_report_root(&swapped));
    }

    #[test]
    fn trailing_zeros_do_not_matter() {
        let report = make_report();
        let mut rescaled = report.clone();
        rescaled.supply_after = Decimal::new(1000, 2);
        assert_eq!(compute_report_root(&report), compute_report_root(&rescaled));
    }

    #[test]
    fn verify_detects_tampering() {
        let mut report = make_report();
        assert!(verify_report_root(&report));
        report.supply_after = dec(11);
        assert!(!verify_report_root(&report));
    }
}
