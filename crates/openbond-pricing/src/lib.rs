//! # openbond-pricing
//!
//! **Pure deterministic bonding-curve pricing for OpenBond.**
//!
//! Pricing maps a bond's `(supply, reserve)` state to spot prices, mint
//! costs and burn returns. It has:
//!
//! - **Zero side effects**: no ledger writes, no admission logic
//! - **Deterministic output**: fixed-point `Decimal` only, no floats
//! - **Closed curve set**: power, sigmoid, augmented and swapper curves
//! - **Grid rounding**: costs round up, returns and fees round down

pub mod bond_curve;
pub mod checked;
pub mod curve;
pub mod rounding;
pub mod sanity;

pub use bond_curve::{BondCurve, CurveState};
pub use curve::{AugmentedParams, Curve, PowerParams, SigmoidParams};
pub use rounding::{is_on_grid, percentage_of, percentage_of_coins, round_down, round_up};
pub use sanity::{SanityBand, check_sanity};
