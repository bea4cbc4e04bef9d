//! # openbond-ingress
//!
//! **Admission plane**: bond registry, reserve ledger and order admission
//! into each bond's open batch.
//!
//! ## Architecture
//!
//! Ingress sits between the message layer and settlement:
//! 1. **BondRegistry**: creates and edits bonds, owns curve identity
//! 2. **ReserveLedger**: balances per (holder, denom), atomic postings
//! 3. **OrderAccumulator**: validates orders, escrows funds, appends to
//!    the open batch and counts down the batch window
//!
//! ## Order Flow
//!
//! ```text
//! MsgBuy/MsgSell/MsgSwap → OrderAccumulator.submit_*()
//!     → ReserveLedger (account → escrow) → Batch → settlement
//! ```
//!
//! Every order in a batch has its funds held in the bond's escrow.

pub mod accumulator;
pub mod ledger;
pub mod registry;

pub use accumulator::{OrderAccumulator, estimate_batch_price};
pub use ledger::{FeeSplit, Holder, LedgerSnapshot, Posting, ReserveLedger};
pub use registry::BondRegistry;
