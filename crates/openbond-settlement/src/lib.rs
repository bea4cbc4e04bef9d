//! # openbond-settlement
//!
//! **Finality plane**: batch settlement, conservation checks, settlement
//! reports and the host-facing [`BondsEngine`].
//!
//! ## Architecture
//!
//! When a bond's batch window closes the engine:
//! 1. Settles the batch as a fold over its orders ([`SettlementEngine`])
//! 2. Writes the resulting supply and reserve back to the bond
//! 3. Checks the conservation invariants ([`SupplyConservation`])
//! 4. Commits to the outcome with a SHA-256 report root
//! 5. Records the report in a bounded history ([`ReportHistory`])
//!
//! Any failure in these steps rolls the bond back and halts it.

pub mod determinism;
pub mod engine;
pub mod history;
pub mod keeper;
pub mod supply_conservation;

pub use determinism::{compute_report_root, verify_report_root};
pub use engine::{SettledBatch, SettlementEngine};
pub use history::ReportHistory;
pub use keeper::BondsEngine;
pub use supply_conservation::SupplyConservation;
