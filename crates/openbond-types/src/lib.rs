//! # openbond-types
//!
//! Shared types, errors, and configuration for the **OpenBond** bonding-curve
//! settlement engine.
//!
//! This crate is the leaf dependency of the workspace. It defines:
//!
//! - **Identifiers**: [`BondDid`], [`AccountDid`], [`BatchSeq`], [`Denom`]
//! - **Amounts**: [`Coin`], [`Coins`]
//! - **Bond model**: [`Bond`], [`FunctionType`], [`FunctionParameters`]
//! - **Batch model**: [`Batch`], [`BuyOrder`], [`SellOrder`], [`SwapOrder`], [`CancelReason`]
//! - **Messages**: [`MsgCreateBond`], [`MsgEditBond`], [`MsgBuy`], [`MsgSell`], [`MsgSwap`], [`BondsMsg`]
//! - **Reports**: [`SettlementReport`], [`OrderReport`], [`OrderOutcome`], [`Fill`]
//! - **Configuration**: [`EngineConfig`]
//! - **Errors**: [`BondsError`] with `BD_ERR_` prefix codes
//! - **Constants**: system-wide limits and defaults

pub mod batch;
pub mod bond;
pub mod coin;
pub mod config;
pub mod constants;
pub mod error;
pub mod ids;
pub mod msgs;
pub mod report;

// Re-export all primary types at crate root for ergonomic imports:
//   use openbond_types::{Bond, Batch, Coins, BondsError, ...};

pub use batch::*;
pub use bond::*;
pub use coin::*;
pub use config::*;
pub use error::*;
pub use ids::*;
pub use msgs::*;
pub use report::*;

// Constants are accessed via `openbond_types::constants::FOO`
// (not re-exported to avoid name collisions).
