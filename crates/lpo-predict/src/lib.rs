//! lpo-predict
//!
//! Pure prediction engine: given the state observed right before an action,
//! the action and its timing, compute the reserve and user states the ledger
//! should report right after it.
//!
//! # Layout
//!
//! - `context`: prediction inputs and the `Expected` output
//! - `book`: working copy of reserve + users with shared accrual steps
//! - `liquidity`: supply / withdraw
//! - `debt`: borrow / repay / rate swap / stable rebalance
//! - `account`: collateral flag / interest redirection / allowance
//! - `dispatch`: `ActionKind` → predictor table and `predict`
//!
//! No IO, no clock, no logging. Every predictor is a plain function and the
//! engine is `Send + Sync`.

mod account;
mod book;
mod context;
mod debt;
mod dispatch;
mod error;
mod liquidity;

pub use book::resolve_rate_mode;
pub use context::{Expected, MarketParams, PredictionInput, Timing};
pub use dispatch::{predict, PredictorFn, PredictorTable};
pub use error::{PredictError, PredictResult};
