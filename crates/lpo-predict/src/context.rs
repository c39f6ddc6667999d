use std::collections::BTreeMap;

use lpo_math::{InterestRateStrategy, U256};
use lpo_schemas::{Address, ReserveSnapshot, UserReserveSnapshot};
use serde::Serialize;

/// When the action executed and when the after-state is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    /// Block timestamp of the action; interest accrues up to here.
    pub action_ts: u64,
    /// Read time of the after-snapshot; current views are projected here.
    pub query_ts: u64,
}

/// Static per-reserve parameters the snapshots do not carry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarketParams {
    pub strategy: InterestRateStrategy,
    /// Origination fee as a wad fraction of the borrowed amount.
    pub origination_fee: U256,
    /// Gas is paid in this reserve's asset.
    pub native: bool,
}

/// Everything a predictor reads.
#[derive(Debug, Clone)]
pub struct PredictionInput {
    pub reserve: ReserveSnapshot,
    /// Before-snapshots of every account the action touches.
    pub users: BTreeMap<Address, UserReserveSnapshot>,
    pub actor: Address,
    pub timing: Timing,
    /// Transaction cost, native smallest units.
    pub tx_cost: U256,
    pub market: MarketParams,
}

/// Predicted after-state. `users` has the same keys as the input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Expected {
    pub reserve: ReserveSnapshot,
    pub users: BTreeMap<Address, UserReserveSnapshot>,
}
