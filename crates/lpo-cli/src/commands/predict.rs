//! `lpo predict`: run the reference model on a before-state read from JSON.
//!
//! Input shape:
//!
//! ```json
//! {
//!   "reserve": { ...reserve snapshot... },
//!   "users": { "0x…": { ...user snapshot... } },
//!   "actor": "0x…",
//!   "action": { "kind": "supply", "amount": "1000" },
//!   "action_ts": 1600000001,
//!   "query_ts": 1600000001,
//!   "tx_cost": "0"
//! }
//! ```
//!
//! Market parameters come from the config entry named by `reserve.symbol`.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use lpo_config::OracleConfig;
use lpo_predict::{predict, Expected, MarketParams, PredictionInput, Timing};
use lpo_schemas::{Action, Address, ReserveSnapshot, UserReserveSnapshot, U256};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PredictRequest {
    pub reserve: ReserveSnapshot,
    pub users: BTreeMap<Address, UserReserveSnapshot>,
    pub actor: Address,
    pub action: Action,
    pub action_ts: u64,
    pub query_ts: u64,
    #[serde(default, with = "lpo_schemas::dec_u256")]
    pub tx_cost: U256,
}

pub fn predict_request(req: PredictRequest, cfg: &OracleConfig) -> Result<Expected> {
    let symbol = req.reserve.symbol.clone();
    let rc = cfg.reserve(&symbol)?;
    let market = MarketParams {
        strategy: rc.strategy.to_strategy()?,
        origination_fee: cfg.origination_fee_wad()?,
        native: rc.native,
    };
    let kind = req.action.kind();
    let input = PredictionInput {
        reserve: req.reserve,
        users: req.users,
        actor: req.actor,
        timing: Timing {
            action_ts: req.action_ts,
            query_ts: req.query_ts,
        },
        tx_cost: req.tx_cost,
        market,
    };
    predict(&req.action, &input).with_context(|| format!("PREDICTION_FAILED: {kind} on {symbol}"))
}

pub fn predict_from_file(input_path: &str, config_paths: &[String]) -> Result<()> {
    let (_, cfg) = super::load_config(config_paths)?;
    let raw = std::fs::read_to_string(input_path)
        .with_context(|| format!("read prediction input failed: {input_path}"))?;
    let req: PredictRequest =
        serde_json::from_str(&raw).context("parse prediction input json failed")?;

    let expected = predict_request(req, &cfg)?;
    println!(
        "{}",
        serde_json::to_string_pretty(&expected).context("serialize prediction failed")?
    );
    Ok(())
}
