//! Typed oracle configuration.
//!
//! ```yaml
//! oracle:
//!   skip_integrity_check: false
//!   native_repay_slack: "0.1"
//! market:
//!   origination_fee: "0.0025"
//!   gas_cost: "0.0001"
//!   block_interval_secs: 1
//! reserves:
//!   DAI:
//!     decimals: 18
//!     market_stable_rate: "0.03"
//!     strategy: { ... }
//! ```
//!
//! Rates and fractions are decimal strings (bare YAML numbers are accepted
//! too) and convert exactly to wad/ray.

use std::collections::BTreeMap;

use anyhow::{bail, Context, Result};
use lpo_math::{
    parse_units, ray, ray_from_decimal, wad_from_decimal, InterestRateStrategy, MAX_DECIMALS,
    U256,
};
use serde::{Deserialize, Deserializer, Serialize};

pub const DEFAULT_NATIVE_REPAY_SLACK: &str = "0.1";

fn default_native_repay_slack() -> String {
    DEFAULT_NATIVE_REPAY_SLACK.to_string()
}

fn default_origination_fee() -> String {
    "0.0025".to_string()
}

fn default_gas_cost() -> String {
    "0".to_string()
}

fn default_block_interval_secs() -> u64 {
    1
}

fn default_optimal_utilization() -> String {
    "0.8".to_string()
}

/// Accept `"0.08"`, `0.08` or `8` for a decimal field.
fn decimal_string<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Int(u64),
        Float(f64),
    }
    Ok(match Raw::deserialize(d)? {
        Raw::Text(s) => s,
        Raw::Int(n) => n.to_string(),
        Raw::Float(f) => f.to_string(),
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OracleConfig {
    #[serde(default)]
    pub oracle: OracleSection,
    #[serde(default)]
    pub market: MarketSection,
    #[serde(default)]
    pub reserves: BTreeMap<String, ReserveConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OracleSection {
    #[serde(default)]
    pub skip_integrity_check: bool,
    /// Extra native value attached to a full-debt repayment, human units.
    #[serde(
        default = "default_native_repay_slack",
        deserialize_with = "decimal_string"
    )]
    pub native_repay_slack: String,
}

impl Default for OracleSection {
    fn default() -> Self {
        Self {
            skip_integrity_check: false,
            native_repay_slack: default_native_repay_slack(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MarketSection {
    /// Fraction of the borrowed amount charged at origination.
    #[serde(default = "default_origination_fee", deserialize_with = "decimal_string")]
    pub origination_fee: String,
    /// Per-transaction cost charged by the paper ledger, native human units.
    #[serde(default = "default_gas_cost", deserialize_with = "decimal_string")]
    pub gas_cost: String,
    /// Paper ledger clock step per transaction.
    #[serde(default = "default_block_interval_secs")]
    pub block_interval_secs: u64,
}

impl Default for MarketSection {
    fn default() -> Self {
        Self {
            origination_fee: default_origination_fee(),
            gas_cost: default_gas_cost(),
            block_interval_secs: default_block_interval_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReserveConfig {
    pub decimals: u32,
    /// Gas is paid in this asset and it is sent as transaction value.
    #[serde(default)]
    pub native: bool,
    #[serde(deserialize_with = "decimal_string")]
    pub market_stable_rate: String,
    pub strategy: StrategyConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StrategyConfig {
    #[serde(
        default = "default_optimal_utilization",
        deserialize_with = "decimal_string"
    )]
    pub optimal_utilization: String,
    #[serde(deserialize_with = "decimal_string")]
    pub base_variable_borrow_rate: String,
    #[serde(deserialize_with = "decimal_string")]
    pub variable_rate_slope1: String,
    #[serde(deserialize_with = "decimal_string")]
    pub variable_rate_slope2: String,
    #[serde(deserialize_with = "decimal_string")]
    pub stable_rate_slope1: String,
    #[serde(deserialize_with = "decimal_string")]
    pub stable_rate_slope2: String,
}

fn ray_field(name: &str, value: &str) -> Result<U256> {
    ray_from_decimal(value).with_context(|| format!("CONFIG_INVALID: {name}='{value}'"))
}

impl StrategyConfig {
    pub fn to_strategy(&self) -> Result<InterestRateStrategy> {
        let strategy = InterestRateStrategy {
            optimal_utilization: ray_field("optimal_utilization", &self.optimal_utilization)?,
            base_variable_borrow_rate: ray_field(
                "base_variable_borrow_rate",
                &self.base_variable_borrow_rate,
            )?,
            variable_rate_slope1: ray_field("variable_rate_slope1", &self.variable_rate_slope1)?,
            variable_rate_slope2: ray_field("variable_rate_slope2", &self.variable_rate_slope2)?,
            stable_rate_slope1: ray_field("stable_rate_slope1", &self.stable_rate_slope1)?,
            stable_rate_slope2: ray_field("stable_rate_slope2", &self.stable_rate_slope2)?,
        };
        if strategy.optimal_utilization.is_zero() || strategy.optimal_utilization >= ray() {
            bail!(
                "CONFIG_INVALID: optimal_utilization must be strictly between 0 and 1, got {}",
                self.optimal_utilization
            );
        }
        Ok(strategy)
    }
}

impl ReserveConfig {
    pub fn market_stable_rate_ray(&self) -> Result<U256> {
        ray_field("market_stable_rate", &self.market_stable_rate)
    }
}

impl OracleConfig {
    pub fn reserve(&self, symbol: &str) -> Result<&ReserveConfig> {
        self.reserves
            .get(symbol)
            .with_context(|| format!("CONFIG_UNKNOWN_RESERVE: '{symbol}' is not configured"))
    }

    /// The native reserve's symbol, if one is configured.
    pub fn native_symbol(&self) -> Option<&str> {
        self.reserves
            .iter()
            .find(|(_, r)| r.native)
            .map(|(s, _)| s.as_str())
    }

    pub fn origination_fee_wad(&self) -> Result<U256> {
        wad_from_decimal(&self.market.origination_fee).with_context(|| {
            format!(
                "CONFIG_INVALID: market.origination_fee='{}'",
                self.market.origination_fee
            )
        })
    }

    /// Per-transaction cost in the native asset's smallest unit; zero when no
    /// native reserve is configured.
    pub fn gas_cost_units(&self) -> Result<U256> {
        let Some(native) = self.native_symbol() else {
            return Ok(U256::zero());
        };
        let decimals = self.reserve(native)?.decimals;
        parse_units(&self.market.gas_cost, decimals)
            .with_context(|| format!("CONFIG_INVALID: market.gas_cost='{}'", self.market.gas_cost))
    }

    /// Full-repay slack in the smallest unit of a reserve with `decimals`.
    pub fn native_repay_slack_units(&self, decimals: u32) -> Result<U256> {
        parse_units(&self.oracle.native_repay_slack, decimals).with_context(|| {
            format!(
                "CONFIG_INVALID: oracle.native_repay_slack='{}'",
                self.oracle.native_repay_slack
            )
        })
    }

    /// Parse every decimal field once so bad values fail at load time.
    pub fn validate(&self) -> Result<()> {
        let natives = self.reserves.values().filter(|r| r.native).count();
        if natives > 1 {
            bail!("CONFIG_INVALID: at most one reserve may be native, found {natives}");
        }
        self.origination_fee_wad()?;
        self.gas_cost_units()?;
        for (symbol, reserve) in &self.reserves {
            if reserve.decimals > MAX_DECIMALS {
                bail!(
                    "CONFIG_INVALID: reserve {symbol} has {} decimals, at most {MAX_DECIMALS} fit in 256 bits",
                    reserve.decimals
                );
            }
            reserve
                .strategy
                .to_strategy()
                .with_context(|| format!("reserve {symbol}"))?;
            reserve
                .market_stable_rate_ray()
                .with_context(|| format!("reserve {symbol}"))?;
            self.native_repay_slack_units(reserve.decimals)
                .with_context(|| format!("reserve {symbol}"))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strategy() -> StrategyConfig {
        StrategyConfig {
            optimal_utilization: "0.8".into(),
            base_variable_borrow_rate: "0.01".into(),
            variable_rate_slope1: "0.08".into(),
            variable_rate_slope2: "1".into(),
            stable_rate_slope1: "0.1".into(),
            stable_rate_slope2: "1".into(),
        }
    }

    #[test]
    fn strategy_converts_to_ray() {
        let s = strategy().to_strategy().unwrap();
        assert_eq!(s.base_variable_borrow_rate, U256::exp10(25));
        assert_eq!(s.variable_rate_slope2, ray());
        assert_eq!(s.optimal_utilization, U256::from(8u64) * U256::exp10(26));
    }

    #[test]
    fn optimal_utilization_of_one_is_rejected() {
        let mut s = strategy();
        s.optimal_utilization = "1".into();
        assert!(s.to_strategy().is_err());
    }
}
