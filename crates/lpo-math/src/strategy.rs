//! Utilization-kinked interest rate strategy.
//!
//! Below the optimal utilization rates grow along slope 1; above it slope 2
//! applies to the excess. The liquidity rate is the overall borrow rate
//! weighted by utilization.

use primitive_types::U256;

use crate::wad_ray::{ray, WadRayMath};
use crate::{add, sub, MathResult};

/// Per-reserve strategy parameters, all in ray.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InterestRateStrategy {
    pub optimal_utilization: U256,
    pub base_variable_borrow_rate: U256,
    pub variable_rate_slope1: U256,
    pub variable_rate_slope2: U256,
    pub stable_rate_slope1: U256,
    pub stable_rate_slope2: U256,
}

/// Rates produced by one strategy evaluation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReserveRates {
    pub liquidity_rate: U256,
    pub stable_borrow_rate: U256,
    pub variable_borrow_rate: U256,
}

impl InterestRateStrategy {
    /// 80% expressed in ray.
    pub fn default_optimal_utilization() -> U256 {
        ray() * U256::from(8u64) / U256::from(10u64)
    }

    pub fn calculate_rates(
        &self,
        utilization: U256,
        market_stable_rate: U256,
        total_borrows_stable: U256,
        total_borrows_variable: U256,
        average_stable_rate: U256,
    ) -> MathResult<ReserveRates> {
        let excess_utilization = sub(ray(), self.optimal_utilization, "calculate_rates")?;

        let (stable_borrow_rate, variable_borrow_rate) = if utilization > self.optimal_utilization
        {
            let excess_ratio = sub(utilization, self.optimal_utilization, "calculate_rates")?
                .ray_div(excess_utilization)?;
            let stable = add(
                add(market_stable_rate, self.stable_rate_slope1, "stable_rate")?,
                self.stable_rate_slope2.ray_mul(excess_ratio)?,
                "stable_rate",
            )?;
            let variable = add(
                add(
                    self.base_variable_borrow_rate,
                    self.variable_rate_slope1,
                    "variable_rate",
                )?,
                self.variable_rate_slope2.ray_mul(excess_ratio)?,
                "variable_rate",
            )?;
            (stable, variable)
        } else {
            let ratio = utilization.ray_div(self.optimal_utilization)?;
            let stable = add(
                market_stable_rate,
                self.stable_rate_slope1.ray_mul(ratio)?,
                "stable_rate",
            )?;
            let variable = add(
                self.base_variable_borrow_rate,
                ratio.ray_mul(self.variable_rate_slope1)?,
                "variable_rate",
            )?;
            (stable, variable)
        };

        let liquidity_rate = overall_borrow_rate(
            total_borrows_stable,
            total_borrows_variable,
            variable_borrow_rate,
            average_stable_rate,
        )?
        .ray_mul(utilization)?;

        Ok(ReserveRates {
            liquidity_rate,
            stable_borrow_rate,
            variable_borrow_rate,
        })
    }
}

/// `total_borrows / total_liquidity` in ray; zero when nothing is borrowed.
pub fn utilization_rate(total_borrows: U256, total_liquidity: U256) -> MathResult<U256> {
    if total_borrows.is_zero() {
        return Ok(U256::zero());
    }
    total_borrows.ray_div(total_liquidity)
}

/// Borrow-weighted average of the variable rate and the average stable rate.
pub fn overall_borrow_rate(
    total_borrows_stable: U256,
    total_borrows_variable: U256,
    variable_rate: U256,
    average_stable_rate: U256,
) -> MathResult<U256> {
    let total = add(total_borrows_stable, total_borrows_variable, "overall_borrow_rate")?;
    if total.is_zero() {
        return Ok(U256::zero());
    }
    let weighted_variable = total_borrows_variable.wad_to_ray()?.ray_mul(variable_rate)?;
    let weighted_stable = total_borrows_stable
        .wad_to_ray()?
        .ray_mul(average_stable_rate)?;
    add(weighted_variable, weighted_stable, "overall_borrow_rate")?.ray_div(total.wad_to_ray()?)
}
