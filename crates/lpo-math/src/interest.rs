//! Interest accrual: linear (supply side) and compounded per second (borrow
//! side), plus the reserve index update built on them.

use primitive_types::U256;

use crate::wad_ray::{ray, WadRayMath};
use crate::{add, MathError, MathResult};

/// 365 days. Rates are annualized against this constant.
pub const SECONDS_PER_YEAR: u64 = 365 * 24 * 60 * 60;

fn elapsed(last: u64, now: u64) -> MathResult<u64> {
    now.checked_sub(last)
        .ok_or(MathError::NonMonotonicTime { last, now })
}

/// `1 + rate * dt / year`, in ray.
pub fn linear_interest(rate: U256, last: u64, now: u64) -> MathResult<U256> {
    let dt = elapsed(last, now)?;
    let time_delta = U256::from(dt)
        .wad_to_ray()?
        .ray_div(U256::from(SECONDS_PER_YEAR).wad_to_ray()?)?;
    add(rate.ray_mul(time_delta)?, ray(), "linear_interest")
}

/// `(1 + rate / year) ^ dt`, in ray. The per-second rate is truncated.
pub fn compounded_interest(rate: U256, last: u64, now: u64) -> MathResult<U256> {
    let dt = elapsed(last, now)?;
    let rate_per_second = rate / U256::from(SECONDS_PER_YEAR);
    add(rate_per_second, ray(), "compounded_interest")?.ray_pow(dt)
}

/// Liquidity index as of `now` without persisting it.
pub fn normalized_income(
    liquidity_rate: U256,
    liquidity_index: U256,
    last: u64,
    now: u64,
) -> MathResult<U256> {
    linear_interest(liquidity_rate, last, now)?.ray_mul(liquidity_index)
}

/// Variable borrow index as of `now` without persisting it.
pub fn normalized_debt(
    variable_rate: U256,
    variable_index: U256,
    last: u64,
    now: u64,
) -> MathResult<U256> {
    compounded_interest(variable_rate, last, now)?.ray_mul(variable_index)
}

/// The two cumulative indices a reserve persists.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IndexState {
    pub liquidity_index: U256,
    pub variable_borrow_index: U256,
}

/// Index update applied at the start of every liquidity-moving action.
///
/// Indices only move while something is borrowed; an idle reserve keeps its
/// indices and just advances its timestamp.
pub fn accrue_indexes(
    total_borrows: U256,
    liquidity_rate: U256,
    variable_rate: U256,
    indexes: IndexState,
    last: u64,
    now: u64,
) -> MathResult<IndexState> {
    elapsed(last, now)?;
    if total_borrows.is_zero() {
        return Ok(indexes);
    }
    Ok(IndexState {
        liquidity_index: normalized_income(liquidity_rate, indexes.liquidity_index, last, now)?,
        variable_borrow_index: normalized_debt(
            variable_rate,
            indexes.variable_borrow_index,
            last,
            now,
        )?,
    })
}
