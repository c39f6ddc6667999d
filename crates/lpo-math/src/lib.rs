//! lpo-math
//!
//! Fixed-point arithmetic for the lending ledger oracle.
//!
//! - Amounts are `U256` in the asset's smallest unit.
//! - Rates and indices are rays (1e27 = 1.0).
//! - Fractions configured by humans (fees) are wads (1e18 = 1.0).
//!
//! Every operation is checked and returns [`MathResult`]; overflow and
//! division by zero are surfaced, never wrapped or clamped silently.
//! Pure deterministic logic. No IO, no clock.

mod balances;
mod interest;
mod stable_rate;
mod strategy;
mod units;
mod wad_ray;

pub use balances::{a_token_balance, stable_debt, variable_debt, ATokenPosition};
pub use interest::{
    accrue_indexes, compounded_interest, linear_interest, normalized_debt, normalized_income,
    IndexState, SECONDS_PER_YEAR,
};
pub use stable_rate::StableBook;
pub use strategy::{
    overall_borrow_rate, utilization_rate, InterestRateStrategy, ReserveRates,
};
pub use units::{
    format_units, parse_units, ray_from_decimal, wad_from_decimal, UnitsError, MAX_DECIMALS,
};
pub use wad_ray::{half_ray, half_wad, ray, wad, wad_ray_ratio, WadRayMath};

pub use primitive_types::U256;

/// Result alias used by every fallible operation in this crate.
pub type MathResult<T> = std::result::Result<T, MathError>;

/// Arithmetic failure. Each variant names the operation that failed so the
/// message is actionable without a backtrace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MathError {
    Overflow { op: &'static str },
    Underflow { op: &'static str },
    DivisionByZero { op: &'static str },
    /// Interest was requested over a window whose end precedes its start.
    NonMonotonicTime { last: u64, now: u64 },
}

impl std::fmt::Display for MathError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MathError::Overflow { op } => write!(f, "MATH_OVERFLOW in {op}"),
            MathError::Underflow { op } => write!(f, "MATH_UNDERFLOW in {op}"),
            MathError::DivisionByZero { op } => write!(f, "MATH_DIV_BY_ZERO in {op}"),
            MathError::NonMonotonicTime { last, now } => {
                write!(f, "MATH_TIME_BACKWARDS: now={now} precedes last={last}")
            }
        }
    }
}

impl std::error::Error for MathError {}

/// Checked addition tagged with the calling operation.
#[inline]
pub fn add(a: U256, b: U256, op: &'static str) -> MathResult<U256> {
    a.checked_add(b).ok_or(MathError::Overflow { op })
}

/// Checked subtraction tagged with the calling operation.
#[inline]
pub fn sub(a: U256, b: U256, op: &'static str) -> MathResult<U256> {
    a.checked_sub(b).ok_or(MathError::Underflow { op })
}
