//! Structural checks that hold for any well-formed snapshot, independent of
//! what the predictor expected.

use std::fmt;

use lpo_schemas::{RateMode, ReserveSnapshot, UserReserveSnapshot, U256};
use serde::Serialize;

use crate::within_tolerance;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum InvariantViolation {
    /// available + stable + variable drifted from total liquidity.
    LiquidityNotConserved {
        available: String,
        borrows_stable: String,
        borrows_variable: String,
        total: String,
    },
    /// A cumulative index moved backwards between consecutive snapshots.
    IndexDecreased {
        index: &'static str,
        before: String,
        after: String,
    },
    /// A rate mode is set but both debts are zero, or debt exists without one.
    RateModeInconsistent { mode: RateMode, stable: String, variable: String },
    /// Non-redirecting position reports less than its principal.
    BalanceBelowPrincipal { principal: String, current: String },
}

impl fmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvariantViolation::LiquidityNotConserved {
                available,
                borrows_stable,
                borrows_variable,
                total,
            } => write!(
                f,
                "INVARIANT_LIQUIDITY: available {available} + stable {borrows_stable} \
                 + variable {borrows_variable} != total {total}"
            ),
            InvariantViolation::IndexDecreased {
                index,
                before,
                after,
            } => write!(f, "INVARIANT_INDEX: {index} decreased from {before} to {after}"),
            InvariantViolation::RateModeInconsistent {
                mode,
                stable,
                variable,
            } => write!(
                f,
                "INVARIANT_RATE_MODE: mode {mode} with stable debt {stable}, variable debt {variable}"
            ),
            InvariantViolation::BalanceBelowPrincipal { principal, current } => write!(
                f,
                "INVARIANT_BALANCE: current balance {current} below principal {principal}"
            ),
        }
    }
}

impl std::error::Error for InvariantViolation {}

/// Liquidity conservation within tolerance.
pub fn check_reserve(reserve: &ReserveSnapshot) -> Result<(), InvariantViolation> {
    let sum = reserve
        .available_liquidity
        .saturating_add(reserve.total_borrows_stable)
        .saturating_add(reserve.total_borrows_variable);
    if within_tolerance(sum, reserve.total_liquidity) {
        return Ok(());
    }
    Err(InvariantViolation::LiquidityNotConserved {
        available: reserve.available_liquidity.to_string(),
        borrows_stable: reserve.total_borrows_stable.to_string(),
        borrows_variable: reserve.total_borrows_variable.to_string(),
        total: reserve.total_liquidity.to_string(),
    })
}

/// Rate mode agrees with the debts; balance not below principal unless the
/// user's interest is redirected elsewhere.
pub fn check_user(user: &UserReserveSnapshot) -> Result<(), InvariantViolation> {
    let no_debt = user.current_stable_debt.is_zero() && user.current_variable_debt.is_zero();
    let mode_ok = match user.borrow_rate_mode {
        RateMode::None => no_debt,
        RateMode::Stable | RateMode::Variable => !no_debt,
    };
    if !mode_ok {
        return Err(InvariantViolation::RateModeInconsistent {
            mode: user.borrow_rate_mode,
            stable: user.current_stable_debt.to_string(),
            variable: user.current_variable_debt.to_string(),
        });
    }

    if !user.is_redirecting()
        && user.current_balance < user.principal_balance
        && !within_tolerance(user.principal_balance, user.current_balance)
    {
        return Err(InvariantViolation::BalanceBelowPrincipal {
            principal: user.principal_balance.to_string(),
            current: user.current_balance.to_string(),
        });
    }
    Ok(())
}

/// Indices of the same reserve never decrease.
pub fn check_index_progress(
    before: &ReserveSnapshot,
    after: &ReserveSnapshot,
) -> Result<(), InvariantViolation> {
    let pairs: [(&'static str, U256, U256); 2] = [
        ("liquidity_index", before.liquidity_index, after.liquidity_index),
        (
            "variable_borrow_index",
            before.variable_borrow_index,
            after.variable_borrow_index,
        ),
    ];
    for (index, b, a) in pairs {
        if a < b {
            return Err(InvariantViolation::IndexDecreased {
                index,
                before: b.to_string(),
                after: a.to_string(),
            });
        }
    }
    Ok(())
}
