//! Balance and debt views accrued to an arbitrary timestamp.

use primitive_types::U256;

use crate::interest::{compounded_interest, normalized_debt};
use crate::wad_ray::WadRayMath;
use crate::{add, MathResult};

/// Inputs of the interest-bearing deposit balance view.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ATokenPosition {
    pub principal: U256,
    pub redirected_balance: U256,
    pub user_index: U256,
    /// True when this position's interest flows to another account.
    pub redirecting: bool,
}

fn cumulated(balance: U256, income: U256, user_index: U256) -> MathResult<U256> {
    balance
        .wad_to_ray()?
        .ray_mul(income)?
        .ray_div(user_index)?
        .ray_to_wad()
}

/// Deposit balance given the reserve's normalized income at the query time.
///
/// Interest earned on redirected balance belongs to this position; interest
/// on its own principal stays only while it is not redirecting.
pub fn a_token_balance(position: &ATokenPosition, normalized_income: U256) -> MathResult<U256> {
    if position.user_index.is_zero() {
        return Ok(position.principal);
    }
    if position.redirecting {
        let redirected = cumulated(
            position.redirected_balance,
            normalized_income,
            position.user_index,
        )?;
        let interest = redirected.saturating_sub(position.redirected_balance);
        return add(position.principal, interest, "a_token_balance");
    }
    let gross = add(
        position.principal,
        position.redirected_balance,
        "a_token_balance",
    )?;
    Ok(cumulated(gross, normalized_income, position.user_index)?
        .saturating_sub(position.redirected_balance))
}

/// Stable debt compounded at the user's locked rate since its last update.
pub fn stable_debt(principal: U256, user_rate: U256, last: u64, now: u64) -> MathResult<U256> {
    if principal.is_zero() {
        return Ok(U256::zero());
    }
    principal
        .wad_to_ray()?
        .ray_mul(compounded_interest(user_rate, last, now)?)?
        .ray_to_wad()
}

/// Variable debt scaled by the reserve's normalized debt over the user's
/// personal index.
pub fn variable_debt(
    principal: U256,
    user_index: U256,
    variable_rate: U256,
    reserve_index: U256,
    last: u64,
    now: u64,
) -> MathResult<U256> {
    if principal.is_zero() {
        return Ok(U256::zero());
    }
    if user_index.is_zero() {
        return Ok(principal);
    }
    principal
        .wad_to_ray()?
        .ray_mul(normalized_debt(variable_rate, reserve_index, last, now)?)?
        .ray_div(user_index)?
        .ray_to_wad()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interest::SECONDS_PER_YEAR;
    use crate::wad_ray::{ray, wad};

    fn pct(p: u64) -> U256 {
        ray() * U256::from(p) / U256::from(100u64)
    }

    fn units(n: u64) -> U256 {
        U256::from(n) * wad()
    }

    #[test]
    fn fresh_position_returns_principal() {
        let pos = ATokenPosition {
            principal: units(10),
            redirected_balance: U256::zero(),
            user_index: U256::zero(),
            redirecting: false,
        };
        assert_eq!(a_token_balance(&pos, ray() * U256::from(2u64)).unwrap(), units(10));
    }

    #[test]
    fn balance_grows_with_income() {
        let pos = ATokenPosition {
            principal: units(100),
            redirected_balance: U256::zero(),
            user_index: ray(),
            redirecting: false,
        };
        let income = ray() + pct(5);
        assert_eq!(a_token_balance(&pos, income).unwrap(), units(105));
    }

    #[test]
    fn redirected_interest_is_credited_to_receiver() {
        let receiver = ATokenPosition {
            principal: units(10),
            redirected_balance: units(100),
            user_index: ray(),
            redirecting: false,
        };
        // (10 + 100) * 1.1 - 100 = 21
        assert_eq!(
            a_token_balance(&receiver, ray() + pct(10)).unwrap(),
            units(21)
        );
    }

    #[test]
    fn redirecting_position_keeps_only_principal() {
        let sender = ATokenPosition {
            principal: units(100),
            redirected_balance: U256::zero(),
            user_index: ray(),
            redirecting: true,
        };
        assert_eq!(
            a_token_balance(&sender, ray() + pct(10)).unwrap(),
            units(100)
        );
    }

    #[test]
    fn zero_principal_has_no_debt() {
        assert_eq!(stable_debt(U256::zero(), pct(10), 0, 100).unwrap(), U256::zero());
        assert_eq!(
            variable_debt(U256::zero(), ray(), pct(10), ray(), 0, 100).unwrap(),
            U256::zero()
        );
    }

    #[test]
    fn stable_debt_compounds_over_a_year() {
        let debt = stable_debt(units(100), pct(10), 0, SECONDS_PER_YEAR).unwrap();
        assert!(debt > units(110) && debt < units(111));
    }

    #[test]
    fn variable_debt_tracks_index_ratio() {
        // reserve index doubled since the user's snapshot, no time elapsed
        let debt = variable_debt(
            units(50),
            ray(),
            pct(10),
            ray() * U256::from(2u64),
            100,
            100,
        )
        .unwrap();
        assert_eq!(debt, units(100));
    }
}
