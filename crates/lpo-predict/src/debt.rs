//! Borrow, repay, rate-mode swap and stable-rate rebalance.
//!
//! Stable and variable debt of one user are tracked as separate principals.
//! Totals on the reserve move by the accrued increase of the touched mode
//! plus the principal effect; the stable average is maintained through
//! `StableBook`.

use lpo_math::{add, sub, WadRayMath, U256};
use lpo_schemas::{Action, ActionKind, AmountRequest, RateMode};

use crate::book::{kind_mismatch, resolve_rate_mode, Book};
use crate::context::{Expected, PredictionInput};
use crate::error::{invalid, PredictResult};

pub(crate) fn predict_borrow(action: &Action, input: &PredictionInput) -> PredictResult<Expected> {
    let Action::Borrow { amount, rate_mode } = *action else {
        return Err(kind_mismatch(ActionKind::Borrow, action.kind()));
    };
    if amount.is_zero() {
        return Err(invalid(ActionKind::Borrow, "amount must be greater than zero"));
    }
    if amount > input.reserve.available_liquidity {
        return Err(invalid(
            ActionKind::Borrow,
            "amount exceeds the reserve's available liquidity",
        ));
    }

    let mut book = Book::open(input)?;
    let actor = input.actor;
    let ta = input.timing.action_ts;
    book.accrue_reserve()?;

    match rate_mode {
        RateMode::Stable => {
            let user = book.user(actor)?;
            let accrued = book.stable_debt_at(user, ta)?;
            let new_principal = add(accrued, amount, "borrow")?;
            let rate = book.stable_lock_rate();
            let stable = book.stable_book().restate(
                user.principal_stable_debt,
                user.borrow_rate,
                new_principal,
                rate,
            )?;
            book.set_stable_book(stable);

            let user = book.user_mut(actor)?;
            user.principal_stable_debt = new_principal;
            user.borrow_rate = rate;
            user.stable_borrow_last_update_timestamp = ta;
        }
        RateMode::Variable => {
            let user = book.user(actor)?;
            let accrued = book.variable_debt_at(user, ta)?;
            let increase = accrued.saturating_sub(user.principal_variable_debt);
            book.reserve.total_borrows_variable = add(
                book.reserve.total_borrows_variable,
                add(increase, amount, "borrow")?,
                "borrow",
            )?;

            let index = book.reserve.variable_borrow_index;
            let user = book.user_mut(actor)?;
            user.principal_variable_debt = add(accrued, amount, "borrow")?;
            user.variable_borrow_index = index;
        }
        RateMode::None => {
            return Err(invalid(ActionKind::Borrow, "rate mode must be STABLE or VARIABLE"));
        }
    }

    let fee = amount.wad_mul(input.market.origination_fee)?;
    let user = book.user_mut(actor)?;
    user.origination_fee = add(user.origination_fee, fee, "borrow")?;
    user.borrow_rate_mode = rate_mode;
    user.wallet_balance = add(user.wallet_balance, amount, "borrow")?;

    book.update_rates(U256::zero(), amount)?;
    book.finish()
}

pub(crate) fn predict_repay(action: &Action, input: &PredictionInput) -> PredictResult<Expected> {
    let Action::Repay {
        amount,
        rate_mode,
        on_behalf_of,
    } = *action
    else {
        return Err(kind_mismatch(ActionKind::Repay, action.kind()));
    };

    let mut book = Book::open(input)?;
    let actor = input.actor;
    let ta = input.timing.action_ts;
    let mode = match rate_mode {
        RateMode::None => book.user(on_behalf_of)?.borrow_rate_mode,
        explicit => explicit,
    };

    book.accrue_reserve()?;

    let user = book.user(on_behalf_of)?;
    let (principal, accrued) = match mode {
        RateMode::Stable => (user.principal_stable_debt, book.stable_debt_at(user, ta)?),
        RateMode::Variable => (
            user.principal_variable_debt,
            book.variable_debt_at(user, ta)?,
        ),
        RateMode::None => {
            return Err(invalid(ActionKind::Repay, "the user has no borrow pending"));
        }
    };
    if accrued.is_zero() {
        return Err(invalid(ActionKind::Repay, "the user has no borrow pending"));
    }
    if amount == AmountRequest::Max && actor != on_behalf_of {
        return Err(invalid(
            ActionKind::Repay,
            "repaying on behalf of another user needs an explicit amount",
        ));
    }

    let fee = user.origination_fee;
    let user_rate = user.borrow_rate;
    let increase = accrued.saturating_sub(principal);

    let mut payback = add(accrued, fee, "repay")?;
    if let AmountRequest::Exact(n) = amount {
        if n < payback {
            payback = n;
        }
    }
    // Fee is settled first; only the remainder reduces principal.
    let (principal_part, fee_part) = if payback <= fee {
        (U256::zero(), payback)
    } else {
        (payback - fee, fee)
    };
    let repaid_whole_loan = principal_part == accrued;
    let new_principal = sub(add(principal, increase, "repay")?, principal_part, "repay")?;

    match mode {
        RateMode::Stable => {
            let stable = book
                .stable_book()
                .increase(increase, user_rate)?
                .decrease(principal_part, user_rate)?;
            book.set_stable_book(stable);

            let user = book.user_mut(on_behalf_of)?;
            user.principal_stable_debt = new_principal;
            user.stable_borrow_last_update_timestamp = ta;
            if repaid_whole_loan {
                user.borrow_rate = U256::zero();
            }
        }
        RateMode::Variable => {
            book.reserve.total_borrows_variable = sub(
                add(book.reserve.total_borrows_variable, increase, "repay")?,
                principal_part,
                "repay",
            )?;

            let index = book.reserve.variable_borrow_index;
            let user = book.user_mut(on_behalf_of)?;
            user.principal_variable_debt = new_principal;
            user.variable_borrow_index = if repaid_whole_loan {
                U256::zero()
            } else {
                index
            };
        }
        // rejected above
        RateMode::None => {}
    }

    let user = book.user_mut(on_behalf_of)?;
    user.origination_fee = sub(user.origination_fee, fee_part, "repay")?;
    user.borrow_rate_mode = resolve_rate_mode(
        mode,
        user.principal_stable_debt,
        user.principal_variable_debt,
    );

    let payer = book.user_mut(actor)?;
    payer.wallet_balance = sub(payer.wallet_balance, payback, "repay")?;

    book.update_rates(principal_part, U256::zero())?;
    book.finish()
}

pub(crate) fn predict_swap_rate_mode(
    action: &Action,
    input: &PredictionInput,
) -> PredictResult<Expected> {
    let Action::SwapRateMode { from_mode } = *action else {
        return Err(kind_mismatch(ActionKind::SwapRateMode, action.kind()));
    };

    let mut book = Book::open(input)?;
    let actor = input.actor;
    let ta = input.timing.action_ts;
    book.accrue_reserve()?;

    let user = book.user(actor)?;
    let stable_accrued = book.stable_debt_at(user, ta)?;
    let variable_accrued = book.variable_debt_at(user, ta)?;
    let merged = add(stable_accrued, variable_accrued, "swap_rate_mode")?;

    match from_mode {
        RateMode::Stable => {
            if stable_accrued.is_zero() {
                return Err(invalid(ActionKind::SwapRateMode, "no stable debt to swap"));
            }
            let stable = book
                .stable_book()
                .decrease(user.principal_stable_debt, user.borrow_rate)?;
            let variable_total = add(
                sub(
                    book.reserve.total_borrows_variable,
                    user.principal_variable_debt,
                    "swap_rate_mode",
                )?,
                merged,
                "swap_rate_mode",
            )?;
            book.set_stable_book(stable);
            book.reserve.total_borrows_variable = variable_total;

            let index = book.reserve.variable_borrow_index;
            let user = book.user_mut(actor)?;
            user.principal_stable_debt = U256::zero();
            user.borrow_rate = U256::zero();
            user.stable_borrow_last_update_timestamp = ta;
            user.principal_variable_debt = merged;
            user.variable_borrow_index = index;
        }
        RateMode::Variable => {
            if variable_accrued.is_zero() {
                return Err(invalid(ActionKind::SwapRateMode, "no variable debt to swap"));
            }
            let rate = book.stable_lock_rate();
            let stable = book.stable_book().restate(
                user.principal_stable_debt,
                user.borrow_rate,
                merged,
                rate,
            )?;
            let variable_total = sub(
                book.reserve.total_borrows_variable,
                user.principal_variable_debt,
                "swap_rate_mode",
            )?;
            book.set_stable_book(stable);
            book.reserve.total_borrows_variable = variable_total;

            let user = book.user_mut(actor)?;
            user.principal_variable_debt = U256::zero();
            user.variable_borrow_index = U256::zero();
            user.principal_stable_debt = merged;
            user.borrow_rate = rate;
            user.stable_borrow_last_update_timestamp = ta;
        }
        RateMode::None => {
            return Err(invalid(
                ActionKind::SwapRateMode,
                "from mode must be STABLE or VARIABLE",
            ));
        }
    }

    book.user_mut(actor)?.borrow_rate_mode = from_mode.opposite();
    book.update_rates(U256::zero(), U256::zero())?;
    book.finish()
}

pub(crate) fn predict_rebalance_stable_rate(
    action: &Action,
    input: &PredictionInput,
) -> PredictResult<Expected> {
    let Action::RebalanceStableRate { target } = *action else {
        return Err(kind_mismatch(ActionKind::RebalanceStableRate, action.kind()));
    };

    let mut book = Book::open(input)?;
    let ta = input.timing.action_ts;
    book.accrue_reserve()?;

    let user = book.user(target)?;
    let accrued = book.stable_debt_at(user, ta)?;
    if accrued.is_zero() {
        return Err(invalid(
            ActionKind::RebalanceStableRate,
            "target has no stable debt",
        ));
    }
    let rate = book.stable_lock_rate();
    let stable = book.stable_book().restate(
        user.principal_stable_debt,
        user.borrow_rate,
        accrued,
        rate,
    )?;
    book.set_stable_book(stable);

    let user = book.user_mut(target)?;
    user.principal_stable_debt = accrued;
    user.borrow_rate = rate;
    user.stable_borrow_last_update_timestamp = ta;

    book.update_rates(U256::zero(), U256::zero())?;
    book.finish()
}
