//! Supply and withdraw.

use lpo_math::{add, sub, U256};
use lpo_schemas::{Action, ActionKind, AmountRequest};

use crate::book::{kind_mismatch, Book};
use crate::context::{Expected, PredictionInput};
use crate::error::{invalid, PredictResult};

pub(crate) fn predict_supply(action: &Action, input: &PredictionInput) -> PredictResult<Expected> {
    let Action::Supply { amount } = *action else {
        return Err(kind_mismatch(ActionKind::Supply, action.kind()));
    };
    if amount.is_zero() {
        return Err(invalid(ActionKind::Supply, "amount must be greater than zero"));
    }

    let mut book = Book::open(input)?;
    let actor = input.actor;
    let first_deposit = book.balance_at(actor, input.timing.action_ts)?.is_zero();

    book.accrue_reserve()?;
    book.update_rates(amount, U256::zero())?;

    let cumulated = book.cumulate_balance(actor)?;
    book.update_redirected_of_target(
        actor,
        add(cumulated.increase, amount, "supply")?,
        U256::zero(),
    )?;

    let user = book.user_mut(actor)?;
    user.principal_balance = add(user.principal_balance, amount, "supply")?;
    if first_deposit {
        user.usage_as_collateral_enabled = true;
    }
    user.wallet_balance = sub(user.wallet_balance, amount, "supply")?;

    book.finish()
}

pub(crate) fn predict_withdraw(
    action: &Action,
    input: &PredictionInput,
) -> PredictResult<Expected> {
    let Action::Withdraw { amount } = *action else {
        return Err(kind_mismatch(ActionKind::Withdraw, action.kind()));
    };

    let mut book = Book::open(input)?;
    let actor = input.actor;

    book.accrue_reserve()?;
    let cumulated = book.cumulate_balance(actor)?;
    let amount = match amount {
        AmountRequest::Exact(n) => n,
        AmountRequest::Max => cumulated.balance,
    };
    if amount.is_zero() {
        return Err(invalid(ActionKind::Withdraw, "nothing to withdraw"));
    }
    if amount > cumulated.balance {
        return Err(invalid(
            ActionKind::Withdraw,
            format!(
                "amount {amount} exceeds balance {} accrued at {}",
                cumulated.balance, input.timing.action_ts
            ),
        ));
    }
    if amount > book.reserve.available_liquidity {
        return Err(invalid(
            ActionKind::Withdraw,
            "amount exceeds the reserve's available liquidity",
        ));
    }

    book.update_redirected_of_target(actor, cumulated.increase, amount)?;

    let user = book.user_mut(actor)?;
    user.principal_balance = sub(user.principal_balance, amount, "withdraw")?;
    if user.principal_balance.is_zero() {
        user.usage_as_collateral_enabled = false;
        if user.redirected_balance.is_zero() {
            user.liquidity_index = U256::zero();
            user.interest_redirection_address = None;
        }
    }
    user.wallet_balance = add(user.wallet_balance, amount, "withdraw")?;

    book.update_rates(U256::zero(), amount)?;
    book.finish()
}
