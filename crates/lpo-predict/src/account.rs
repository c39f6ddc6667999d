//! Collateral flag, interest redirection and redirection allowance.
//!
//! None of these move liquidity or touch rates, but the reserve indexes are
//! still accrued to the action time before the flag or pointer changes.

use lpo_math::U256;
use lpo_schemas::{Action, ActionKind, Address};

use crate::book::{kind_mismatch, Book};
use crate::context::{Expected, PredictionInput};
use crate::error::{invalid, PredictResult};

pub(crate) fn predict_set_collateral(
    action: &Action,
    input: &PredictionInput,
) -> PredictResult<Expected> {
    let Action::SetCollateral { enabled } = *action else {
        return Err(kind_mismatch(ActionKind::SetCollateral, action.kind()));
    };

    let mut book = Book::open(input)?;
    book.accrue_reserve()?;
    book.user_mut(input.actor)?.usage_as_collateral_enabled = enabled;
    book.finish()
}

pub(crate) fn predict_redirect_interest(
    action: &Action,
    input: &PredictionInput,
) -> PredictResult<Expected> {
    let Action::RedirectInterest { to } = *action else {
        return Err(kind_mismatch(ActionKind::RedirectInterest, action.kind()));
    };

    let mut book = Book::open(input)?;
    book.accrue_reserve()?;
    redirect(&mut book, ActionKind::RedirectInterest, input.actor, to)?;
    book.finish()
}

pub(crate) fn predict_redirect_interest_of(
    action: &Action,
    input: &PredictionInput,
) -> PredictResult<Expected> {
    let Action::RedirectInterestOf { from, to } = *action else {
        return Err(kind_mismatch(ActionKind::RedirectInterestOf, action.kind()));
    };

    let mut book = Book::open(input)?;
    book.accrue_reserve()?;
    if book.user(from)?.redirection_allowance != Some(input.actor) {
        return Err(invalid(
            ActionKind::RedirectInterestOf,
            format!("{} is not allowed to redirect the interest of {from}", input.actor),
        ));
    }
    redirect(&mut book, ActionKind::RedirectInterestOf, from, to)?;
    book.finish()
}

pub(crate) fn predict_allow_interest_redirection(
    action: &Action,
    input: &PredictionInput,
) -> PredictResult<Expected> {
    let Action::AllowInterestRedirection { to } = *action else {
        return Err(kind_mismatch(
            ActionKind::AllowInterestRedirection,
            action.kind(),
        ));
    };
    if to == Some(input.actor) {
        return Err(invalid(
            ActionKind::AllowInterestRedirection,
            "a user cannot give allowance to itself",
        ));
    }

    let mut book = Book::open(input)?;
    book.accrue_reserve()?;
    book.user_mut(input.actor)?.redirection_allowance = to;
    book.finish()
}

/// Point `from`'s interest stream at `to`; `to == from` stops redirecting.
fn redirect(
    book: &mut Book<'_>,
    kind: ActionKind,
    from: Address,
    to: Address,
) -> PredictResult<()> {
    let current = book.user(from)?.interest_redirection_address;
    if current == Some(to) {
        return Err(invalid(kind, format!("interest is already redirected to {to}")));
    }

    let cumulated = book.cumulate_balance(from)?;
    if cumulated.balance.is_zero() {
        return Err(invalid(
            kind,
            "interest can only be redirected with a non-zero balance",
        ));
    }

    if current.is_some() {
        book.update_redirected_of_target(from, U256::zero(), cumulated.previous_principal)?;
    }

    if to == from {
        book.user_mut(from)?.interest_redirection_address = None;
        return Ok(());
    }

    book.user_mut(from)?.interest_redirection_address = Some(to);
    book.update_redirected_of_target(from, cumulated.balance, U256::zero())
}
