//! Working copy of the reserve and every touched user.
//!
//! Predictors mutate a `Book` in the same order the ledger applies effects:
//! accrue reserve indices, cumulate touched balances, apply the principal
//! effect, recompute rates. `finish` then projects every user's current views
//! to the query time.

use std::collections::BTreeMap;

use lpo_math::{
    a_token_balance, accrue_indexes, add, normalized_income, stable_debt, sub, utilization_rate,
    variable_debt, ATokenPosition, IndexState, StableBook, U256,
};
use lpo_schemas::{ActionKind, Address, RateMode, ReserveSnapshot, UserReserveSnapshot};

use crate::context::{Expected, PredictionInput};
use crate::error::{PredictError, PredictResult};

/// Borrow mode after a position change.
///
/// NONE when both debts are zero, the only non-zero mode when exactly one is,
/// otherwise `previous` (the mode of the most recent borrow or swap target).
pub fn resolve_rate_mode(previous: RateMode, stable: U256, variable: U256) -> RateMode {
    match (stable.is_zero(), variable.is_zero()) {
        (true, true) => RateMode::None,
        (false, true) => RateMode::Stable,
        (true, false) => RateMode::Variable,
        (false, false) => previous,
    }
}

/// Outcome of minting a user's accrued interest into principal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Cumulated {
    pub previous_principal: U256,
    pub balance: U256,
    pub increase: U256,
}

pub(crate) struct Book<'a> {
    input: &'a PredictionInput,
    pub reserve: ReserveSnapshot,
    pub users: BTreeMap<Address, UserReserveSnapshot>,
}

impl<'a> Book<'a> {
    pub fn open(input: &'a PredictionInput) -> PredictResult<Self> {
        if !input.users.contains_key(&input.actor) {
            return Err(PredictError::MissingUser {
                address: input.actor,
            });
        }
        Ok(Self {
            input,
            reserve: input.reserve.clone(),
            users: input.users.clone(),
        })
    }

    pub fn action_ts(&self) -> u64 {
        self.input.timing.action_ts
    }

    pub fn actor(&self) -> Address {
        self.input.actor
    }

    pub fn user(&self, address: Address) -> PredictResult<&UserReserveSnapshot> {
        self.users
            .get(&address)
            .ok_or(PredictError::MissingUser { address })
    }

    pub fn user_mut(&mut self, address: Address) -> PredictResult<&mut UserReserveSnapshot> {
        self.users
            .get_mut(&address)
            .ok_or(PredictError::MissingUser { address })
    }

    // -----------------------------------------------------------------------
    // Reserve
    // -----------------------------------------------------------------------

    /// Bring indices to the action time. Indices move only while something
    /// is borrowed; the timestamp always advances.
    pub fn accrue_reserve(&mut self) -> PredictResult<()> {
        let ta = self.action_ts();
        let r = &mut self.reserve;
        let next = accrue_indexes(
            r.total_borrows(),
            r.current_liquidity_rate,
            r.current_variable_borrow_rate,
            IndexState {
                liquidity_index: r.liquidity_index,
                variable_borrow_index: r.variable_borrow_index,
            },
            r.last_update_timestamp,
            ta,
        )?;
        r.liquidity_index = next.liquidity_index;
        r.variable_borrow_index = next.variable_borrow_index;
        r.last_update_timestamp = ta;
        Ok(())
    }

    pub fn stable_book(&self) -> StableBook {
        StableBook::new(
            self.reserve.total_borrows_stable,
            self.reserve.current_average_stable_borrow_rate,
        )
    }

    pub fn set_stable_book(&mut self, book: StableBook) {
        self.reserve.total_borrows_stable = book.total;
        self.reserve.current_average_stable_borrow_rate = book.average_rate;
    }

    /// Rate a new or rebalanced stable position locks: the pool's average
    /// stable rate before the action, or the offered stable rate while no
    /// stable debt is outstanding.
    pub fn stable_lock_rate(&self) -> U256 {
        if self.reserve.total_borrows_stable.is_zero() {
            self.reserve.current_stable_borrow_rate
        } else {
            self.reserve.current_average_stable_borrow_rate
        }
    }

    /// Move liquidity and re-run the rate strategy.
    pub fn update_rates(&mut self, added: U256, taken: U256) -> PredictResult<()> {
        let r = &mut self.reserve;
        r.available_liquidity = sub(
            add(r.available_liquidity, added, "update_rates")?,
            taken,
            "update_rates",
        )?;
        let total_borrows = add(
            r.total_borrows_stable,
            r.total_borrows_variable,
            "update_rates",
        )?;
        r.total_liquidity = add(r.available_liquidity, total_borrows, "update_rates")?;
        r.utilization_rate = utilization_rate(total_borrows, r.total_liquidity)?;

        let rates = self.input.market.strategy.calculate_rates(
            r.utilization_rate,
            r.market_stable_rate,
            r.total_borrows_stable,
            r.total_borrows_variable,
            r.current_average_stable_borrow_rate,
        )?;
        r.current_liquidity_rate = rates.liquidity_rate;
        r.current_stable_borrow_rate = rates.stable_borrow_rate;
        r.current_variable_borrow_rate = rates.variable_borrow_rate;
        r.last_update_timestamp = self.input.timing.action_ts;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Deposits
    // -----------------------------------------------------------------------

    fn income_at(&self, ts: u64) -> PredictResult<U256> {
        Ok(normalized_income(
            self.reserve.current_liquidity_rate,
            self.reserve.liquidity_index,
            self.reserve.last_update_timestamp,
            ts,
        )?)
    }

    fn position(user: &UserReserveSnapshot) -> ATokenPosition {
        ATokenPosition {
            principal: user.principal_balance,
            redirected_balance: user.redirected_balance,
            user_index: user.liquidity_index,
            redirecting: user.is_redirecting(),
        }
    }

    pub fn balance_at(&self, address: Address, ts: u64) -> PredictResult<U256> {
        let income = self.income_at(ts)?;
        Ok(a_token_balance(&Self::position(self.user(address)?), income)?)
    }

    /// Mint accrued interest into principal and reset the user's index.
    pub fn cumulate_balance(&mut self, address: Address) -> PredictResult<Cumulated> {
        let ta = self.action_ts();
        let income = self.income_at(ta)?;
        let balance = self.balance_at(address, ta)?;
        let user = self.user_mut(address)?;
        let previous_principal = user.principal_balance;
        let increase = balance.saturating_sub(previous_principal);
        user.principal_balance = add(previous_principal, increase, "cumulate_balance")?;
        user.liquidity_index = income;
        Ok(Cumulated {
            previous_principal,
            balance: user.principal_balance,
            increase,
        })
    }

    /// Adjust the redirected balance held by `address`'s redirection target.
    ///
    /// The target's own accrued interest is minted first and, when the
    /// target redirects too, credited to the next hop's redirected balance.
    pub fn update_redirected_of_target(
        &mut self,
        address: Address,
        to_add: U256,
        to_remove: U256,
    ) -> PredictResult<()> {
        let Some(target) = self.user(address)?.interest_redirection_address else {
            return Ok(());
        };
        let cumulated = self.cumulate_balance(target)?;
        let target_user = self.user_mut(target)?;
        target_user.redirected_balance = sub(
            add(target_user.redirected_balance, to_add, "redirected_balance")?,
            to_remove,
            "redirected_balance",
        )?;
        if let Some(next_hop) = target_user.interest_redirection_address {
            let hop = self.user_mut(next_hop)?;
            hop.redirected_balance =
                add(hop.redirected_balance, cumulated.increase, "redirected_balance")?;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Debts
    // -----------------------------------------------------------------------

    pub fn stable_debt_at(&self, user: &UserReserveSnapshot, ts: u64) -> PredictResult<U256> {
        Ok(stable_debt(
            user.principal_stable_debt,
            user.borrow_rate,
            user.stable_borrow_last_update_timestamp,
            ts,
        )?)
    }

    pub fn variable_debt_at(&self, user: &UserReserveSnapshot, ts: u64) -> PredictResult<U256> {
        Ok(variable_debt(
            user.principal_variable_debt,
            user.variable_borrow_index,
            self.reserve.current_variable_borrow_rate,
            self.reserve.variable_borrow_index,
            self.reserve.last_update_timestamp,
            ts,
        )?)
    }

    // -----------------------------------------------------------------------
    // Finish
    // -----------------------------------------------------------------------

    /// Charge gas, project current views to the query time and mirror each
    /// user's target redirected balance.
    pub fn finish(mut self) -> PredictResult<Expected> {
        if self.input.market.native {
            let actor = self.actor();
            let cost = self.input.tx_cost;
            let user = self.user_mut(actor)?;
            user.wallet_balance = sub(user.wallet_balance, cost, "gas_cost")?;
        }

        let tq = self.input.timing.query_ts;
        let addresses: Vec<Address> = self.users.keys().copied().collect();
        for address in &addresses {
            let current_balance = self.balance_at(*address, tq)?;
            let user = self.user(*address)?;
            let current_stable_debt = self.stable_debt_at(user, tq)?;
            let current_variable_debt = self.variable_debt_at(user, tq)?;

            let user = self.user_mut(*address)?;
            user.current_balance = current_balance;
            user.current_stable_debt = current_stable_debt;
            user.current_variable_debt = current_variable_debt;
            user.borrow_rate_mode = resolve_rate_mode(
                user.borrow_rate_mode,
                user.principal_stable_debt,
                user.principal_variable_debt,
            );
            if user.principal_stable_debt.is_zero() {
                user.borrow_rate = U256::zero();
            }
        }

        for address in &addresses {
            let mirrored = match self.user(*address)?.interest_redirection_address {
                None => Some(U256::zero()),
                Some(target) => self.users.get(&target).map(|t| t.redirected_balance),
            };
            if let Some(value) = mirrored {
                self.user_mut(*address)?.redirection_target_redirected_balance = value;
            }
        }

        Ok(Expected {
            reserve: self.reserve,
            users: self.users,
        })
    }
}

pub(crate) fn kind_mismatch(expected: ActionKind, got: ActionKind) -> PredictError {
    PredictError::KindMismatch { expected, got }
}
