//! Deterministic in-memory lending ledger.
//!
//! Storage follows the pooled-reserve model the oracle targets:
//! - per reserve: cash, stable/variable totals, average stable rate,
//!   cumulative indices, current rates, last update timestamp;
//! - per user and reserve: deposit principal + personal index, redirection
//!   state, stable principal + locked rate, variable principal + personal
//!   index, origination fee;
//! - wallets per (asset, user); the native asset is pre-funded.
//!
//! Design decisions (kept simple/deterministic):
//! - Every submission (reverted or not) mines one block: the clock advances by
//!   `block_interval_secs` and the action executes at the new timestamp.
//! - A successful action costs `gas_cost` of the native asset, charged to the
//!   actor after execution. Reverted actions cost nothing.
//! - Actions execute against a scratch copy of the state; a revert discards
//!   it, so a failed action never leaves partial effects.
//! - Borrow eligibility is single-asset: any collateral-enabled deposit with a
//!   non-zero balance counts. No price oracle, no health factor.
//!
//! This is a test double, not a reference for the system under test.

use std::collections::{BTreeMap, BTreeSet};

use anyhow::Context;
use lpo_config::OracleConfig;
use lpo_math::{
    a_token_balance, accrue_indexes, add, normalized_income, parse_units, ray, stable_debt, sub,
    utilization_rate, variable_debt, ATokenPosition, IndexState, InterestRateStrategy, MathError,
    StableBook, WadRayMath, U256,
};
use lpo_predict::resolve_rate_mode;
use lpo_schemas::{
    Action, Address, AmountRequest, RateMode, ReserveSnapshot, UserReserveSnapshot,
};

use crate::collaborators::{
    ActionSubmitter, AmountConverter, LedgerFailure, Receipt, SnapshotSource, TimeControl,
};

/// Clock value of a freshly built ledger.
pub const GENESIS_TIMESTAMP: u64 = 1_600_000_000;

/// Native balance every account starts with, human units.
pub const DEFAULT_NATIVE_ENDOWMENT: &str = "1000";

/// Largest stable loan as a percentage of available liquidity.
const MAX_STABLE_LOAN_PERCENT: u64 = 25;

/// A stable rate above `current_stable_rate * (1 + delta)` may be rebalanced
/// down. 20% in ray.
fn rebalance_down_delta() -> U256 {
    ray() / U256::from(5u64)
}

type Outcome<T> = Result<T, LedgerFailure>;

impl From<MathError> for LedgerFailure {
    fn from(e: MathError) -> Self {
        LedgerFailure::new(e.to_string())
    }
}

fn revert(reason: &str) -> LedgerFailure {
    LedgerFailure::new(reason)
}

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Default)]
struct PaperUser {
    principal: U256,
    user_index: U256,
    redirected_balance: U256,
    redirect_to: Option<Address>,
    allowance: Option<Address>,
    collateral: bool,
    principal_stable: U256,
    stable_rate: U256,
    stable_last_update: u64,
    principal_variable: U256,
    variable_index: U256,
    origination_fee: U256,
    rate_mode: RateMode,
}

#[derive(Clone, Debug)]
struct PaperReserve {
    symbol: String,
    decimals: u32,
    native: bool,
    strategy: InterestRateStrategy,
    market_stable_rate: U256,
    available: U256,
    total_borrows_stable: U256,
    total_borrows_variable: U256,
    average_stable_rate: U256,
    liquidity_index: U256,
    variable_borrow_index: U256,
    liquidity_rate: U256,
    variable_rate: U256,
    stable_rate: U256,
    last_update: u64,
    users: BTreeMap<Address, PaperUser>,
}

/// Result of minting a user's accrued interest into principal.
struct Cumulated {
    previous_principal: U256,
    balance: U256,
    increase: U256,
}

impl PaperReserve {
    fn total_borrows(&self) -> Outcome<U256> {
        Ok(add(
            self.total_borrows_stable,
            self.total_borrows_variable,
            "total_borrows",
        )?)
    }

    fn user(&self, address: Address) -> PaperUser {
        self.users.get(&address).cloned().unwrap_or_default()
    }

    fn user_mut(&mut self, address: Address) -> &mut PaperUser {
        self.users.entry(address).or_default()
    }

    fn accrue(&mut self, now: u64) -> Outcome<()> {
        let next = accrue_indexes(
            self.total_borrows()?,
            self.liquidity_rate,
            self.variable_rate,
            IndexState {
                liquidity_index: self.liquidity_index,
                variable_borrow_index: self.variable_borrow_index,
            },
            self.last_update,
            now,
        )?;
        self.liquidity_index = next.liquidity_index;
        self.variable_borrow_index = next.variable_borrow_index;
        self.last_update = now;
        Ok(())
    }

    fn update_rates(&mut self, added: U256, taken: U256, now: u64) -> Outcome<()> {
        self.available = sub(add(self.available, added, "cash")?, taken, "cash")?;
        let total_borrows = self.total_borrows()?;
        let total_liquidity = add(self.available, total_borrows, "total_liquidity")?;
        let rates = self.strategy.calculate_rates(
            utilization_rate(total_borrows, total_liquidity)?,
            self.market_stable_rate,
            self.total_borrows_stable,
            self.total_borrows_variable,
            self.average_stable_rate,
        )?;
        self.liquidity_rate = rates.liquidity_rate;
        self.stable_rate = rates.stable_borrow_rate;
        self.variable_rate = rates.variable_borrow_rate;
        self.last_update = now;
        Ok(())
    }

    fn stable_book(&self) -> StableBook {
        StableBook::new(self.total_borrows_stable, self.average_stable_rate)
    }

    fn set_stable_book(&mut self, book: StableBook) {
        self.total_borrows_stable = book.total;
        self.average_stable_rate = book.average_rate;
    }

    fn stable_lock_rate(&self) -> U256 {
        if self.total_borrows_stable.is_zero() {
            self.stable_rate
        } else {
            self.average_stable_rate
        }
    }

    fn income(&self, now: u64) -> Outcome<U256> {
        Ok(normalized_income(
            self.liquidity_rate,
            self.liquidity_index,
            self.last_update,
            now,
        )?)
    }

    fn balance_of(&self, address: Address, now: u64) -> Outcome<U256> {
        let Some(u) = self.users.get(&address) else {
            return Ok(U256::zero());
        };
        let position = ATokenPosition {
            principal: u.principal,
            redirected_balance: u.redirected_balance,
            user_index: u.user_index,
            redirecting: u.redirect_to.is_some(),
        };
        Ok(a_token_balance(&position, self.income(now)?)?)
    }

    fn cumulate(&mut self, address: Address, now: u64) -> Outcome<Cumulated> {
        let income = self.income(now)?;
        let balance = self.balance_of(address, now)?;
        let user = self.user_mut(address);
        let previous_principal = user.principal;
        let increase = balance.saturating_sub(previous_principal);
        user.principal = add(previous_principal, increase, "cumulate")?;
        user.user_index = income;
        Ok(Cumulated {
            previous_principal,
            balance: user.principal,
            increase,
        })
    }

    fn update_redirected_of_target(
        &mut self,
        address: Address,
        to_add: U256,
        to_remove: U256,
        now: u64,
    ) -> Outcome<()> {
        let Some(target) = self.user(address).redirect_to else {
            return Ok(());
        };
        let cumulated = self.cumulate(target, now)?;
        let target_user = self.user_mut(target);
        target_user.redirected_balance = sub(
            add(target_user.redirected_balance, to_add, "redirected")?,
            to_remove,
            "redirected",
        )?;
        if let Some(next_hop) = target_user.redirect_to {
            let hop = self.user_mut(next_hop);
            hop.redirected_balance = add(hop.redirected_balance, cumulated.increase, "redirected")?;
        }
        Ok(())
    }

    fn stable_debt_of(&self, u: &PaperUser, now: u64) -> Outcome<U256> {
        Ok(stable_debt(
            u.principal_stable,
            u.stable_rate,
            u.stable_last_update,
            now,
        )?)
    }

    fn variable_debt_of(&self, u: &PaperUser, now: u64) -> Outcome<U256> {
        Ok(variable_debt(
            u.principal_variable,
            u.variable_index,
            self.variable_rate,
            self.variable_borrow_index,
            self.last_update,
            now,
        )?)
    }

    /// Stable loans may not be backed by collateral in the same reserve
    /// unless they exceed it.
    fn stable_borrow_allowed(&self, address: Address, amount: U256, now: u64) -> Outcome<bool> {
        let user = self.user(address);
        Ok(!user.collateral || amount > self.balance_of(address, now)?)
    }
}

#[derive(Clone, Debug, Default)]
struct Wallets {
    balances: BTreeMap<(String, Address), U256>,
    approvals: BTreeSet<(String, Address)>,
    native: Option<String>,
    endowment: U256,
}

impl Wallets {
    fn balance(&self, asset: &str, user: Address) -> U256 {
        match self.balances.get(&(asset.to_string(), user)) {
            Some(v) => *v,
            None if self.native.as_deref() == Some(asset) => self.endowment,
            None => U256::zero(),
        }
    }

    fn credit(&mut self, asset: &str, user: Address, amount: U256) -> Outcome<()> {
        let next = add(self.balance(asset, user), amount, "wallet")?;
        self.balances.insert((asset.to_string(), user), next);
        Ok(())
    }

    fn debit(&mut self, asset: &str, user: Address, amount: U256) -> Outcome<()> {
        let current = self.balance(asset, user);
        if current < amount {
            return Err(revert("insufficient wallet balance"));
        }
        self.balances.insert((asset.to_string(), user), current - amount);
        Ok(())
    }

    fn approved(&self, asset: &str, user: Address) -> bool {
        self.native.as_deref() == Some(asset)
            || self.approvals.contains(&(asset.to_string(), user))
    }
}

#[derive(Clone, Debug)]
struct LedgerState {
    reserves: BTreeMap<String, PaperReserve>,
    wallets: Wallets,
}

/// Per-submission context.
#[derive(Clone, Copy)]
struct Tx {
    actor: Address,
    now: u64,
    value: U256,
    origination_fee: U256,
}

// ---------------------------------------------------------------------------
// PaperLedger
// ---------------------------------------------------------------------------

/// In-memory ledger implementing every collaborator contract.
#[derive(Clone, Debug)]
pub struct PaperLedger {
    state: LedgerState,
    clock: u64,
    block_interval_secs: u64,
    gas_cost: U256,
    origination_fee: U256,
    tx_count: u64,
}

impl PaperLedger {
    /// Build a ledger with one reserve per configured asset, clock at
    /// [`GENESIS_TIMESTAMP`].
    pub fn from_config(cfg: &OracleConfig) -> anyhow::Result<Self> {
        let clock = GENESIS_TIMESTAMP;
        let mut reserves = BTreeMap::new();
        for (symbol, rc) in &cfg.reserves {
            let strategy = rc.strategy.to_strategy()?;
            let market_stable_rate = rc.market_stable_rate_ray()?;
            let rates = strategy
                .calculate_rates(
                    U256::zero(),
                    market_stable_rate,
                    U256::zero(),
                    U256::zero(),
                    U256::zero(),
                )
                .map_err(|e| anyhow::anyhow!("initial rates for {symbol}: {e}"))?;
            reserves.insert(
                symbol.clone(),
                PaperReserve {
                    symbol: symbol.clone(),
                    decimals: rc.decimals,
                    native: rc.native,
                    strategy,
                    market_stable_rate,
                    available: U256::zero(),
                    total_borrows_stable: U256::zero(),
                    total_borrows_variable: U256::zero(),
                    average_stable_rate: U256::zero(),
                    liquidity_index: ray(),
                    variable_borrow_index: ray(),
                    liquidity_rate: rates.liquidity_rate,
                    variable_rate: rates.variable_borrow_rate,
                    stable_rate: rates.stable_borrow_rate,
                    last_update: clock,
                    users: BTreeMap::new(),
                },
            );
        }

        let native = cfg.native_symbol().map(str::to_string);
        let endowment = match &native {
            Some(symbol) => {
                let decimals = cfg.reserve(symbol)?.decimals;
                parse_units(DEFAULT_NATIVE_ENDOWMENT, decimals)
                    .context("native endowment does not fit the native decimals")?
            }
            None => U256::zero(),
        };

        Ok(Self {
            state: LedgerState {
                reserves,
                wallets: Wallets {
                    native,
                    endowment,
                    ..Wallets::default()
                },
            },
            clock,
            block_interval_secs: cfg.market.block_interval_secs,
            gas_cost: cfg.gas_cost_units()?,
            origination_fee: cfg.origination_fee_wad()?,
            tx_count: 0,
        })
    }

    /// Override the starting native balance of accounts not yet touched.
    pub fn with_native_endowment(mut self, endowment: U256) -> Self {
        self.state.wallets.endowment = endowment;
        self
    }

    pub fn gas_cost(&self) -> U256 {
        self.gas_cost
    }

    /// Successful submissions so far.
    pub fn tx_count(&self) -> u64 {
        self.tx_count
    }

    pub fn wallet_balance(&self, reserve: &str, user: Address) -> U256 {
        self.state.wallets.balance(reserve, user)
    }

    fn reserve(&self, symbol: &str) -> Outcome<&PaperReserve> {
        self.state
            .reserves
            .get(symbol)
            .ok_or_else(|| LedgerFailure::new(format!("unknown reserve '{symbol}'")))
    }

    fn mine(&mut self) -> Outcome<u64> {
        self.clock = self
            .clock
            .checked_add(self.block_interval_secs)
            .ok_or_else(|| LedgerFailure::new("ledger clock overflow"))?;
        Ok(self.clock)
    }
}

// ---------------------------------------------------------------------------
// Action execution
// ---------------------------------------------------------------------------

fn has_collateral(state: &LedgerState, user: Address, now: u64) -> Outcome<bool> {
    for reserve in state.reserves.values() {
        if reserve.user(user).collateral && !reserve.balance_of(user, now)?.is_zero() {
            return Ok(true);
        }
    }
    Ok(false)
}

fn execute(state: &mut LedgerState, symbol: &str, action: &Action, tx: Tx) -> Outcome<()> {
    let collateral = has_collateral(state, tx.actor, tx.now)?;
    let LedgerState { reserves, wallets } = state;
    let r = reserves
        .get_mut(symbol)
        .ok_or_else(|| LedgerFailure::new(format!("unknown reserve '{symbol}'")))?;

    let payable = matches!(action, Action::Supply { .. } | Action::Repay { .. });
    if !tx.value.is_zero() && !(payable && r.native) {
        return Err(revert("the action does not accept native value"));
    }

    match *action {
        Action::Supply { amount } => supply(r, wallets, tx, amount),
        Action::Withdraw { amount } => withdraw(r, wallets, tx, amount),
        Action::Borrow { amount, rate_mode } => borrow(r, wallets, tx, amount, rate_mode, collateral),
        Action::Repay {
            amount,
            rate_mode,
            on_behalf_of,
        } => repay(r, wallets, tx, amount, rate_mode, on_behalf_of),
        Action::SetCollateral { enabled } => set_collateral(r, tx, enabled),
        Action::SwapRateMode { from_mode } => swap_rate_mode(r, tx, from_mode),
        Action::RebalanceStableRate { target } => rebalance_stable_rate(r, tx, target),
        Action::RedirectInterest { to } => redirect(r, tx.now, tx.actor, to),
        Action::RedirectInterestOf { from, to } => {
            if r.user(from).allowance != Some(tx.actor) {
                return Err(revert(
                    "Caller is not allowed to redirect the interest of the user",
                ));
            }
            redirect(r, tx.now, from, to)
        }
        Action::AllowInterestRedirection { to } => {
            if to == Some(tx.actor) {
                return Err(revert("User cannot give allowance to himself"));
            }
            r.accrue(tx.now)?;
            r.user_mut(tx.actor).allowance = to;
            Ok(())
        }
    }
}

fn supply(r: &mut PaperReserve, w: &mut Wallets, tx: Tx, amount: U256) -> Outcome<()> {
    if amount.is_zero() {
        return Err(revert("Amount must be greater than 0"));
    }
    if r.native {
        if tx.value != amount {
            return Err(revert(
                "The amount and the value sent to deposit do not match",
            ));
        }
    } else if !w.approved(&r.symbol, tx.actor) {
        return Err(revert("transfer amount exceeds allowance"));
    }
    w.debit(&r.symbol, tx.actor, amount)?;

    let first_deposit = r.balance_of(tx.actor, tx.now)?.is_zero();
    r.accrue(tx.now)?;
    r.update_rates(amount, U256::zero(), tx.now)?;

    let cumulated = r.cumulate(tx.actor, tx.now)?;
    r.update_redirected_of_target(
        tx.actor,
        add(cumulated.increase, amount, "supply")?,
        U256::zero(),
        tx.now,
    )?;
    let user = r.user_mut(tx.actor);
    user.principal = add(user.principal, amount, "supply")?;
    if first_deposit {
        user.collateral = true;
    }
    Ok(())
}

fn withdraw(r: &mut PaperReserve, w: &mut Wallets, tx: Tx, request: AmountRequest) -> Outcome<()> {
    r.accrue(tx.now)?;
    let cumulated = r.cumulate(tx.actor, tx.now)?;
    let amount = match request {
        AmountRequest::Exact(n) => n,
        AmountRequest::Max => cumulated.balance,
    };
    if amount.is_zero() {
        return Err(revert("Amount to redeem needs to be > 0"));
    }
    if amount > cumulated.balance {
        return Err(revert(
            "User cannot redeem more than the available balance",
        ));
    }
    if amount > r.available {
        return Err(revert(
            "There is not enough liquidity available to redeem",
        ));
    }

    r.update_redirected_of_target(tx.actor, cumulated.increase, amount, tx.now)?;
    let user = r.user_mut(tx.actor);
    user.principal = sub(user.principal, amount, "withdraw")?;
    if user.principal.is_zero() {
        user.collateral = false;
        if user.redirected_balance.is_zero() {
            user.user_index = U256::zero();
            user.redirect_to = None;
        }
    }
    w.credit(&r.symbol, tx.actor, amount)?;
    r.update_rates(U256::zero(), amount, tx.now)
}

fn borrow(
    r: &mut PaperReserve,
    w: &mut Wallets,
    tx: Tx,
    amount: U256,
    mode: RateMode,
    has_collateral: bool,
) -> Outcome<()> {
    if mode == RateMode::None {
        return Err(revert("Invalid interest rate mode"));
    }
    if amount.is_zero() {
        return Err(revert("Amount must be greater than 0"));
    }
    if amount > r.available {
        return Err(revert(
            "There is not enough liquidity available in the reserve",
        ));
    }
    if !has_collateral {
        return Err(revert("The collateral balance is 0"));
    }
    if mode == RateMode::Stable {
        if !r.stable_borrow_allowed(tx.actor, amount, tx.now)? {
            return Err(revert(
                "User cannot borrow the selected amount with a stable rate",
            ));
        }
        let max_loan = r.available * U256::from(MAX_STABLE_LOAN_PERCENT) / U256::from(100u64);
        if amount > max_loan {
            return Err(revert(
                "User is trying to borrow too much liquidity at a stable rate",
            ));
        }
    }

    r.accrue(tx.now)?;
    let user = r.user(tx.actor);
    match mode {
        RateMode::Stable => {
            let new_principal = add(r.stable_debt_of(&user, tx.now)?, amount, "borrow")?;
            let rate = r.stable_lock_rate();
            let book = r.stable_book().restate(
                user.principal_stable,
                user.stable_rate,
                new_principal,
                rate,
            )?;
            r.set_stable_book(book);
            let u = r.user_mut(tx.actor);
            u.principal_stable = new_principal;
            u.stable_rate = rate;
            u.stable_last_update = tx.now;
        }
        RateMode::Variable => {
            let accrued = r.variable_debt_of(&user, tx.now)?;
            let increase = accrued.saturating_sub(user.principal_variable);
            r.total_borrows_variable = add(
                r.total_borrows_variable,
                add(increase, amount, "borrow")?,
                "borrow",
            )?;
            let index = r.variable_borrow_index;
            let u = r.user_mut(tx.actor);
            u.principal_variable = add(accrued, amount, "borrow")?;
            u.variable_index = index;
        }
        // rejected above
        RateMode::None => {}
    }

    let fee = amount.wad_mul(tx.origination_fee)?;
    let u = r.user_mut(tx.actor);
    u.origination_fee = add(u.origination_fee, fee, "borrow")?;
    u.rate_mode = resolve_rate_mode(mode, u.principal_stable, u.principal_variable);
    w.credit(&r.symbol, tx.actor, amount)?;
    r.update_rates(U256::zero(), amount, tx.now)
}

fn repay(
    r: &mut PaperReserve,
    w: &mut Wallets,
    tx: Tx,
    request: AmountRequest,
    rate_mode: RateMode,
    on_behalf_of: Address,
) -> Outcome<()> {
    if request == AmountRequest::Exact(U256::zero()) {
        return Err(revert("Amount must be greater than 0"));
    }
    r.accrue(tx.now)?;
    let user = r.user(on_behalf_of);
    let mode = match rate_mode {
        RateMode::None => user.rate_mode,
        explicit => explicit,
    };
    let (principal, accrued) = match mode {
        RateMode::Stable => (user.principal_stable, r.stable_debt_of(&user, tx.now)?),
        RateMode::Variable => (user.principal_variable, r.variable_debt_of(&user, tx.now)?),
        RateMode::None => (U256::zero(), U256::zero()),
    };
    if accrued.is_zero() {
        return Err(revert("The user does not have any borrow pending"));
    }
    if request == AmountRequest::Max && tx.actor != on_behalf_of {
        return Err(revert(
            "To repay on behalf of an user an explicit amount to repay is needed",
        ));
    }

    let fee = user.origination_fee;
    let increase = accrued.saturating_sub(principal);
    let mut payback = add(accrued, fee, "repay")?;
    if let AmountRequest::Exact(n) = request {
        payback = payback.min(n);
    }
    if r.native {
        if tx.value < payback {
            return Err(revert("Invalid msg.value sent for the repayment"));
        }
    } else if !w.approved(&r.symbol, tx.actor) {
        return Err(revert("transfer amount exceeds allowance"));
    }
    w.debit(&r.symbol, tx.actor, payback)?;

    let (principal_part, fee_part) = if payback <= fee {
        (U256::zero(), payback)
    } else {
        (payback - fee, fee)
    };
    let repaid_whole_loan = principal_part == accrued;
    let new_principal = sub(add(principal, increase, "repay")?, principal_part, "repay")?;

    match mode {
        RateMode::Stable => {
            let book = r
                .stable_book()
                .increase(increase, user.stable_rate)?
                .decrease(principal_part, user.stable_rate)?;
            r.set_stable_book(book);
            let u = r.user_mut(on_behalf_of);
            u.principal_stable = new_principal;
            u.stable_last_update = tx.now;
            if repaid_whole_loan {
                u.stable_rate = U256::zero();
            }
        }
        RateMode::Variable => {
            r.total_borrows_variable = sub(
                add(r.total_borrows_variable, increase, "repay")?,
                principal_part,
                "repay",
            )?;
            let index = r.variable_borrow_index;
            let u = r.user_mut(on_behalf_of);
            u.principal_variable = new_principal;
            u.variable_index = if repaid_whole_loan {
                U256::zero()
            } else {
                index
            };
        }
        RateMode::None => {}
    }

    let u = r.user_mut(on_behalf_of);
    u.origination_fee = sub(u.origination_fee, fee_part, "repay")?;
    u.rate_mode = resolve_rate_mode(mode, u.principal_stable, u.principal_variable);
    r.update_rates(principal_part, U256::zero(), tx.now)
}

fn set_collateral(r: &mut PaperReserve, tx: Tx, enabled: bool) -> Outcome<()> {
    if r.balance_of(tx.actor, tx.now)?.is_zero() {
        return Err(revert("User does not have any liquidity deposited"));
    }
    r.accrue(tx.now)?;
    r.user_mut(tx.actor).collateral = enabled;
    Ok(())
}

fn swap_rate_mode(r: &mut PaperReserve, tx: Tx, from_mode: RateMode) -> Outcome<()> {
    if from_mode == RateMode::None {
        return Err(revert("Invalid interest rate mode"));
    }
    r.accrue(tx.now)?;
    let user = r.user(tx.actor);
    let stable_accrued = r.stable_debt_of(&user, tx.now)?;
    let variable_accrued = r.variable_debt_of(&user, tx.now)?;
    let merged = add(stable_accrued, variable_accrued, "swap")?;

    if from_mode == RateMode::Stable {
        if stable_accrued.is_zero() {
            return Err(revert("The user does not have a borrow in progress"));
        }
        let book = r
            .stable_book()
            .decrease(user.principal_stable, user.stable_rate)?;
        r.set_stable_book(book);
        r.total_borrows_variable = add(
            sub(r.total_borrows_variable, user.principal_variable, "swap")?,
            merged,
            "swap",
        )?;
        let index = r.variable_borrow_index;
        let u = r.user_mut(tx.actor);
        u.principal_stable = U256::zero();
        u.stable_rate = U256::zero();
        u.stable_last_update = tx.now;
        u.principal_variable = merged;
        u.variable_index = index;
    } else {
        if variable_accrued.is_zero() {
            return Err(revert("The user does not have a borrow in progress"));
        }
        if !r.stable_borrow_allowed(tx.actor, merged, tx.now)? {
            return Err(revert(
                "User cannot borrow the selected amount with a stable rate",
            ));
        }
        let rate = r.stable_lock_rate();
        let book = r.stable_book().restate(
            user.principal_stable,
            user.stable_rate,
            merged,
            rate,
        )?;
        r.set_stable_book(book);
        r.total_borrows_variable = sub(r.total_borrows_variable, user.principal_variable, "swap")?;
        let u = r.user_mut(tx.actor);
        u.principal_variable = U256::zero();
        u.variable_index = U256::zero();
        u.principal_stable = merged;
        u.stable_rate = rate;
        u.stable_last_update = tx.now;
    }

    let u = r.user_mut(tx.actor);
    u.rate_mode = resolve_rate_mode(
        from_mode.opposite(),
        u.principal_stable,
        u.principal_variable,
    );
    r.update_rates(U256::zero(), U256::zero(), tx.now)
}

fn rebalance_stable_rate(r: &mut PaperReserve, tx: Tx, target: Address) -> Outcome<()> {
    let user = r.user(target);
    let accrued = r.stable_debt_of(&user, tx.now)?;
    if accrued.is_zero() {
        return Err(revert(
            "User does not have any stable rate loan for this reserve",
        ));
    }
    let down_threshold = r
        .stable_rate
        .ray_mul(add(ray(), rebalance_down_delta(), "rebalance")?)?;
    if !(user.stable_rate < r.liquidity_rate || user.stable_rate > down_threshold) {
        return Err(revert("Interest rate rebalance conditions were not met"));
    }

    r.accrue(tx.now)?;
    let rate = r.stable_lock_rate();
    let book = r
        .stable_book()
        .restate(user.principal_stable, user.stable_rate, accrued, rate)?;
    r.set_stable_book(book);
    let u = r.user_mut(target);
    u.principal_stable = accrued;
    u.stable_rate = rate;
    u.stable_last_update = tx.now;
    r.update_rates(U256::zero(), U256::zero(), tx.now)
}

fn redirect(r: &mut PaperReserve, now: u64, from: Address, to: Address) -> Outcome<()> {
    let current = r.user(from).redirect_to;
    if current == Some(to) {
        return Err(revert("Interest is already redirected to the user"));
    }
    r.accrue(now)?;
    let cumulated = r.cumulate(from, now)?;
    if cumulated.balance.is_zero() {
        return Err(revert(
            "Interest stream can only be redirected if there is a valid balance",
        ));
    }
    if current.is_some() {
        r.update_redirected_of_target(from, U256::zero(), cumulated.previous_principal, now)?;
    }
    if to == from {
        r.user_mut(from).redirect_to = None;
        return Ok(());
    }
    r.user_mut(from).redirect_to = Some(to);
    r.update_redirected_of_target(from, cumulated.balance, U256::zero(), now)
}

// ---------------------------------------------------------------------------
// Collaborator contracts
// ---------------------------------------------------------------------------

impl SnapshotSource for PaperLedger {
    fn read_reserve_snapshot(&self, reserve: &str) -> Result<ReserveSnapshot, LedgerFailure> {
        let r = self.reserve(reserve)?;
        let total_borrows = r.total_borrows()?;
        let total_liquidity = add(r.available, total_borrows, "total_liquidity")?;
        Ok(ReserveSnapshot {
            symbol: r.symbol.clone(),
            decimals: r.decimals,
            a_token_address: Address::from_label(&format!("a{}", r.symbol)),
            total_liquidity,
            available_liquidity: r.available,
            total_borrows_stable: r.total_borrows_stable,
            total_borrows_variable: r.total_borrows_variable,
            liquidity_index: r.liquidity_index,
            variable_borrow_index: r.variable_borrow_index,
            current_liquidity_rate: r.liquidity_rate,
            current_variable_borrow_rate: r.variable_rate,
            current_stable_borrow_rate: r.stable_rate,
            current_average_stable_borrow_rate: r.average_stable_rate,
            utilization_rate: utilization_rate(total_borrows, total_liquidity)?,
            market_stable_rate: r.market_stable_rate,
            last_update_timestamp: r.last_update,
        })
    }

    fn read_user_snapshot(
        &self,
        reserve: &str,
        user: Address,
    ) -> Result<UserReserveSnapshot, LedgerFailure> {
        let r = self.reserve(reserve)?;
        let now = self.clock;
        let u = r.user(user);
        let target_redirected = match u.redirect_to {
            Some(target) => r.user(target).redirected_balance,
            None => U256::zero(),
        };
        Ok(UserReserveSnapshot {
            principal_balance: u.principal,
            current_balance: r.balance_of(user, now)?,
            liquidity_index: u.user_index,
            principal_stable_debt: u.principal_stable,
            current_stable_debt: r.stable_debt_of(&u, now)?,
            principal_variable_debt: u.principal_variable,
            current_variable_debt: r.variable_debt_of(&u, now)?,
            variable_borrow_index: u.variable_index,
            borrow_rate_mode: resolve_rate_mode(u.rate_mode, u.principal_stable, u.principal_variable),
            borrow_rate: if u.principal_stable.is_zero() {
                U256::zero()
            } else {
                u.stable_rate
            },
            stable_borrow_last_update_timestamp: u.stable_last_update,
            usage_as_collateral_enabled: u.collateral,
            origination_fee: u.origination_fee,
            redirected_balance: u.redirected_balance,
            interest_redirection_address: u.redirect_to,
            redirection_target_redirected_balance: target_redirected,
            redirection_allowance: u.allowance,
            wallet_balance: self.state.wallets.balance(reserve, user),
        })
    }

    fn now(&self) -> u64 {
        self.clock
    }
}

impl ActionSubmitter for PaperLedger {
    fn submit(
        &mut self,
        reserve: &str,
        actor: Address,
        action: &Action,
        value: U256,
    ) -> Result<Receipt, LedgerFailure> {
        self.reserve(reserve)?;
        let now = self.mine()?;

        let native = self.state.wallets.native.clone();
        let gas = self.gas_cost;
        if let Some(native) = &native {
            let needed = add(value, gas, "gas")?;
            if self.state.wallets.balance(native, actor) < needed {
                return Err(revert("insufficient native balance for value and gas"));
            }
        }

        let mut scratch = self.state.clone();
        execute(
            &mut scratch,
            reserve,
            action,
            Tx {
                actor,
                now,
                value,
                origination_fee: self.origination_fee,
            },
        )?;
        if let Some(native) = &native {
            scratch.wallets.debit(native, actor, gas)?;
        }
        self.state = scratch;
        self.tx_count += 1;

        Ok(Receipt {
            cost: Some(gas),
            execution_timestamp: Some(now),
        })
    }

    fn mint(&mut self, reserve: &str, user: Address, amount: U256) -> Result<(), LedgerFailure> {
        if self.reserve(reserve)?.native {
            return Err(revert("the native asset cannot be minted"));
        }
        self.mine()?;
        self.state.wallets.credit(reserve, user, amount)
    }

    fn approve(&mut self, reserve: &str, user: Address) -> Result<(), LedgerFailure> {
        self.reserve(reserve)?;
        self.mine()?;
        self.state
            .wallets
            .approvals
            .insert((reserve.to_string(), user));
        Ok(())
    }
}

impl AmountConverter for PaperLedger {
    fn to_smallest_unit(&self, reserve: &str, human: &str) -> Result<U256, LedgerFailure> {
        let decimals = self.reserve(reserve)?.decimals;
        parse_units(human, decimals).map_err(|e| LedgerFailure::new(e.to_string()))
    }

    fn is_native(&self, reserve: &str) -> bool {
        self.state.wallets.native.as_deref() == Some(reserve)
    }
}

impl TimeControl for PaperLedger {
    fn advance_time(&mut self, secs: u64) -> Result<(), LedgerFailure> {
        self.clock = self
            .clock
            .checked_add(secs)
            .ok_or_else(|| LedgerFailure::new(format!("advancing the clock by {secs}s overflows")))?;
        Ok(())
    }
}
