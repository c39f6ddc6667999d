//! Scenario: Repayment, rate swap and rebalance predictions
//!
//! # Invariants under test
//!
//! 1. Repay `Max` with stable debt 80 and origination fee 2 clears both;
//!    the fee is consumed first and only the 80 of principal returns to the
//!    pool.
//!
//! 2. A payment not larger than the outstanding fee only reduces the fee.
//!
//! 3. Repaying on behalf of another user needs an explicit amount.
//!
//! 4. Swapping stable -> variable moves the whole accrued debt; the fee is
//!    untouched and the stable book empties.
//!
//! 5. A stable borrow, a swap into stable and a rebalance all lock the
//!    pool's average stable rate as it stood before the action, not the
//!    rate currently offered to new borrowers.
//!
//! All tests are pure; no IO.

use std::collections::BTreeMap;

use lpo_math::{ray, wad, InterestRateStrategy, U256};
use lpo_predict::{predict, MarketParams, PredictError, PredictionInput, Timing};
use lpo_schemas::{Action, Address, AmountRequest, RateMode, ReserveSnapshot, UserReserveSnapshot};

const TA: u64 = 50_000;

fn pct(p: u64) -> U256 {
    ray() * U256::from(p) / U256::from(100u64)
}

fn units(n: u64) -> U256 {
    U256::from(n) * wad()
}

fn market() -> MarketParams {
    MarketParams {
        strategy: InterestRateStrategy {
            optimal_utilization: InterestRateStrategy::default_optimal_utilization(),
            base_variable_borrow_rate: pct(1),
            variable_rate_slope1: pct(8),
            variable_rate_slope2: pct(100),
            stable_rate_slope1: pct(10),
            stable_rate_slope2: pct(100),
        },
        origination_fee: wad() * U256::from(25u64) / U256::from(10_000u64),
        native: false,
    }
}

/// Reserve holding one stable borrow of 80 at 10%, last touched at `TA`.
fn reserve_with_stable_debt() -> ReserveSnapshot {
    ReserveSnapshot {
        symbol: "DAI".to_string(),
        decimals: 18,
        a_token_address: Address::from_label("aDAI"),
        total_liquidity: units(1_000),
        available_liquidity: units(920),
        total_borrows_stable: units(80),
        total_borrows_variable: U256::zero(),
        liquidity_index: ray(),
        variable_borrow_index: ray(),
        current_liquidity_rate: pct(1),
        current_variable_borrow_rate: pct(2),
        current_stable_borrow_rate: pct(4),
        current_average_stable_borrow_rate: pct(10),
        utilization_rate: pct(8),
        market_stable_rate: pct(3),
        last_update_timestamp: TA,
    }
}

fn stable_borrower() -> UserReserveSnapshot {
    let mut user = UserReserveSnapshot::empty(units(100));
    user.principal_stable_debt = units(80);
    user.current_stable_debt = units(80);
    user.borrow_rate_mode = RateMode::Stable;
    user.borrow_rate = pct(10);
    user.stable_borrow_last_update_timestamp = TA;
    user.origination_fee = units(2);
    user
}

/// Two stable borrowers of 80 each, at 10% and 4%: average 7%.
fn reserve_with_two_stable_borrowers() -> ReserveSnapshot {
    ReserveSnapshot {
        available_liquidity: units(840),
        total_borrows_stable: units(160),
        current_average_stable_borrow_rate: pct(7),
        utilization_rate: pct(16),
        ..reserve_with_stable_debt()
    }
}

fn variable_borrower(principal: U256) -> UserReserveSnapshot {
    let mut user = UserReserveSnapshot::empty(units(100));
    user.principal_variable_debt = principal;
    user.current_variable_debt = principal;
    user.variable_borrow_index = ray();
    user.borrow_rate_mode = RateMode::Variable;
    user
}

fn input(users: Vec<(Address, UserReserveSnapshot)>, actor: Address) -> PredictionInput {
    PredictionInput {
        reserve: reserve_with_stable_debt(),
        users: users.into_iter().collect::<BTreeMap<_, _>>(),
        actor,
        timing: Timing {
            action_ts: TA,
            query_ts: TA,
        },
        tx_cost: U256::zero(),
        market: market(),
    }
}

// ---------------------------------------------------------------------------
// 1. Repay max: fee first, then principal
// ---------------------------------------------------------------------------

#[test]
fn repay_max_clears_stable_debt_and_fee() {
    let alice = Address::from_label("alice");
    let out = predict(
        &Action::Repay {
            amount: AmountRequest::Max,
            rate_mode: RateMode::Stable,
            on_behalf_of: alice,
        },
        &input(vec![(alice, stable_borrower())], alice),
    )
    .unwrap();

    let a = &out.users[&alice];
    assert_eq!(a.principal_stable_debt, U256::zero());
    assert_eq!(a.current_stable_debt, U256::zero());
    assert_eq!(a.origination_fee, U256::zero());
    assert_eq!(a.borrow_rate, U256::zero());
    assert_eq!(a.borrow_rate_mode, RateMode::None);
    assert_eq!(a.wallet_balance, units(18), "paid 80 principal + 2 fee");

    let r = &out.reserve;
    assert_eq!(r.available_liquidity, units(1_000), "fee does not enter the pool");
    assert_eq!(r.total_borrows_stable, U256::zero());
    assert_eq!(r.current_average_stable_borrow_rate, U256::zero());
    assert_eq!(r.utilization_rate, U256::zero());
}

// ---------------------------------------------------------------------------
// 2. Payment within the fee
// ---------------------------------------------------------------------------

#[test]
fn payment_below_fee_only_reduces_fee() {
    let alice = Address::from_label("alice");
    let out = predict(
        &Action::Repay {
            amount: AmountRequest::Exact(units(1)),
            rate_mode: RateMode::Stable,
            on_behalf_of: alice,
        },
        &input(vec![(alice, stable_borrower())], alice),
    )
    .unwrap();

    let a = &out.users[&alice];
    assert_eq!(a.origination_fee, units(1));
    assert_eq!(a.principal_stable_debt, units(80));
    assert_eq!(a.borrow_rate, pct(10));
    assert_eq!(a.borrow_rate_mode, RateMode::Stable);
    assert_eq!(out.reserve.available_liquidity, units(920));
    assert_eq!(out.reserve.total_borrows_stable, units(80));
}

#[test]
fn partial_repay_splits_fee_and_principal() {
    let alice = Address::from_label("alice");
    let out = predict(
        &Action::Repay {
            amount: AmountRequest::Exact(units(30)),
            rate_mode: RateMode::Stable,
            on_behalf_of: alice,
        },
        &input(vec![(alice, stable_borrower())], alice),
    )
    .unwrap();

    let a = &out.users[&alice];
    assert_eq!(a.origination_fee, U256::zero());
    assert_eq!(a.principal_stable_debt, units(52));
    assert_eq!(out.reserve.available_liquidity, units(948));
    assert_eq!(out.reserve.total_borrows_stable, units(52));
    assert_eq!(out.reserve.current_average_stable_borrow_rate, pct(10));
}

// ---------------------------------------------------------------------------
// 3. On-behalf repayment
// ---------------------------------------------------------------------------

#[test]
fn repay_max_on_behalf_is_refused() {
    let alice = Address::from_label("alice");
    let bob = Address::from_label("bob");
    let err = predict(
        &Action::Repay {
            amount: AmountRequest::Max,
            rate_mode: RateMode::Stable,
            on_behalf_of: alice,
        },
        &input(
            vec![
                (alice, stable_borrower()),
                (bob, UserReserveSnapshot::empty(units(100))),
            ],
            bob,
        ),
    )
    .unwrap_err();
    assert!(matches!(err, PredictError::InvalidAction { .. }), "{err}");
}

#[test]
fn repay_on_behalf_charges_the_payer() {
    let alice = Address::from_label("alice");
    let bob = Address::from_label("bob");
    let out = predict(
        &Action::Repay {
            amount: AmountRequest::Exact(units(10)),
            rate_mode: RateMode::Stable,
            on_behalf_of: alice,
        },
        &input(
            vec![
                (alice, stable_borrower()),
                (bob, UserReserveSnapshot::empty(units(100))),
            ],
            bob,
        ),
    )
    .unwrap();
    assert_eq!(out.users[&bob].wallet_balance, units(90));
    assert_eq!(out.users[&alice].wallet_balance, units(100));
    assert_eq!(out.users[&alice].principal_stable_debt, units(72));
}

// ---------------------------------------------------------------------------
// 4. Swap
// ---------------------------------------------------------------------------

#[test]
fn swap_stable_to_variable_moves_whole_debt() {
    let alice = Address::from_label("alice");
    let out = predict(
        &Action::SwapRateMode {
            from_mode: RateMode::Stable,
        },
        &input(vec![(alice, stable_borrower())], alice),
    )
    .unwrap();

    let a = &out.users[&alice];
    assert_eq!(a.principal_stable_debt, U256::zero());
    assert_eq!(a.principal_variable_debt, units(80));
    assert_eq!(a.variable_borrow_index, ray());
    assert_eq!(a.borrow_rate_mode, RateMode::Variable);
    assert_eq!(a.borrow_rate, U256::zero());
    assert_eq!(a.origination_fee, units(2), "fee unchanged");

    let r = &out.reserve;
    assert_eq!(r.total_borrows_stable, U256::zero());
    assert_eq!(r.current_average_stable_borrow_rate, U256::zero());
    assert_eq!(r.total_borrows_variable, units(80));
    assert_eq!(r.total_liquidity, units(1_000));
}

#[test]
fn swap_from_mode_without_debt_is_refused() {
    let alice = Address::from_label("alice");
    let err = predict(
        &Action::SwapRateMode {
            from_mode: RateMode::Variable,
        },
        &input(vec![(alice, stable_borrower())], alice),
    )
    .unwrap_err();
    assert!(matches!(err, PredictError::InvalidAction { .. }), "{err}");
}

// ---------------------------------------------------------------------------
// 5. Locked stable rate
// ---------------------------------------------------------------------------

#[test]
fn stable_borrow_locks_average_rate_not_offered_rate() {
    let alice = Address::from_label("alice");
    let dave = Address::from_label("dave");
    let out = predict(
        &Action::Borrow {
            amount: units(10),
            rate_mode: RateMode::Stable,
        },
        &input(
            vec![
                (alice, stable_borrower()),
                (dave, UserReserveSnapshot::empty(U256::zero())),
            ],
            dave,
        ),
    )
    .unwrap();

    let d = &out.users[&dave];
    assert_eq!(d.borrow_rate, pct(10), "average 10%, offered 4%");
    assert_eq!(d.principal_stable_debt, units(10));
    assert_eq!(d.borrow_rate_mode, RateMode::Stable);
    assert_eq!(d.wallet_balance, units(10));
    assert_eq!(out.reserve.total_borrows_stable, units(90));
    assert_eq!(out.reserve.current_average_stable_borrow_rate, pct(10));
}

#[test]
fn first_stable_borrow_locks_offered_rate() {
    let dave = Address::from_label("dave");
    let mut inp = input(vec![(dave, UserReserveSnapshot::empty(U256::zero()))], dave);
    inp.reserve = ReserveSnapshot {
        available_liquidity: units(1_000),
        total_borrows_stable: U256::zero(),
        current_average_stable_borrow_rate: U256::zero(),
        utilization_rate: U256::zero(),
        ..reserve_with_stable_debt()
    };

    let out = predict(
        &Action::Borrow {
            amount: units(10),
            rate_mode: RateMode::Stable,
        },
        &inp,
    )
    .unwrap();

    assert_eq!(out.users[&dave].borrow_rate, pct(4));
    assert_eq!(out.reserve.current_average_stable_borrow_rate, pct(4));
}

#[test]
fn swap_variable_to_stable_locks_average_rate() {
    let alice = Address::from_label("alice");
    let erin = Address::from_label("erin");
    let mut inp = input(
        vec![
            (alice, stable_borrower()),
            (erin, variable_borrower(units(50))),
        ],
        erin,
    );
    inp.reserve = ReserveSnapshot {
        available_liquidity: units(870),
        total_borrows_variable: units(50),
        utilization_rate: pct(13),
        ..reserve_with_stable_debt()
    };

    let out = predict(
        &Action::SwapRateMode {
            from_mode: RateMode::Variable,
        },
        &inp,
    )
    .unwrap();

    let e = &out.users[&erin];
    assert_eq!(e.borrow_rate, pct(10));
    assert_eq!(e.principal_stable_debt, units(50));
    assert_eq!(e.principal_variable_debt, U256::zero());
    assert_eq!(e.borrow_rate_mode, RateMode::Stable);
    assert_eq!(out.reserve.total_borrows_stable, units(130));
    assert_eq!(out.reserve.total_borrows_variable, U256::zero());
    assert_eq!(out.reserve.current_average_stable_borrow_rate, pct(10));
}

#[test]
fn rebalance_adopts_average_stable_rate() {
    let alice = Address::from_label("alice");
    let bob = Address::from_label("bob");
    let carol = Address::from_label("carol");
    let mut low = stable_borrower();
    low.borrow_rate = pct(4);
    let mut inp = input(
        vec![
            (alice, stable_borrower()),
            (bob, UserReserveSnapshot::empty(U256::zero())),
            (carol, low),
        ],
        bob,
    );
    inp.reserve = reserve_with_two_stable_borrowers();

    let out = predict(&Action::RebalanceStableRate { target: alice }, &inp).unwrap();

    let a = &out.users[&alice];
    assert_eq!(a.borrow_rate, pct(7), "average before the action, not the offered 4%");
    assert_eq!(a.principal_stable_debt, units(80));
    // (80 at 4% + 80 at 7%) / 160
    assert_eq!(
        out.reserve.current_average_stable_borrow_rate,
        ray() * U256::from(55u64) / U256::from(1_000u64)
    );
    assert_eq!(out.reserve.total_borrows_stable, units(160));
    assert_eq!(out.users[&carol].borrow_rate, pct(4));
}
