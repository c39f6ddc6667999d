//! Scenario: Oracle against the paper ledger
//!
//! # Invariants under test
//!
//! 1. Supply, variable borrow, a year of accrual, a full repay and a full
//!    withdraw all reconcile against the reference model.
//! 2. A full native repay attaches debt + fee + slack; only the payback and
//!    gas leave the wallet.
//! 3. An expected revert passes; a revert where success was expected is
//!    UnexpectedRevert; a success where a revert was expected is
//!    MissingExpectedRevert carrying the diagnostic.
//! 4. Minting the native asset and a maximum-sentinel supply fail with
//!    InvalidActionInput before the ledger sees any call.
//! 5. Every account reachable through redirection targets is snapshotted,
//!    so a credit that travels two hops still reconciles.

use lpo_config::load_layered_yaml_from_strings;
use lpo_math::U256;
use lpo_schemas::{Address, RateMode};
use lpo_testkit::{
    AmountConverter, OracleError, Orchestrator, PaperLedger, SnapshotSource, Step, StepAction,
    StepState,
};

const CFG: &str = r#"
oracle:
  native_repay_slack: "0.1"
market:
  origination_fee: "0.0025"
  gas_cost: "0.01"
reserves:
  ETH:
    decimals: 18
    native: true
    market_stable_rate: "0.03"
    strategy:
      base_variable_borrow_rate: "0"
      variable_rate_slope1: "0.08"
      variable_rate_slope2: "0.5"
      stable_rate_slope1: "0.1"
      stable_rate_slope2: "0.6"
  DAI:
    decimals: 18
    market_stable_rate: "0.035"
    strategy:
      base_variable_borrow_rate: "0.01"
      variable_rate_slope1: "0.07"
      variable_rate_slope2: "1.5"
      stable_rate_slope1: "0.06"
      stable_rate_slope2: "1.5"
"#;

fn setup() -> (Orchestrator, PaperLedger) {
    let cfg = load_layered_yaml_from_strings(&[CFG])
        .unwrap()
        .oracle_config()
        .unwrap();
    let ledger = PaperLedger::from_config(&cfg).unwrap();
    (Orchestrator::new(cfg), ledger)
}

fn units(n: u64) -> U256 {
    U256::from(n) * U256::exp10(18)
}

fn ok(o: &Orchestrator, l: &mut PaperLedger, step: Step) {
    let name = step.action.name();
    match o.run_step(l, &step) {
        Ok(state) => assert_eq!(state, StepState::Succeeded, "{name}"),
        Err(e) => panic!("{name} on {} failed: {e}", step.reserve),
    }
}

fn fund(o: &Orchestrator, l: &mut PaperLedger, reserve: &str, user: Address, amount: &str) {
    ok(o, l, Step::success(reserve, user, StepAction::Mint { amount: amount.into() }));
    ok(o, l, Step::success(reserve, user, StepAction::Approve));
}

fn supply(o: &Orchestrator, l: &mut PaperLedger, reserve: &str, user: Address, amount: &str) {
    ok(o, l, Step::success(reserve, user, StepAction::Supply { amount: amount.into() }));
}

// ---------------------------------------------------------------------------
// 1. Full lifecycle
// ---------------------------------------------------------------------------

#[test]
fn supply_borrow_accrue_repay_withdraw_reconciles() {
    let (o, mut l) = setup();
    let alice = Address::from_label("alice");
    let bob = Address::from_label("bob");

    fund(&o, &mut l, "DAI", alice, "1000");
    supply(&o, &mut l, "DAI", alice, "1000");
    supply(&o, &mut l, "ETH", bob, "10");

    let mut borrow = Step::success(
        "DAI",
        bob,
        StepAction::Borrow {
            amount: "100".into(),
            rate_mode: RateMode::Variable,
        },
    );
    borrow.time_travel_days = Some(365);
    ok(&o, &mut l, borrow);

    let owed = l.read_user_snapshot("DAI", bob).unwrap();
    assert!(owed.current_variable_debt > units(100), "a year of interest accrued");
    assert_eq!(owed.borrow_rate_mode, RateMode::Variable);

    fund(&o, &mut l, "DAI", bob, "50");
    ok(
        &o,
        &mut l,
        Step::success(
            "DAI",
            bob,
            StepAction::Repay {
                amount: "-1".into(),
                rate_mode: RateMode::None,
                on_behalf_of: None,
            },
        ),
    );

    let settled = l.read_user_snapshot("DAI", bob).unwrap();
    assert!(settled.current_variable_debt.is_zero());
    assert!(settled.origination_fee.is_zero());
    assert_eq!(settled.borrow_rate_mode, RateMode::None);

    ok(
        &o,
        &mut l,
        Step::success("DAI", alice, StepAction::Withdraw { amount: "-1".into() }),
    );
    let lender = l.read_user_snapshot("DAI", alice).unwrap();
    assert!(lender.current_balance.is_zero());
    assert!(lender.wallet_balance > units(1000), "lender earned interest");
}

// ---------------------------------------------------------------------------
// 2. Native full repay
// ---------------------------------------------------------------------------

#[test]
fn native_full_repay_attaches_slack_and_refunds_excess() {
    let (o, mut l) = setup();
    let alice = Address::from_label("alice");
    let bob = Address::from_label("bob");

    supply(&o, &mut l, "ETH", alice, "10");
    fund(&o, &mut l, "DAI", bob, "1000");
    supply(&o, &mut l, "DAI", bob, "1000");

    let mut borrow = Step::success(
        "ETH",
        bob,
        StepAction::Borrow {
            amount: "1".into(),
            rate_mode: RateMode::Variable,
        },
    );
    borrow.time_travel_days = Some(30);
    ok(&o, &mut l, borrow);

    let owed = l.read_user_snapshot("ETH", bob).unwrap();
    let wallet_before = l.wallet_balance("ETH", bob);
    let slack = l.to_smallest_unit("ETH", "0.1").unwrap();

    let mut repay = Step::success(
        "ETH",
        bob,
        StepAction::Repay {
            amount: "-1".into(),
            rate_mode: RateMode::Variable,
            on_behalf_of: None,
        },
    );
    repay.send_value = Some("-1".into());
    ok(&o, &mut l, repay);

    let settled = l.read_user_snapshot("ETH", bob).unwrap();
    assert!(settled.current_variable_debt.is_zero());
    assert!(settled.origination_fee.is_zero());

    let spent = wallet_before - l.wallet_balance("ETH", bob);
    let attached = owed.current_variable_debt + owed.origination_fee + slack;
    assert!(spent > owed.current_variable_debt + owed.origination_fee);
    assert!(spent < attached + l.gas_cost(), "the slack came back");
}

// ---------------------------------------------------------------------------
// 3. Revert expectations
// ---------------------------------------------------------------------------

#[test]
fn revert_expectations() {
    let (o, mut l) = setup();
    let alice = Address::from_label("alice");
    let bob = Address::from_label("bob");

    fund(&o, &mut l, "DAI", alice, "100");
    supply(&o, &mut l, "DAI", alice, "50");

    let borrow = StepAction::Borrow {
        amount: "10".into(),
        rate_mode: RateMode::Variable,
    };
    assert_eq!(
        o.run_step(&mut l, &Step::revert("DAI", bob, borrow.clone())),
        Ok(StepState::RevertedAsExpected)
    );

    assert_eq!(
        o.run_step(&mut l, &Step::success("DAI", bob, borrow)),
        Err(OracleError::UnexpectedRevert {
            reason: "The collateral balance is 0".to_string()
        })
    );

    let mut wrong = Step::revert("DAI", alice, StepAction::Supply { amount: "10".into() });
    wrong.revert_message = Some("deposit should have failed".to_string());
    assert_eq!(
        o.run_step(&mut l, &wrong),
        Err(OracleError::MissingExpectedRevert {
            diagnostic: Some("deposit should have failed".to_string())
        })
    );
    let report = o.execute(&mut l, &wrong);
    assert_eq!(report.state, StepState::FailedAssertion);
    assert!(report
        .failure
        .as_deref()
        .unwrap()
        .contains("deposit should have failed"));
}

// ---------------------------------------------------------------------------
// 4. Input rejected before any call
// ---------------------------------------------------------------------------

#[test]
fn invalid_input_never_reaches_the_ledger() {
    let (o, mut l) = setup();
    let bob = Address::from_label("bob");
    let t0 = l.now();

    let mint_native = Step::success("ETH", bob, StepAction::Mint { amount: "1".into() });
    let err = o.run_step(&mut l, &mint_native).unwrap_err();
    assert!(
        matches!(err, OracleError::InvalidActionInput { .. }),
        "{err}"
    );

    let supply_max = Step::success("DAI", bob, StepAction::Supply { amount: "-1".into() });
    let err = o.run_step(&mut l, &supply_max).unwrap_err();
    assert!(
        matches!(err, OracleError::InvalidActionInput { .. }),
        "{err}"
    );

    assert_eq!(l.now(), t0, "no block was mined");
    assert_eq!(l.tx_count(), 0);
}

// ---------------------------------------------------------------------------
// 5. Redirection chain
// ---------------------------------------------------------------------------

#[test]
fn two_hop_redirection_reconciles() {
    let (o, mut l) = setup();
    let alice = Address::from_label("alice");
    let bob = Address::from_label("bob");
    let carol = Address::from_label("carol");

    for user in [alice, bob] {
        fund(&o, &mut l, "DAI", user, "200");
        supply(&o, &mut l, "DAI", user, "100");
    }
    ok(
        &o,
        &mut l,
        Step::success("DAI", alice, StepAction::RedirectInterest { to: bob }),
    );
    ok(
        &o,
        &mut l,
        Step::success("DAI", bob, StepAction::RedirectInterest { to: carol }),
    );

    // Alice's target is cumulated and its interest credited one hop further.
    supply(&o, &mut l, "DAI", alice, "50");

    let b = l.read_user_snapshot("DAI", bob).unwrap();
    let c = l.read_user_snapshot("DAI", carol).unwrap();
    assert_eq!(b.interest_redirection_address, Some(carol));
    assert_eq!(b.redirected_balance, units(150));
    assert_eq!(c.redirected_balance, units(100));

    let a = l.read_user_snapshot("DAI", alice).unwrap();
    assert_eq!(a.redirection_target_redirected_balance, units(150));
}
