//! Per-step oracle flow.
//!
//! A ledger action expected to succeed runs, in order:
//!
//! 1. before-snapshots of the reserve and every involved user
//! 2. submission (native value attached when the reserve is native)
//! 3. receipt metadata: cost and execution timestamp are required
//! 4. optional time travel
//! 5. after-snapshots and the ledger clock
//! 6. structural invariants on the after-state
//! 7. prediction from the before-state
//! 8. reconciliation of the reserve, then each user
//!
//! Nothing runs between step 1 and step 2. Time travel is checked against
//! clock overflow before step 2. With `skip_integrity_check` set the step
//! succeeds after step 4. A step expected to revert only submits and
//! requires a failure.

use std::collections::BTreeMap;

use lpo_config::OracleConfig;
use lpo_math::{add, U256};
use lpo_predict::{predict, MarketParams, PredictError, PredictionInput, Timing};
use lpo_reconcile::{
    check_index_progress, check_reserve, check_user, diff, reconcile, FieldMismatch,
    InvariantViolation, Reconcilable, ReconcileContext,
};
use lpo_schemas::{Action, Address, AmountRequest, RateMode, UserReserveSnapshot};
use serde::{Deserialize, Serialize};
use tracing::{info, info_span, warn};

use crate::collaborators::{Ledger, LedgerFailure};

pub const SECONDS_PER_DAY: u64 = 86_400;

/// Amount string meaning "everything" (withdraw, repay) or "full debt"
/// (native value).
pub const MAX_SENTINEL: &str = "-1";

// ---------------------------------------------------------------------------
// Step description
// ---------------------------------------------------------------------------

/// One step in human units. Amounts are decimal strings in the reserve's
/// asset; `"-1"` requests the maximum where the action supports it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepAction {
    Mint {
        amount: String,
    },
    Approve,
    Supply {
        amount: String,
    },
    Withdraw {
        amount: String,
    },
    Borrow {
        amount: String,
        rate_mode: RateMode,
    },
    Repay {
        amount: String,
        rate_mode: RateMode,
        /// Defaults to the actor.
        on_behalf_of: Option<Address>,
    },
    SetCollateral {
        enabled: bool,
    },
    SwapRateMode {
        from_mode: RateMode,
    },
    RebalanceStableRate {
        target: Address,
    },
    RedirectInterest {
        to: Address,
    },
    RedirectInterestOf {
        from: Address,
        to: Address,
    },
    AllowInterestRedirection {
        to: Option<Address>,
    },
}

impl StepAction {
    /// Name used in scenario files.
    pub fn name(&self) -> &'static str {
        match self {
            StepAction::Mint { .. } => "mint",
            StepAction::Approve => "approve",
            StepAction::Supply { .. } => "deposit",
            StepAction::Withdraw { .. } => "redeem",
            StepAction::Borrow { .. } => "borrow",
            StepAction::Repay { .. } => "repay",
            StepAction::SetCollateral { .. } => "setUseAsCollateral",
            StepAction::SwapRateMode { .. } => "swapBorrowRateMode",
            StepAction::RebalanceStableRate { .. } => "rebalanceStableBorrowRate",
            StepAction::RedirectInterest { .. } => "redirectInterestStream",
            StepAction::RedirectInterestOf { .. } => "redirectInterestStreamOf",
            StepAction::AllowInterestRedirection { .. } => "allowInterestRedirectionTo",
        }
    }

    pub fn is_setup(&self) -> bool {
        matches!(self, StepAction::Mint { .. } | StepAction::Approve)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Expectation {
    Success,
    Revert,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub reserve: String,
    pub actor: Address,
    pub action: StepAction,
    pub expected: Expectation,
    /// Diagnostic shown when an expected revert does not happen.
    pub revert_message: Option<String>,
    /// Native value override, human units; `"-1"` on a repay means the full
    /// debt plus fee plus the configured slack.
    pub send_value: Option<String>,
    /// Advance the ledger clock after the action, before the after-snapshot.
    pub time_travel_days: Option<u64>,
}

impl Step {
    pub fn success(reserve: impl Into<String>, actor: Address, action: StepAction) -> Self {
        Self {
            reserve: reserve.into(),
            actor,
            action,
            expected: Expectation::Success,
            revert_message: None,
            send_value: None,
            time_travel_days: None,
        }
    }

    pub fn revert(reserve: impl Into<String>, actor: Address, action: StepAction) -> Self {
        Self {
            expected: Expectation::Revert,
            ..Self::success(reserve, actor, action)
        }
    }
}

// ---------------------------------------------------------------------------
// Verdicts
// ---------------------------------------------------------------------------

/// `Pending` until the step runs, then exactly one terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepState {
    Pending,
    Succeeded,
    RevertedAsExpected,
    FailedAssertion,
}

impl StepState {
    pub fn as_str(self) -> &'static str {
        match self {
            StepState::Pending => "PENDING",
            StepState::Succeeded => "SUCCEEDED",
            StepState::RevertedAsExpected => "REVERTED_AS_EXPECTED",
            StepState::FailedAssertion => "FAILED_ASSERTION",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum OracleError {
    /// Predicted and observed state disagree beyond tolerance.
    AssertionMismatch {
        subject: String,
        mismatch: FieldMismatch,
        diff: Vec<FieldMismatch>,
    },
    UnexpectedRevert {
        reason: String,
    },
    MissingExpectedRevert {
        diagnostic: Option<String>,
    },
    /// The step cannot be turned into a ledger call.
    InvalidActionInput {
        reason: String,
    },
    /// The receipt lacks cost or execution timestamp.
    MetadataUnavailable {
        missing: &'static str,
    },
    InvariantViolation {
        subject: String,
        violation: InvariantViolation,
    },
    Prediction(PredictError),
    Ledger(LedgerFailure),
}

impl std::fmt::Display for OracleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OracleError::AssertionMismatch {
                subject, mismatch, ..
            } => write!(f, "ORACLE_ASSERTION_MISMATCH: {subject}: {mismatch}"),
            OracleError::UnexpectedRevert { reason } => {
                write!(f, "ORACLE_UNEXPECTED_REVERT: {reason}")
            }
            OracleError::MissingExpectedRevert { diagnostic } => match diagnostic {
                Some(d) => write!(f, "ORACLE_MISSING_REVERT: expected revert ({d})"),
                None => write!(f, "ORACLE_MISSING_REVERT: expected revert"),
            },
            OracleError::InvalidActionInput { reason } => {
                write!(f, "ORACLE_INVALID_INPUT: {reason}")
            }
            OracleError::MetadataUnavailable { missing } => {
                write!(f, "ORACLE_METADATA_UNAVAILABLE: receipt has no {missing}")
            }
            OracleError::InvariantViolation { subject, violation } => {
                write!(f, "ORACLE_INVARIANT: {subject}: {violation}")
            }
            OracleError::Prediction(e) => write!(f, "ORACLE_PREDICTION: {e}"),
            OracleError::Ledger(e) => write!(f, "ORACLE_LEDGER: {e}"),
        }
    }
}

impl std::error::Error for OracleError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            OracleError::Prediction(e) => Some(e),
            OracleError::Ledger(e) => Some(e),
            OracleError::InvariantViolation { violation, .. } => Some(violation),
            _ => None,
        }
    }
}

fn invalid_input(reason: impl std::fmt::Display) -> OracleError {
    OracleError::InvalidActionInput {
        reason: reason.to_string(),
    }
}

/// Seconds to travel after a step, refused up front when the span or the
/// resulting clock would not fit in a `u64`.
fn travel_secs(now: u64, days: u64) -> Result<u64, OracleError> {
    days.checked_mul(SECONDS_PER_DAY)
        .filter(|secs| now.checked_add(*secs).is_some())
        .ok_or_else(|| {
            invalid_input(format!(
                "time travel of {days} days overflows the ledger clock"
            ))
        })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepReport {
    pub action: &'static str,
    pub reserve: String,
    pub actor: Address,
    pub expected: Expectation,
    pub state: StepState,
    pub failure: Option<String>,
    /// Every mismatching field of the failing snapshot, for assertion
    /// failures.
    pub mismatches: Vec<FieldMismatch>,
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

pub struct Orchestrator {
    config: OracleConfig,
    ctx: ReconcileContext,
}

impl Orchestrator {
    pub fn new(config: OracleConfig) -> Self {
        let ctx = ReconcileContext {
            skip_integrity_check: config.oracle.skip_integrity_check,
        };
        Self { config, ctx }
    }

    pub fn with_context(mut self, ctx: ReconcileContext) -> Self {
        self.ctx = ctx;
        self
    }

    pub fn config(&self) -> &OracleConfig {
        &self.config
    }

    /// Run one step and fold the outcome into a report.
    pub fn execute<L: Ledger>(&self, ledger: &mut L, step: &Step) -> StepReport {
        let mut report = StepReport {
            action: step.action.name(),
            reserve: step.reserve.clone(),
            actor: step.actor,
            expected: step.expected,
            state: StepState::Pending,
            failure: None,
            mismatches: Vec::new(),
        };
        match self.run_step(ledger, step) {
            Ok(state) => report.state = state,
            Err(e) => {
                report.state = StepState::FailedAssertion;
                report.failure = Some(e.to_string());
                if let OracleError::AssertionMismatch { diff, .. } = e {
                    report.mismatches = diff;
                }
            }
        }
        report
    }

    /// Run one step; `Err` is the `FailedAssertion` outcome.
    pub fn run_step<L: Ledger>(&self, ledger: &mut L, step: &Step) -> Result<StepState, OracleError> {
        let span = info_span!(
            "oracle_step",
            action = step.action.name(),
            reserve = %step.reserve,
            actor = %step.actor,
        );
        let _guard = span.enter();

        let result = if step.action.is_setup() {
            self.setup(ledger, step)
        } else {
            self.resolve(ledger, step).and_then(|action| match step.expected {
                Expectation::Success => self.expect_success(ledger, step, &action),
                Expectation::Revert => self.expect_revert(ledger, step, &action),
            })
        };

        match &result {
            Ok(state) => info!(?state, "step verdict"),
            Err(e) => warn!(error = %e, "step failed"),
        }
        result
    }

    fn setup<L: Ledger>(&self, ledger: &mut L, step: &Step) -> Result<StepState, OracleError> {
        let outcome = match &step.action {
            StepAction::Mint { amount } => {
                if ledger.is_native(&step.reserve) {
                    return Err(invalid_input(format!(
                        "the native asset {} cannot be minted",
                        step.reserve
                    )));
                }
                let amount = ledger
                    .to_smallest_unit(&step.reserve, amount)
                    .map_err(invalid_input)?;
                ledger.mint(&step.reserve, step.actor, amount)
            }
            StepAction::Approve => ledger.approve(&step.reserve, step.actor),
            other => {
                return Err(invalid_input(format!(
                    "'{}' is not a setup step",
                    other.name()
                )))
            }
        };
        verdict(step, outcome)
    }

    /// Human step → ledger action.
    fn resolve<L: Ledger>(&self, ledger: &L, step: &Step) -> Result<Action, OracleError> {
        let exact = |human: &str| -> Result<U256, OracleError> {
            if human.trim() == MAX_SENTINEL {
                return Err(invalid_input(format!(
                    "'{}' does not accept the maximum sentinel",
                    step.action.name()
                )));
            }
            ledger
                .to_smallest_unit(&step.reserve, human)
                .map_err(invalid_input)
        };
        let request = |human: &str| -> Result<AmountRequest, OracleError> {
            if human.trim() == MAX_SENTINEL {
                return Ok(AmountRequest::Max);
            }
            ledger
                .to_smallest_unit(&step.reserve, human)
                .map(AmountRequest::Exact)
                .map_err(invalid_input)
        };

        Ok(match &step.action {
            StepAction::Supply { amount } => Action::Supply {
                amount: exact(amount)?,
            },
            StepAction::Withdraw { amount } => Action::Withdraw {
                amount: request(amount)?,
            },
            StepAction::Borrow { amount, rate_mode } => Action::Borrow {
                amount: exact(amount)?,
                rate_mode: *rate_mode,
            },
            StepAction::Repay {
                amount,
                rate_mode,
                on_behalf_of,
            } => Action::Repay {
                amount: request(amount)?,
                rate_mode: *rate_mode,
                on_behalf_of: on_behalf_of.unwrap_or(step.actor),
            },
            StepAction::SetCollateral { enabled } => Action::SetCollateral { enabled: *enabled },
            StepAction::SwapRateMode { from_mode } => Action::SwapRateMode {
                from_mode: *from_mode,
            },
            StepAction::RebalanceStableRate { target } => {
                Action::RebalanceStableRate { target: *target }
            }
            StepAction::RedirectInterest { to } => Action::RedirectInterest { to: *to },
            StepAction::RedirectInterestOf { from, to } => Action::RedirectInterestOf {
                from: *from,
                to: *to,
            },
            StepAction::AllowInterestRedirection { to } => {
                Action::AllowInterestRedirection { to: *to }
            }
            StepAction::Mint { .. } | StepAction::Approve => {
                return Err(invalid_input(format!(
                    "'{}' is not a ledger action",
                    step.action.name()
                )))
            }
        })
    }

    fn market<L: Ledger>(&self, ledger: &L, reserve: &str) -> Result<MarketParams, OracleError> {
        let rc = self
            .config
            .reserve(reserve)
            .map_err(|e| invalid_input(format!("{e:#}")))?;
        Ok(MarketParams {
            strategy: rc
                .strategy
                .to_strategy()
                .map_err(|e| invalid_input(format!("{e:#}")))?,
            origination_fee: self
                .config
                .origination_fee_wad()
                .map_err(|e| invalid_input(format!("{e:#}")))?,
            native: ledger.is_native(reserve),
        })
    }

    /// Native value attached to the submission; zero for non-native reserves.
    fn native_value<L: Ledger>(
        &self,
        ledger: &L,
        step: &Step,
        action: &Action,
    ) -> Result<U256, OracleError> {
        if !ledger.is_native(&step.reserve) {
            return Ok(U256::zero());
        }
        match (step.send_value.as_deref().map(str::trim), action) {
            (
                Some(MAX_SENTINEL),
                Action::Repay {
                    rate_mode,
                    on_behalf_of,
                    ..
                },
            ) => self.full_repay_value(ledger, &step.reserve, *rate_mode, *on_behalf_of),
            (Some(MAX_SENTINEL), _) => Err(invalid_input(
                "send value '-1' is only meaningful for a repay",
            )),
            (Some(human), _) => ledger
                .to_smallest_unit(&step.reserve, human)
                .map_err(invalid_input),
            (None, Action::Supply { amount }) => Ok(*amount),
            (None, Action::Repay { amount, .. }) => Ok(amount.wire_value()),
            (None, _) => Ok(U256::zero()),
        }
    }

    /// Accrued debt of the repaid mode plus outstanding fee plus slack, so
    /// interest accrued while the transaction is mined is covered.
    fn full_repay_value<L: Ledger>(
        &self,
        ledger: &L,
        reserve: &str,
        rate_mode: RateMode,
        on_behalf_of: Address,
    ) -> Result<U256, OracleError> {
        let user = ledger
            .read_user_snapshot(reserve, on_behalf_of)
            .map_err(OracleError::Ledger)?;
        let mode = match rate_mode {
            RateMode::None => user.borrow_rate_mode,
            explicit => explicit,
        };
        let debt = match mode {
            RateMode::Stable => user.current_stable_debt,
            RateMode::Variable => user.current_variable_debt,
            RateMode::None => U256::zero(),
        };
        let decimals = self
            .config
            .reserve(reserve)
            .map_err(|e| invalid_input(format!("{e:#}")))?
            .decimals;
        let slack = self
            .config
            .native_repay_slack_units(decimals)
            .map_err(|e| invalid_input(format!("{e:#}")))?;
        add(debt, user.origination_fee, "repay_value")
            .and_then(|sum| add(sum, slack, "repay_value"))
            .map_err(|e| OracleError::Prediction(e.into()))
    }

    fn expect_revert<L: Ledger>(
        &self,
        ledger: &mut L,
        step: &Step,
        action: &Action,
    ) -> Result<StepState, OracleError> {
        let value = self.native_value(ledger, step, action)?;
        let outcome = ledger
            .submit(&step.reserve, step.actor, action, value)
            .map(|_| ());
        verdict(step, outcome)
    }

    fn expect_success<L: Ledger>(
        &self,
        ledger: &mut L,
        step: &Step,
        action: &Action,
    ) -> Result<StepState, OracleError> {
        let reserve = step.reserve.as_str();
        let market = self.market(ledger, reserve)?;
        let value = self.native_value(ledger, step, action)?;
        let travel_secs = step
            .time_travel_days
            .map(|days| travel_secs(ledger.now(), days))
            .transpose()?;

        let reserve_before = ledger
            .read_reserve_snapshot(reserve)
            .map_err(OracleError::Ledger)?;
        let users_before = involved_users(ledger, reserve, step.actor, action)?;

        let receipt = ledger
            .submit(reserve, step.actor, action, value)
            .map_err(|f| OracleError::UnexpectedRevert { reason: f.reason })?;
        let tx_cost = receipt
            .cost
            .ok_or(OracleError::MetadataUnavailable { missing: "cost" })?;
        let action_ts = receipt
            .execution_timestamp
            .ok_or(OracleError::MetadataUnavailable {
                missing: "execution timestamp",
            })?;

        if let Some(secs) = travel_secs {
            ledger.advance_time(secs).map_err(OracleError::Ledger)?;
        }
        if self.ctx.skip_integrity_check {
            return Ok(StepState::Succeeded);
        }

        let reserve_after = ledger
            .read_reserve_snapshot(reserve)
            .map_err(OracleError::Ledger)?;
        let mut users_after = BTreeMap::new();
        for address in users_before.keys() {
            let snap = ledger
                .read_user_snapshot(reserve, *address)
                .map_err(OracleError::Ledger)?;
            users_after.insert(*address, snap);
        }
        let query_ts = ledger.now();

        check_invariants(&reserve_before, &reserve_after, &users_after)?;

        let expected = predict(
            action,
            &PredictionInput {
                reserve: reserve_before,
                users: users_before,
                actor: step.actor,
                timing: Timing {
                    action_ts,
                    query_ts,
                },
                tx_cost,
                market,
            },
        )
        .map_err(OracleError::Prediction)?;

        self.compare("reserve".to_string(), &expected.reserve, &reserve_after)?;
        for (address, actual) in &users_after {
            let predicted = expected
                .users
                .get(address)
                .ok_or(OracleError::Prediction(PredictError::MissingUser {
                    address: *address,
                }))?;
            self.compare(address.to_string(), predicted, actual)?;
        }
        Ok(StepState::Succeeded)
    }

    fn compare<T: Reconcilable>(
        &self,
        subject: String,
        expected: &T,
        actual: &T,
    ) -> Result<(), OracleError> {
        if let Err(mismatch) = reconcile(expected, actual, &self.ctx) {
            let all = diff(expected, actual);
            for m in &all {
                warn!(
                    subject = %subject,
                    field = m.field,
                    expected = %m.expected,
                    actual = %m.actual,
                    "snapshot mismatch"
                );
            }
            return Err(OracleError::AssertionMismatch {
                subject,
                mismatch,
                diff: all,
            });
        }
        Ok(())
    }
}

fn verdict(step: &Step, outcome: Result<(), LedgerFailure>) -> Result<StepState, OracleError> {
    match (step.expected, outcome) {
        (Expectation::Success, Ok(())) => Ok(StepState::Succeeded),
        (Expectation::Success, Err(f)) => Err(OracleError::UnexpectedRevert { reason: f.reason }),
        (Expectation::Revert, Ok(())) => Err(OracleError::MissingExpectedRevert {
            diagnostic: step.revert_message.clone(),
        }),
        (Expectation::Revert, Err(f)) => {
            info!(reason = %f.reason, "reverted as expected");
            Ok(StepState::RevertedAsExpected)
        }
    }
}

/// Before-snapshots of the named parties plus every account reachable
/// through redirection targets, since crediting a target also credits the
/// target's own target.
fn involved_users<L: Ledger>(
    ledger: &L,
    reserve: &str,
    actor: Address,
    action: &Action,
) -> Result<BTreeMap<Address, UserReserveSnapshot>, OracleError> {
    let mut users = BTreeMap::new();
    let mut pending = action.named_parties(actor);
    while let Some(address) = pending.pop() {
        if users.contains_key(&address) {
            continue;
        }
        let snap = ledger
            .read_user_snapshot(reserve, address)
            .map_err(OracleError::Ledger)?;
        if let Some(target) = snap.interest_redirection_address {
            pending.push(target);
        }
        users.insert(address, snap);
    }
    Ok(users)
}

fn check_invariants(
    before: &lpo_schemas::ReserveSnapshot,
    after: &lpo_schemas::ReserveSnapshot,
    users: &BTreeMap<Address, UserReserveSnapshot>,
) -> Result<(), OracleError> {
    let on_reserve = |violation| OracleError::InvariantViolation {
        subject: "reserve".to_string(),
        violation,
    };
    check_index_progress(before, after).map_err(on_reserve)?;
    check_reserve(after).map_err(on_reserve)?;
    for (address, user) in users {
        check_user(user).map_err(|violation| OracleError::InvariantViolation {
            subject: address.to_string(),
            violation,
        })?;
    }
    Ok(())
}
