//! lpo-testkit
//!
//! Drives a ledger under test through actions and checks every successful
//! one against the reference model:
//! - [`collaborators`]: what a ledger must provide (snapshots, submission,
//!   unit conversion, clock control)
//! - [`Orchestrator`]: per-step snapshot, submit, predict, reconcile flow
//! - [`PaperLedger`]: deterministic in-memory ledger for offline runs
//! - [`ScenarioRunner`]: replays declarative story files

pub mod collaborators;
mod orchestrator;
mod paper_ledger;
mod scenario;

pub use collaborators::{
    ActionSubmitter, AmountConverter, Ledger, LedgerFailure, Receipt, SnapshotSource, TimeControl,
};
pub use orchestrator::{
    Expectation, OracleError, Orchestrator, Step, StepAction, StepReport, StepState,
    MAX_SENTINEL, SECONDS_PER_DAY,
};
pub use paper_ledger::{PaperLedger, DEFAULT_NATIVE_ENDOWMENT, GENESIS_TIMESTAMP};
pub use scenario::{
    load_scenario, parse_scenario, user_address, ActionArgs, Scalar, Scenario, ScenarioAction,
    ScenarioReport, ScenarioRunner, Story, StoryReport,
};
