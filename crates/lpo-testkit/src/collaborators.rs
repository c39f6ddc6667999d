//! Contracts the orchestrator needs from the ledger under test.
//!
//! Implementations own ground truth (a deployed ledger, a fork, or the
//! in-memory [`crate::PaperLedger`]). Every call is synchronous: nothing may
//! run between the before-snapshot and the submission of an action.

use lpo_math::U256;
use lpo_schemas::{Action, Address, ReserveSnapshot, UserReserveSnapshot};

// ---------------------------------------------------------------------------
// Receipt / failure
// ---------------------------------------------------------------------------

/// Metadata of an executed action. Both fields are required by the oracle;
/// they are optional here because some transports cannot always provide them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Receipt {
    /// Total transaction cost, native smallest units.
    pub cost: Option<U256>,
    pub execution_timestamp: Option<u64>,
}

/// The ledger refused a call or could not be read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerFailure {
    pub reason: String,
}

impl LedgerFailure {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl std::fmt::Display for LedgerFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "LEDGER_FAILURE: {}", self.reason)
    }
}

impl std::error::Error for LedgerFailure {}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Read side: point-in-time state of one reserve and its users.
pub trait SnapshotSource {
    fn read_reserve_snapshot(&self, reserve: &str) -> Result<ReserveSnapshot, LedgerFailure>;
    fn read_user_snapshot(
        &self,
        reserve: &str,
        user: Address,
    ) -> Result<UserReserveSnapshot, LedgerFailure>;
    /// Ledger clock, seconds.
    fn now(&self) -> u64;
}

/// Write side: execute actions and test setup calls.
pub trait ActionSubmitter {
    /// Execute `action` as `actor`, attaching `value` of the native asset.
    fn submit(
        &mut self,
        reserve: &str,
        actor: Address,
        action: &Action,
        value: U256,
    ) -> Result<Receipt, LedgerFailure>;

    /// Credit `amount` of a non-native asset to `user`'s wallet.
    fn mint(&mut self, reserve: &str, user: Address, amount: U256) -> Result<(), LedgerFailure>;

    /// Let the ledger pull `user`'s tokens without limit.
    fn approve(&mut self, reserve: &str, user: Address) -> Result<(), LedgerFailure>;
}

/// Human amounts ("1000.5") to smallest units.
pub trait AmountConverter {
    fn to_smallest_unit(&self, reserve: &str, human: &str) -> Result<U256, LedgerFailure>;
    fn is_native(&self, reserve: &str) -> bool;
}

/// Fails rather than wrapping when the clock would overflow.
pub trait TimeControl {
    fn advance_time(&mut self, secs: u64) -> Result<(), LedgerFailure>;
}

/// Everything the orchestrator drives, as one bound.
pub trait Ledger: SnapshotSource + ActionSubmitter + AmountConverter + TimeControl {}

impl<T: SnapshotSource + ActionSubmitter + AmountConverter + TimeControl> Ledger for T {}
