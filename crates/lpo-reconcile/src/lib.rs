//! lpo-reconcile
//!
//! Field-by-field comparison of predicted vs observed ledger snapshots.
//!
//! Rules:
//! - Identity and clock fields are skipped (`SKIPPED_FIELDS`)
//! - Numeric fields match within `TOLERANCE_UNITS` smallest units
//! - Everything else (addresses, flags, rate modes) matches exactly
//! - `reconcile` fails fast on the first mismatch in declaration order;
//!   `diff` collects all of them for logging
//!
//! Plus structural invariant checks on single snapshots and on consecutive
//! reserve snapshots. Deterministic, pure logic. No IO.

mod engine;
mod fields;
mod invariants;
mod types;

pub use engine::{diff, reconcile, within_tolerance};
pub use fields::Reconcilable;
pub use invariants::{check_index_progress, check_reserve, check_user, InvariantViolation};
pub use types::{FieldMismatch, FieldValue, ReconcileContext, SKIPPED_FIELDS, TOLERANCE_UNITS};
