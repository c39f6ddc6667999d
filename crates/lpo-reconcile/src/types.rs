use std::fmt;

use lpo_schemas::U256;
use serde::Serialize;

/// Maximum absolute difference, in smallest units, between a predicted and
/// an observed numeric field. Absorbs per-step rounding of ray arithmetic.
pub const TOLERANCE_UNITS: u64 = 3;

/// Fields never compared: clock, oracle input and static identity.
pub const SKIPPED_FIELDS: &[&str] = &[
    "last_update_timestamp",
    "market_stable_rate",
    "symbol",
    "a_token_address",
    "decimals",
];

/// Comparison knobs, passed explicitly.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReconcileContext {
    /// When set, `reconcile` succeeds without comparing anything.
    pub skip_integrity_check: bool,
}

/// One comparable field value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FieldValue {
    /// Compared with `TOLERANCE_UNITS`.
    Numeric(U256),
    /// Compared by exact equality of the rendered value.
    Exact(String),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Numeric(v) => write!(f, "{v}"),
            FieldValue::Exact(s) => f.write_str(s),
        }
    }
}

/// A predicted/observed disagreement on one field.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FieldMismatch {
    pub field: &'static str,
    pub expected: String,
    pub actual: String,
}

impl fmt::Display for FieldMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "field '{}' mismatch: expected {} actual {}",
            self.field, self.expected, self.actual
        )
    }
}

impl std::error::Error for FieldMismatch {}
