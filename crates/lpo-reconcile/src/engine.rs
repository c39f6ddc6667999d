use lpo_schemas::U256;

use crate::{
    FieldMismatch, FieldValue, Reconcilable, ReconcileContext, SKIPPED_FIELDS, TOLERANCE_UNITS,
};

/// `|actual - expected| <= TOLERANCE_UNITS`.
pub fn within_tolerance(expected: U256, actual: U256) -> bool {
    let delta = if actual >= expected {
        actual - expected
    } else {
        expected - actual
    };
    delta <= U256::from(TOLERANCE_UNITS)
}

fn field_matches(expected: &FieldValue, actual: &FieldValue) -> bool {
    match (expected, actual) {
        (FieldValue::Numeric(e), FieldValue::Numeric(a)) => within_tolerance(*e, *a),
        (FieldValue::Exact(e), FieldValue::Exact(a)) => e == a,
        _ => false,
    }
}

fn mismatches<T: Reconcilable>(expected: &T, actual: &T) -> impl Iterator<Item = FieldMismatch> {
    expected
        .fields()
        .into_iter()
        .zip(actual.fields())
        .filter(|((name, _), _)| !SKIPPED_FIELDS.contains(name))
        .filter(|((_, e), (_, a))| !field_matches(e, a))
        .map(|((field, e), (_, a))| FieldMismatch {
            field,
            expected: e.to_string(),
            actual: a.to_string(),
        })
}

/// Compare `expected` against `actual`, stopping at the first mismatch.
///
/// With `ctx.skip_integrity_check` set this always succeeds.
pub fn reconcile<T: Reconcilable>(
    expected: &T,
    actual: &T,
    ctx: &ReconcileContext,
) -> Result<(), FieldMismatch> {
    if ctx.skip_integrity_check {
        return Ok(());
    }
    match mismatches(expected, actual).next() {
        Some(m) => Err(m),
        None => Ok(()),
    }
}

/// Every mismatch, in declaration order. Ignores `skip_integrity_check`.
pub fn diff<T: Reconcilable>(expected: &T, actual: &T) -> Vec<FieldMismatch> {
    mismatches(expected, actual).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tolerance_is_symmetric_and_tight() {
        let x = U256::from(1_000u64);
        assert!(within_tolerance(x, x));
        assert!(within_tolerance(x, x + U256::from(3u64)));
        assert!(within_tolerance(x + U256::from(3u64), x));
        assert!(!within_tolerance(x, x + U256::from(4u64)));
        assert!(!within_tolerance(x + U256::from(4u64), x));
    }

    #[test]
    fn numeric_never_matches_exact() {
        assert!(!field_matches(
            &FieldValue::Numeric(U256::zero()),
            &FieldValue::Exact("0".into())
        ));
    }
}
