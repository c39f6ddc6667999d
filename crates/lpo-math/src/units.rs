//! Human decimal amounts <-> smallest-unit integers.
//!
//! Decimal strings are parsed with `rust_decimal` so "0.0025" becomes an exact
//! wad, never a float approximation.

use std::str::FromStr;

use primitive_types::U256;
use rust_decimal::Decimal;

/// Rejected human amount.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitsError {
    Malformed { input: String },
    Negative { input: String },
    /// More fractional digits than the asset supports.
    TooPrecise { input: String, decimals: u32 },
    Overflow { input: String },
}

impl std::fmt::Display for UnitsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UnitsError::Malformed { input } => write!(f, "malformed decimal amount '{input}'"),
            UnitsError::Negative { input } => write!(f, "negative amount '{input}'"),
            UnitsError::TooPrecise { input, decimals } => {
                write!(f, "amount '{input}' has more than {decimals} fractional digits")
            }
            UnitsError::Overflow { input } => write!(f, "amount '{input}' overflows 256 bits"),
        }
    }
}

impl std::error::Error for UnitsError {}

/// Largest power of ten a U256 holds.
pub const MAX_DECIMALS: u32 = 77;

/// Parse `human` (e.g. "1000.5") into an integer scaled by `10^decimals`.
pub fn parse_units(human: &str, decimals: u32) -> Result<U256, UnitsError> {
    let trimmed = human.trim();
    let value = Decimal::from_str(trimmed).map_err(|_| UnitsError::Malformed {
        input: trimmed.to_string(),
    })?;
    if value.is_sign_negative() && !value.is_zero() {
        return Err(UnitsError::Negative {
            input: trimmed.to_string(),
        });
    }

    let value = value.normalize();
    let scale = value.scale();
    if scale > decimals {
        return Err(UnitsError::TooPrecise {
            input: trimmed.to_string(),
            decimals,
        });
    }

    let shift = decimals - scale;
    if shift > MAX_DECIMALS {
        return Err(UnitsError::Overflow {
            input: trimmed.to_string(),
        });
    }
    let mantissa = U256::from(value.mantissa().unsigned_abs());
    mantissa
        .checked_mul(U256::exp10(shift as usize))
        .ok_or(UnitsError::Overflow {
            input: trimmed.to_string(),
        })
}

/// Decimal fraction as ray ("0.08" -> 8e25).
pub fn ray_from_decimal(human: &str) -> Result<U256, UnitsError> {
    parse_units(human, 27)
}

/// Decimal fraction as wad ("0.0025" -> 2.5e15).
pub fn wad_from_decimal(human: &str) -> Result<U256, UnitsError> {
    parse_units(human, 18)
}

/// Render a smallest-unit integer as a decimal string with trailing zeros
/// trimmed.
pub fn format_units(value: U256, decimals: u32) -> String {
    let raw = value.to_string();
    let decimals = decimals as usize;
    if decimals == 0 {
        return raw;
    }
    let padded = if raw.len() <= decimals {
        format!("{}{}", "0".repeat(decimals - raw.len() + 1), raw)
    } else {
        raw
    };
    let (int_part, frac_part) = padded.split_at(padded.len() - decimals);
    let frac_part = frac_part.trim_end_matches('0');
    if frac_part.is_empty() {
        int_part.to_string()
    } else {
        format!("{int_part}.{frac_part}")
    }
}
