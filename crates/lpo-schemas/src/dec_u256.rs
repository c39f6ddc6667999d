//! Serde adapter: `U256` as a decimal string.
//!
//! Deserialization also accepts plain JSON/YAML integers that fit in `u64`,
//! which keeps hand-written fixtures readable.

use primitive_types::U256;
use serde::de::{self, Visitor};
use serde::{Deserializer, Serializer};

pub fn serialize<S: Serializer>(value: &U256, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&value.to_string())
}

pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<U256, D::Error> {
    deserializer.deserialize_any(DecU256Visitor)
}

struct DecU256Visitor;

impl<'de> Visitor<'de> for DecU256Visitor {
    type Value = U256;

    fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str("a non-negative decimal integer string")
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<U256, E> {
        Ok(U256::from(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<U256, E> {
        u64::try_from(v)
            .map(U256::from)
            .map_err(|_| E::custom(format!("negative amount {v}")))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<U256, E> {
        parse(v).map_err(E::custom)
    }
}

/// Parse a decimal integer string, rejecting signs and fractions.
pub fn parse(v: &str) -> Result<U256, String> {
    let v = v.trim();
    if v.is_empty() || !v.bytes().all(|b| b.is_ascii_digit()) {
        return Err(format!("invalid decimal integer '{v}'"));
    }
    U256::from_dec_str(v).map_err(|e| format!("invalid decimal integer '{v}': {e:?}"))
}
