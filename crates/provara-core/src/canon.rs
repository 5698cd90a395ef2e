//! Canonical JSON serialization (C1): the determinism substrate everything
//! else — content addressing, signing, state hashing — is built on.
//!
//! Rules: object keys sorted by Unicode code point, no insignificant
//! whitespace, `,`/`:` separators, Unicode preserved rather than
//! `\uXXXX`-escaped where not required, `NaN`/`±Infinity` rejected.

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::error::ErrorCode;

#[derive(Debug, Error)]
pub enum CanonError {
    #[error("{code}: value contains a non-finite number (NaN or Infinity), which has no canonical JSON representation", code = ErrorCode::E300RequiredFieldMissing)]
    NonFiniteNumber,
    #[error("{code}: value failed to serialize to JSON: {source}", code = ErrorCode::E300RequiredFieldMissing)]
    Serialize {
        #[source]
        source: serde_json::Error,
    },
}

impl From<serde_json::Error> for CanonError {
    fn from(source: serde_json::Error) -> Self {
        CanonError::Serialize { source }
    }
}

/// Serializes `value` to its canonical byte representation.
///
/// Determinism, key-order independence, and null preservation follow from
/// delegating to `serde_jcs` over a `serde_json::Value`; the non-finite-number
/// check below is a defense in depth since `serde_json::Number` cannot itself
/// represent `NaN`/`Infinity`.
pub fn to_canonical_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>, CanonError> {
    let value = serde_json::to_value(value)?;
    reject_non_finite(&value)?;
    serde_jcs::to_vec(&value).map_err(|source| CanonError::Serialize { source })
}

fn reject_non_finite(value: &Value) -> Result<(), CanonError> {
    match value {
        Value::Number(n) => match n.as_f64() {
            Some(f) if !f.is_finite() => Err(CanonError::NonFiniteNumber),
            _ => Ok(()),
        },
        Value::Array(items) => items.iter().try_for_each(reject_non_finite),
        Value::Object(map) => map.values().try_for_each(reject_non_finite),
        _ => Ok(()),
    }
}

/// `SHA-256(canonical_bytes(value))`, lowercase hex.
pub fn canonical_hash<T: Serialize>(value: &T) -> Result<String, CanonError> {
    let bytes = to_canonical_bytes(value)?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}
