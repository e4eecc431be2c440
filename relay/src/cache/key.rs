//! Content-addressed cache keys.
//!
//! A key is the hex SHA-256 of the operation id and a canonical JSON rendering
//! of `{params, sources}`. Object keys are sorted recursively, so
//! inputs that are equal by value always produce the same key.

use crate::domain::{CacheKey, OperationId};
use serde_json::{Map, Value, json};
use sha2::{Digest, Sha256};
use std::fmt;

/// Why a call cannot be cached. Never an error: the call simply bypasses the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Uncacheable {
    /// The sourced value at `index` did not resolve to anything.
    UnresolvedSource { index: usize },
}

impl fmt::Display for Uncacheable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Uncacheable::UnresolvedSource { index } => {
                write!(f, "sourced value #{} is unresolved", index)
            }
        }
    }
}

/// Derive the key for one call, or `None` when the call is not cacheable.
///
/// `params` is `None` when the operation declares its params meaningless; every
/// call then shares one key (modulo sources).
pub fn derive_key(
    operation_id: &OperationId,
    params: Option<&Value>,
    sources: &[Option<Value>],
) -> Option<CacheKey> {
    try_derive_key(operation_id, params, sources).ok()
}

/// Same as [`derive_key`], but reports why a call is not cacheable.
pub fn try_derive_key(
    operation_id: &OperationId,
    params: Option<&Value>,
    sources: &[Option<Value>],
) -> Result<CacheKey, Uncacheable> {
    let mut resolved = Vec::with_capacity(sources.len());
    for (index, source) in sources.iter().enumerate() {
        match source {
            Some(value) => resolved.push(canonicalize(value)),
            None => return Err(Uncacheable::UnresolvedSource { index }),
        }
    }

    let params = params.map(canonicalize).unwrap_or(Value::Null);
    let payload = json!({ "params": params, "sources": resolved });

    let mut hasher = Sha256::new();
    hasher.update(operation_id.as_str().as_bytes());
    hasher.update([0u8]);
    // Value's Display never fails and renders compact JSON
    hasher.update(payload.to_string().as_bytes());

    Ok(CacheKey::new(hex::encode(hasher.finalize())))
}

/// Sort JSON object keys recursively for consistent hashing
fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut sorted: Vec<_> = map.iter().collect();
            sorted.sort_by_key(|(k, _)| *k);
            let sorted_map: Map<String, Value> = sorted
                .into_iter()
                .map(|(k, v)| (k.clone(), canonicalize(v)))
                .collect();
            Value::Object(sorted_map)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        _ => value.clone(),
    }
}
