/// Drill engine: canonical hashing.
///
/// Deterministic serialization + SHA-256, used for snapshot integrity and
/// determinism checks.
///
/// Rules:
///   - `stateVersion` first, then the state
///   - struct fields in declaration order, keyed maps in key order
///   - vectors keep their order (it is meaningful: newest first, run order)
///   - UTF-8 JSON, no whitespace

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::domain::AppState;
use crate::STATE_VERSION;

/// Canonical serialization of `state` as UTF-8 JSON bytes.
pub fn canonical_serialize(state: &AppState) -> Result<Vec<u8>, serde_json::Error> {
    let value = build_canonical_value(state)?;
    serde_json::to_vec(&value)
}

/// SHA-256 of the canonical serialization, lowercase hex.
pub fn canonical_hash(state: &AppState) -> Result<String, serde_json::Error> {
    let bytes = canonical_serialize(state)?;
    Ok(hex_digest(&bytes))
}

/// Lowercase hex SHA-256 of arbitrary bytes.
pub fn hex_digest(bytes: &[u8]) -> String {
    Sha256::digest(bytes)
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

fn build_canonical_value(state: &AppState) -> Result<Value, serde_json::Error> {
    let mut root = Map::new();
    // stateVersion first: it is part of the hash identity.
    root.insert("stateVersion".to_string(), Value::from(STATE_VERSION));
    root.insert("state".to_string(), serde_json::to_value(state)?);
    Ok(Value::Object(root))
}
