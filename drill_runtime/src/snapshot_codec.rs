//! Snapshot codec: versioned, hash-checked `AppState` encoder/decoder.
//!
//! On-disk form: `{"version": 1, "hash": "<sha256 hex>", "state": {...}}`,
//! where `hash` is the canonical hash of `state`.
//!
//! - `encode_snapshot`:  AppState → envelope JSON
//! - `decode_snapshot`:  JSON → envelope (version checked, strict fields)
//! - `restore_snapshot`: decode + hash check + invariant validation
//! - `export_snapshot_to_file` / `import_snapshot_from_file`: file I/O
//! - `snapshot_hash`:    canonical hash of a state

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use drill_engine::domain::AppState;
use drill_engine::hashing::canonical_hash;
use drill_engine::invariants::{try_validate_invariants, InvariantViolation};
use drill_engine::STATE_VERSION;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot encoding failed: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("snapshot is not valid: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("snapshot has no version tag")]
    MissingVersion,

    #[error("snapshot version {found} is not supported (expected {expected})")]
    UnsupportedVersion { found: Value, expected: u32 },

    #[error("snapshot hash mismatch: recorded {recorded}, computed {computed}")]
    HashMismatch { recorded: String, computed: String },

    #[error("snapshot state violates invariants: {0}")]
    Invariant(#[from] InvariantViolation),

    #[error("snapshot I/O failed: {0}")]
    Io(#[from] io::Error),
}

/// Envelope written to disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SnapshotEnvelope {
    pub version: u32,
    pub hash: String,
    pub state: AppState,
}

// ---------------------------------------------------------------------------
// Encoder
// ---------------------------------------------------------------------------

pub fn encode_snapshot(state: &AppState) -> Result<String, SnapshotError> {
    let envelope = SnapshotEnvelope {
        version: STATE_VERSION,
        hash: snapshot_hash(state)?,
        state: state.clone(),
    };
    serde_json::to_string(&envelope).map_err(SnapshotError::Encode)
}

// ---------------------------------------------------------------------------
// Decoder
// ---------------------------------------------------------------------------

/// Parse an envelope. The version tag is checked before the state is
/// deserialized, so a future layout is reported as a version problem.
pub fn decode_snapshot(json: &str) -> Result<SnapshotEnvelope, SnapshotError> {
    let raw: Value = serde_json::from_str(json).map_err(SnapshotError::Decode)?;
    match raw.get("version") {
        None => return Err(SnapshotError::MissingVersion),
        Some(v) if v.as_u64() != Some(STATE_VERSION as u64) => {
            return Err(SnapshotError::UnsupportedVersion {
                found: v.clone(),
                expected: STATE_VERSION,
            })
        }
        Some(_) => {}
    }
    serde_json::from_value(raw).map_err(SnapshotError::Decode)
}

// ---------------------------------------------------------------------------
// Restore (decode + verify)
// ---------------------------------------------------------------------------

/// Decode, check the recorded hash and validate invariants.
pub fn restore_snapshot(json: &str) -> Result<AppState, SnapshotError> {
    let envelope = decode_snapshot(json)?;
    let computed = snapshot_hash(&envelope.state)?;
    if computed != envelope.hash {
        return Err(SnapshotError::HashMismatch {
            recorded: envelope.hash,
            computed,
        });
    }
    try_validate_invariants(&envelope.state)?;
    Ok(envelope.state)
}

// ---------------------------------------------------------------------------
// File I/O
// ---------------------------------------------------------------------------

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "snapshot".into());
    name.push(".tmp");
    path.with_file_name(name)
}

/// Write the snapshot next to `path`, fsync it, then rename over `path`.
/// Creates parent directories if needed.
pub fn export_snapshot_to_file(state: &AppState, path: &Path) -> Result<(), SnapshotError> {
    let json = encode_snapshot(state)?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let tmp = temp_path_for(path);
    let mut file = File::create(&tmp)?;
    file.write_all(json.as_bytes())?;
    file.sync_all()?;
    drop(file);
    fs::rename(&tmp, path)?;
    Ok(())
}

pub fn import_snapshot_from_file(path: &Path) -> Result<AppState, SnapshotError> {
    let content = fs::read_to_string(path)?;
    restore_snapshot(&content)
}

// ---------------------------------------------------------------------------
// Hash
// ---------------------------------------------------------------------------

/// Canonical hash of `state`, lowercase hex.
pub fn snapshot_hash(state: &AppState) -> Result<String, SnapshotError> {
    canonical_hash(state).map_err(SnapshotError::Encode)
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use drill_engine::domain::{ListItem, WordList};

    fn make_test_state() -> AppState {
        let mut state = AppState::default();
        state.lists.push(WordList {
            id: "L".into(),
            name: "Verbs".into(),
            created_at: 1,
        });
        state
            .items_by_list_id
            .insert("L".into(), vec![ListItem::new("a", "abate", 1)]);
        state
    }

    #[test]
    fn roundtrip_restores_state() {
        let state = make_test_state();
        let json = encode_snapshot(&state).unwrap();
        assert_eq!(restore_snapshot(&json).unwrap(), state);
        assert_eq!(encode_snapshot(&restore_snapshot(&json).unwrap()).unwrap(), json);
    }

    #[test]
    fn not_json_is_decode_error() {
        assert!(matches!(
            restore_snapshot("{ not valid json !!!}"),
            Err(SnapshotError::Decode(_))
        ));
    }

    #[test]
    fn missing_or_wrong_version_rejected() {
        let state_json = serde_json::to_string(&make_test_state()).unwrap();
        assert!(matches!(
            restore_snapshot(&state_json),
            Err(SnapshotError::MissingVersion)
        ));

        let json = encode_snapshot(&make_test_state()).unwrap();
        let mut v: Value = serde_json::from_str(&json).unwrap();
        v["version"] = Value::from(2);
        assert!(matches!(
            restore_snapshot(&v.to_string()),
            Err(SnapshotError::UnsupportedVersion { .. })
        ));
    }

    #[test]
    fn tampered_state_fails_hash_check() {
        let json = encode_snapshot(&make_test_state()).unwrap();
        let mut v: Value = serde_json::from_str(&json).unwrap();
        v["state"]["lists"][0]["name"] = Value::from("Nouns");
        assert!(matches!(
            restore_snapshot(&v.to_string()),
            Err(SnapshotError::HashMismatch { .. })
        ));
    }

    #[test]
    fn invariant_violation_rejected() {
        let mut state = make_test_state();
        state.lists.push(state.lists[0].clone());
        let json = encode_snapshot(&state).unwrap();
        match restore_snapshot(&json) {
            Err(SnapshotError::Invariant(InvariantViolation::DuplicateListId(id))) => {
                assert_eq!(id, "L")
            }
            other => panic!("expected invariant violation, got {:?}", other),
        }
    }

    #[test]
    fn unknown_state_field_rejected() {
        let json = encode_snapshot(&make_test_state()).unwrap();
        let mut v: Value = serde_json::from_str(&json).unwrap();
        v["state"]["surprise"] = Value::from(true);
        assert!(matches!(
            restore_snapshot(&v.to_string()),
            Err(SnapshotError::Decode(_))
        ));
    }

    #[test]
    fn file_roundtrip_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("state.json");
        let state = make_test_state();

        export_snapshot_to_file(&state, &path).unwrap();
        assert_eq!(import_snapshot_from_file(&path).unwrap(), state);
        assert!(!temp_path_for(&path).exists());
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            import_snapshot_from_file(&dir.path().join("absent.json")),
            Err(SnapshotError::Io(_))
        ));
    }
}
