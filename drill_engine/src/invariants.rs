/// Drill engine: invariant checks.
///
/// Run after every applied transition and on snapshot restore. Reports the
/// first failure.

use std::collections::BTreeSet;

use thiserror::Error;

use crate::domain::{AppState, FINAL_WRONG_ATTEMPT};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvariantViolation {
    #[error("[INVARIANT:cursor_bounds] list {list_id:?} cursor {cursor} exceeds order length {len}")]
    CursorOutOfBounds {
        list_id: String,
        cursor: usize,
        len: usize,
    },
    #[error("[INVARIANT:run_total] list {list_id:?} run total {total} != order length {len}")]
    RunTotalDrift {
        list_id: String,
        total: usize,
        len: usize,
    },
    #[error("[INVARIANT:record_attempt] run {run_id:?} item {item_id:?} has attemptCount={attempt_count} isCorrect={is_correct}")]
    BadRecord {
        run_id: String,
        item_id: String,
        attempt_count: u8,
        is_correct: bool,
    },
    #[error("[INVARIANT:history_unique] run {0:?} archived more than once")]
    DuplicateHistoryRun(String),
    #[error("[INVARIANT:mistake_key] duplicate mistake row for list {list_id:?} item {item_id:?}")]
    DuplicateMistake { list_id: String, item_id: String },
    #[error("[INVARIANT:correct_key] duplicate correct row for list {list_id:?} item {item_id:?} stage {stage}")]
    DuplicateCorrect {
        list_id: String,
        item_id: String,
        stage: u8,
    },
    #[error("[INVARIANT:list_ids] list id {0:?} appears more than once")]
    DuplicateListId(String),
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Run every check; `Err` on the first failure.
pub fn try_validate_invariants(state: &AppState) -> Result<(), InvariantViolation> {
    check_progress(state)?;
    check_history_unique(state)?;
    check_mistake_keys(state)?;
    check_correct_keys(state)?;
    check_list_ids(state)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Individual checks (private)
// ---------------------------------------------------------------------------

/// Cursor bounds, run total and record shape for every progress.
fn check_progress(state: &AppState) -> Result<(), InvariantViolation> {
    for (list_id, progress) in &state.practice_by_list_id {
        let len = progress.order.len();
        if progress.cursor > len {
            return Err(InvariantViolation::CursorOutOfBounds {
                list_id: list_id.clone(),
                cursor: progress.cursor,
                len,
            });
        }
        let Some(run) = &progress.run else { continue };
        if run.total != len {
            return Err(InvariantViolation::RunTotalDrift {
                list_id: list_id.clone(),
                total: run.total,
                len,
            });
        }
        for record in &run.records {
            let in_range = (1..=FINAL_WRONG_ATTEMPT).contains(&record.attempt_count);
            let consistent = record.is_correct == (record.attempt_count < FINAL_WRONG_ATTEMPT);
            if !(in_range && consistent) {
                return Err(InvariantViolation::BadRecord {
                    run_id: run.id.clone(),
                    item_id: record.item_id.clone(),
                    attempt_count: record.attempt_count,
                    is_correct: record.is_correct,
                });
            }
        }
    }
    Ok(())
}

fn check_history_unique(state: &AppState) -> Result<(), InvariantViolation> {
    let mut seen = BTreeSet::new();
    for entry in &state.practice_history {
        if !seen.insert(entry.run.id.as_str()) {
            return Err(InvariantViolation::DuplicateHistoryRun(entry.run.id.clone()));
        }
    }
    Ok(())
}

fn check_mistake_keys(state: &AppState) -> Result<(), InvariantViolation> {
    let mut seen = BTreeSet::new();
    for m in &state.mistakes {
        if !seen.insert((m.list_id.as_str(), m.item_id.as_str())) {
            return Err(InvariantViolation::DuplicateMistake {
                list_id: m.list_id.clone(),
                item_id: m.item_id.clone(),
            });
        }
    }
    Ok(())
}

/// Stage range is enforced by `AttemptNo` itself.
fn check_correct_keys(state: &AppState) -> Result<(), InvariantViolation> {
    let mut seen = BTreeSet::new();
    for c in &state.corrects {
        if !seen.insert((c.list_id.as_str(), c.item_id.as_str(), c.stage)) {
            return Err(InvariantViolation::DuplicateCorrect {
                list_id: c.list_id.clone(),
                item_id: c.item_id.clone(),
                stage: c.stage.number(),
            });
        }
    }
    Ok(())
}

fn check_list_ids(state: &AppState) -> Result<(), InvariantViolation> {
    let mut seen = BTreeSet::new();
    for l in &state.lists {
        if !seen.insert(l.id.as_str()) {
            return Err(InvariantViolation::DuplicateListId(l.id.clone()));
        }
    }
    Ok(())
}
