/// Drill engine: mistake and correct ledgers.
///
/// One row per identity key. Repeats bump the counter, refresh the timestamp
/// and overwrite the snapshot; first sightings are prepended.

use crate::domain::{AppState, CorrectEntry, Millis, MistakeEntry, NewCorrect, NewMistake};

/// Record a wrong answer, keyed by `(list_id, item_id)`.
pub fn record_mistake(state: &mut AppState, entry: NewMistake, now: Millis) {
    let existing = state
        .mistakes
        .iter_mut()
        .find(|m| m.list_id == entry.list_id && m.item_id == entry.item_id);

    match existing {
        Some(row) => {
            row.wrong_count += 1;
            row.last_wrong_at = now;
            row.snapshot = entry.snapshot;
        }
        None => state.mistakes.insert(
            0,
            MistakeEntry {
                id: entry.id,
                list_id: entry.list_id,
                item_id: entry.item_id,
                term: entry.term,
                sentence: entry.sentence,
                wrong_count: 1,
                last_wrong_at: now,
                snapshot: entry.snapshot,
            },
        ),
    }
}

/// Record a correct answer, keyed by `(list_id, item_id, stage)`.
pub fn record_correct(state: &mut AppState, entry: NewCorrect, now: Millis) {
    let existing = state.corrects.iter_mut().find(|c| {
        c.list_id == entry.list_id && c.item_id == entry.item_id && c.stage == entry.stage
    });

    match existing {
        Some(row) => {
            row.correct_count += 1;
            row.last_correct_at = now;
            row.snapshot = entry.snapshot;
        }
        None => state.corrects.insert(
            0,
            CorrectEntry {
                id: entry.id,
                list_id: entry.list_id,
                item_id: entry.item_id,
                term: entry.term,
                sentence: entry.sentence,
                stage: entry.stage,
                correct_count: 1,
                last_correct_at: now,
                snapshot: entry.snapshot,
            },
        ),
    }
}

pub fn clear_mistakes(state: &mut AppState) {
    state.mistakes.clear();
}

pub fn clear_corrects(state: &mut AppState) {
    state.corrects.clear();
}
