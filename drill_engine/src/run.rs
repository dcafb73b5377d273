/// Drill engine: run lifecycle.
///
/// A run is born with its progress, collects one record per answered item,
/// and is archived to history exactly once when its cursor reaches the end.

use tracing::info;

use crate::clock::IdentityClock;
use crate::domain::{
    AppState, AttemptNo, CorrectByAttempt, PracticeHistoryEntry, PracticeMode,
    PracticeProgress, PracticeRecord, PracticeRun, RecordInput, FINAL_WRONG_ATTEMPT,
};

/// A fresh, empty run sized to `total` items.
pub fn create_run(total: usize, clock: &dyn IdentityClock) -> PracticeRun {
    PracticeRun {
        id: clock.new_id(),
        started_at: clock.now_ms(),
        ended_at: None,
        total,
        correct_by_attempt: CorrectByAttempt::default(),
        final_wrong_count: 0,
        records: Vec::new(),
    }
}

/// Return the progress's run, creating it if missing. `total` is always
/// resynced to the order length.
pub fn ensure_run<'a>(
    progress: &'a mut PracticeProgress,
    clock: &dyn IdentityClock,
) -> &'a mut PracticeRun {
    let len = progress.order.len();
    let run = progress.run.get_or_insert_with(|| create_run(len, clock));
    run.total = len;
    run
}

/// Result of advancing a list's cursor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Advance {
    /// No progress for the list, or an empty order.
    Inapplicable,
    /// Cursor moved (or was already at the end).
    Moved,
    /// This call moved the cursor onto the end.
    Finished { run_id: String, archived: bool },
}

/// Advance the cursor by one, clamped to the order length. Crossing onto the
/// end stamps `ended_at` and archives the run.
pub fn move_next(state: &mut AppState, list_id: &str, clock: &dyn IdentityClock) -> Advance {
    let Some(progress) = state.practice_by_list_id.get_mut(list_id) else {
        return Advance::Inapplicable;
    };
    let len = progress.order.len();
    if len == 0 {
        return Advance::Inapplicable;
    }

    let was_open = progress.cursor < len;
    progress.cursor = (progress.cursor + 1).min(len);
    progress.updated_at = clock.now_ms();

    if !(was_open && progress.cursor == len) {
        return Advance::Moved;
    }

    let mode = progress.mode;
    let run = ensure_run(progress, clock);
    if run.ended_at.is_none() {
        run.ended_at = Some(clock.now_ms());
    }
    let run = run.clone();

    let archived = archive_run(state, list_id, &run, mode);
    Advance::Finished {
        run_id: run.id,
        archived,
    }
}

/// Prepend a history entry for `run` unless one with the same id exists.
/// Returns whether an entry was added.
pub fn archive_run(
    state: &mut AppState,
    list_id: &str,
    run: &PracticeRun,
    mode: PracticeMode,
) -> bool {
    if state.practice_history.iter().any(|h| h.run.id == run.id) {
        return false;
    }
    let list_name = state.list(list_id).map(|l| l.name.clone());
    info!(run_id = %run.id, list_id, %mode, "archiving practice run");
    state.practice_history.insert(
        0,
        PracticeHistoryEntry {
            run: run.clone(),
            list_id: list_id.to_string(),
            list_name,
            mode,
        },
    );
    true
}

/// Count a correct answer on `attempt` and append its record.
pub fn record_correct(
    progress: &mut PracticeProgress,
    attempt: AttemptNo,
    record: RecordInput,
    clock: &dyn IdentityClock,
) {
    let run = ensure_run(progress, clock);
    run.correct_by_attempt.bump(attempt);
    run.records.push(PracticeRecord {
        item_id: record.item_id,
        term: record.term,
        attempt_count: attempt.number(),
        is_correct: true,
        user_meaning_zh: record.user_meaning_zh,
        snapshot: record.snapshot,
    });
    progress.updated_at = clock.now_ms();
}

/// Count an item whose attempts were all wrong.
pub fn record_final_wrong(
    progress: &mut PracticeProgress,
    record: RecordInput,
    clock: &dyn IdentityClock,
) {
    let run = ensure_run(progress, clock);
    run.final_wrong_count += 1;
    run.records.push(PracticeRecord {
        item_id: record.item_id,
        term: record.term,
        attempt_count: FINAL_WRONG_ATTEMPT,
        is_correct: false,
        user_meaning_zh: record.user_meaning_zh,
        snapshot: record.snapshot,
    });
    progress.updated_at = clock.now_ms();
}

/// Id of the item the list's cursor points at, if the session is open.
pub fn current_item_id<'a>(state: &'a AppState, list_id: &str) -> Option<&'a str> {
    state.progress(list_id)?.current_item_id()
}

/// Aggregate view of a run for result screens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub total: usize,
    pub answered: usize,
    pub correct: u32,
    pub final_wrong: u32,
    /// Correct answers as a whole percentage of answered items.
    pub accuracy_percent: u32,
}

pub fn run_summary(run: &PracticeRun) -> RunSummary {
    let correct = run.correct_by_attempt.total();
    let answered = run.records.len();
    let accuracy_percent = if answered == 0 {
        0
    } else {
        (correct as usize * 100 / answered) as u32
    };
    RunSummary {
        total: run.total,
        answered,
        correct,
        final_wrong: run.final_wrong_count,
        accuracy_percent,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::domain::WordList;

    fn progress_with(order: &[&str], cursor: usize) -> PracticeProgress {
        PracticeProgress {
            order: order.iter().map(|s| s.to_string()).collect(),
            cursor,
            updated_at: 0,
            mode: PracticeMode::FixedSequence,
            run: None,
        }
    }

    fn rec(item: &str) -> RecordInput {
        RecordInput {
            item_id: item.into(),
            term: format!("term-{}", item),
            ..Default::default()
        }
    }

    #[test]
    fn test_ensure_run_creates_and_syncs_total() {
        let clock = ManualClock::new(10);
        let mut p = progress_with(&["a", "b"], 0);
        let id = ensure_run(&mut p, &clock).id.clone();
        assert_eq!(p.run.as_ref().unwrap().total, 2);

        p.order.push("c".into());
        let run = ensure_run(&mut p, &clock);
        assert_eq!(run.id, id);
        assert_eq!(run.total, 3);
    }

    #[test]
    fn test_record_correct_buckets() {
        let clock = ManualClock::new(0);
        for attempt in AttemptNo::ALL {
            let mut p = progress_with(&["a"], 0);
            record_correct(&mut p, attempt, rec("a"), &clock);
            let run = p.run.as_ref().unwrap();
            for other in AttemptNo::ALL {
                let expected = if other == attempt { 1 } else { 0 };
                assert_eq!(run.correct_by_attempt.get(other), expected);
            }
            assert_eq!(run.records.len(), 1);
            assert_eq!(run.records[0].attempt_count, attempt.number());
            assert!(run.records[0].is_correct);
        }
    }

    #[test]
    fn test_record_final_wrong() {
        let clock = ManualClock::new(0);
        let mut p = progress_with(&["a"], 0);
        record_final_wrong(&mut p, rec("a"), &clock);
        let run = p.run.as_ref().unwrap();
        assert_eq!(run.final_wrong_count, 1);
        assert_eq!(run.records[0].attempt_count, 4);
        assert!(!run.records[0].is_correct);
        assert_eq!(run.correct_by_attempt.total(), 0);
    }

    #[test]
    fn test_move_next_archives_once() {
        let clock = ManualClock::new(100);
        let mut state = AppState::default();
        state.lists.push(WordList {
            id: "L".into(),
            name: "Verbs".into(),
            created_at: 0,
        });
        state
            .practice_by_list_id
            .insert("L".into(), progress_with(&["a", "b"], 0));

        assert_eq!(move_next(&mut state, "L", &clock), Advance::Moved);
        let finished = move_next(&mut state, "L", &clock);
        assert!(matches!(finished, Advance::Finished { archived: true, .. }));
        assert_eq!(move_next(&mut state, "L", &clock), Advance::Moved);
        assert_eq!(state.practice_history.len(), 1);
        assert_eq!(state.practice_history[0].list_name.as_deref(), Some("Verbs"));
        assert_eq!(state.practice_history[0].run.ended_at, Some(100));
        assert_eq!(state.progress("L").unwrap().cursor, 2);
    }

    #[test]
    fn test_move_next_without_progress() {
        let clock = ManualClock::new(0);
        let mut state = AppState::default();
        assert_eq!(move_next(&mut state, "nope", &clock), Advance::Inapplicable);
        state
            .practice_by_list_id
            .insert("E".into(), progress_with(&[], 0));
        assert_eq!(move_next(&mut state, "E", &clock), Advance::Inapplicable);
    }

    #[test]
    fn test_archive_run_is_idempotent() {
        let clock = ManualClock::new(0);
        let mut state = AppState::default();
        let run = create_run(3, &clock);
        assert!(archive_run(&mut state, "L", &run, PracticeMode::FixedSequence));
        assert!(!archive_run(&mut state, "L", &run, PracticeMode::FixedSequence));
        assert_eq!(state.practice_history.len(), 1);
    }

    #[test]
    fn test_run_summary() {
        let clock = ManualClock::new(0);
        let mut p = progress_with(&["a", "b", "c", "d"], 0);
        record_correct(&mut p, AttemptNo::First, rec("a"), &clock);
        record_correct(&mut p, AttemptNo::Third, rec("b"), &clock);
        record_final_wrong(&mut p, rec("c"), &clock);
        let s = run_summary(p.run.as_ref().unwrap());
        assert_eq!(s.total, 4);
        assert_eq!(s.answered, 3);
        assert_eq!(s.correct, 2);
        assert_eq!(s.final_wrong, 1);
        assert_eq!(s.accuracy_percent, 66);
    }
}
