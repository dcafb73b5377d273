/// Drill engine: practice order.
///
/// Builds a list's order on reset and keeps a `fixed_sequence` order in step
/// with the list's items afterwards.

use tracing::debug;

use crate::clock::IdentityClock;
use crate::domain::{AppState, PracticeMode, PracticeProgress};
use crate::run::{create_run, ensure_run};
use crate::shuffle::{sample, RANDOM_SESSION_SIZE};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnsureOptions {
    pub reshuffle: bool,
    pub mode: Option<PracticeMode>,
}

/// Make sure `list_id` has a usable order and an active run.
///
/// Returns `false` (state untouched) when the list has no item collection.
pub fn ensure_order(
    state: &mut AppState,
    list_id: &str,
    opts: EnsureOptions,
    clock: &dyn IdentityClock,
) -> bool {
    let Some(items) = state.items_by_list_id.get(list_id) else {
        return false;
    };
    let ids: Vec<String> = items.iter().map(|i| i.id.clone()).collect();

    let existing = state.practice_by_list_id.get(list_id);
    let mode = opts
        .mode
        .or_else(|| existing.map(|p| p.mode))
        .unwrap_or_default();
    let reset = match existing {
        None => true,
        Some(p) => opts.reshuffle || p.mode != mode,
    };

    if reset {
        let progress = build_progress(ids, mode, clock);
        debug!(
            list_id,
            %mode,
            len = progress.order.len(),
            run_id = progress.run_id().unwrap_or_default(),
            "practice order reset"
        );
        state.practice_by_list_id.insert(list_id.to_string(), progress);
        return true;
    }

    let Some(progress) = state.practice_by_list_id.get_mut(list_id) else {
        return false;
    };
    if mode == PracticeMode::FixedSequence && progress.order != ids {
        reconcile(progress, ids);
        progress.updated_at = clock.now_ms();
    }
    ensure_run(progress, clock);
    true
}

fn build_progress(
    ids: Vec<String>,
    mode: PracticeMode,
    clock: &dyn IdentityClock,
) -> PracticeProgress {
    let order = match mode {
        PracticeMode::FixedRandom => sample(&ids, clock.shuffle_seed(), RANDOM_SESSION_SIZE),
        PracticeMode::FixedSequence | PracticeMode::AiInfinite => ids,
    };
    let run = create_run(order.len(), clock);
    PracticeProgress {
        order,
        cursor: 0,
        updated_at: clock.now_ms(),
        mode,
        run: Some(run),
    }
}

/// Swap in `ids` as the new order, keeping the learner on the same item when
/// it survives.
fn reconcile(progress: &mut PracticeProgress, ids: Vec<String>) {
    let cursor = match progress.current_item_id() {
        Some(current) => match ids.iter().position(|id| id == current) {
            Some(idx) => idx,
            None => progress.cursor.min(ids.len().saturating_sub(1)),
        },
        // Session already finished: items appended since are open again.
        None => progress.cursor.min(ids.len()),
    };
    progress.order = ids;
    progress.cursor = cursor;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::domain::ListItem;

    fn state_with(list_id: &str, n: usize) -> AppState {
        let mut s = AppState::default();
        let items = (1..=n)
            .map(|i| ListItem::new(i.to_string(), format!("term{}", i), i as i64))
            .collect();
        s.items_by_list_id.insert(list_id.into(), items);
        s
    }

    fn set_items(s: &mut AppState, list_id: &str, ids: &[&str]) {
        let items = ids.iter().map(|id| ListItem::new(*id, *id, 0)).collect();
        s.items_by_list_id.insert(list_id.into(), items);
    }

    fn reshuffle() -> EnsureOptions {
        EnsureOptions {
            reshuffle: true,
            mode: None,
        }
    }

    fn random() -> EnsureOptions {
        EnsureOptions {
            reshuffle: false,
            mode: Some(PracticeMode::FixedRandom),
        }
    }

    #[test]
    fn test_unknown_list_is_inapplicable() {
        let clock = ManualClock::new(0);
        let mut s = AppState::default();
        assert!(!ensure_order(&mut s, "L", EnsureOptions::default(), &clock));
        assert!(s.practice_by_list_id.is_empty());
    }

    #[test]
    fn test_first_ensure_builds_sequence() {
        let clock = ManualClock::new(5);
        let mut s = state_with("L", 3);
        assert!(ensure_order(&mut s, "L", EnsureOptions::default(), &clock));
        let p = s.progress("L").unwrap();
        assert_eq!(p.order, vec!["1", "2", "3"]);
        assert_eq!(p.cursor, 0);
        assert_eq!(p.mode, PracticeMode::FixedSequence);
        assert_eq!(p.run.as_ref().unwrap().total, 3);
        assert_eq!(p.updated_at, 5);
    }

    #[test]
    fn test_reshuffle_resets_cursor_and_run() {
        let clock = ManualClock::new(0);
        let mut s = state_with("L", 4);
        ensure_order(&mut s, "L", EnsureOptions::default(), &clock);
        let first_run = s.progress("L").unwrap().run_id().unwrap().to_string();
        s.practice_by_list_id.get_mut("L").unwrap().cursor = 3;

        ensure_order(&mut s, "L", reshuffle(), &clock);
        let p = s.progress("L").unwrap();
        assert_eq!(p.cursor, 0);
        assert_ne!(p.run_id().unwrap(), first_run);
        assert_eq!(p.run.as_ref().unwrap().total, p.order.len());
    }

    #[test]
    fn test_random_session_is_capped() {
        let clock = ManualClock::new(0).with_seed(7);
        let mut s = state_with("L", 20);
        ensure_order(&mut s, "L", random(), &clock);
        let p = s.progress("L").unwrap();
        assert_eq!(p.order.len(), 10);
        assert_eq!(p.run.as_ref().unwrap().total, 10);

        let mut small = state_with("S", 4);
        ensure_order(&mut small, "S", random(), &clock);
        assert_eq!(small.progress("S").unwrap().order.len(), 4);
    }

    #[test]
    fn test_pinned_seed_reproduces_order() {
        let mut a = state_with("L", 20);
        let mut b = state_with("L", 20);
        ensure_order(&mut a, "L", random(), &ManualClock::new(0).with_seed(99));
        ensure_order(&mut b, "L", random(), &ManualClock::new(50).with_seed(99));
        assert_eq!(a.progress("L").unwrap().order, b.progress("L").unwrap().order);
    }

    #[test]
    fn test_mode_change_resets() {
        let clock = ManualClock::new(0).with_seed(1);
        let mut s = state_with("L", 12);
        ensure_order(&mut s, "L", EnsureOptions::default(), &clock);
        ensure_order(&mut s, "L", random(), &clock);
        let p = s.progress("L").unwrap();
        assert_eq!(p.mode, PracticeMode::FixedRandom);
        assert_eq!(p.order.len(), 10);
    }

    #[test]
    fn test_sequence_reconcile_keeps_position() {
        let clock = ManualClock::new(0);
        let mut s = AppState::default();
        set_items(&mut s, "L", &["1", "2"]);
        ensure_order(&mut s, "L", EnsureOptions::default(), &clock);
        let run_id = s.progress("L").unwrap().run_id().unwrap().to_string();
        s.practice_by_list_id.get_mut("L").unwrap().cursor = 1;

        set_items(&mut s, "L", &["1", "2", "3"]);
        ensure_order(&mut s, "L", EnsureOptions::default(), &clock);
        let p = s.progress("L").unwrap();
        assert_eq!(p.order, vec!["1", "2", "3"]);
        assert_eq!(p.cursor, 1);
        assert_eq!(p.current_item_id(), Some("2"));
        assert_eq!(p.run_id(), Some(run_id.as_str()));
        assert_eq!(p.run.as_ref().unwrap().total, 3);
    }

    #[test]
    fn test_sequence_reconcile_follows_moved_item() {
        let clock = ManualClock::new(0);
        let mut s = AppState::default();
        set_items(&mut s, "L", &["a", "b", "c"]);
        ensure_order(&mut s, "L", EnsureOptions::default(), &clock);
        s.practice_by_list_id.get_mut("L").unwrap().cursor = 2;

        set_items(&mut s, "L", &["c", "a", "b"]);
        ensure_order(&mut s, "L", EnsureOptions::default(), &clock);
        assert_eq!(s.progress("L").unwrap().cursor, 0);
    }

    #[test]
    fn test_sequence_reconcile_clamps_when_current_deleted() {
        let clock = ManualClock::new(0);
        let mut s = AppState::default();
        set_items(&mut s, "L", &["a", "b", "c"]);
        ensure_order(&mut s, "L", EnsureOptions::default(), &clock);
        s.practice_by_list_id.get_mut("L").unwrap().cursor = 2;

        set_items(&mut s, "L", &["a", "b"]);
        ensure_order(&mut s, "L", EnsureOptions::default(), &clock);
        let p = s.progress("L").unwrap();
        assert_eq!(p.cursor, 1);
        assert_eq!(p.run.as_ref().unwrap().total, 2);

        set_items(&mut s, "L", &[]);
        ensure_order(&mut s, "L", EnsureOptions::default(), &clock);
        assert_eq!(s.progress("L").unwrap().cursor, 0);
    }

    #[test]
    fn test_finished_sequence_reopens_for_appended_items() {
        let clock = ManualClock::new(0);
        let mut s = AppState::default();
        set_items(&mut s, "L", &["a", "b"]);
        ensure_order(&mut s, "L", EnsureOptions::default(), &clock);
        s.practice_by_list_id.get_mut("L").unwrap().cursor = 2;

        set_items(&mut s, "L", &["a", "b", "c"]);
        ensure_order(&mut s, "L", EnsureOptions::default(), &clock);
        let p = s.progress("L").unwrap();
        assert_eq!(p.cursor, 2);
        assert_eq!(p.current_item_id(), Some("c"));
    }

    #[test]
    fn test_random_session_stays_frozen() {
        let clock = ManualClock::new(0).with_seed(3);
        let mut s = state_with("L", 5);
        ensure_order(&mut s, "L", random(), &clock);
        let before = s.progress("L").unwrap().clone();

        set_items(&mut s, "L", &["x", "y"]);
        ensure_order(&mut s, "L", EnsureOptions::default(), &clock);
        assert_eq!(s.progress("L").unwrap(), &before);
    }

    #[test]
    fn test_missing_run_recreated() {
        let clock = ManualClock::new(0);
        let mut s = state_with("L", 2);
        ensure_order(&mut s, "L", EnsureOptions::default(), &clock);
        s.practice_by_list_id.get_mut("L").unwrap().run = None;
        ensure_order(&mut s, "L", EnsureOptions::default(), &clock);
        assert_eq!(s.progress("L").unwrap().run.as_ref().unwrap().total, 2);
    }
}
