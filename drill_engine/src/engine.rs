/// Drill engine: stateful store.
///
/// Owns the current state and the identity/clock capability. Delegates
/// mutation to transitions and validates each applied result.

use tracing::{debug, error};

use crate::actions::Action;
use crate::clock::{IdentityClock, SystemClock};
use crate::domain::{AppState, Transition};
use crate::invariants::{try_validate_invariants, InvariantViolation};
use crate::state::create_initial_state;
use crate::transitions::apply_action;

/// Stateful engine wrapping the pure reducer.
#[derive(Debug)]
pub struct DrillEngine<C = SystemClock> {
    state: AppState,
    clock: C,
}

impl Default for DrillEngine<SystemClock> {
    fn default() -> Self {
        Self::new(SystemClock)
    }
}

impl<C: IdentityClock> DrillEngine<C> {
    /// Engine over a fresh, empty state.
    pub fn new(clock: C) -> Self {
        Self {
            state: create_initial_state(),
            clock,
        }
    }

    /// Engine over an existing state, which must satisfy every invariant.
    pub fn with_state(state: AppState, clock: C) -> Result<Self, InvariantViolation> {
        try_validate_invariants(&state)?;
        Ok(Self { state, clock })
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Apply one action:
    ///   1. Delegate to `transitions::apply_action`
    ///   2. Keep the prior state if the action was not applicable
    ///   3. Validate invariants on the new state; reject on violation
    ///   4. Store and return the outcome
    pub fn dispatch(&mut self, action: &Action) -> Transition {
        let (next, transition) = apply_action(&self.state, action, &self.clock);
        if !transition.applied {
            return transition;
        }

        if let Err(violation) = try_validate_invariants(&next) {
            error!(action = action.kind(), %violation, "transition rejected");
            return Transition::skipped(action.kind(), violation.to_string());
        }

        debug!(action = action.kind(), "transition applied");
        self.state = next;
        transition
    }

    /// Apply actions in order, one outcome per action.
    pub fn dispatch_all<'a>(
        &mut self,
        actions: impl IntoIterator<Item = &'a Action>,
    ) -> Vec<Transition> {
        actions.into_iter().map(|a| self.dispatch(a)).collect()
    }

    /// Swap in a whole new state if it satisfies every invariant.
    pub fn replace(&mut self, state: AppState) -> Result<(), InvariantViolation> {
        try_validate_invariants(&state)?;
        self.state = state;
        Ok(())
    }

    pub fn into_state(self) -> AppState {
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::domain::{ListItem, WordList};

    fn engine() -> DrillEngine<ManualClock> {
        DrillEngine::new(ManualClock::new(1_000))
    }

    #[test]
    fn test_dispatch_applies_and_stores() {
        let mut e = engine();
        let t = e.dispatch(&Action::ListsCreate {
            name: "Verbs".into(),
            id: Some("L".into()),
            created_at: None,
        });
        assert!(t.applied);
        assert_eq!(e.state().lists.len(), 1);
        assert_eq!(e.state().lists[0].created_at, 1_000);
    }

    #[test]
    fn test_dispatch_all() {
        let mut e = engine();
        let actions = vec![
            Action::ListsCreate {
                name: "Verbs".into(),
                id: Some("L".into()),
                created_at: None,
            },
            Action::ItemsUpsert {
                list_id: "L".into(),
                item: ListItem::new("a", "abate", 0),
            },
            Action::ensure("L"),
            Action::next("nope"),
        ];
        let outcomes = e.dispatch_all(&actions);
        let applied: Vec<bool> = outcomes.iter().map(|t| t.applied).collect();
        assert_eq!(applied, vec![true, true, true, false]);
        assert_eq!(e.state().progress("L").unwrap().order, vec!["a"]);
    }

    #[test]
    fn test_invalid_replacement_rejected() {
        let mut e = engine();
        let list = WordList {
            id: "dup".into(),
            name: "x".into(),
            created_at: 0,
        };
        let mut bad = AppState::default();
        bad.lists = vec![list.clone(), list];

        let t = e.dispatch(&Action::StateReplace {
            state: Box::new(bad.clone()),
        });
        assert!(!t.applied);
        assert!(t.reason.contains("list_ids"));
        assert!(e.state().lists.is_empty());

        assert!(e.replace(bad.clone()).is_err());
        assert!(DrillEngine::with_state(bad, ManualClock::new(0)).is_err());
    }

    #[test]
    fn test_into_state() {
        let mut e = engine();
        e.dispatch(&Action::MistakesClear);
        assert_eq!(e.into_state(), AppState::default());
    }
}
