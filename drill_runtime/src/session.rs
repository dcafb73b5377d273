//! Store: the drill engine plus its persistence, behind one lock.
//!
//! Apply-before-persist order:
//!   1. engine.dispatch(action)  (rejected actions stop here)
//!   2. persistence.save(state)  only if step 1 applied and autosave is on
//!
//! A failed save is logged and does not undo the applied transition.
//! Concurrency: one Mutex serializes dispatches; it is never held across
//! an `.await`.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, warn};

use drill_engine::actions::Action;
use drill_engine::clock::IdentityClock;
use drill_engine::domain::{AppState, Transition};
use drill_engine::engine::DrillEngine;
use drill_engine::hashing::canonical_hash;
use drill_engine::review::{review_actions, ReviewSource};

use crate::persistence::Persistence;
use crate::prompts::fresh_state;
use crate::snapshot_codec::SnapshotError;

pub type BoxedClock = Box<dyn IdentityClock + Send>;

pub struct Store {
    engine: DrillEngine<BoxedClock>,
    persistence: Box<dyn Persistence>,
    autosave: bool,
}

impl Store {
    /// Load the persisted state and wrap it in an engine.
    pub fn open(persistence: Box<dyn Persistence>, clock: BoxedClock, autosave: bool) -> Self {
        let mut engine = DrillEngine::new(clock);
        if let Err(violation) = engine.replace(persistence.load()) {
            warn!(%violation, "loaded state rejected, starting fresh");
            engine.dispatch(&Action::StateReplace {
                state: Box::new(fresh_state()),
            });
        }
        Self {
            engine,
            persistence,
            autosave,
        }
    }

    pub fn state(&self) -> &AppState {
        self.engine.state()
    }

    pub fn clock(&self) -> &dyn IdentityClock {
        &**self.engine.clock()
    }

    pub fn dispatch(&mut self, action: &Action) -> Transition {
        let transition = self.engine.dispatch(action);
        if transition.applied && self.autosave {
            self.persist();
        }
        transition
    }

    /// Apply a batch, saving once at the end if anything applied.
    pub fn dispatch_all(&mut self, actions: &[Action]) -> Vec<Transition> {
        let outcomes = self.engine.dispatch_all(actions);
        if self.autosave && outcomes.iter().any(|t| t.applied) {
            self.persist();
        }
        outcomes
    }

    pub fn save(&self) -> Result<(), SnapshotError> {
        self.persistence.save(self.engine.state())
    }

    fn persist(&self) {
        match self.save() {
            Ok(()) => debug!("state saved"),
            Err(err) => warn!(error = %err, "state save failed"),
        }
    }

    pub fn current_hash(&self) -> Option<String> {
        canonical_hash(self.engine.state()).ok()
    }
}

/// Thread-safe store handle for async tasks.
#[derive(Clone)]
pub struct SharedStore {
    inner: Arc<Mutex<Store>>,
}

impl SharedStore {
    pub fn new(store: Store) -> Self {
        Self {
            inner: Arc::new(Mutex::new(store)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Store> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn dispatch(&self, action: &Action) -> Transition {
        self.lock().dispatch(action)
    }

    pub fn dispatch_all(&self, actions: &[Action]) -> Vec<Transition> {
        self.lock().dispatch_all(actions)
    }

    /// Apply `actions` only if `guard` holds for the state they would be
    /// applied to. `None` when the guard failed.
    pub fn dispatch_all_if(
        &self,
        guard: impl FnOnce(&AppState) -> bool,
        actions: &[Action],
    ) -> Option<Vec<Transition>> {
        let mut store = self.lock();
        if !guard(store.state()) {
            return None;
        }
        Some(store.dispatch_all(actions))
    }

    /// Run `f` against the current state and clock under the lock.
    pub fn read<R>(&self, f: impl FnOnce(&AppState, &dyn IdentityClock) -> R) -> R {
        let store = self.lock();
        f(store.state(), store.clock())
    }

    /// Owned copy of the current state.
    pub fn snapshot(&self) -> AppState {
        self.lock().state().clone()
    }

    pub fn save(&self) -> Result<(), SnapshotError> {
        self.lock().save()
    }

    /// Build and apply a review session in one critical section.
    pub fn start_review(&self, source: ReviewSource) -> Vec<Transition> {
        let mut store = self.lock();
        let actions = review_actions(store.state(), source, store.clock());
        store.dispatch_all(&actions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::MemoryStore;
    use drill_engine::clock::ManualClock;
    use drill_engine::domain::ListItem;

    struct Shared(Arc<MemoryStore>);

    impl Persistence for Shared {
        fn load(&self) -> AppState {
            self.0.load()
        }
        fn save(&self, state: &AppState) -> Result<(), SnapshotError> {
            self.0.save(state)
        }
    }

    fn open(memory: &Arc<MemoryStore>, autosave: bool) -> Store {
        Store::open(
            Box::new(Shared(memory.clone())),
            Box::new(ManualClock::new(100)),
            autosave,
        )
    }

    fn create(id: &str) -> Action {
        Action::ListsCreate {
            name: id.to_string(),
            id: Some(id.to_string()),
            created_at: None,
        }
    }

    #[test]
    fn test_open_empty_has_prompts() {
        let memory = Arc::new(MemoryStore::new());
        let store = open(&memory, true);
        assert_eq!(store.state(), &fresh_state());
    }

    #[test]
    fn test_applied_action_autosaves() {
        let memory = Arc::new(MemoryStore::new());
        let mut store = open(&memory, true);

        let t = store.dispatch(&Action::ListsRename {
            list_id: "nope".into(),
            name: "x".into(),
        });
        assert!(!t.applied);
        assert!(memory.blob().is_none());

        assert!(store.dispatch(&create("L")).applied);
        assert!(memory.blob().is_some());

        let reopened = open(&memory, true);
        assert_eq!(reopened.state(), store.state());
        assert_eq!(reopened.current_hash(), store.current_hash());
    }

    #[test]
    fn test_autosave_off_requires_explicit_save() {
        let memory = Arc::new(MemoryStore::new());
        let mut store = open(&memory, false);
        store.dispatch(&create("L"));
        assert!(memory.blob().is_none());
        store.save().unwrap();
        assert_eq!(open(&memory, false).state().lists.len(), 1);
    }

    #[test]
    fn test_shared_store_across_threads() {
        let memory = Arc::new(MemoryStore::new());
        let shared = SharedStore::new(open(&memory, false));
        shared.dispatch(&create("L"));

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let s = shared.clone();
                std::thread::spawn(move || {
                    s.dispatch(&Action::ItemsUpsert {
                        list_id: "L".into(),
                        item: ListItem::new(format!("i{}", i), format!("t{}", i), i),
                    })
                })
            })
            .collect();
        for h in handles {
            assert!(h.join().unwrap().applied);
        }
        assert_eq!(shared.snapshot().items("L").len(), 4);
        assert_eq!(shared.read(|s, _| s.lists.len()), 1);
    }
}
