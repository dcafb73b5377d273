/// Drill engine: centralized transition logic.
///
/// Every state change goes through `apply_action`. The prior state is never
/// touched; handlers mutate a private clone. Inapplicable actions hand back
/// an equal state and a skipped `Transition`, they never fail.

use tracing::debug;

use crate::actions::Action;
use crate::clock::IdentityClock;
use crate::domain::{
    AppState, AttemptNo, ItemMaterial, Millis, PracticeMode, PromptTemplate, RecordInput,
    Transition, WordList,
};
use crate::ledger;
use crate::lists;
use crate::order::{ensure_order, EnsureOptions};
use crate::run::{self, Advance};

// ---------------------------------------------------------------------------
// Public dispatcher
// ---------------------------------------------------------------------------

/// Apply `action` to `state` and return `(new_state, outcome)`.
pub fn apply_action(
    state: &AppState,
    action: &Action,
    clock: &dyn IdentityClock,
) -> (AppState, Transition) {
    let mut next = state.clone();
    let kind = action.kind();

    let outcome = match action {
        Action::StateReplace { state: replacement } => {
            next = replacement.as_ref().clone();
            Ok(Transition::applied(kind))
        }
        Action::ListsSync { remote } => {
            lists::merge_remote_lists(&mut next, remote, clock);
            Ok(Transition::applied(kind))
        }
        Action::ListsCreate {
            name,
            id,
            created_at,
        } => apply_create_list(&mut next, kind, name, id.as_deref(), *created_at, clock),
        Action::ListsRename { list_id, name } => {
            applied_if(kind, lists::rename_list(&mut next, list_id, name), || {
                format!("list {:?} does not exist", list_id)
            })
        }
        Action::ListsDelete { list_id } => {
            applied_if(kind, lists::delete_list(&mut next, list_id), || {
                format!("list {:?} does not exist", list_id)
            })
        }
        Action::ItemsUpsert { list_id, item } => applied_if(
            kind,
            lists::upsert_item(&mut next, list_id, item.clone()),
            || format!("list {:?} does not exist", list_id),
        ),
        Action::ItemsBulkUpsert { list_id, items } => applied_if(
            kind,
            lists::bulk_upsert_items(&mut next, list_id, items.clone()),
            || format!("list {:?} does not exist", list_id),
        ),
        Action::ItemsReplace { list_id, items } => {
            lists::replace_items(&mut next, list_id, items.clone());
            Ok(Transition::applied(kind))
        }
        Action::ItemsDelete { list_id, item_id } => applied_if(
            kind,
            lists::delete_item(&mut next, list_id, item_id, clock.now_ms()),
            || format!("item {:?} not found in list {:?}", item_id, list_id),
        ),
        Action::ItemsMaterial {
            list_id,
            item_id,
            material,
        } => apply_material(&mut next, kind, list_id, item_id, material),
        Action::PracticeEnsure {
            list_id,
            reshuffle,
            mode,
        } => {
            let opts = EnsureOptions {
                reshuffle: *reshuffle,
                mode: *mode,
            };
            applied_if(kind, ensure_order(&mut next, list_id, opts, clock), || {
                format!("list {:?} has no items collection", list_id)
            })
        }
        Action::PracticeNext { list_id } => apply_next(&mut next, kind, list_id, clock),
        Action::PracticeDeleteSession { list_id } => applied_if(
            kind,
            next.practice_by_list_id.remove(list_id).is_some(),
            || format!("list {:?} has no practice session", list_id),
        ),
        Action::PracticeCorrect {
            list_id,
            attempt_no,
            record,
        } => apply_score(&mut next, kind, list_id, Some(*attempt_no), record, clock),
        Action::PracticeFinalWrong { list_id, record } => {
            apply_score(&mut next, kind, list_id, None, record, clock)
        }
        Action::SettingsMode { mode } => apply_mode(&mut next, kind, *mode),
        Action::SettingsSelectedList { selected_list_id } => {
            next.settings.selected_list_id = selected_list_id.clone();
            Ok(Transition::applied(kind))
        }
        Action::MistakesRecord { entry } => {
            ledger::record_mistake(&mut next, entry.clone(), clock.now_ms());
            Ok(Transition::applied(kind))
        }
        Action::MistakesClear => {
            ledger::clear_mistakes(&mut next);
            Ok(Transition::applied(kind))
        }
        Action::CorrectsRecord { entry } => {
            ledger::record_correct(&mut next, entry.clone(), clock.now_ms());
            Ok(Transition::applied(kind))
        }
        Action::CorrectsClear => {
            ledger::clear_corrects(&mut next);
            Ok(Transition::applied(kind))
        }
        Action::HistoryDelete { run_id } => {
            let before = next.practice_history.len();
            next.practice_history.retain(|h| &h.run.id != run_id);
            applied_if(kind, next.practice_history.len() != before, || {
                format!("no history entry for run {:?}", run_id)
            })
        }
        Action::PromptsSet { key, template } => apply_prompt(&mut next, kind, key, template),
    };

    match outcome {
        Ok(transition) => (next, transition),
        Err(skipped) => {
            debug!(action = kind, reason = %skipped.reason, "action not applicable");
            (state.clone(), skipped)
        }
    }
}

// ---------------------------------------------------------------------------
// Individual transition handlers (private)
// ---------------------------------------------------------------------------

/// `Err` carries the skipped outcome; the dispatcher then discards the clone.
type Outcome = Result<Transition, Transition>;

fn applied_if(kind: &str, applied: bool, reason: impl FnOnce() -> String) -> Outcome {
    if applied {
        Ok(Transition::applied(kind))
    } else {
        Err(Transition::skipped(kind, reason()))
    }
}

fn apply_create_list(
    state: &mut AppState,
    kind: &str,
    name: &str,
    id: Option<&str>,
    created_at: Option<Millis>,
    clock: &dyn IdentityClock,
) -> Outcome {
    let list = WordList {
        id: id.map(str::to_string).unwrap_or_else(|| clock.new_id()),
        name: name.to_string(),
        created_at: created_at.unwrap_or_else(|| clock.now_ms()),
    };
    lists::upsert_list(state, list);
    Ok(Transition::applied(kind))
}

fn apply_material(
    state: &mut AppState,
    kind: &str,
    list_id: &str,
    item_id: &str,
    material: &ItemMaterial,
) -> Outcome {
    if let Some(stamp) = material.run_id.as_deref() {
        let current = state.progress(list_id).and_then(|p| p.run_id());
        if current != Some(stamp) {
            return Err(Transition::skipped(
                kind,
                format!(
                    "material for run {:?} is stale (current run {:?})",
                    stamp, current
                ),
            ));
        }
    }
    applied_if(
        kind,
        lists::attach_material(state, list_id, item_id, material.clone()),
        || format!("item {:?} not found in list {:?}", item_id, list_id),
    )
}

fn apply_next(
    state: &mut AppState,
    kind: &str,
    list_id: &str,
    clock: &dyn IdentityClock,
) -> Outcome {
    match run::move_next(state, list_id, clock) {
        Advance::Inapplicable => Err(Transition::skipped(
            kind,
            format!("list {:?} has no practice order", list_id),
        )),
        Advance::Moved => Ok(Transition::applied(kind)),
        Advance::Finished { run_id, archived } => {
            let mut t = Transition::applied(kind);
            if archived {
                t.archived_run_id = Some(run_id);
            }
            Ok(t)
        }
    }
}

/// `attempt == None` scores a final wrong answer.
fn apply_score(
    state: &mut AppState,
    kind: &str,
    list_id: &str,
    attempt: Option<AttemptNo>,
    record: &RecordInput,
    clock: &dyn IdentityClock,
) -> Outcome {
    let Some(progress) = state.practice_by_list_id.get_mut(list_id) else {
        return Err(Transition::skipped(
            kind,
            format!("list {:?} has no practice session", list_id),
        ));
    };
    match attempt {
        Some(attempt) => run::record_correct(progress, attempt, record.clone(), clock),
        None => run::record_final_wrong(progress, record.clone(), clock),
    }
    Ok(Transition::applied(kind))
}

fn apply_mode(state: &mut AppState, kind: &str, mode: PracticeMode) -> Outcome {
    state.settings.mode = mode;
    Ok(Transition::applied(kind))
}

fn apply_prompt(state: &mut AppState, kind: &str, key: &str, template: &PromptTemplate) -> Outcome {
    state.prompts.insert(key.to_string(), template.clone());
    Ok(Transition::applied(kind))
}
