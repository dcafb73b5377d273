/// Drill engine: list and item lifecycle.
///
/// Every function mutates the working copy handed to it by the reducer and
/// reports whether it was applicable.

use std::collections::BTreeMap;

use chrono::DateTime;
use tracing::debug;

use crate::clock::IdentityClock;
use crate::domain::{AppState, ItemMaterial, ListItem, Millis, RemoteList, WordList};

/// Local-only review lists. Never present remotely, never removed by sync.
pub const REVIEW_MISTAKES_LIST_ID: &str = "review-mistakes";
pub const REVIEW_CORRECTS_LIST_ID: &str = "review-corrects";
pub const RESERVED_LIST_IDS: [&str; 2] = [REVIEW_MISTAKES_LIST_ID, REVIEW_CORRECTS_LIST_ID];

pub fn is_reserved_list(list_id: &str) -> bool {
    RESERVED_LIST_IDS.contains(&list_id)
}

/// Replace the list with the same id in place, or prepend it. The list
/// always ends up with an item collection.
pub fn upsert_list(state: &mut AppState, list: WordList) {
    state.items_by_list_id.entry(list.id.clone()).or_default();
    match state.lists.iter_mut().find(|l| l.id == list.id) {
        Some(slot) => *slot = list,
        None => state.lists.insert(0, list),
    }
}

pub fn rename_list(state: &mut AppState, list_id: &str, name: &str) -> bool {
    match state.lists.iter_mut().find(|l| l.id == list_id) {
        Some(list) => {
            list.name = name.to_string();
            true
        }
        None => false,
    }
}

/// Remove a list and everything that hangs off it.
pub fn delete_list(state: &mut AppState, list_id: &str) -> bool {
    let known = state.list(list_id).is_some()
        || state.items_by_list_id.contains_key(list_id)
        || state.practice_by_list_id.contains_key(list_id);
    if !known {
        return false;
    }

    state.lists.retain(|l| l.id != list_id);
    state.items_by_list_id.remove(list_id);
    state.practice_by_list_id.remove(list_id);
    state.mistakes.retain(|m| m.list_id != list_id);
    state.corrects.retain(|c| c.list_id != list_id);
    state.practice_history.retain(|h| h.list_id != list_id);
    if state.settings.selected_list_id.as_deref() == Some(list_id) {
        state.settings.selected_list_id = None;
    }
    true
}

/// Replace an item by id or prepend it. Requires the list to exist.
pub fn upsert_item(state: &mut AppState, list_id: &str, item: ListItem) -> bool {
    if state.list(list_id).is_none() {
        return false;
    }
    let items = state.items_by_list_id.entry(list_id.to_string()).or_default();
    match items.iter_mut().find(|i| i.id == item.id) {
        Some(slot) => *slot = item,
        None => items.insert(0, item),
    }
    true
}

/// Merge `incoming` by id and order the collection newest first.
pub fn bulk_upsert_items(state: &mut AppState, list_id: &str, incoming: Vec<ListItem>) -> bool {
    if state.list(list_id).is_none() {
        return false;
    }
    let items = state.items_by_list_id.entry(list_id.to_string()).or_default();
    for item in incoming {
        match items.iter_mut().find(|i| i.id == item.id) {
            Some(slot) => *slot = item,
            None => items.push(item),
        }
    }
    // Stable: equal timestamps keep merge order.
    items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    true
}

/// Swap in a full item collection. Material already attached to an item is
/// kept when the incoming copy has none.
pub fn replace_items(state: &mut AppState, list_id: &str, incoming: Vec<ListItem>) {
    let mut previous: BTreeMap<String, ItemMaterial> = state
        .items_by_list_id
        .remove(list_id)
        .unwrap_or_default()
        .into_iter()
        .filter_map(|i| i.material.map(|m| (i.id, m)))
        .collect();

    let items = incoming
        .into_iter()
        .map(|mut item| {
            if item.material.is_none() {
                item.material = previous.remove(&item.id);
            }
            item
        })
        .collect();
    state.items_by_list_id.insert(list_id.to_string(), items);
}

/// Remove an item, trim it out of the list's order and drop its mistakes.
///
/// When the removed item sat before the cursor the cursor moves back one so
/// the learner stays on the same item.
pub fn delete_item(state: &mut AppState, list_id: &str, item_id: &str, now: Millis) -> bool {
    let Some(items) = state.items_by_list_id.get_mut(list_id) else {
        return false;
    };
    let before = items.len();
    items.retain(|i| i.id != item_id);
    let removed_item = items.len() != before;

    let mut touched_order = false;
    if let Some(progress) = state.practice_by_list_id.get_mut(list_id) {
        if let Some(idx) = progress.order.iter().position(|id| id == item_id) {
            progress.order.remove(idx);
            if idx < progress.cursor {
                progress.cursor -= 1;
            }
            progress.cursor = progress.cursor.min(progress.order.len());
            if let Some(run) = progress.run.as_mut() {
                run.total = progress.order.len();
            }
            progress.updated_at = now;
            touched_order = true;
        }
    }

    let mistakes_before = state.mistakes.len();
    state
        .mistakes
        .retain(|m| !(m.list_id == list_id && m.item_id == item_id));

    removed_item || touched_order || state.mistakes.len() != mistakes_before
}

/// Attach generated material to one item. `false` when the item is absent.
pub fn attach_material(
    state: &mut AppState,
    list_id: &str,
    item_id: &str,
    material: ItemMaterial,
) -> bool {
    let item = state
        .items_by_list_id
        .get_mut(list_id)
        .and_then(|items| items.iter_mut().find(|i| i.id == item_id));
    match item {
        Some(item) => {
            item.material = Some(material);
            true
        }
        None => false,
    }
}

/// RFC 3339 timestamp as epoch millis.
pub fn parse_remote_time(raw: Option<&str>) -> Option<Millis> {
    DateTime::parse_from_rfc3339(raw?).ok().map(|t| t.timestamp_millis())
}

/// Fold the remote table listing into local lists.
///
/// Reserved review lists stay in front, remote lists follow newest first,
/// and local lists the remote does not report are kept after them
/// untouched. Items, progress, ledgers and history are never dropped here.
pub fn merge_remote_lists(state: &mut AppState, remote: &[RemoteList], clock: &dyn IdentityClock) {
    let now = clock.now_ms();
    let mut remote_lists: Vec<WordList> = remote
        .iter()
        .map(|r| WordList {
            id: r.id.clone(),
            name: r.table_name.clone(),
            created_at: parse_remote_time(r.create_time.as_deref())
                .or_else(|| parse_remote_time(r.created_time.as_deref()))
                .unwrap_or(now),
        })
        .collect();
    remote_lists.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    let (reserved, others): (Vec<WordList>, Vec<WordList>) = std::mem::take(&mut state.lists)
        .into_iter()
        .partition(|l| is_reserved_list(&l.id));
    let local_only: Vec<WordList> = others
        .into_iter()
        .filter(|l| !remote_lists.iter().any(|r| r.id == l.id))
        .collect();
    if !local_only.is_empty() {
        debug!(kept = local_only.len(), "local-only lists kept through sync");
    }

    let mut lists = reserved;
    lists.extend(remote_lists);
    lists.extend(local_only);
    for list in &lists {
        state.items_by_list_id.entry(list.id.clone()).or_default();
    }
    state.lists = lists;

    let dangling = match state.settings.selected_list_id.as_deref() {
        Some(selected) => state.list(selected).is_none(),
        None => false,
    };
    if dangling {
        state.settings.selected_list_id = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::domain::{MistakeEntry, PracticeMode, PracticeProgress};

    fn list(id: &str, created_at: Millis) -> WordList {
        WordList {
            id: id.into(),
            name: format!("list {}", id),
            created_at,
        }
    }

    fn mistake(list_id: &str, item_id: &str) -> MistakeEntry {
        MistakeEntry {
            id: format!("{}:{}", list_id, item_id),
            list_id: list_id.into(),
            item_id: item_id.into(),
            term: item_id.into(),
            sentence: String::new(),
            wrong_count: 1,
            last_wrong_at: 0,
            snapshot: None,
        }
    }

    fn remote(id: &str, create_time: Option<&str>) -> RemoteList {
        RemoteList {
            id: id.into(),
            table_name: format!("table {}", id),
            create_time: create_time.map(str::to_string),
            created_time: None,
        }
    }

    #[test]
    fn test_upsert_list_prepends_then_replaces() {
        let mut s = AppState::default();
        upsert_list(&mut s, list("a", 1));
        upsert_list(&mut s, list("b", 2));
        assert_eq!(s.lists[0].id, "b");
        assert!(s.items_by_list_id.contains_key("a"));

        let mut renamed = list("a", 1);
        renamed.name = "renamed".into();
        upsert_list(&mut s, renamed);
        assert_eq!(s.lists.len(), 2);
        assert_eq!(s.lists[1].name, "renamed");
    }

    #[test]
    fn test_rename_missing_list() {
        let mut s = AppState::default();
        assert!(!rename_list(&mut s, "nope", "x"));
    }

    #[test]
    fn test_upsert_item_requires_list() {
        let mut s = AppState::default();
        assert!(!upsert_item(&mut s, "L", ListItem::new("i", "t", 0)));
        upsert_list(&mut s, list("L", 0));
        assert!(upsert_item(&mut s, "L", ListItem::new("i", "t", 0)));
        assert!(upsert_item(&mut s, "L", ListItem::new("j", "u", 0)));
        assert!(upsert_item(&mut s, "L", ListItem::new("i", "t2", 0)));
        let terms: Vec<_> = s.items("L").iter().map(|i| i.term.as_str()).collect();
        assert_eq!(terms, vec!["u", "t2"]);
    }

    #[test]
    fn test_bulk_upsert_merges_and_sorts() {
        let mut s = AppState::default();
        upsert_list(&mut s, list("L", 0));
        bulk_upsert_items(
            &mut s,
            "L",
            vec![ListItem::new("a", "a", 1), ListItem::new("b", "b", 3)],
        );
        bulk_upsert_items(
            &mut s,
            "L",
            vec![ListItem::new("a", "a2", 5), ListItem::new("c", "c", 2)],
        );
        let ids: Vec<_> = s.items("L").iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(s.items("L")[0].term, "a2");
    }

    #[test]
    fn test_replace_items_keeps_material() {
        let mut s = AppState::default();
        let mut old = ListItem::new("a", "a", 0);
        old.material = Some(ItemMaterial {
            sentence: Some("kept".into()),
            ..Default::default()
        });
        s.items_by_list_id.insert("L".into(), vec![old, ListItem::new("b", "b", 0)]);

        replace_items(
            &mut s,
            "L",
            vec![ListItem::new("a", "a", 9), ListItem::new("c", "c", 9)],
        );
        let items = s.items("L");
        assert_eq!(items.len(), 2);
        assert_eq!(
            items[0].material.as_ref().unwrap().sentence.as_deref(),
            Some("kept")
        );
        assert!(items[1].material.is_none());
    }

    #[test]
    fn test_delete_list_cascades() {
        let mut s = AppState::default();
        upsert_list(&mut s, list("L", 0));
        upsert_list(&mut s, list("M", 0));
        s.mistakes.push(mistake("L", "i"));
        s.mistakes.push(mistake("M", "i"));
        s.settings.selected_list_id = Some("L".into());

        assert!(delete_list(&mut s, "L"));
        assert!(s.list("L").is_none());
        assert!(!s.items_by_list_id.contains_key("L"));
        assert_eq!(s.mistakes.len(), 1);
        assert_eq!(s.settings.selected_list_id, None);
        assert!(!delete_list(&mut s, "L"));
    }

    #[test]
    fn test_delete_item_trims_order() {
        let mut s = AppState::default();
        s.items_by_list_id.insert(
            "L".into(),
            vec![
                ListItem::new("a", "a", 0),
                ListItem::new("b", "b", 0),
                ListItem::new("c", "c", 0),
            ],
        );
        s.practice_by_list_id.insert(
            "L".into(),
            PracticeProgress {
                order: vec!["a".into(), "b".into(), "c".into()],
                cursor: 2,
                updated_at: 0,
                mode: PracticeMode::FixedSequence,
                run: Some(crate::run::create_run(3, &ManualClock::new(0))),
            },
        );
        s.mistakes.push(mistake("L", "a"));
        s.mistakes.push(mistake("M", "a"));

        assert!(delete_item(&mut s, "L", "a", 42));
        let p = s.progress("L").unwrap();
        assert_eq!(p.order, vec!["b", "c"]);
        assert_eq!(p.current_item_id(), Some("c"));
        assert_eq!(p.run.as_ref().unwrap().total, 2);
        assert_eq!(p.updated_at, 42);
        assert_eq!(s.mistakes.len(), 1);
        assert_eq!(s.mistakes[0].list_id, "M");

        assert!(delete_item(&mut s, "L", "c", 43));
        let p = s.progress("L").unwrap();
        assert_eq!(p.cursor, 1);
        assert!(p.is_complete());
    }

    #[test]
    fn test_delete_item_unknown() {
        let mut s = AppState::default();
        assert!(!delete_item(&mut s, "L", "x", 0));
        s.items_by_list_id.insert("L".into(), vec![]);
        assert!(!delete_item(&mut s, "L", "x", 0));
    }

    #[test]
    fn test_attach_material() {
        let mut s = AppState::default();
        s.items_by_list_id
            .insert("L".into(), vec![ListItem::new("a", "a", 0)]);
        assert!(attach_material(&mut s, "L", "a", ItemMaterial::default()));
        assert!(!attach_material(&mut s, "L", "zz", ItemMaterial::default()));
        assert!(s.item("L", "a").unwrap().material.is_some());
    }

    #[test]
    fn test_merge_remote_lists() {
        let clock = ManualClock::new(1_000);
        let mut s = AppState::default();
        upsert_list(&mut s, list(REVIEW_MISTAKES_LIST_ID, 0));
        upsert_list(&mut s, list("local", 0));
        upsert_list(&mut s, list("keep", 0));
        s.mistakes.push(mistake("local", "i"));
        s.settings.selected_list_id = Some("gone".into());

        merge_remote_lists(
            &mut s,
            &[
                remote("keep", Some("2024-01-01T00:00:00Z")),
                remote("new", Some("2024-06-01T00:00:00Z")),
                remote("undated", Some("not a date")),
            ],
            &clock,
        );

        let ids: Vec<_> = s.lists.iter().map(|l| l.id.as_str()).collect();
        assert_eq!(ids, vec![REVIEW_MISTAKES_LIST_ID, "new", "keep", "undated", "local"]);
        assert_eq!(s.list("undated").unwrap().created_at, 1_000);
        assert_eq!(s.list("keep").unwrap().name, "table keep");
        assert!(s.items_by_list_id.contains_key("new"));
        assert!(s.items_by_list_id.contains_key("local"));
        assert_eq!(s.mistakes.len(), 1);
        assert_eq!(s.settings.selected_list_id, None);
    }

    #[test]
    fn test_remote_time_falls_back_to_record_time() {
        let clock = ManualClock::new(0);
        let mut s = AppState::default();
        let mut r = remote("a", None);
        r.created_time = Some("1970-01-01T00:00:01Z".into());
        merge_remote_lists(&mut s, &[r], &clock);
        assert_eq!(s.list("a").unwrap().created_at, 1_000);
    }
}
