/// Drill engine: review sessions built from the ledgers.

use std::collections::BTreeSet;

use crate::actions::Action;
use crate::clock::IdentityClock;
use crate::domain::{AppState, LedgerSnapshot, ListItem, Millis, PracticeMode};
use crate::lists::{REVIEW_CORRECTS_LIST_ID, REVIEW_MISTAKES_LIST_ID};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewSource {
    Mistakes,
    Corrects,
}

impl ReviewSource {
    pub fn list_id(self) -> &'static str {
        match self {
            ReviewSource::Mistakes => REVIEW_MISTAKES_LIST_ID,
            ReviewSource::Corrects => REVIEW_CORRECTS_LIST_ID,
        }
    }

    pub fn list_name(self) -> &'static str {
        match self {
            ReviewSource::Mistakes => "Mistakes review",
            ReviewSource::Corrects => "Corrects review",
        }
    }
}

/// Actions that start a frozen random review over one ledger.
///
/// Items keep the ledger's most-recent-first order; an item that appears in
/// several correct rows is taken once. Empty ledger, empty batch.
pub fn review_actions(
    state: &AppState,
    source: ReviewSource,
    clock: &dyn IdentityClock,
) -> Vec<Action> {
    let rows: Vec<ListItem> = match source {
        ReviewSource::Mistakes => state
            .mistakes
            .iter()
            .map(|m| ledger_item(&m.item_id, &m.term, m.last_wrong_at, m.snapshot.as_ref()))
            .collect(),
        ReviewSource::Corrects => state
            .corrects
            .iter()
            .map(|c| ledger_item(&c.item_id, &c.term, c.last_correct_at, c.snapshot.as_ref()))
            .collect(),
    };

    let mut seen = BTreeSet::new();
    let items: Vec<ListItem> = rows
        .into_iter()
        .filter(|item| seen.insert(item.id.clone()))
        .collect();
    if items.is_empty() {
        return Vec::new();
    }

    let list_id = source.list_id().to_string();
    vec![
        Action::ListsCreate {
            name: source.list_name().to_string(),
            id: Some(list_id.clone()),
            created_at: Some(clock.now_ms()),
        },
        Action::ItemsReplace {
            list_id: list_id.clone(),
            items,
        },
        Action::PracticeEnsure {
            list_id,
            reshuffle: true,
            mode: Some(PracticeMode::FixedRandom),
        },
    ]
}

fn ledger_item(
    item_id: &str,
    term: &str,
    seen_at: Millis,
    snapshot: Option<&LedgerSnapshot>,
) -> ListItem {
    ListItem {
        id: item_id.to_string(),
        term: term.to_string(),
        created_at: seen_at,
        material: snapshot.and_then(|s| s.material.clone()),
    }
}
