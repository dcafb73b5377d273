/// Drill engine: action definitions.
///
/// Actions are pure data: a kind plus its payload. All behaviour lives in
/// `transitions`. Wire form is `{"type": "<kind>", "payload": {...}}`.

use serde::{Deserialize, Serialize};

use crate::domain::{
    AppState, AttemptNo, ItemMaterial, ListItem, Millis, NewCorrect, NewMistake, PracticeMode,
    PromptTemplate, RecordInput, RemoteList,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all_fields = "camelCase")]
pub enum Action {
    #[serde(rename = "state/replace")]
    StateReplace { state: Box<AppState> },

    #[serde(rename = "lists/sync")]
    ListsSync { remote: Vec<RemoteList> },
    #[serde(rename = "lists/create")]
    ListsCreate {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        created_at: Option<Millis>,
    },
    #[serde(rename = "lists/rename")]
    ListsRename { list_id: String, name: String },
    #[serde(rename = "lists/delete")]
    ListsDelete { list_id: String },

    #[serde(rename = "items/upsert")]
    ItemsUpsert { list_id: String, item: ListItem },
    #[serde(rename = "items/bulkUpsert")]
    ItemsBulkUpsert { list_id: String, items: Vec<ListItem> },
    #[serde(rename = "items/replace")]
    ItemsReplace { list_id: String, items: Vec<ListItem> },
    #[serde(rename = "items/delete")]
    ItemsDelete { list_id: String, item_id: String },
    #[serde(rename = "items/material")]
    ItemsMaterial {
        list_id: String,
        item_id: String,
        material: ItemMaterial,
    },

    #[serde(rename = "practice/ensure")]
    PracticeEnsure {
        list_id: String,
        #[serde(default)]
        reshuffle: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        mode: Option<PracticeMode>,
    },
    #[serde(rename = "practice/next")]
    PracticeNext { list_id: String },
    #[serde(rename = "practice/deleteSession")]
    PracticeDeleteSession { list_id: String },
    #[serde(rename = "practice/correct")]
    PracticeCorrect {
        list_id: String,
        attempt_no: AttemptNo,
        record: RecordInput,
    },
    #[serde(rename = "practice/finalWrong")]
    PracticeFinalWrong { list_id: String, record: RecordInput },

    #[serde(rename = "settings/mode")]
    SettingsMode { mode: PracticeMode },
    #[serde(rename = "settings/selectedList")]
    SettingsSelectedList {
        #[serde(default)]
        selected_list_id: Option<String>,
    },

    #[serde(rename = "mistakes/record")]
    MistakesRecord { entry: NewMistake },
    #[serde(rename = "mistakes/clear")]
    MistakesClear,
    #[serde(rename = "corrects/record")]
    CorrectsRecord { entry: NewCorrect },
    #[serde(rename = "corrects/clear")]
    CorrectsClear,

    #[serde(rename = "history/delete")]
    HistoryDelete { run_id: String },

    #[serde(rename = "prompts/set")]
    PromptsSet { key: String, template: PromptTemplate },
}

impl Action {
    /// The wire `type` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            Action::StateReplace { .. } => "state/replace",
            Action::ListsSync { .. } => "lists/sync",
            Action::ListsCreate { .. } => "lists/create",
            Action::ListsRename { .. } => "lists/rename",
            Action::ListsDelete { .. } => "lists/delete",
            Action::ItemsUpsert { .. } => "items/upsert",
            Action::ItemsBulkUpsert { .. } => "items/bulkUpsert",
            Action::ItemsReplace { .. } => "items/replace",
            Action::ItemsDelete { .. } => "items/delete",
            Action::ItemsMaterial { .. } => "items/material",
            Action::PracticeEnsure { .. } => "practice/ensure",
            Action::PracticeNext { .. } => "practice/next",
            Action::PracticeDeleteSession { .. } => "practice/deleteSession",
            Action::PracticeCorrect { .. } => "practice/correct",
            Action::PracticeFinalWrong { .. } => "practice/finalWrong",
            Action::SettingsMode { .. } => "settings/mode",
            Action::SettingsSelectedList { .. } => "settings/selectedList",
            Action::MistakesRecord { .. } => "mistakes/record",
            Action::MistakesClear => "mistakes/clear",
            Action::CorrectsRecord { .. } => "corrects/record",
            Action::CorrectsClear => "corrects/clear",
            Action::HistoryDelete { .. } => "history/delete",
            Action::PromptsSet { .. } => "prompts/set",
        }
    }

    /// Shorthand for `practice/ensure` without reshuffle or mode override.
    pub fn ensure(list_id: impl Into<String>) -> Self {
        Action::PracticeEnsure {
            list_id: list_id.into(),
            reshuffle: false,
            mode: None,
        }
    }

    pub fn next(list_id: impl Into<String>) -> Self {
        Action::PracticeNext {
            list_id: list_id.into(),
        }
    }
}
