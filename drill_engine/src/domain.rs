/// Drill engine: core domain types.
///
/// Pure data plus a handful of read-only lookups.
/// Timestamps are epoch milliseconds (i64); ids are opaque strings.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Epoch milliseconds.
pub type Millis = i64;

// ── Lists and items ────────────────────────────────────────────────

/// A named word list. The id is a foreign key everywhere else.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct WordList {
    pub id: String,
    pub name: String,
    pub created_at: Millis,
}

/// A single term inside a list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ListItem {
    pub id: String,
    pub term: String,
    pub created_at: Millis,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub material: Option<ItemMaterial>,
}

impl ListItem {
    pub fn new(id: impl Into<String>, term: impl Into<String>, created_at: Millis) -> Self {
        Self {
            id: id.into(),
            term: term.into(),
            created_at,
            material: None,
        }
    }

    /// Classify this item's material against the run that is currently active.
    pub fn material_for(&self, run_id: Option<&str>) -> MaterialView<'_> {
        match &self.material {
            None => MaterialView::Missing,
            Some(m) if m.run_id.as_deref() == run_id => MaterialView::Current(m),
            Some(m) => MaterialView::Stale {
                run_id: m.run_id.as_deref(),
            },
        }
    }
}

/// Stage 2 hint: the target sentence framed by a sentence before and after.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SentenceContext {
    pub prev_sentence: String,
    pub next_sentence: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation_zh: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_zh: Option<String>,
}

/// Stage 3 hint: a short article built around the context.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Article {
    pub article_en: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sentence_explanation_en: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub article_zh: Option<String>,
}

/// Stage 4: the full reveal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalReveal {
    pub article_zh: String,
    pub term_meaning_zh: String,
}

/// Generated content attached to an item, stamped with the run it was made for.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemMaterial {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sentence: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sentence_zh: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<SentenceContext>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub article: Option<Article>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_reveal: Option<FinalReveal>,
}

/// How an item's material relates to the active run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaterialView<'a> {
    /// Nothing generated yet.
    Missing,
    /// Generated for the active run.
    Current(&'a ItemMaterial),
    /// Generated for another run; must be treated as absent.
    Stale { run_id: Option<&'a str> },
}

impl<'a> MaterialView<'a> {
    pub fn current(self) -> Option<&'a ItemMaterial> {
        match self {
            MaterialView::Current(m) => Some(m),
            _ => None,
        }
    }
}

// ── Practice ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PracticeMode {
    #[default]
    FixedSequence,
    FixedRandom,
    AiInfinite,
}

impl PracticeMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PracticeMode::FixedSequence => "fixed_sequence",
            PracticeMode::FixedRandom => "fixed_random",
            PracticeMode::AiInfinite => "ai_infinite",
        }
    }
}

impl fmt::Display for PracticeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which of the three judged attempts an answer landed on.
/// Also used as the `stage` of a correct-ledger row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum AttemptNo {
    First,
    Second,
    Third,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("attempt number {0} is outside 1..=3")]
pub struct AttemptOutOfRange(pub u8);

impl AttemptNo {
    pub const ALL: [AttemptNo; 3] = [AttemptNo::First, AttemptNo::Second, AttemptNo::Third];

    pub fn number(self) -> u8 {
        match self {
            AttemptNo::First => 1,
            AttemptNo::Second => 2,
            AttemptNo::Third => 3,
        }
    }

    /// The attempt that follows a wrong answer, or `None` after the third.
    pub fn escalate(self) -> Option<AttemptNo> {
        match self {
            AttemptNo::First => Some(AttemptNo::Second),
            AttemptNo::Second => Some(AttemptNo::Third),
            AttemptNo::Third => None,
        }
    }
}

impl TryFrom<u8> for AttemptNo {
    type Error = AttemptOutOfRange;

    fn try_from(n: u8) -> Result<Self, Self::Error> {
        match n {
            1 => Ok(AttemptNo::First),
            2 => Ok(AttemptNo::Second),
            3 => Ok(AttemptNo::Third),
            other => Err(AttemptOutOfRange(other)),
        }
    }
}

impl From<AttemptNo> for u8 {
    fn from(a: AttemptNo) -> u8 {
        a.number()
    }
}

/// `attemptCount` value reserved for "failed all attempts".
pub const FINAL_WRONG_ATTEMPT: u8 = 4;

/// Per-attempt correct counters, serialized as `{"1":..,"2":..,"3":..}`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrectByAttempt {
    #[serde(rename = "1")]
    pub first: u32,
    #[serde(rename = "2")]
    pub second: u32,
    #[serde(rename = "3")]
    pub third: u32,
}

impl CorrectByAttempt {
    pub fn get(&self, attempt: AttemptNo) -> u32 {
        match attempt {
            AttemptNo::First => self.first,
            AttemptNo::Second => self.second,
            AttemptNo::Third => self.third,
        }
    }

    pub fn bump(&mut self, attempt: AttemptNo) {
        let slot = match attempt {
            AttemptNo::First => &mut self.first,
            AttemptNo::Second => &mut self.second,
            AttemptNo::Third => &mut self.third,
        };
        *slot += 1;
    }

    pub fn total(&self) -> u32 {
        self.first + self.second + self.third
    }
}

/// One processed item within a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PracticeRecord {
    pub item_id: String,
    pub term: String,
    pub attempt_count: u8, // 1..=3 correct, 4 = failed
    pub is_correct: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_meaning_zh: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<ItemMaterial>,
}

/// What a caller reports about an answered item; the engine fills in the scoring.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordInput {
    pub item_id: String,
    pub term: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_meaning_zh: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<ItemMaterial>,
}

/// One pass through a practice order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PracticeRun {
    pub id: String,
    pub started_at: Millis,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<Millis>,
    pub total: usize,
    #[serde(default)]
    pub correct_by_attempt: CorrectByAttempt,
    #[serde(default)]
    pub final_wrong_count: u32,
    #[serde(default)]
    pub records: Vec<PracticeRecord>,
}

/// Per-list practice state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PracticeProgress {
    pub order: Vec<String>,
    pub cursor: usize,
    pub updated_at: Millis,
    #[serde(default)]
    pub mode: PracticeMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run: Option<PracticeRun>,
}

impl PracticeProgress {
    pub fn is_complete(&self) -> bool {
        self.cursor >= self.order.len()
    }

    pub fn current_item_id(&self) -> Option<&str> {
        self.order.get(self.cursor).map(String::as_str)
    }

    pub fn run_id(&self) -> Option<&str> {
        self.run.as_ref().map(|r| r.id.as_str())
    }
}

/// An archived run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PracticeHistoryEntry {
    #[serde(flatten)]
    pub run: PracticeRun,
    pub list_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub list_name: Option<String>,
    pub mode: PracticeMode,
}

// ── Ledgers ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub material: Option<ItemMaterial>,
}

/// Mistake ledger row, keyed by `(list_id, item_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MistakeEntry {
    pub id: String,
    pub list_id: String,
    pub item_id: String,
    pub term: String,
    pub sentence: String,
    pub wrong_count: u32,
    pub last_wrong_at: Millis,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<LedgerSnapshot>,
}

/// Incoming mistake; counters are owned by the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMistake {
    pub id: String,
    pub list_id: String,
    pub item_id: String,
    pub term: String,
    pub sentence: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<LedgerSnapshot>,
}

/// Correct ledger row, keyed by `(list_id, item_id, stage)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorrectEntry {
    pub id: String,
    pub list_id: String,
    pub item_id: String,
    pub term: String,
    pub sentence: String,
    pub stage: AttemptNo,
    pub correct_count: u32,
    pub last_correct_at: Millis,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<LedgerSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCorrect {
    pub id: String,
    pub list_id: String,
    pub item_id: String,
    pub term: String,
    pub sentence: String,
    pub stage: AttemptNo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<LedgerSnapshot>,
}

// ── Settings and prompts ───────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default)]
    pub mode: PracticeMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_list_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptMessage {
    pub role: PromptRole,
    pub content: String,
}

impl PromptMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: PromptRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: PromptRole::User,
            content: content.into(),
        }
    }
}

/// A chat prompt with `{{var}}` placeholders. Opaque to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptTemplate {
    pub messages: Vec<PromptMessage>,
}

// ── Remote lists ───────────────────────────────────────────────────

/// A word table as reported by the remote store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteList {
    pub id: String,
    pub table_name: String,
    /// RFC 3339 creation time recorded in the table's own field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_time: Option<String>,
    /// RFC 3339 record creation time reported by the store.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_time: Option<String>,
}

// ── Transition outcome ─────────────────────────────────────────────

/// Structured outcome of one reducer step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub action: String,
    pub applied: bool,
    pub reason: String,
    pub archived_run_id: Option<String>,
}

impl Transition {
    pub fn applied(action: &str) -> Self {
        Self {
            action: action.to_string(),
            applied: true,
            reason: String::new(),
            archived_run_id: None,
        }
    }

    pub fn skipped(action: &str, reason: impl Into<String>) -> Self {
        Self {
            action: action.to_string(),
            applied: false,
            reason: reason.into(),
            archived_run_id: None,
        }
    }
}

// ── Root ───────────────────────────────────────────────────────────

/// Complete application state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AppState {
    /// Newest first.
    #[serde(default)]
    pub lists: Vec<WordList>,
    #[serde(default)]
    pub items_by_list_id: BTreeMap<String, Vec<ListItem>>,
    #[serde(default)]
    pub practice_by_list_id: BTreeMap<String, PracticeProgress>,
    /// Most recent first.
    #[serde(default)]
    pub mistakes: Vec<MistakeEntry>,
    /// Most recent first.
    #[serde(default)]
    pub corrects: Vec<CorrectEntry>,
    /// Most recent first, one entry per run id.
    #[serde(default)]
    pub practice_history: Vec<PracticeHistoryEntry>,
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub prompts: BTreeMap<String, PromptTemplate>,
}

impl AppState {
    pub fn list(&self, list_id: &str) -> Option<&WordList> {
        self.lists.iter().find(|l| l.id == list_id)
    }

    pub fn items(&self, list_id: &str) -> &[ListItem] {
        self.items_by_list_id
            .get(list_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn item(&self, list_id: &str, item_id: &str) -> Option<&ListItem> {
        self.items(list_id).iter().find(|i| i.id == item_id)
    }

    pub fn progress(&self, list_id: &str) -> Option<&PracticeProgress> {
        self.practice_by_list_id.get(list_id)
    }

    pub fn history_entry(&self, run_id: &str) -> Option<&PracticeHistoryEntry> {
        self.practice_history.iter().find(|h| h.run.id == run_id)
    }
}
