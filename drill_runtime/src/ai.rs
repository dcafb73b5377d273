// AI provider seam.
//
// The practice flow only talks to `AiProvider`. Implementations:
// - `ChatAiProvider`: stored prompt templates over a `ChatTransport`
// - `MockAiProvider`: canned, deterministic content

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use drill_engine::domain::{Article, FinalReveal, SentenceContext};

#[derive(Debug, Error)]
pub enum AiError {
    #[error("AI request failed: {0}")]
    Transport(String),

    #[error("Missing prompt: {0}")]
    MissingPrompt(String),

    #[error("AI returned unusable output: {0}")]
    InvalidOutput(String),
}

// =============================================================================
// Inputs and outputs
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedSentence {
    pub sentence: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sentence_zh: Option<String>,
}

/// Whatever hint material exists when the learner's guess is judged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JudgeMaterial {
    pub prev_sentence: Option<String>,
    pub next_sentence: Option<String>,
    pub article_en: Option<String>,
    pub sentence_explanation_en: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JudgeInput {
    pub term: String,
    pub sentence: String,
    pub material: JudgeMaterial,
    pub user_meaning_zh: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Judgement {
    pub is_correct: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correct_meaning_zh: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub accept_alternatives: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArticleInput {
    pub term: String,
    pub sentence: String,
    pub prev_sentence: Option<String>,
    pub next_sentence: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalRevealInput {
    pub term: String,
    pub sentence: String,
    pub article_en: String,
    pub sentence_explanation_en: Option<String>,
}

// =============================================================================
// Provider trait
// =============================================================================

#[async_trait]
pub trait AiProvider: Send + Sync {
    /// Stage 1: an example sentence using `term`, optionally with a translation.
    async fn generate_sentence(&self, term: &str) -> Result<GeneratedSentence, AiError>;

    /// Chinese translation of `sentence`, keeping `term` in English.
    async fn translate_sentence_zh(&self, term: &str, sentence: &str) -> Result<String, AiError>;

    async fn judge_meaning(&self, input: &JudgeInput) -> Result<Judgement, AiError>;

    /// Stage 2: a sentence before and after the target sentence.
    async fn generate_context(&self, term: &str, sentence: &str)
        -> Result<SentenceContext, AiError>;

    /// Stage 3: a short article around the context.
    async fn generate_article(&self, input: &ArticleInput) -> Result<Article, AiError>;

    /// Stage 4: Chinese article summary plus the term's meaning.
    async fn final_reveal(&self, input: &FinalRevealInput) -> Result<FinalReveal, AiError>;
}
