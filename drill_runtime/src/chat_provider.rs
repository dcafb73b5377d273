// Chat-completion backed AI provider.
//
// Renders the stored prompt templates, sends them through a `ChatTransport`
// and extracts structured fields from whatever text comes back.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::debug;

use drill_engine::domain::{Article, FinalReveal, PromptMessage, PromptTemplate, SentenceContext};

use crate::ai::{
    AiError, AiProvider, ArticleInput, FinalRevealInput, GeneratedSentence, JudgeInput, Judgement,
};
use crate::prompts::{
    render_template, JUDGE_MEANING, STAGE1_SENTENCE, STAGE2_CONTEXT, STAGE3_ARTICLE, STAGE4_FINAL,
};
use crate::session::SharedStore;

/// Score at or above which a judged guess counts as correct.
pub const PASS_SCORE: u8 = 80;

/// Sends rendered messages to a model and returns its raw text reply.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn complete(&self, messages: &[PromptMessage]) -> Result<String, AiError>;
}

/// Where prompt templates are looked up at call time.
#[derive(Clone)]
pub enum PromptSource {
    /// A fixed template set.
    Fixed(BTreeMap<String, PromptTemplate>),
    /// Whatever the store currently holds, so `prompts/set` takes effect.
    Store(SharedStore),
}

impl PromptSource {
    fn get(&self, key: &str) -> Result<PromptTemplate, AiError> {
        let found = match self {
            PromptSource::Fixed(map) => map.get(key).cloned(),
            PromptSource::Store(store) => store.read(|state, _| state.prompts.get(key).cloned()),
        };
        found.ok_or_else(|| AiError::MissingPrompt(key.to_string()))
    }
}

pub struct ChatAiProvider<T> {
    transport: T,
    prompts: PromptSource,
}

impl<T: ChatTransport> ChatAiProvider<T> {
    pub fn new(transport: T, prompts: PromptSource) -> Self {
        Self { transport, prompts }
    }

    async fn run(&self, key: &str, vars: &BTreeMap<&str, String>) -> Result<String, AiError> {
        let template = self.prompts.get(key)?;
        let reply = self.transport.complete(&render_template(&template, vars)).await?;
        debug!(prompt = key, reply_len = reply.len(), "chat completion");
        Ok(reply)
    }
}

fn vars<const N: usize>(pairs: [(&'static str, &str); N]) -> BTreeMap<&'static str, String> {
    pairs.into_iter().map(|(k, v)| (k, v.to_string())).collect()
}

const TRANSLATE_SYSTEM: &str = "You translate English sentences into Chinese. Keep the given term \
exactly as written in English and do not translate it. Reply with JSON only.";
const TRANSLATE_USER: &str = "Translate the sentence into Chinese, leaving the term unchanged.\n\
Term: \"{{term}}\"\nSentence: \"{{sentence}}\"\nReply: {\"sentenceZh\":\"...\"}";

#[async_trait]
impl<T: ChatTransport> AiProvider for ChatAiProvider<T> {
    async fn generate_sentence(&self, term: &str) -> Result<GeneratedSentence, AiError> {
        let reply = self.run(STAGE1_SENTENCE, &vars([("term", term)])).await?;
        parse_sentence(&reply)
    }

    async fn translate_sentence_zh(&self, term: &str, sentence: &str) -> Result<String, AiError> {
        let template = PromptTemplate {
            messages: vec![
                PromptMessage::system(TRANSLATE_SYSTEM),
                PromptMessage::user(TRANSLATE_USER),
            ],
        };
        let messages = render_template(&template, &vars([("term", term), ("sentence", sentence)]));
        let reply = self.transport.complete(&messages).await?;
        parse_translation(&reply)
    }

    async fn judge_meaning(&self, input: &JudgeInput) -> Result<Judgement, AiError> {
        let m = &input.material;
        let v = vars([
            ("term", input.term.as_str()),
            ("sentence", input.sentence.as_str()),
            ("prevSentence", m.prev_sentence.as_deref().unwrap_or_default()),
            ("nextSentence", m.next_sentence.as_deref().unwrap_or_default()),
            ("articleEn", m.article_en.as_deref().unwrap_or_default()),
            ("userMeaningZh", input.user_meaning_zh.as_str()),
        ]);
        let reply = self.run(JUDGE_MEANING, &v).await?;
        Ok(parse_judgement(&reply))
    }

    async fn generate_context(&self, term: &str, sentence: &str) -> Result<SentenceContext, AiError> {
        let reply = self
            .run(STAGE2_CONTEXT, &vars([("term", term), ("sentence", sentence)]))
            .await?;
        Ok(parse_context(&reply))
    }

    async fn generate_article(&self, input: &ArticleInput) -> Result<Article, AiError> {
        let v = vars([
            ("term", input.term.as_str()),
            ("sentence", input.sentence.as_str()),
            ("prevSentence", input.prev_sentence.as_deref().unwrap_or_default()),
            ("nextSentence", input.next_sentence.as_deref().unwrap_or_default()),
        ]);
        let reply = self.run(STAGE3_ARTICLE, &v).await?;
        parse_article(&reply)
    }

    async fn final_reveal(&self, input: &FinalRevealInput) -> Result<FinalReveal, AiError> {
        let v = vars([
            ("term", input.term.as_str()),
            ("sentence", input.sentence.as_str()),
            ("articleEn", input.article_en.as_str()),
            (
                "sentenceExplanationEn",
                input.sentence_explanation_en.as_deref().unwrap_or_default(),
            ),
        ]);
        let reply = self.run(STAGE4_FINAL, &v).await?;
        parse_final(&reply)
    }
}

// =============================================================================
// Reply parsing
// =============================================================================

/// Parse a reply as a JSON object: the whole text first, then the slice from
/// the first `{` to the last `}`.
pub fn extract_json_object(text: &str) -> Option<Map<String, Value>> {
    let trimmed = text.trim();
    if let Ok(Value::Object(map)) = serde_json::from_str(trimmed) {
        return Some(map);
    }
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end <= start {
        return None;
    }
    match serde_json::from_str(&trimmed[start..=end]) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

fn str_field(map: &Map<String, Value>, key: &str) -> Option<String> {
    map.get(key).and_then(Value::as_str).map(str::to_string)
}

fn parse_sentence(reply: &str) -> Result<GeneratedSentence, AiError> {
    match extract_json_object(reply) {
        Some(map) => {
            let sentence = str_field(&map, "sentence").unwrap_or_default().trim().to_string();
            if sentence.is_empty() {
                return Err(AiError::InvalidOutput(format!("{} has no sentence", STAGE1_SENTENCE)));
            }
            let sentence_zh = str_field(&map, "sentenceZh").map(|s| s.trim().to_string());
            Ok(GeneratedSentence {
                sentence,
                sentence_zh,
            })
        }
        None => {
            let sentence = reply.trim();
            if sentence.is_empty() {
                return Err(AiError::InvalidOutput(format!("{} reply is empty", STAGE1_SENTENCE)));
            }
            Ok(GeneratedSentence {
                sentence: sentence.to_string(),
                sentence_zh: None,
            })
        }
    }
}

fn parse_translation(reply: &str) -> Result<String, AiError> {
    let sentence_zh = extract_json_object(reply)
        .and_then(|map| str_field(&map, "sentenceZh"))
        .map(|s| s.trim().to_string())
        .unwrap_or_default();
    if sentence_zh.is_empty() {
        return Err(AiError::InvalidOutput("translation has no sentenceZh".into()));
    }
    Ok(sentence_zh)
}

fn score_of(value: &Value) -> Option<u8> {
    let raw = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) if !s.trim().is_empty() => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    if !raw.is_finite() {
        return None;
    }
    Some(raw.round().clamp(0.0, 100.0) as u8)
}

/// Judge replies never fail: an unparseable reply is correct iff it mentions
/// "true", and the raw text becomes the reason.
pub fn parse_judgement(reply: &str) -> Judgement {
    let Some(map) = extract_json_object(reply) else {
        let trimmed = reply.trim();
        return Judgement {
            is_correct: trimmed.to_ascii_lowercase().contains("true"),
            reason: Some(trimmed.to_string()),
            ..Default::default()
        };
    };

    let score = map.get("score").and_then(score_of);
    let is_correct = match score {
        Some(s) => s >= PASS_SCORE,
        None => map.get("isCorrect").map(truthy).unwrap_or(false),
    };
    let accept_alternatives = map
        .get("acceptAlternatives")
        .and_then(Value::as_array)
        .map(|vs| {
            vs.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    Judgement {
        is_correct,
        score,
        confidence: map.get("confidence").and_then(Value::as_f64),
        reason: str_field(&map, "reason"),
        correct_meaning_zh: str_field(&map, "correctMeaningZh"),
        accept_alternatives,
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
        Value::Null => false,
    }
}

/// Context replies never fail: missing fields are empty, and an unparseable
/// reply becomes the explanation.
pub fn parse_context(reply: &str) -> SentenceContext {
    match extract_json_object(reply) {
        Some(map) => SentenceContext {
            prev_sentence: str_field(&map, "prevSentence").unwrap_or_default(),
            next_sentence: str_field(&map, "nextSentence").unwrap_or_default(),
            explanation_zh: str_field(&map, "explanationZh"),
            context_zh: str_field(&map, "contextZh"),
        },
        None => SentenceContext {
            explanation_zh: Some(reply.trim().to_string()),
            ..Default::default()
        },
    }
}

fn parse_article(reply: &str) -> Result<Article, AiError> {
    let map = extract_json_object(reply)
        .ok_or_else(|| AiError::InvalidOutput(format!("{} reply is not JSON", STAGE3_ARTICLE)))?;
    let article_en = str_field(&map, "articleEn").unwrap_or_default();
    if article_en.is_empty() {
        return Err(AiError::InvalidOutput(format!("{} has no articleEn", STAGE3_ARTICLE)));
    }
    Ok(Article {
        article_en,
        sentence_explanation_en: None,
        article_zh: str_field(&map, "articleZh"),
    })
}

fn parse_final(reply: &str) -> Result<FinalReveal, AiError> {
    let map = extract_json_object(reply)
        .ok_or_else(|| AiError::InvalidOutput(format!("{} reply is not JSON", STAGE4_FINAL)))?;
    let article_zh = str_field(&map, "articleZh").unwrap_or_default();
    let term_meaning_zh = str_field(&map, "termMeaningZh").unwrap_or_default();
    if article_zh.is_empty() || term_meaning_zh.is_empty() {
        return Err(AiError::InvalidOutput(format!(
            "{} needs articleZh and termMeaningZh",
            STAGE4_FINAL
        )));
    }
    Ok(FinalReveal {
        article_zh,
        term_meaning_zh,
    })
}
