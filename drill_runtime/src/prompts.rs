//! Prompt templates consumed by the chat AI provider.
//!
//! The engine stores templates opaquely under `prompts`; this module owns the
//! defaults and the `{{var}}` substitution.

use std::collections::BTreeMap;

use drill_engine::domain::{AppState, PromptMessage, PromptTemplate};
use drill_engine::state::create_initial_state_with_prompts;

pub const STAGE1_SENTENCE: &str = "stage1_sentence";
pub const STAGE2_CONTEXT: &str = "stage2_context";
pub const STAGE3_ARTICLE: &str = "stage3_article";
pub const STAGE4_FINAL: &str = "stage4_final";
pub const JUDGE_MEANING: &str = "judge_meaning";

const JSON_SYSTEM: &str = "You write vocabulary learning material. Reply with a single JSON object only: \
no markdown fences, double-quoted keys and strings.";

fn template(system: &str, user: &str) -> PromptTemplate {
    PromptTemplate {
        messages: vec![PromptMessage::system(system), PromptMessage::user(user)],
    }
}

/// The built-in template set, keyed by prompt name.
pub fn default_prompts() -> BTreeMap<String, PromptTemplate> {
    let mut prompts = BTreeMap::new();
    prompts.insert(
        STAGE1_SENTENCE.to_string(),
        template(
            JSON_SYSTEM,
            "Write one natural English sentence that uses \"{{term}}\" verbatim and lets a reader \
             infer its meaning without defining it.\n\
             Also give a Chinese translation in \"sentenceZh\". Leave \"{{term}}\" untranslated \
             inside \"sentenceZh\", in English exactly as written.\n\n\
             Reply: {\"sentence\":\"...\",\"sentenceZh\":\"...\"}",
        ),
    );
    prompts.insert(
        STAGE2_CONTEXT.to_string(),
        template(
            JSON_SYSTEM,
            "Target term: \"{{term}}\". Sentence: \"{{sentence}}\".\n\
             Write one sentence to go before it and one to go after it so the three read as a \
             coherent paragraph with the given sentence unchanged in the middle. The surrounding \
             sentences should hint strongly at the meaning of \"{{term}}\" without defining it.\n\
             Translate the whole paragraph into Chinese as \"contextZh\", keeping every \
             \"{{term}}\" in English and adding no explanations.\n\n\
             Reply: {\"prevSentence\":\"...\",\"nextSentence\":\"...\",\"contextZh\":\"...\"}",
        ),
    );
    prompts.insert(
        STAGE3_ARTICLE.to_string(),
        template(
            JSON_SYSTEM,
            "Target term: \"{{term}}\".\nPrev: \"{{prevSentence}}\"\nCenter: \"{{sentence}}\"\n\
             Next: \"{{nextSentence}}\"\n\n\
             Write a short English paragraph of five to seven sentences that contains Prev, \
             Center and Next verbatim and in that order. You may add a sentence or two around \
             them.\nTranslate the whole paragraph into Chinese as \"articleZh\". \"{{term}}\" \
             must stay in English inside \"articleZh\".\n\n\
             Reply: {\"articleEn\":\"...\",\"articleZh\":\"...\"}",
        ),
    );
    prompts.insert(
        STAGE4_FINAL.to_string(),
        template(
            JSON_SYSTEM,
            "Term: \"{{term}}\". Sentence: \"{{sentence}}\". Article: \"{{articleEn}}\".\n\
             Give a concise Chinese summary of the article and the meaning of the term in this \
             context.\n\nReply: {\"articleZh\":\"...\",\"termMeaningZh\":\"...\"}",
        ),
    );
    prompts.insert(
        JUDGE_MEANING.to_string(),
        template(
            "You judge whether a learner's Chinese guess matches the meaning of an English term \
             in context. Reply with a single JSON object only.",
            "Term: \"{{term}}\"\nSentence: \"{{sentence}}\"\nPrev: \"{{prevSentence}}\"\n\
             Next: \"{{nextSentence}}\"\nArticleEn: \"{{articleEn}}\"\n\
             UserMeaningZh: \"{{userMeaningZh}}\"\n\n\
             Work out the meaning of the term in this context, then score the guess from 0 to \
             100 (100 = same meaning).\n\
             Below 80: {\"score\":..,\"isCorrect\":false}\n\
             80 or above: {\"score\":..,\"isCorrect\":true,\"correctMeaningZh\":\"...\",\"reason\":\"...\"}",
        ),
    );
    prompts
}

/// A fresh empty state carrying the default prompts.
pub fn fresh_state() -> AppState {
    create_initial_state_with_prompts(default_prompts())
}

/// Add any default prompt missing from `state`. Returns how many were added.
pub fn fill_missing_prompts(state: &mut AppState) -> usize {
    let mut added = 0;
    for (key, template) in default_prompts() {
        if !state.prompts.contains_key(&key) {
            state.prompts.insert(key, template);
            added += 1;
        }
    }
    added
}

/// Substitute `{{ name }}` placeholders. Unknown names render as empty text;
/// an unterminated `{{` is copied through.
pub fn render_vars(text: &str, vars: &BTreeMap<&str, String>) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else {
            out.push_str(&rest[start..]);
            return out;
        };
        let name = after[..end].trim();
        let valid = !name.is_empty()
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_');
        if valid {
            if let Some(value) = vars.get(name) {
                out.push_str(value);
            }
        } else {
            out.push_str(&rest[start..start + 2 + end + 2]);
        }
        rest = &after[end + 2..];
    }
    out.push_str(rest);
    out
}

/// Render every message of `template`.
pub fn render_template(template: &PromptTemplate, vars: &BTreeMap<&str, String>) -> Vec<PromptMessage> {
    template
        .messages
        .iter()
        .map(|m| PromptMessage {
            role: m.role,
            content: render_vars(&m.content, vars),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&'static str, &str)]) -> BTreeMap<&'static str, String> {
        pairs.iter().map(|(k, v)| (*k, v.to_string())).collect()
    }

    #[test]
    fn test_render_vars() {
        let v = vars(&[("term", "abate"), ("sentence", "It abated.")]);
        assert_eq!(
            render_vars("T={{term}} S={{ sentence }} X={{missing}}", &v),
            "T=abate S=It abated. X="
        );
    }

    #[test]
    fn test_render_leaves_odd_braces() {
        let v = vars(&[("term", "abate")]);
        assert_eq!(render_vars("{\"a\":1} {{term}}", &v), "{\"a\":1} abate");
        assert_eq!(render_vars("{{not valid}} {{term", &v), "{{not valid}} {{term");
    }

    #[test]
    fn test_defaults_cover_every_stage() {
        let prompts = default_prompts();
        for key in [STAGE1_SENTENCE, STAGE2_CONTEXT, STAGE3_ARTICLE, STAGE4_FINAL, JUDGE_MEANING] {
            let t = prompts.get(key).unwrap();
            assert_eq!(t.messages.len(), 2);
            assert!(t.messages[1].content.contains("{{term}}"));
        }
    }

    #[test]
    fn test_fill_missing_prompts() {
        let mut state = AppState::default();
        state.prompts.insert(
            JUDGE_MEANING.into(),
            PromptTemplate {
                messages: vec![PromptMessage::user("custom")],
            },
        );
        assert_eq!(fill_missing_prompts(&mut state), 4);
        assert_eq!(state.prompts[JUDGE_MEANING].messages[0].content, "custom");
        assert_eq!(fill_missing_prompts(&mut state), 0);
        assert_eq!(fresh_state().prompts.len(), 5);
    }
}
