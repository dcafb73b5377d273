// Offline AI provider with canned, deterministic content.

use async_trait::async_trait;

use drill_engine::domain::{Article, FinalReveal, SentenceContext};

use crate::ai::{
    AiError, AiProvider, ArticleInput, FinalRevealInput, GeneratedSentence, JudgeInput, Judgement,
};

/// Markers a guess must contain for the mock judge to accept it.
const ACCEPT_MARKERS: [&str; 4] = ["对", "正确", "意思是", "="];

#[derive(Debug, Clone, Copy, Default)]
pub struct MockAiProvider;

#[async_trait]
impl AiProvider for MockAiProvider {
    async fn generate_sentence(&self, term: &str) -> Result<GeneratedSentence, AiError> {
        Ok(GeneratedSentence {
            sentence: format!(
                "In the middle of the discussion, she casually mentioned \"{}\" and everyone nodded.",
                term
            ),
            sentence_zh: Some(format!("在讨论的过程中，她随口提到 “{}”，大家都点头。", term)),
        })
    }

    async fn translate_sentence_zh(&self, term: &str, sentence: &str) -> Result<String, AiError> {
        Ok(format!(
            "（演示）请将英文句子翻译为中文，并保持术语 “{}” 不翻译：{}",
            term, sentence
        ))
    }

    async fn judge_meaning(&self, input: &JudgeInput) -> Result<Judgement, AiError> {
        let guess = input.user_meaning_zh.trim();
        let is_correct = !guess.is_empty() && ACCEPT_MARKERS.iter().any(|m| guess.contains(m));
        Ok(Judgement {
            is_correct,
            score: Some(if is_correct { 90 } else { 55 }),
            confidence: Some(if is_correct { 0.75 } else { 0.4 }),
            reason: Some(
                if is_correct {
                    "覆盖到关键语义"
                } else {
                    "还没有贴近这句话的语境"
                }
                .to_string(),
            ),
            ..Default::default()
        })
    }

    async fn generate_context(&self, term: &str, _sentence: &str) -> Result<SentenceContext, AiError> {
        Ok(SentenceContext {
            prev_sentence: format!(
                "Before that, the speaker sets up the scene so \"{}\" makes sense.",
                term
            ),
            next_sentence: format!(
                "Afterwards, the sentence clarifies the consequence related to \"{}\".",
                term
            ),
            explanation_zh: Some("这两句是在帮你把原句的逻辑补全，重点看因果/转折关系。".to_string()),
            context_zh: Some(format!("前一句先铺垫场景，后一句说明与 \"{}\" 相关的结果。", term)),
        })
    }

    async fn generate_article(&self, input: &ArticleInput) -> Result<Article, AiError> {
        let article_en = [
            "I was reading quietly when I noticed something odd.",
            input.sentence.as_str(),
            "At that moment, the meaning became clearer through the surrounding details.",
            "The story continues with a small twist and a simple conclusion.",
        ]
        .join(" ");
        Ok(Article {
            article_en,
            sentence_explanation_en: Some(format!(
                "In this sentence, \"{}\" carries a context-specific meaning that fits the story flow.",
                input.term
            )),
            article_zh: None,
        })
    }

    async fn final_reveal(&self, input: &FinalRevealInput) -> Result<FinalReveal, AiError> {
        Ok(FinalReveal {
            article_zh: "这是一段围绕目标句展开的短文。通过前后信息，你可以推断出句子里的关键词在此处\
                         表达了更具体的语义，而不是它最常见的泛义。"
                .to_string(),
            term_meaning_zh: format!("（在此句语境下）\"{}\" 的含义", input.term),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::JudgeMaterial;

    fn judge_input(guess: &str) -> JudgeInput {
        JudgeInput {
            term: "abate".into(),
            sentence: "The storm abated.".into(),
            material: JudgeMaterial::default(),
            user_meaning_zh: guess.into(),
        }
    }

    #[tokio::test]
    async fn test_judge_markers() {
        let p = MockAiProvider;
        let yes = p.judge_meaning(&judge_input("意思是减弱")).await.unwrap();
        assert!(yes.is_correct);
        assert_eq!(yes.score, Some(90));

        let no = p.judge_meaning(&judge_input("暴风")).await.unwrap();
        assert!(!no.is_correct);
        assert_eq!(no.score, Some(55));

        assert!(!p.judge_meaning(&judge_input("   ")).await.unwrap().is_correct);
    }

    #[tokio::test]
    async fn test_article_contains_sentence() {
        let a = MockAiProvider
            .generate_article(&ArticleInput {
                term: "abate".into(),
                sentence: "The storm abated.".into(),
                prev_sentence: None,
                next_sentence: None,
            })
            .await
            .unwrap();
        assert!(a.article_en.contains("The storm abated."));
        assert!(a.sentence_explanation_en.is_some());
    }
}
