//! Practice attempt flow: one item through sentence, context, article and
//! final reveal against an `AiProvider`.
//!
//! Each step reads a snapshot of the store, releases it, awaits the provider
//! and then dispatches ordinary actions. Generated material is stamped with
//! the run id captured before the call, and scoring actions are dropped when
//! the run has moved on in the meantime.

use thiserror::Error;
use tracing::{debug, info};

use drill_engine::actions::Action;
use drill_engine::domain::{
    AppState, Article, AttemptNo, FinalReveal, ItemMaterial, LedgerSnapshot, NewCorrect,
    NewMistake, RecordInput, Transition,
};

use crate::ai::{AiError, AiProvider, ArticleInput, FinalRevealInput, JudgeInput, JudgeMaterial, Judgement};
use crate::session::SharedStore;

#[derive(Debug, Error)]
pub enum FlowError {
    #[error("guess is blank")]
    BlankGuess,

    #[error("list {0} has no item to practice")]
    NoCurrentItem(String),

    #[error("practice run changed while waiting for the AI")]
    RunChanged,

    #[error(transparent)]
    Ai(#[from] AiError),
}

/// The current item with material valid for the active run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedItem {
    pub list_id: String,
    pub item_id: String,
    pub term: String,
    pub run_id: Option<String>,
    pub material: ItemMaterial,
}

impl PreparedItem {
    pub fn sentence(&self) -> &str {
        self.material.sentence.as_deref().unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum GuessOutcome {
    Correct { judgement: Judgement },
    /// Wrong; the next attempt's hint material is in place.
    Escalated { next: AttemptNo, judgement: Judgement },
    /// Wrong on the last attempt; the answer is revealed and recorded.
    Revealed { judgement: Judgement, reveal: FinalReveal },
}

/// Article material is usable only if it carries a Chinese version that
/// keeps the term in English, and no older-style sentence explanation.
pub fn article_is_valid(article: &Article, term: &str) -> bool {
    let term = term.to_lowercase();
    article.sentence_explanation_en.is_none()
        && article
            .article_zh
            .as_deref()
            .is_some_and(|zh| zh.to_lowercase().contains(&term))
}

pub struct PracticeFlow<P> {
    provider: P,
    store: SharedStore,
}

impl<P: AiProvider> PracticeFlow<P> {
    pub fn new(provider: P, store: SharedStore) -> Self {
        Self { provider, store }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    fn current(&self, list_id: &str) -> Result<PreparedItem, FlowError> {
        self.store
            .read(|state, _| current_item(state, list_id))
            .ok_or_else(|| FlowError::NoCurrentItem(list_id.to_string()))
    }

    fn attach(&self, item: &PreparedItem) -> Transition {
        self.store.dispatch(&Action::ItemsMaterial {
            list_id: item.list_id.clone(),
            item_id: item.item_id.clone(),
            material: item.material.clone(),
        })
    }

    /// Make sure the current item has a sentence and its translation for
    /// the active run, generating whatever is missing.
    pub async fn prepare_item(&self, list_id: &str) -> Result<PreparedItem, FlowError> {
        let mut item = self.current(list_id)?;
        let mut changed = false;

        if item.material.sentence.as_deref().map_or(true, str::is_empty) {
            let generated = self.provider.generate_sentence(&item.term).await?;
            item.material = ItemMaterial {
                run_id: item.run_id.clone(),
                sentence: Some(generated.sentence),
                sentence_zh: generated.sentence_zh.filter(|zh| !zh.is_empty()),
                ..Default::default()
            };
            changed = true;
        }
        if item.material.sentence_zh.is_none() {
            let zh = self
                .provider
                .translate_sentence_zh(&item.term, item.sentence())
                .await?;
            item.material.sentence_zh = Some(zh);
            changed = true;
        }

        if changed {
            let t = self.attach(&item);
            debug!(list_id, item_id = %item.item_id, applied = t.applied, "sentence material");
        }
        Ok(item)
    }

    /// Judge a guess for `attempt` and move the item along.
    pub async fn submit_guess(
        &self,
        list_id: &str,
        attempt: AttemptNo,
        guess: &str,
    ) -> Result<GuessOutcome, FlowError> {
        let guess = guess.trim();
        if guess.is_empty() {
            return Err(FlowError::BlankGuess);
        }

        let mut item = self.prepare_item(list_id).await?;
        let judgement = self
            .provider
            .judge_meaning(&JudgeInput {
                term: item.term.clone(),
                sentence: item.sentence().to_string(),
                material: judge_material(&item.material),
                user_meaning_zh: guess.to_string(),
            })
            .await?;

        if judgement.is_correct {
            let actions = self.correct_actions(&item, attempt, guess);
            self.dispatch_for_run(&item, &actions)?;
            info!(list_id, item_id = %item.item_id, attempt = attempt.number(), "guess correct");
            return Ok(GuessOutcome::Correct { judgement });
        }

        match attempt.escalate() {
            Some(next) => {
                let changed = match next {
                    AttemptNo::Second => self.ensure_context(&mut item).await?,
                    _ => self.ensure_article(&mut item).await?,
                };
                if changed && !self.attach(&item).applied {
                    return Err(FlowError::RunChanged);
                }
                Ok(GuessOutcome::Escalated { next, judgement })
            }
            None => {
                self.ensure_article(&mut item).await?;
                let reveal = match item.material.final_reveal.clone() {
                    Some(reveal) => reveal,
                    None => {
                        let article = item.material.article.clone().unwrap_or_default();
                        self.provider
                            .final_reveal(&FinalRevealInput {
                                term: item.term.clone(),
                                sentence: item.sentence().to_string(),
                                article_en: article.article_en,
                                sentence_explanation_en: article.sentence_explanation_en,
                            })
                            .await?
                    }
                };
                item.material.final_reveal = Some(reveal.clone());

                let mut actions = vec![Action::ItemsMaterial {
                    list_id: item.list_id.clone(),
                    item_id: item.item_id.clone(),
                    material: item.material.clone(),
                }];
                actions.extend(self.final_wrong_actions(&item, guess));
                self.dispatch_for_run(&item, &actions)?;
                info!(list_id, item_id = %item.item_id, "answer revealed");
                Ok(GuessOutcome::Revealed { judgement, reveal })
            }
        }
    }

    /// Advance past the current item.
    pub fn advance(&self, list_id: &str) -> Transition {
        self.store.dispatch(&Action::next(list_id))
    }

    /// Context without a Chinese version is regenerated.
    async fn ensure_context(&self, item: &mut PreparedItem) -> Result<bool, FlowError> {
        if item
            .material
            .context
            .as_ref()
            .is_some_and(|c| c.context_zh.is_some())
        {
            return Ok(false);
        }
        let context = self
            .provider
            .generate_context(&item.term, item.sentence())
            .await?;
        item.material.context = Some(context);
        Ok(true)
    }

    async fn ensure_article(&self, item: &mut PreparedItem) -> Result<bool, FlowError> {
        if item
            .material
            .article
            .as_ref()
            .is_some_and(|a| article_is_valid(a, &item.term))
        {
            return Ok(false);
        }
        let context = item.material.context.as_ref();
        let article = self
            .provider
            .generate_article(&ArticleInput {
                term: item.term.clone(),
                sentence: item.sentence().to_string(),
                prev_sentence: context.map(|c| c.prev_sentence.clone()),
                next_sentence: context.map(|c| c.next_sentence.clone()),
            })
            .await?;
        item.material.article = Some(article);
        Ok(true)
    }

    fn record(&self, item: &PreparedItem, guess: &str) -> RecordInput {
        RecordInput {
            item_id: item.item_id.clone(),
            term: item.term.clone(),
            user_meaning_zh: Some(guess.to_string()),
            snapshot: Some(item.material.clone()),
        }
    }

    fn correct_actions(&self, item: &PreparedItem, attempt: AttemptNo, guess: &str) -> Vec<Action> {
        let id = self.store.read(|_, clock| clock.new_id());
        vec![
            Action::PracticeCorrect {
                list_id: item.list_id.clone(),
                attempt_no: attempt,
                record: self.record(item, guess),
            },
            Action::CorrectsRecord {
                entry: NewCorrect {
                    id,
                    list_id: item.list_id.clone(),
                    item_id: item.item_id.clone(),
                    term: item.term.clone(),
                    sentence: item.sentence().to_string(),
                    stage: attempt,
                    snapshot: Some(LedgerSnapshot {
                        material: Some(item.material.clone()),
                    }),
                },
            },
        ]
    }

    fn final_wrong_actions(&self, item: &PreparedItem, guess: &str) -> Vec<Action> {
        let id = self.store.read(|_, clock| clock.new_id());
        vec![
            Action::MistakesRecord {
                entry: NewMistake {
                    id,
                    list_id: item.list_id.clone(),
                    item_id: item.item_id.clone(),
                    term: item.term.clone(),
                    sentence: item.sentence().to_string(),
                    snapshot: Some(LedgerSnapshot {
                        material: Some(item.material.clone()),
                    }),
                },
            },
            Action::PracticeFinalWrong {
                list_id: item.list_id.clone(),
                record: self.record(item, guess),
            },
        ]
    }

    fn dispatch_for_run(&self, item: &PreparedItem, actions: &[Action]) -> Result<(), FlowError> {
        self.store
            .dispatch_all_if(
                |state| {
                    let progress = state.progress(&item.list_id);
                    progress.and_then(|p| p.run_id()) == item.run_id.as_deref()
                        && progress.and_then(|p| p.current_item_id()) == Some(item.item_id.as_str())
                },
                actions,
            )
            .map(|_| ())
            .ok_or(FlowError::RunChanged)
    }
}

fn current_item(state: &AppState, list_id: &str) -> Option<PreparedItem> {
    let progress = state.progress(list_id)?;
    let item_id = progress.current_item_id()?;
    let item = state.item(list_id, item_id)?;
    let run_id = progress.run_id();
    let material = item
        .material_for(run_id)
        .current()
        .cloned()
        .unwrap_or_else(|| ItemMaterial {
            run_id: run_id.map(str::to_string),
            ..Default::default()
        });
    Some(PreparedItem {
        list_id: list_id.to_string(),
        item_id: item.id.clone(),
        term: item.term.clone(),
        run_id: run_id.map(str::to_string),
        material,
    })
}

fn judge_material(material: &ItemMaterial) -> JudgeMaterial {
    JudgeMaterial {
        prev_sentence: material.context.as_ref().map(|c| c.prev_sentence.clone()),
        next_sentence: material.context.as_ref().map(|c| c.next_sentence.clone()),
        article_en: material.article.as_ref().map(|a| a.article_en.clone()),
        sentence_explanation_en: material
            .article
            .as_ref()
            .and_then(|a| a.sentence_explanation_en.clone()),
    }
}
