/// Drill engine: state construction.

use crate::domain::{AppState, PracticeMode, PromptTemplate, Settings};

/// A fresh, empty state: no lists, empty ledgers, `fixed_sequence` mode.
pub fn create_initial_state() -> AppState {
    AppState {
        settings: Settings {
            mode: PracticeMode::FixedSequence,
            selected_list_id: None,
        },
        ..AppState::default()
    }
}

/// A fresh state carrying the given prompt templates.
pub fn create_initial_state_with_prompts(
    prompts: impl IntoIterator<Item = (String, PromptTemplate)>,
) -> AppState {
    AppState {
        prompts: prompts.into_iter().collect(),
        ..create_initial_state()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::PromptMessage;

    #[test]
    fn test_initial_state_is_empty() {
        let s = create_initial_state();
        assert!(s.lists.is_empty());
        assert!(s.practice_history.is_empty());
        assert_eq!(s.settings.mode, PracticeMode::FixedSequence);
        assert_eq!(s, AppState::default());
    }

    #[test]
    fn test_initial_state_with_prompts() {
        let s = create_initial_state_with_prompts([(
            "judge_meaning".to_string(),
            PromptTemplate {
                messages: vec![PromptMessage::user("{{term}}")],
            },
        )]);
        assert_eq!(s.prompts.len(), 1);
    }
}
