// src/services/bank.rs

use std::sync::Arc;

use crate::error::AppError;
use crate::models::question::Question;
use crate::store::QuestionStore;

const FALLBACK_QUESTIONS: &str = include_str!("../../data/fallback_questions.json");

/// The bundled question list used while the store has no questions.
pub fn fallback_questions() -> Result<Vec<Question>, AppError> {
    serde_json::from_str(FALLBACK_QUESTIONS).map_err(|e| {
        tracing::error!("Bundled fallback questions are unreadable: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })
}

/// Read access to the question bank.
#[derive(Clone)]
pub struct QuestionBank {
    store: Arc<dyn QuestionStore>,
}

impl QuestionBank {
    pub fn new(store: Arc<dyn QuestionStore>) -> Self {
        Self { store }
    }

    /// Loads every question, oldest first.
    ///
    /// An empty store serves the bundled fallback list. Store failures are
    /// returned as errors.
    pub async fn load(&self) -> Result<Vec<Question>, AppError> {
        let questions = self.store.load_all().await?;
        if !questions.is_empty() {
            return Ok(questions);
        }

        tracing::warn!("Question bank is empty; serving bundled fallback questions");
        fallback_questions()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::question::{AnswerKey, Difficulty, Letter, QuestionDraft};
    use crate::store::{SqlQuestionStore, test_pool};

    #[test]
    fn fallback_list_is_well_formed() {
        let questions = fallback_questions().unwrap();
        assert!(questions.len() >= 2);
        for question in &questions {
            assert!((4..=6).contains(&question.options.len()), "{}", question.id);
            for letter in question.answer.letters() {
                assert!(question.has_option(letter), "{}", question.id);
            }
            assert_eq!(question.category, "SAA");
        }
        assert!(questions.iter().any(|q| q.is_multiple()));
    }

    #[tokio::test]
    async fn empty_store_serves_fallback() {
        let bank = QuestionBank::new(Arc::new(SqlQuestionStore::new(test_pool().await)));
        let loaded = bank.load().await.unwrap();
        assert_eq!(loaded, fallback_questions().unwrap());
    }

    #[tokio::test]
    async fn stored_questions_win_over_fallback() {
        let store = SqlQuestionStore::new(test_pool().await);
        let options = "ABCD"
            .chars()
            .map(|c| (Letter::new(c).unwrap(), format!("Option {}", c)))
            .collect();
        store
            .create(&QuestionDraft {
                question_text: "Only one".into(),
                options,
                answer: AnswerKey::Single(Letter::new('C').unwrap()),
                explanation: None,
                category: "SAA".into(),
                difficulty: Difficulty::Easy,
            })
            .await
            .unwrap();

        let bank = QuestionBank::new(Arc::new(store));
        let loaded = bank.load().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].question_text, "Only one");
    }
}
