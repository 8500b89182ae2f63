// src/services/results.rs

use std::sync::Arc;

use crate::error::AppError;
use crate::exam::scoring::ExamReport;
use crate::models::exam_result::{ExamResult, HistoryStats, QuestionResult};
use crate::store::ResultStore;

/// Reduces a history to its summary figures.
pub fn stats(history: &[ExamResult]) -> HistoryStats {
    if history.is_empty() {
        return HistoryStats::default();
    }
    let total_score: i64 = history.iter().map(|r| r.score).sum();
    HistoryStats {
        total_exams: history.len(),
        average_score: (total_score as f64 / history.len() as f64).round() as i64,
        best_score: history.iter().map(|r| r.score).max().unwrap_or_default(),
        total_time_secs: history.iter().map(|r| r.time_taken).sum(),
    }
}

#[derive(Clone)]
pub struct ResultService {
    store: Arc<dyn ResultStore>,
}

impl ResultService {
    pub fn new(store: Arc<dyn ResultStore>) -> Self {
        Self { store }
    }

    /// Stores a finished exam for a signed-in user.
    ///
    /// Anonymous runs are graded but never written; `None` is returned.
    pub async fn persist(
        &self,
        user_id: Option<&str>,
        report: &ExamReport,
    ) -> Result<Option<String>, AppError> {
        match user_id {
            Some(user_id) => self.store.insert(user_id, report).await.map(Some),
            None => {
                tracing::debug!("Anonymous exam finished; result not stored");
                Ok(None)
            }
        }
    }

    pub async fn history(&self, user_id: &str) -> Result<Vec<ExamResult>, AppError> {
        self.store.history(user_id).await
    }

    pub async fn stats(&self, user_id: &str) -> Result<HistoryStats, AppError> {
        Ok(stats(&self.history(user_id).await?))
    }

    pub async fn wrong_questions(&self, user_id: &str) -> Result<Vec<QuestionResult>, AppError> {
        self.store.wrong_answers(user_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exam::fixtures::{letter, single};
    use crate::exam::scoring::{Timing, grade};
    use crate::exam::session::AnswerSlot;
    use crate::exam::{ExamLength, ExamMode};
    use crate::store::{IdentityProvider, SqlIdentityProvider, SqlResultStore, test_pool};
    use chrono::{Duration, Utc};

    fn result(score: i64, time_taken: i64) -> ExamResult {
        ExamResult {
            id: "r".into(),
            user_id: "u".into(),
            quiz_mode: "exam".into(),
            quiz_length: "full".into(),
            total_questions: 65,
            correct_answers: 0,
            score,
            time_taken,
            started_at: Utc::now(),
            completed_at: Utc::now(),
        }
    }

    fn report(correct_first: bool, completed_ago_mins: i64) -> ExamReport {
        let questions = vec![single("a", 'A'), single("b", 'B')];
        let first = if correct_first { 'A' } else { 'C' };
        let answers = vec![AnswerSlot::Single(letter(first)), AnswerSlot::Single(letter('C'))];
        let completed_at = Utc::now() - Duration::minutes(completed_ago_mins);
        grade(
            ExamMode::Exam,
            ExamLength::Short,
            &questions,
            &answers,
            Timing {
                started_at: completed_at - Duration::minutes(5),
                completed_at,
                time_taken_secs: 300,
            },
        )
    }

    #[test]
    fn stats_of_empty_history_are_zero() {
        assert_eq!(stats(&[]), HistoryStats::default());
    }

    #[test]
    fn stats_reduce_history() {
        let history = vec![result(800, 100), result(650, 200), result(701, 50)];
        let stats = stats(&history);
        assert_eq!(stats.total_exams, 3);
        assert_eq!(stats.average_score, 717);
        assert_eq!(stats.best_score, 800);
        assert_eq!(stats.total_time_secs, 350);
    }

    #[tokio::test]
    async fn persists_only_for_signed_in_users() {
        let pool = test_pool().await;
        let identity = SqlIdentityProvider::new(pool.clone(), "s".into(), 60);
        let user = identity.sign_up("alice", "secret1").await.unwrap().user;
        let service = ResultService::new(Arc::new(SqlResultStore::new(pool)));

        assert_eq!(service.persist(None, &report(true, 0)).await.unwrap(), None);
        assert!(service.history(&user.id).await.unwrap().is_empty());

        let older = service.persist(Some(&user.id), &report(true, 30)).await.unwrap();
        let newer = service.persist(Some(&user.id), &report(false, 1)).await.unwrap();

        let history = service.history(&user.id).await.unwrap();
        let ids: Vec<_> = history.iter().map(|r| Some(r.id.clone())).collect();
        assert_eq!(ids, vec![newer, older]);
        assert_eq!(history[0].score, 0);
        assert_eq!(history[1].score, 500);
        assert_eq!(history[1].time_taken, 300);

        let wrong = service.wrong_questions(&user.id).await.unwrap();
        assert_eq!(wrong.len(), 3);
        assert!(wrong.iter().all(|w| !w.is_correct));
        assert_eq!(wrong[0].question_id, "a");
        assert_eq!(wrong[0].user_answer, AnswerSlot::Single(letter('C')));
        assert_eq!(wrong[0].correct_answer, AnswerSlot::Single(letter('A')));
    }
}
