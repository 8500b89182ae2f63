// src/store/results.rs

use async_trait::async_trait;
use sqlx::SqlitePool;
use uuid::Uuid;

use super::{ResultStore, db_error};
use crate::error::AppError;
use crate::exam::scoring::ExamReport;
use crate::models::exam_result::{ExamResult, QuestionResult, QuestionResultRow, ResultWithUser};

#[derive(Clone)]
pub struct SqlResultStore {
    pool: SqlitePool,
}

impl SqlResultStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ResultStore for SqlResultStore {
    async fn insert(&self, user_id: &str, report: &ExamReport) -> Result<String, AppError> {
        let id = Uuid::new_v4().to_string();
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(db_error("Failed to begin result transaction"))?;

        sqlx::query(
            r#"
            INSERT INTO quiz_results
            (id, user_id, quiz_mode, quiz_length, total_questions, correct_answers,
             score, time_taken, started_at, completed_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(user_id)
        .bind(report.mode.as_str())
        .bind(report.length.as_str())
        .bind(report.total_questions as i64)
        .bind(report.correct_answers as i64)
        .bind(i64::from(report.score))
        .bind(report.time_taken_secs)
        .bind(report.started_at)
        .bind(report.completed_at)
        .execute(&mut *tx)
        .await
        .map_err(db_error("Failed to insert quiz result"))?;

        for review in &report.questions {
            sqlx::query(
                r#"
                INSERT INTO quiz_question_results
                (quiz_result_id, question_index, question_id, question_text,
                 user_answer, correct_answer, is_correct)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&id)
            .bind(review.index as i64)
            .bind(&review.question_id)
            .bind(&review.question_text)
            .bind(review.user_answer.to_stored())
            .bind(review.correct_answer.to_stored())
            .bind(review.is_correct)
            .execute(&mut *tx)
            .await
            .map_err(db_error("Failed to insert question result"))?;
        }

        tx.commit()
            .await
            .map_err(db_error("Failed to commit quiz result"))?;

        tracing::info!(
            "Stored result {} for user {} (score {})",
            id,
            user_id,
            report.score
        );
        Ok(id)
    }

    async fn history(&self, user_id: &str) -> Result<Vec<ExamResult>, AppError> {
        sqlx::query_as(
            r#"
            SELECT id, user_id, quiz_mode, quiz_length, total_questions, correct_answers,
                   score, time_taken, started_at, completed_at
            FROM quiz_results
            WHERE user_id = ?
            ORDER BY completed_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("Failed to load history"))
    }

    async fn wrong_answers(&self, user_id: &str) -> Result<Vec<QuestionResult>, AppError> {
        let rows: Vec<QuestionResultRow> = sqlx::query_as(
            r#"
            SELECT d.quiz_result_id, d.question_index, d.question_id, d.question_text,
                   d.user_answer, d.correct_answer, d.is_correct, r.completed_at
            FROM quiz_question_results d
            JOIN quiz_results r ON r.id = d.quiz_result_id
            WHERE r.user_id = ? AND d.is_correct = 0
            ORDER BY r.completed_at DESC, d.question_index ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("Failed to load wrong answers"))?;

        Ok(rows.into_iter().map(QuestionResult::from).collect())
    }

    async fn all_with_users(&self) -> Result<Vec<ResultWithUser>, AppError> {
        sqlx::query_as(
            r#"
            SELECT r.id, r.user_id, r.quiz_mode, r.quiz_length, r.total_questions,
                   r.correct_answers, r.score, r.time_taken, r.started_at, r.completed_at,
                   u.username
            FROM quiz_results r
            JOIN users u ON u.id = r.user_id
            ORDER BY r.completed_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("Failed to list results"))
    }
}
