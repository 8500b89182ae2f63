// src/models/exam_result.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::exam::session::AnswerSlot;

/// Represents the 'quiz_results' table in the database.
/// Rows are append-only.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct ExamResult {
    pub id: String,
    pub user_id: String,
    pub quiz_mode: String,
    pub quiz_length: String,
    pub total_questions: i64,
    pub correct_answers: i64,
    pub score: i64,
    /// Seconds.
    pub time_taken: i64,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

/// Raw 'quiz_question_results' row joined with its parent's completion time.
#[derive(Debug, Clone, FromRow)]
pub struct QuestionResultRow {
    pub quiz_result_id: String,
    pub question_index: i64,
    pub question_id: String,
    pub question_text: String,
    pub user_answer: String,
    pub correct_answer: String,
    pub is_correct: bool,
    pub completed_at: DateTime<Utc>,
}

/// Per-question detail of a stored result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuestionResult {
    pub quiz_result_id: String,
    pub question_index: i64,
    pub question_id: String,
    pub question_text: String,
    pub user_answer: AnswerSlot,
    pub correct_answer: AnswerSlot,
    pub is_correct: bool,
    pub attempted_at: DateTime<Utc>,
}

impl From<QuestionResultRow> for QuestionResult {
    fn from(row: QuestionResultRow) -> Self {
        QuestionResult {
            quiz_result_id: row.quiz_result_id,
            question_index: row.question_index,
            question_id: row.question_id,
            question_text: row.question_text,
            user_answer: AnswerSlot::parse_stored(&row.user_answer),
            correct_answer: AnswerSlot::parse_stored(&row.correct_answer),
            is_correct: row.is_correct,
            attempted_at: row.completed_at,
        }
    }
}

/// A result joined with its owner's username, for the admin listing.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ResultWithUser {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub result: ExamResult,
    pub username: String,
}

/// Aggregates over one user's history.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HistoryStats {
    pub total_exams: usize,
    pub average_score: i64,
    pub best_score: i64,
    pub total_time_secs: i64,
}

/// Aggregates shown on the admin overview.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Overview {
    pub total_users: usize,
    pub total_quizzes: usize,
    pub average_score: i64,
    /// Users with at least one stored result.
    pub active_users: usize,
}
