// src/store/questions.rs

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use uuid::Uuid;

use super::{QuestionStore, db_error};
use crate::error::AppError;
use crate::models::question::{Question, QuestionDraft, QuestionRow};

const COLUMNS: &str =
    "id, question_text, options, answer, explanation, category, difficulty, created_at, updated_at";

#[derive(Clone)]
pub struct SqlQuestionStore {
    pool: SqlitePool,
}

impl SqlQuestionStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

/// Normalizes rows, dropping the ones that do not parse.
fn normalize(rows: Vec<QuestionRow>) -> Vec<Question> {
    rows.into_iter()
        .filter_map(|row| match Question::try_from(row) {
            Ok(question) => Some(question),
            Err(e) => {
                tracing::warn!("Skipping malformed question: {}", e);
                None
            }
        })
        .collect()
}

/// Escapes LIKE wildcards so the keyword matches literally.
fn like_pattern(keyword: &str) -> String {
    let mut escaped = String::with_capacity(keyword.len() + 2);
    escaped.push('%');
    for c in keyword.to_lowercase().chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

fn encode_options(draft: &QuestionDraft) -> Result<String, AppError> {
    serde_json::to_string(&draft.options)
        .map_err(|e| AppError::InternalServerError(e.to_string()))
}

#[async_trait]
impl QuestionStore for SqlQuestionStore {
    async fn load_all(&self) -> Result<Vec<Question>, AppError> {
        let rows: Vec<QuestionRow> = sqlx::query_as(&format!(
            "SELECT {} FROM questions ORDER BY created_at ASC, seq ASC",
            COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("Failed to load questions"))?;

        Ok(normalize(rows))
    }

    async fn find(&self, id: &str) -> Result<Option<Question>, AppError> {
        let row: Option<QuestionRow> =
            sqlx::query_as(&format!("SELECT {} FROM questions WHERE id = ?", COLUMNS))
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(db_error("Failed to fetch question"))?;

        row.map(Question::try_from)
            .transpose()
            .map_err(AppError::InternalServerError)
    }

    async fn search(
        &self,
        keyword: Option<&str>,
        offset: i64,
        limit: i64,
    ) -> Result<(Vec<Question>, i64), AppError> {
        let keyword = keyword.map(str::trim).filter(|k| !k.is_empty());

        let mut count_query: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT COUNT(*) FROM questions");
        let mut page_query: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {} FROM questions", COLUMNS));

        if let Some(keyword) = keyword {
            let pattern = like_pattern(keyword);
            for query in [&mut count_query, &mut page_query] {
                query
                    .push(" WHERE LOWER(question_text) LIKE ")
                    .push_bind(pattern.clone())
                    .push(" ESCAPE '\\'");
            }
        }

        page_query
            .push(" ORDER BY created_at DESC, seq DESC LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind(offset);

        let total: i64 = count_query
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await
            .map_err(db_error("Failed to count questions"))?;

        let rows: Vec<QuestionRow> = page_query
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(db_error("Failed to search questions"))?;

        Ok((normalize(rows), total))
    }

    async fn create(&self, draft: &QuestionDraft) -> Result<Question, AppError> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let options = encode_options(draft)?;

        sqlx::query(
            r#"
            INSERT INTO questions
            (id, question_text, options, answer, explanation, category, difficulty, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&draft.question_text)
        .bind(&options)
        .bind(draft.answer.to_stored())
        .bind(&draft.explanation)
        .bind(&draft.category)
        .bind(draft.difficulty.as_str())
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(db_error("Failed to create question"))?;

        tracing::info!("Question {} created", id);

        Ok(Question {
            id,
            question_text: draft.question_text.clone(),
            options: draft.options.clone(),
            answer: draft.answer.clone(),
            explanation: draft.explanation.clone(),
            category: draft.category.clone(),
            difficulty: draft.difficulty,
            created_at: Some(now),
            updated_at: Some(now),
        })
    }

    async fn update(&self, id: &str, draft: &QuestionDraft) -> Result<Option<Question>, AppError> {
        let options = encode_options(draft)?;

        let result = sqlx::query(
            r#"
            UPDATE questions
            SET question_text = ?, options = ?, answer = ?, explanation = ?,
                category = ?, difficulty = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&draft.question_text)
        .bind(&options)
        .bind(draft.answer.to_stored())
        .bind(&draft.explanation)
        .bind(&draft.category)
        .bind(draft.difficulty.as_str())
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(db_error("Failed to update question"))?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.find(id).await
    }

    async fn delete(&self, id: &str) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM questions WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_error("Failed to delete question"))?;

        Ok(result.rows_affected() > 0)
    }

    async fn count(&self) -> Result<i64, AppError> {
        sqlx::query_scalar("SELECT COUNT(*) FROM questions")
            .fetch_one(&self.pool)
            .await
            .map_err(db_error("Failed to count questions"))
    }
}
