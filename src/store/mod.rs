// src/store/mod.rs

//! Persistence ports and their SQLite adapters.
//!
//! Services only ever see the traits; the concrete adapters are wired in
//! `AppState::new`.

pub mod identity;
pub mod local;
pub mod questions;
pub mod results;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;

use crate::error::AppError;
use crate::exam::scoring::ExamReport;
use crate::models::exam_result::{ExamResult, QuestionResult, ResultWithUser};
use crate::models::question::{Question, QuestionDraft};
use crate::models::user::{Role, User};

pub use identity::{SqlIdentityProvider, SqlProfileStore};
pub use local::{DeviceStorage, MemoryLocalStore, SqlLocalStore};
pub use questions::SqlQuestionStore;
pub use results::SqlResultStore;

#[async_trait]
pub trait QuestionStore: Send + Sync {
    /// Every question, oldest first. Rows that cannot be normalized are skipped.
    async fn load_all(&self) -> Result<Vec<Question>, AppError>;

    async fn find(&self, id: &str) -> Result<Option<Question>, AppError>;

    /// Case-insensitive keyword search on the question text.
    async fn search(
        &self,
        keyword: Option<&str>,
        offset: i64,
        limit: i64,
    ) -> Result<(Vec<Question>, i64), AppError>;

    async fn create(&self, draft: &QuestionDraft) -> Result<Question, AppError>;

    async fn update(&self, id: &str, draft: &QuestionDraft) -> Result<Option<Question>, AppError>;

    /// Returns false when nothing was deleted.
    async fn delete(&self, id: &str) -> Result<bool, AppError>;

    async fn count(&self) -> Result<i64, AppError>;
}

#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Writes the result and its per-question rows atomically. Returns the new id.
    async fn insert(&self, user_id: &str, report: &ExamReport) -> Result<String, AppError>;

    /// A user's results, newest first.
    async fn history(&self, user_id: &str) -> Result<Vec<ExamResult>, AppError>;

    /// Incorrectly answered questions across a user's results, newest first.
    async fn wrong_answers(&self, user_id: &str) -> Result<Vec<QuestionResult>, AppError>;

    /// All results with the owning username, newest first.
    async fn all_with_users(&self) -> Result<Vec<ResultWithUser>, AppError>;
}

/// A session as recorded by the identity backend.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BackendSession {
    pub session_id: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub token: String,
    pub session: BackendSession,
    pub user: User,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn sign_up(&self, username: &str, password: &str) -> Result<IssuedSession, AppError>;

    async fn sign_in(&self, username: &str, password: &str) -> Result<IssuedSession, AppError>;

    async fn sign_out(&self, token: &str) -> Result<(), AppError>;

    /// The live session behind a token, if it is valid, unexpired and not revoked.
    async fn get_session(&self, token: &str) -> Result<Option<BackendSession>, AppError>;
}

#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn find_by_id(&self, id: &str) -> Result<Option<User>, AppError>;

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, AppError>;

    /// All users, newest first.
    async fn list(&self) -> Result<Vec<User>, AppError>;

    async fn update_role(&self, id: &str, role: Role) -> Result<bool, AppError>;
}

/// Device-scoped key/value storage.
#[async_trait]
pub trait LocalStore: Send + Sync {
    async fn get(&self, device: &str, key: &str) -> Result<Option<String>, AppError>;

    async fn set(&self, device: &str, key: &str, value: &str) -> Result<(), AppError>;

    async fn remove(&self, device: &str, key: &str) -> Result<(), AppError>;
}

pub async fn connect(database_url: &str) -> Result<SqlitePool, sqlx::Error> {
    SqlitePoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await
}

pub async fn migrate(pool: &SqlitePool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}

/// Maps a database error, logging it with some context first.
pub(crate) fn db_error(context: &'static str) -> impl Fn(sqlx::Error) -> AppError {
    move |e| {
        tracing::error!("{}: {:?}", context, e);
        AppError::InternalServerError(e.to_string())
    }
}

#[cfg(test)]
pub(crate) async fn test_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    migrate(&pool).await.unwrap();
    pool
}
