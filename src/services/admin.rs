// src/services/admin.rs

use std::collections::HashSet;
use std::sync::Arc;

use crate::error::AppError;
use crate::models::exam_result::{Overview, ResultWithUser};
use crate::models::question::{
    Question, QuestionDraft, QuestionListParams, QuestionPage, QuestionPatch,
};
use crate::models::user::{Role, User};
use crate::store::{ProfileStore, QuestionStore, ResultStore};

const DEFAULT_PAGE_SIZE: i64 = 20;
const MAX_PAGE_SIZE: i64 = 100;

/// Rejects anyone who is not an admin.
pub fn ensure_admin(actor: &User) -> Result<(), AppError> {
    if actor.is_admin() {
        Ok(())
    } else {
        tracing::warn!("User {} attempted an admin operation", actor.username);
        Err(AppError::Forbidden("Admin access required".to_string()))
    }
}

/// Question bank, user and result management.
///
/// Every call checks the actor's role itself, on top of the route guard.
#[derive(Clone)]
pub struct AdminService {
    questions: Arc<dyn QuestionStore>,
    profiles: Arc<dyn ProfileStore>,
    results: Arc<dyn ResultStore>,
}

impl AdminService {
    pub fn new(
        questions: Arc<dyn QuestionStore>,
        profiles: Arc<dyn ProfileStore>,
        results: Arc<dyn ResultStore>,
    ) -> Self {
        Self {
            questions,
            profiles,
            results,
        }
    }

    pub async fn list_questions(
        &self,
        actor: &User,
        params: &QuestionListParams,
    ) -> Result<QuestionPage, AppError> {
        ensure_admin(actor)?;

        let limit = params
            .limit
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE);
        let offset = params.offset.unwrap_or(0).max(0);

        let (items, total) = self
            .questions
            .search(params.q.as_deref(), offset, limit)
            .await?;

        Ok(QuestionPage {
            items,
            total,
            offset,
            limit,
        })
    }

    pub async fn create_question(
        &self,
        actor: &User,
        draft: QuestionDraft,
    ) -> Result<Question, AppError> {
        ensure_admin(actor)?;

        let draft = draft.sanitized();
        draft.check()?;
        self.questions.create(&draft).await
    }

    /// Merges the patch into the stored question, then validates the result.
    pub async fn update_question(
        &self,
        actor: &User,
        id: &str,
        patch: QuestionPatch,
    ) -> Result<Question, AppError> {
        ensure_admin(actor)?;

        if patch.is_empty() {
            return Err(AppError::BadRequest("No fields to update".to_string()));
        }

        let current = self
            .questions
            .find(id)
            .await?
            .ok_or_else(|| AppError::NotFound("Question not found".to_string()))?;

        let draft = QuestionDraft::from(current).apply(patch).sanitized();
        draft.check()?;

        self.questions
            .update(id, &draft)
            .await?
            .ok_or_else(|| AppError::NotFound("Question not found".to_string()))
    }

    pub async fn delete_question(&self, actor: &User, id: &str) -> Result<(), AppError> {
        ensure_admin(actor)?;

        if !self.questions.delete(id).await? {
            return Err(AppError::NotFound("Question not found".to_string()));
        }
        tracing::info!("Question {} deleted by {}", id, actor.username);
        Ok(())
    }

    pub async fn list_users(&self, actor: &User) -> Result<Vec<User>, AppError> {
        ensure_admin(actor)?;
        self.profiles.list().await
    }

    /// Changes another user's role. Admins cannot change their own role.
    pub async fn update_role(&self, actor: &User, user_id: &str, role: Role) -> Result<(), AppError> {
        ensure_admin(actor)?;

        if actor.id == user_id {
            return Err(AppError::BadRequest("Cannot change your own role".to_string()));
        }
        if !self.profiles.update_role(user_id, role).await? {
            return Err(AppError::NotFound("User not found".to_string()));
        }
        tracing::info!("User {} is now {} (by {})", user_id, role, actor.username);
        Ok(())
    }

    pub async fn list_results(&self, actor: &User) -> Result<Vec<ResultWithUser>, AppError> {
        ensure_admin(actor)?;
        self.results.all_with_users().await
    }

    pub async fn overview(&self, actor: &User) -> Result<Overview, AppError> {
        ensure_admin(actor)?;

        let users = self.profiles.list().await?;
        let results = self.results.all_with_users().await?;
        Ok(overview(&users, &results))
    }
}

pub fn overview(users: &[User], results: &[ResultWithUser]) -> Overview {
    let total_quizzes = results.len();
    let average_score = if total_quizzes == 0 {
        0
    } else {
        let sum: i64 = results.iter().map(|r| r.result.score).sum();
        (sum as f64 / total_quizzes as f64).round() as i64
    };
    let with_results: HashSet<&str> = results.iter().map(|r| r.result.user_id.as_str()).collect();

    Overview {
        total_users: users.len(),
        total_quizzes,
        average_score,
        active_users: users
            .iter()
            .filter(|u| with_results.contains(u.id.as_str()))
            .count(),
    }
}
