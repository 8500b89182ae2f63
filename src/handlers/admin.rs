// src/handlers/admin.rs

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};

use crate::{
    error::AppError,
    models::{
        question::{QuestionDraft, QuestionListParams, QuestionPatch},
        user::UpdateRoleRequest,
    },
    services::admin::AdminService,
    utils::jwt::CurrentUser,
};

/// Lists questions, optionally filtered by a keyword.
/// Admin only.
pub async fn list_questions(
    State(admin): State<AdminService>,
    Extension(current): Extension<CurrentUser>,
    Query(params): Query<QuestionListParams>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(admin.list_questions(&current.user, &params).await?))
}

/// Creates a new question.
/// Admin only.
pub async fn create_question(
    State(admin): State<AdminService>,
    Extension(current): Extension<CurrentUser>,
    Json(payload): Json<QuestionDraft>,
) -> Result<impl IntoResponse, AppError> {
    let question = admin.create_question(&current.user, payload).await?;
    Ok((StatusCode::CREATED, Json(question)))
}

/// Updates a question. Only the provided fields change.
/// Admin only.
pub async fn update_question(
    State(admin): State<AdminService>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<String>,
    Json(payload): Json<QuestionPatch>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(admin.update_question(&current.user, &id, payload).await?))
}

/// Deletes a question by ID.
/// Admin only.
pub async fn delete_question(
    State(admin): State<AdminService>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    admin.delete_question(&current.user, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Lists all users, newest first.
/// Admin only.
pub async fn list_users(
    State(admin): State<AdminService>,
    Extension(current): Extension<CurrentUser>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(admin.list_users(&current.user).await?))
}

/// Changes a user's role.
/// Admin only. Prevents changing your own role.
pub async fn update_user_role(
    State(admin): State<AdminService>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<String>,
    Json(payload): Json<UpdateRoleRequest>,
) -> Result<impl IntoResponse, AppError> {
    admin.update_role(&current.user, &id, payload.role).await?;
    Ok(StatusCode::OK)
}

/// Lists every stored result with its username.
/// Admin only.
pub async fn list_results(
    State(admin): State<AdminService>,
    Extension(current): Extension<CurrentUser>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(admin.list_results(&current.user).await?))
}

/// Admin only.
pub async fn overview(
    State(admin): State<AdminService>,
    Extension(current): Extension<CurrentUser>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(admin.overview(&current.user).await?))
}
