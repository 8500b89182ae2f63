// src/handlers/history.rs

use axum::{Extension, Json, extract::State, response::IntoResponse};

use crate::{error::AppError, services::results::ResultService, utils::jwt::CurrentUser};

/// The signed-in user's results, newest first.
pub async fn list_history(
    State(results): State<ResultService>,
    Extension(current): Extension<CurrentUser>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(results.history(&current.user.id).await?))
}

pub async fn history_stats(
    State(results): State<ResultService>,
    Extension(current): Extension<CurrentUser>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(results.stats(&current.user.id).await?))
}

/// Every question the user got wrong, for review.
pub async fn wrong_questions(
    State(results): State<ResultService>,
    Extension(current): Extension<CurrentUser>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(results.wrong_questions(&current.user.id).await?))
}
