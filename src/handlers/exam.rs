// src/handlers/exam.rs

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::{
    error::AppError,
    exam::{ExamLength, ExamMode},
    models::{question::Letter, user::User},
    services::exam::ExamService,
    store::DeviceStorage,
    utils::jwt::CurrentUser,
};

#[derive(Debug, Deserialize)]
pub struct StartExamRequest {
    pub mode: ExamMode,
    pub length: ExamLength,
}

#[derive(Debug, Deserialize)]
pub struct AnswerRequest {
    /// Option key; for multi-answer questions each call toggles one letter.
    pub answer: Letter,
}

type Viewer = Option<Extension<CurrentUser>>;

fn viewer_user(viewer: &Viewer) -> Option<&User> {
    viewer.as_ref().map(|Extension(current)| &current.user)
}

/// Draws a new exam. Timed exams wait for `confirm` before the clock runs.
pub async fn start_exam(
    State(exams): State<ExamService>,
    viewer: Viewer,
    Json(payload): Json<StartExamRequest>,
) -> Result<impl IntoResponse, AppError> {
    let view = exams
        .start(viewer_user(&viewer), payload.mode, payload.length)
        .await?;
    Ok((StatusCode::CREATED, Json(view)))
}

pub async fn get_exam(
    State(exams): State<ExamService>,
    viewer: Viewer,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(exams.view(id, viewer_user(&viewer)).await?))
}

pub async fn confirm_exam(
    State(exams): State<ExamService>,
    viewer: Viewer,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(exams.confirm(id, viewer_user(&viewer)).await?))
}

pub async fn answer(
    State(exams): State<ExamService>,
    viewer: Viewer,
    Path(id): Path<Uuid>,
    Json(payload): Json<AnswerRequest>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(
        exams.answer(id, viewer_user(&viewer), payload.answer).await?,
    ))
}

/// Practice only: shows whether the current answer is right.
pub async fn reveal(
    State(exams): State<ExamService>,
    viewer: Viewer,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(exams.reveal(id, viewer_user(&viewer)).await?))
}

pub async fn next_question(
    State(exams): State<ExamService>,
    viewer: Viewer,
    device: DeviceStorage,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(exams.next(id, viewer_user(&viewer), &device).await?))
}

pub async fn previous_question(
    State(exams): State<ExamService>,
    viewer: Viewer,
    device: DeviceStorage,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(
        exams.previous(id, viewer_user(&viewer), &device).await?,
    ))
}

pub async fn finish_exam(
    State(exams): State<ExamService>,
    viewer: Viewer,
    device: DeviceStorage,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(exams.finish(id, viewer_user(&viewer), &device).await?))
}

/// Abandons an exam. Saved full-length practice progress is kept.
pub async fn cancel_exam(
    State(exams): State<ExamService>,
    viewer: Viewer,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let cancelled = exams.cancel(id, viewer_user(&viewer)).await?;
    Ok(Json(json!({ "snapshot_retained": cancelled.snapshot_retained })))
}

/// Saved full-length practice progress on this device.
pub async fn get_resume(
    State(exams): State<ExamService>,
    Extension(current): Extension<CurrentUser>,
    device: DeviceStorage,
) -> Result<impl IntoResponse, AppError> {
    let saved = exams.saved_progress(&current.user, &device).await?;
    Ok(Json(json!({ "saved": saved })))
}

pub async fn resume_exam(
    State(exams): State<ExamService>,
    Extension(current): Extension<CurrentUser>,
    device: DeviceStorage,
) -> Result<impl IntoResponse, AppError> {
    let view = exams.resume(&current.user, &device).await?;
    Ok((StatusCode::CREATED, Json(view)))
}

pub async fn discard_resume(
    State(exams): State<ExamService>,
    Extension(current): Extension<CurrentUser>,
    device: DeviceStorage,
) -> Result<impl IntoResponse, AppError> {
    exams.discard_progress(&current.user, &device).await?;
    Ok(StatusCode::NO_CONTENT)
}
