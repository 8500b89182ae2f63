// src/handlers/auth.rs

use std::sync::Arc;

use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use serde_json::json;
use validator::Validate;

use crate::{
    error::AppError,
    models::user::{AuthResponse, Credentials},
    services::auth::{AuthSessionManager, SignedIn},
    store::DeviceStorage,
    utils::jwt::CurrentUser,
};

fn auth_response(signed: SignedIn) -> AuthResponse {
    AuthResponse {
        token: signed.token,
        token_type: "Bearer",
        user: signed.user,
    }
}

/// Registers a new user and signs them in on this device.
///
/// Returns 201 Created with a token and the user profile.
pub async fn register(
    State(auth): State<Arc<AuthSessionManager>>,
    device: DeviceStorage,
    Json(payload): Json<Credentials>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let signed = auth
        .sign_up(&device, payload.username.trim(), &payload.password)
        .await?;

    Ok((StatusCode::CREATED, Json(auth_response(signed))))
}

/// Authenticates a user and returns a JWT token.
pub async fn login(
    State(auth): State<Arc<AuthSessionManager>>,
    device: DeviceStorage,
    Json(payload): Json<Credentials>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let signed = auth
        .sign_in(&device, payload.username.trim(), &payload.password)
        .await?;

    Ok(Json(auth_response(signed)))
}

/// Revokes the session and clears this device's cached user.
pub async fn logout(
    State(auth): State<Arc<AuthSessionManager>>,
    device: DeviceStorage,
    Extension(current): Extension<CurrentUser>,
) -> Result<impl IntoResponse, AppError> {
    auth.sign_out(&device, &current.token).await?;
    tracing::info!("User {} signed out", current.user.username);
    Ok(StatusCode::NO_CONTENT)
}

/// Returns the user behind a live session. The session check itself runs
/// in the auth middleware.
pub async fn me(Extension(current): Extension<CurrentUser>) -> impl IntoResponse {
    Json(current.user)
}

/// Returns the user cached on this device, if any, without a backend check.
pub async fn cached(
    State(auth): State<Arc<AuthSessionManager>>,
    device: DeviceStorage,
) -> Result<impl IntoResponse, AppError> {
    let user = auth.current_user(&device).await?;
    Ok(Json(json!({ "user": user })))
}
