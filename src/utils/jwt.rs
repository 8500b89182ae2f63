// src/utils/jwt.rs

use std::time::{SystemTime, UNIX_EPOCH};

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, Request, header},
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::{
    error::{AppError, SESSION_EXPIRED},
    models::user::{Role, User},
    state::AppState,
    utils::device::device_storage,
};

/// JWT Claims structure.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Claims {
    /// Subject - the user id.
    pub sub: String,
    /// Backend session id; revoking it invalidates the token.
    pub sid: String,
    pub role: Role,
    /// Expiration time as Unix timestamp.
    pub exp: usize,
}

/// The signed-in user of a request, injected by the auth middlewares.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub user: User,
    pub token: String,
}

/// Signs a new JWT for a backend session.
pub fn sign_jwt(
    user_id: &str,
    session_id: &str,
    role: Role,
    secret: &str,
    expiration_seconds: u64,
) -> Result<String, AppError> {
    let expiration = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| AppError::InternalServerError(e.to_string()))?
        .as_secs() as usize
        + expiration_seconds as usize;

    let claims = Claims {
        sub: user_id.to_owned(),
        sid: session_id.to_owned(),
        role,
        exp: expiration,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::InternalServerError(e.to_string()))
}

/// Verifies and decodes a JWT string.
pub fn verify_jwt(token: &str, secret: &str) -> Result<Claims, AppError> {
    let token_data = decode(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| AppError::AuthError("Invalid token".to_string()))?;

    Ok(token_data.claims)
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Resolves the bearer token into a user through the session manager, which
/// also enforces the device's session age ceiling.
async fn resolve_user(state: &AppState, headers: &HeaderMap) -> Result<Option<CurrentUser>, AppError> {
    let Some(token) = bearer_token(headers) else {
        return Ok(None);
    };
    let device = device_storage(state, headers);
    let user = state.auth.restore_session(&device, token).await?;
    Ok(user.map(|user| CurrentUser {
        user,
        token: token.to_string(),
    }))
}

/// Axum Middleware: Authentication.
///
/// Requires a live session. Injects `CurrentUser` into the request
/// extensions, or answers 401.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    if bearer_token(req.headers()).is_none() {
        return Err(AppError::AuthError("Missing bearer token".to_string()));
    }

    match resolve_user(&state, req.headers()).await? {
        Some(current) => {
            req.extensions_mut().insert(current);
            Ok(next.run(req).await)
        }
        None => Err(AppError::AuthError(SESSION_EXPIRED.to_string())),
    }
}

/// Axum Middleware: optional authentication.
///
/// Like `auth_middleware`, but an absent or dead session just leaves the
/// request anonymous.
pub async fn viewer_middleware(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    if let Some(current) = resolve_user(&state, req.headers()).await? {
        req.extensions_mut().insert(current);
    }
    Ok(next.run(req).await)
}

/// Axum Middleware: Admin Authorization.
///
/// Must be used AFTER `auth_middleware`. Returns 403 for non-admins.
pub async fn admin_middleware(req: Request<Body>, next: Next) -> Result<Response, AppError> {
    let current = req
        .extensions()
        .get::<CurrentUser>()
        .ok_or_else(|| AppError::AuthError("Not signed in".to_string()))?;

    if !current.user.is_admin() {
        return Err(AppError::Forbidden("Admin access required".to_string()));
    }

    Ok(next.run(req).await)
}
