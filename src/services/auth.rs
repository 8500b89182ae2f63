// src/services/auth.rs

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use regex::Regex;

use crate::config::{Config, PASSWORD_MIN_LEN, USERNAME_MAX_LEN};
use crate::error::{AppError, USERNAME_TAKEN};
use crate::models::user::User;
use crate::store::{DeviceStorage, IdentityProvider, IssuedSession, ProfileStore};

const CACHED_USER_KEY: &str = "auth:user";
const SESSION_MARKER_KEY: &str = "auth:session_created_at";

/// A fresh sign-in or sign-up.
#[derive(Debug, Clone)]
pub struct SignedIn {
    pub user: User,
    pub token: String,
}

/// Wraps the identity backend with local username/password rules and a
/// per-device session age ceiling.
pub struct AuthSessionManager {
    identity: Arc<dyn IdentityProvider>,
    profiles: Arc<dyn ProfileStore>,
    username_pattern: Regex,
    username_min_len: usize,
    max_age: Duration,
}

impl AuthSessionManager {
    pub fn new(
        identity: Arc<dyn IdentityProvider>,
        profiles: Arc<dyn ProfileStore>,
        config: &Config,
    ) -> Result<Self, AppError> {
        let username_pattern = Regex::new(r"^[A-Za-z0-9]+$")
            .map_err(|e| AppError::InternalServerError(e.to_string()))?;
        Ok(Self {
            identity,
            profiles,
            username_pattern,
            username_min_len: config.username_min_len,
            max_age: config.session_max_age(),
        })
    }

    pub fn validate_username(&self, username: &str) -> Result<(), AppError> {
        let len = username.chars().count();
        if len < self.username_min_len
            || len > USERNAME_MAX_LEN
            || !self.username_pattern.is_match(username)
        {
            return Err(AppError::BadRequest(format!(
                "Username must be {}-{} letters or digits.",
                self.username_min_len, USERNAME_MAX_LEN
            )));
        }
        Ok(())
    }

    pub fn validate_password(&self, password: &str) -> Result<(), AppError> {
        if password.chars().count() < PASSWORD_MIN_LEN {
            return Err(AppError::BadRequest(format!(
                "Password must be at least {} characters.",
                PASSWORD_MIN_LEN
            )));
        }
        Ok(())
    }

    pub async fn sign_up(
        &self,
        device: &DeviceStorage,
        username: &str,
        password: &str,
    ) -> Result<SignedIn, AppError> {
        self.validate_username(username)?;
        self.validate_password(password)?;

        if self.profiles.find_by_username(username).await?.is_some() {
            return Err(AppError::Conflict(USERNAME_TAKEN.to_string()));
        }

        let issued = self.identity.sign_up(username, password).await?;
        self.remember(device, issued).await
    }

    pub async fn sign_in(
        &self,
        device: &DeviceStorage,
        username: &str,
        password: &str,
    ) -> Result<SignedIn, AppError> {
        self.validate_username(username)?;
        self.validate_password(password)?;

        let issued = self.identity.sign_in(username, password).await?;
        tracing::info!("User {} signed in", issued.user.username);
        self.remember(device, issued).await
    }

    /// Writes the cached user and a fresh session marker.
    async fn remember(
        &self,
        device: &DeviceStorage,
        issued: IssuedSession,
    ) -> Result<SignedIn, AppError> {
        device.set_json(CACHED_USER_KEY, &issued.user).await?;
        device
            .set(SESSION_MARKER_KEY, &issued.session.created_at.to_rfc3339())
            .await?;
        Ok(SignedIn {
            user: issued.user,
            token: issued.token,
        })
    }

    async fn forget(&self, device: &DeviceStorage) -> Result<(), AppError> {
        device.remove(CACHED_USER_KEY).await?;
        device.remove(SESSION_MARKER_KEY).await
    }

    pub async fn sign_out(&self, device: &DeviceStorage, token: &str) -> Result<(), AppError> {
        self.identity.sign_out(token).await?;
        self.forget(device).await
    }

    /// The cached user of this device, without asking the backend.
    pub async fn current_user(&self, device: &DeviceStorage) -> Result<Option<User>, AppError> {
        device.get_json(CACHED_USER_KEY).await
    }

    /// Checks the backend session behind `token` and the device's age ceiling.
    ///
    /// Returns the refreshed user, or `None` after clearing local state when
    /// the session is gone or too old. Sessions past the ceiling are also
    /// signed out on the backend.
    pub async fn restore_session(
        &self,
        device: &DeviceStorage,
        token: &str,
    ) -> Result<Option<User>, AppError> {
        let Some(session) = self.identity.get_session(token).await? else {
            self.forget(device).await?;
            return Ok(None);
        };

        let started = match device.get(SESSION_MARKER_KEY).await? {
            Some(raw) => DateTime::parse_from_rfc3339(&raw)
                .ok()
                .map(|at| at.with_timezone(&Utc)),
            None => {
                device
                    .set(SESSION_MARKER_KEY, &session.created_at.to_rfc3339())
                    .await?;
                Some(session.created_at)
            }
        };

        let fresh = started.is_some_and(|at| Utc::now() - at <= self.max_age);
        if !fresh {
            tracing::info!("Session of user {} exceeded its maximum age", session.user_id);
            self.identity.sign_out(token).await?;
            self.forget(device).await?;
            return Ok(None);
        }

        let Some(user) = self.profiles.find_by_id(&session.user_id).await? else {
            tracing::warn!("Session for unknown user {}", session.user_id);
            self.forget(device).await?;
            return Ok(None);
        };

        device.set_json(CACHED_USER_KEY, &user).await?;
        Ok(Some(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::INVALID_CREDENTIALS;
    use crate::store::{MemoryLocalStore, SqlIdentityProvider, SqlProfileStore, test_pool};

    async fn manager() -> (AuthSessionManager, DeviceStorage) {
        let pool = test_pool().await;
        let config = Config::for_tests("auth-test-secret");
        let manager = AuthSessionManager::new(
            Arc::new(SqlIdentityProvider::new(
                pool.clone(),
                config.jwt_secret.clone(),
                config.jwt_expiration,
            )),
            Arc::new(SqlProfileStore::new(pool)),
            &config,
        )
        .unwrap();
        let device = DeviceStorage::new(Arc::new(MemoryLocalStore::new()), "laptop");
        (manager, device)
    }

    async fn signed_up(manager: &AuthSessionManager, device: &DeviceStorage) -> SignedIn {
        manager.sign_up(device, "alice", "secret1").await.unwrap()
    }

    #[tokio::test]
    async fn username_boundaries() {
        let (manager, _) = manager().await;
        assert!(manager.validate_username("abc").is_err());
        assert!(manager.validate_username("abcd").is_ok());
        assert!(manager.validate_username(&"a".repeat(20)).is_ok());
        assert!(manager.validate_username(&"a".repeat(21)).is_err());
        assert!(manager.validate_username("abc_d").is_err());
        assert!(manager.validate_username("abc d").is_err());
        assert!(manager.validate_username("User2024").is_ok());
    }

    #[tokio::test]
    async fn password_boundaries() {
        let (manager, _) = manager().await;
        assert!(manager.validate_password("12345").is_err());
        assert!(manager.validate_password("123456").is_ok());
    }

    #[tokio::test]
    async fn sign_up_caches_user_and_marker() {
        let (manager, device) = manager().await;
        let signed = manager.sign_up(&device, "alice", "secret1").await.unwrap();

        let cached = manager.current_user(&device).await.unwrap().unwrap();
        assert_eq!(cached, signed.user);
        assert!(device.get(SESSION_MARKER_KEY).await.unwrap().is_some());

        let err = manager.sign_up(&device, "alice", "secret1").await.unwrap_err();
        assert_eq!(err, AppError::Conflict(USERNAME_TAKEN.to_string()));
    }

    #[tokio::test]
    async fn bad_credentials_are_rejected() {
        let (manager, device) = manager().await;
        manager.sign_up(&device, "alice", "secret1").await.unwrap();
        let err = manager.sign_in(&device, "alice", "wrong11").await.unwrap_err();
        assert_eq!(err, AppError::AuthError(INVALID_CREDENTIALS.to_string()));
    }

    #[tokio::test]
    async fn restore_refreshes_fresh_sessions() {
        let (manager, device) = manager().await;
        let signed = signed_up(&manager, &device).await;
        let restored = manager.restore_session(&device, &signed.token).await.unwrap();
        assert_eq!(restored.map(|u| u.id), Some(signed.user.id));
    }

    #[tokio::test]
    async fn restore_expires_sessions_past_the_ceiling() {
        let (manager, device) = manager().await;
        let signed = signed_up(&manager, &device).await;

        let eight_days_ago = Utc::now() - Duration::days(8);
        device
            .set(SESSION_MARKER_KEY, &eight_days_ago.to_rfc3339())
            .await
            .unwrap();

        assert!(manager.restore_session(&device, &signed.token).await.unwrap().is_none());
        assert!(manager.current_user(&device).await.unwrap().is_none());

        // The backend session was revoked too, even from another device.
        let other = DeviceStorage::new(Arc::new(MemoryLocalStore::new()), "phone");
        assert!(manager.restore_session(&other, &signed.token).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn garbage_marker_counts_as_expired() {
        let (manager, device) = manager().await;
        let signed = signed_up(&manager, &device).await;
        device.set(SESSION_MARKER_KEY, "yesterday-ish").await.unwrap();
        assert!(manager.restore_session(&device, &signed.token).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn new_device_adopts_backend_session_start() {
        let (manager, device) = manager().await;
        let signed = signed_up(&manager, &device).await;

        let other = DeviceStorage::new(Arc::new(MemoryLocalStore::new()), "phone");
        let restored = manager.restore_session(&other, &signed.token).await.unwrap();
        assert!(restored.is_some());
        assert!(other.get(SESSION_MARKER_KEY).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn missing_backend_session_clears_cache() {
        let (manager, device) = manager().await;
        let signed = signed_up(&manager, &device).await;
        manager.sign_out(&device, &signed.token).await.unwrap();

        device.set_json(CACHED_USER_KEY, &signed.user).await.unwrap();
        assert!(manager.restore_session(&device, &signed.token).await.unwrap().is_none());
        assert!(manager.current_user(&device).await.unwrap().is_none());
    }
}
