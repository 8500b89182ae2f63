// src/store/identity.rs

use async_trait::async_trait;
use chrono::{Duration, Utc};
use sqlx::{FromRow, SqlitePool};
use uuid::Uuid;

use super::{BackendSession, IdentityProvider, IssuedSession, ProfileStore, db_error};
use crate::error::{AppError, INVALID_CREDENTIALS, USERNAME_TAKEN};
use crate::models::user::{Role, User, UserRow};
use crate::utils::{
    hash::{hash_password, verify_password},
    jwt::{sign_jwt, verify_jwt},
};

/// Identity backend over the `users` and `auth_sessions` tables.
#[derive(Clone)]
pub struct SqlIdentityProvider {
    pool: SqlitePool,
    jwt_secret: String,
    jwt_expiration: u64,
}

#[derive(Debug, FromRow)]
struct SessionRow {
    id: String,
    user_id: String,
    created_at: chrono::DateTime<Utc>,
    expires_at: chrono::DateTime<Utc>,
}

impl SqlIdentityProvider {
    pub fn new(pool: SqlitePool, jwt_secret: String, jwt_expiration: u64) -> Self {
        Self {
            pool,
            jwt_secret,
            jwt_expiration,
        }
    }

    /// Records a new backend session and signs its token.
    async fn issue(&self, user: User) -> Result<IssuedSession, AppError> {
        let now = Utc::now();
        let session = BackendSession {
            session_id: Uuid::new_v4().to_string(),
            user_id: user.id.clone(),
            created_at: now,
            expires_at: now + Duration::seconds(self.jwt_expiration as i64),
        };

        sqlx::query(
            "INSERT INTO auth_sessions (id, user_id, created_at, expires_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&session.session_id)
        .bind(&session.user_id)
        .bind(session.created_at)
        .bind(session.expires_at)
        .execute(&self.pool)
        .await
        .map_err(db_error("Failed to record session"))?;

        let token = sign_jwt(
            &user.id,
            &session.session_id,
            user.role,
            &self.jwt_secret,
            self.jwt_expiration,
        )?;

        Ok(IssuedSession {
            token,
            session,
            user,
        })
    }
}

#[async_trait]
impl IdentityProvider for SqlIdentityProvider {
    async fn sign_up(&self, username: &str, password: &str) -> Result<IssuedSession, AppError> {
        let hashed_password = hash_password(password)?;
        let user = User {
            id: Uuid::new_v4().to_string(),
            username: username.to_string(),
            role: Role::User,
            created_at: Utc::now(),
        };

        sqlx::query(
            "INSERT INTO users (id, username, password, role, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&user.id)
        .bind(&user.username)
        .bind(&hashed_password)
        .bind(user.role.as_str())
        .bind(user.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            let unique = e
                .as_database_error()
                .is_some_and(|db| db.is_unique_violation());
            if unique {
                AppError::Conflict(USERNAME_TAKEN.to_string())
            } else {
                tracing::error!("Failed to create user: {:?}", e);
                AppError::InternalServerError(e.to_string())
            }
        })?;

        tracing::info!("User {} registered", user.username);
        self.issue(user).await
    }

    async fn sign_in(&self, username: &str, password: &str) -> Result<IssuedSession, AppError> {
        let row: Option<UserRow> = sqlx::query_as(
            "SELECT id, username, password, role, created_at FROM users WHERE username = ?",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("Failed to look up user"))?;

        let row = row.ok_or_else(|| AppError::AuthError(INVALID_CREDENTIALS.to_string()))?;

        if !verify_password(password, &row.password)? {
            return Err(AppError::AuthError(INVALID_CREDENTIALS.to_string()));
        }

        self.issue(User::from(row)).await
    }

    async fn sign_out(&self, token: &str) -> Result<(), AppError> {
        let Ok(claims) = verify_jwt(token, &self.jwt_secret) else {
            return Ok(());
        };

        sqlx::query("UPDATE auth_sessions SET revoked = 1 WHERE id = ?")
            .bind(&claims.sid)
            .execute(&self.pool)
            .await
            .map_err(db_error("Failed to revoke session"))?;

        Ok(())
    }

    async fn get_session(&self, token: &str) -> Result<Option<BackendSession>, AppError> {
        let Ok(claims) = verify_jwt(token, &self.jwt_secret) else {
            return Ok(None);
        };

        let row: Option<SessionRow> = sqlx::query_as(
            r#"
            SELECT id, user_id, created_at, expires_at
            FROM auth_sessions
            WHERE id = ? AND user_id = ? AND revoked = 0
            "#,
        )
        .bind(&claims.sid)
        .bind(&claims.sub)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("Failed to load session"))?;

        Ok(row
            .filter(|row| row.expires_at > Utc::now())
            .map(|row| BackendSession {
                session_id: row.id,
                user_id: row.user_id,
                created_at: row.created_at,
                expires_at: row.expires_at,
            }))
    }
}

/// Profile lookups over the `users` table.
#[derive(Clone)]
pub struct SqlProfileStore {
    pool: SqlitePool,
}

impl SqlProfileStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProfileStore for SqlProfileStore {
    async fn find_by_id(&self, id: &str) -> Result<Option<User>, AppError> {
        let row: Option<UserRow> = sqlx::query_as(
            "SELECT id, username, password, role, created_at FROM users WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("Failed to fetch profile"))?;

        Ok(row.map(User::from))
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, AppError> {
        let row: Option<UserRow> = sqlx::query_as(
            "SELECT id, username, password, role, created_at FROM users WHERE username = ?",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("Failed to fetch profile"))?;

        Ok(row.map(User::from))
    }

    async fn list(&self) -> Result<Vec<User>, AppError> {
        let rows: Vec<UserRow> = sqlx::query_as(
            "SELECT id, username, password, role, created_at FROM users ORDER BY created_at DESC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("Failed to list users"))?;

        Ok(rows.into_iter().map(User::from).collect())
    }

    async fn update_role(&self, id: &str, role: Role) -> Result<bool, AppError> {
        let result = sqlx::query("UPDATE users SET role = ? WHERE id = ?")
            .bind(role.as_str())
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_error("Failed to update role"))?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_pool;

    const SECRET: &str = "identity-test-secret";

    async fn provider() -> (SqlIdentityProvider, SqlProfileStore) {
        let pool = test_pool().await;
        (
            SqlIdentityProvider::new(pool.clone(), SECRET.to_string(), 3600),
            SqlProfileStore::new(pool),
        )
    }

    #[tokio::test]
    async fn sign_up_then_sign_in() {
        let (identity, _) = provider().await;
        let issued = identity.sign_up("alice", "secret1").await.unwrap();
        assert_eq!(issued.user.role, Role::User);

        let again = identity.sign_in("alice", "secret1").await.unwrap();
        assert_eq!(again.user.id, issued.user.id);
        assert_ne!(again.session.session_id, issued.session.session_id);
    }

    #[tokio::test]
    async fn duplicate_username_is_conflict() {
        let (identity, _) = provider().await;
        identity.sign_up("alice", "secret1").await.unwrap();
        let err = identity.sign_up("alice", "other11").await.unwrap_err();
        assert_eq!(err, AppError::Conflict(USERNAME_TAKEN.to_string()));
    }

    #[tokio::test]
    async fn wrong_password_and_unknown_user_look_the_same() {
        let (identity, _) = provider().await;
        identity.sign_up("alice", "secret1").await.unwrap();

        let wrong = identity.sign_in("alice", "secret2").await.unwrap_err();
        let unknown = identity.sign_in("bob", "secret1").await.unwrap_err();
        assert_eq!(wrong, unknown);
        assert_eq!(wrong, AppError::AuthError(INVALID_CREDENTIALS.to_string()));
    }

    #[tokio::test]
    async fn sign_out_revokes_session() {
        let (identity, _) = provider().await;
        let issued = identity.sign_up("alice", "secret1").await.unwrap();
        assert!(identity.get_session(&issued.token).await.unwrap().is_some());

        identity.sign_out(&issued.token).await.unwrap();
        assert!(identity.get_session(&issued.token).await.unwrap().is_none());
        assert!(identity.get_session("garbage").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn profiles_list_newest_first_and_update_role() {
        let (identity, profiles) = provider().await;
        let first = identity.sign_up("alice", "secret1").await.unwrap().user;
        let second = identity.sign_up("bobby", "secret1").await.unwrap().user;

        let listed: Vec<_> = profiles.list().await.unwrap().into_iter().map(|u| u.id).collect();
        assert_eq!(listed, vec![second.id.clone(), first.id.clone()]);

        assert!(profiles.update_role(&first.id, Role::Admin).await.unwrap());
        let updated = profiles.find_by_username("alice").await.unwrap().unwrap();
        assert!(updated.is_admin());
        assert!(!profiles.update_role("missing", Role::Admin).await.unwrap());
    }
}
