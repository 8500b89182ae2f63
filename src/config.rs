// src/config.rs

use std::env;
use std::str::FromStr;

use chrono::Duration;
use dotenvy::dotenv;

/// Passing threshold on the 1000-point scale.
pub const PASSING_SCORE: u32 = 720;

/// Maximum score of a completed exam.
pub const MAX_SCORE: u32 = 1000;

/// Question count for the full-length timed exam.
pub const FULL_EXAM_QUESTION_COUNT: usize = 65;

/// Question count for the short timed exam.
pub const SHORT_EXAM_QUESTION_COUNT: usize = 20;

/// Question count for short practice runs.
pub const PRACTICE_SHORT_COUNT: usize = FULL_EXAM_QUESTION_COUNT;

/// Time budget of the full timed exam (130 minutes).
pub const FULL_EXAM_SECONDS: u32 = 130 * 60;

/// Time budget of the short timed exam (20 minutes).
pub const SHORT_EXAM_SECONDS: u32 = 20 * 60;

/// Completed runs stay readable this long after their last request.
pub const COMPLETED_SESSION_TTL_MINS: i64 = 30;

/// Unfinished runs without a request for this long are dropped.
pub const IDLE_SESSION_TTL_MINS: i64 = 180;

/// Ceiling on live anonymous runs; the least recently used one makes room.
pub const MAX_ANONYMOUS_SESSIONS: usize = 1000;

pub const USERNAME_MAX_LEN: usize = 20;
pub const PASSWORD_MIN_LEN: usize = 6;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    /// Lifetime of backend tokens in seconds.
    pub jwt_expiration: u64,
    pub rust_log: String,
    pub admin_username: Option<String>,
    pub admin_password: Option<String>,
    /// Shortest accepted username. Sign-up and sign-in share this value.
    pub username_min_len: usize,
    /// Application-level ceiling on session age, independent of token expiry.
    pub session_max_age_days: i64,
    pub bind_addr: String,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv().ok();

        let database_url = env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://mock_exam.db?mode=rwc".to_string());

        let jwt_secret = env::var("JWT_SECRET")
            .expect("JWT_SECRET must be set");

        let rust_log = env::var("RUST_LOG")
            .unwrap_or_else(|_| "info".to_string());

        Self {
            database_url,
            jwt_secret,
            jwt_expiration: parse_or("JWT_EXPIRATION", 30 * 24 * 60 * 60),
            rust_log,
            admin_username: env::var("ADMIN_USERNAME").ok(),
            admin_password: env::var("ADMIN_PASSWORD").ok(),
            username_min_len: parse_or("USERNAME_MIN_LENGTH", 4),
            session_max_age_days: parse_or("SESSION_MAX_AGE_DAYS", 7),
            bind_addr: env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string()),
        }
    }

    /// Configuration used by tests and local tooling.
    pub fn for_tests(jwt_secret: &str) -> Self {
        Self {
            database_url: "sqlite::memory:".to_string(),
            jwt_secret: jwt_secret.to_string(),
            jwt_expiration: 30 * 24 * 60 * 60,
            rust_log: "error".to_string(),
            admin_username: None,
            admin_password: None,
            username_min_len: 4,
            session_max_age_days: 7,
            bind_addr: "127.0.0.1:0".to_string(),
        }
    }

    pub fn session_max_age(&self) -> Duration {
        Duration::days(self.session_max_age_days)
    }
}

fn parse_or<T: FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!("Ignoring invalid value for {}: {:?}", key, raw);
            default
        }),
        Err(_) => default,
    }
}
