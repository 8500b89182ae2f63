// src/state.rs

use std::sync::Arc;

use axum::extract::FromRef;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::error::AppError;
use crate::services::{
    admin::AdminService, auth::AuthSessionManager, bank::QuestionBank, exam::ExamService,
    results::ResultService,
};
use crate::store::{
    LocalStore, SqlIdentityProvider, SqlLocalStore, SqlProfileStore, SqlQuestionStore,
    SqlResultStore,
};

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub auth: Arc<AuthSessionManager>,
    pub exams: ExamService,
    pub results: ResultService,
    pub admin: AdminService,
    pub local: Arc<dyn LocalStore>,
}

impl AppState {
    /// Wires the SQLite adapters into the services.
    pub fn new(pool: SqlitePool, config: Config) -> Result<Self, AppError> {
        let questions = Arc::new(SqlQuestionStore::new(pool.clone()));
        let results_store = Arc::new(SqlResultStore::new(pool.clone()));
        let profiles = Arc::new(SqlProfileStore::new(pool.clone()));
        let identity = Arc::new(SqlIdentityProvider::new(
            pool.clone(),
            config.jwt_secret.clone(),
            config.jwt_expiration,
        ));

        let auth = AuthSessionManager::new(identity, profiles.clone(), &config)?;
        let results = ResultService::new(results_store.clone());
        let exams = ExamService::new(QuestionBank::new(questions.clone()), results.clone());
        let admin = AdminService::new(questions, profiles, results_store);

        Ok(Self {
            config,
            auth: Arc::new(auth),
            exams,
            results,
            admin,
            local: Arc::new(SqlLocalStore::new(pool)),
        })
    }
}

impl FromRef<AppState> for ExamService {
    fn from_ref(state: &AppState) -> Self {
        state.exams.clone()
    }
}

impl FromRef<AppState> for ResultService {
    fn from_ref(state: &AppState) -> Self {
        state.results.clone()
    }
}

impl FromRef<AppState> for AdminService {
    fn from_ref(state: &AppState) -> Self {
        state.admin.clone()
    }
}

impl FromRef<AppState> for Arc<AuthSessionManager> {
    fn from_ref(state: &AppState) -> Self {
        state.auth.clone()
    }
}
