// src/routes.rs

use axum::{
    Router,
    http::{HeaderName, HeaderValue, Method, header},
    middleware,
    routing::{get, post, put},
};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    handlers::{admin, auth, exam, history},
    state::AppState,
    utils::{
        device::DEVICE_HEADER,
        jwt::{admin_middleware, auth_middleware, viewer_middleware},
    },
};

/// Assembles the main application router.
///
/// * Exam routes work with or without a session; results are only stored
///   for signed-in users.
/// * History, resume and logout require a live session.
/// * Admin routes require the admin role.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin([
            HeaderValue::from_static("http://localhost:5173"),
            HeaderValue::from_static("http://127.0.0.1:5173"),
        ])
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            HeaderName::from_static(DEVICE_HEADER),
        ]);

    let require_auth = || middleware::from_fn_with_state(state.clone(), auth_middleware);

    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/cached", get(auth::cached))
        .merge(
            Router::new()
                .route("/logout", post(auth::logout))
                .route("/me", get(auth::me))
                .layer(require_auth()),
        );

    let exam_routes = Router::new()
        .route("/start", post(exam::start_exam))
        .route("/{id}", get(exam::get_exam).delete(exam::cancel_exam))
        .route("/{id}/confirm", post(exam::confirm_exam))
        .route("/{id}/answer", post(exam::answer))
        .route("/{id}/reveal", post(exam::reveal))
        .route("/{id}/next", post(exam::next_question))
        .route("/{id}/previous", post(exam::previous_question))
        .route("/{id}/finish", post(exam::finish_exam))
        .layer(middleware::from_fn_with_state(state.clone(), viewer_middleware))
        .merge(
            Router::new()
                .route(
                    "/resume",
                    get(exam::get_resume)
                        .post(exam::resume_exam)
                        .delete(exam::discard_resume),
                )
                .layer(require_auth()),
        );

    let history_routes = Router::new()
        .route("/", get(history::list_history))
        .route("/stats", get(history::history_stats))
        .route("/wrong", get(history::wrong_questions))
        .layer(require_auth());

    let admin_routes = Router::new()
        .route(
            "/questions",
            get(admin::list_questions).post(admin::create_question),
        )
        .route(
            "/questions/{id}",
            put(admin::update_question).delete(admin::delete_question),
        )
        .route("/users", get(admin::list_users))
        .route("/users/{id}/role", put(admin::update_user_role))
        .route("/results", get(admin::list_results))
        .route("/overview", get(admin::overview))
        // Double middleware protection: Auth first, then Admin check
        .layer(middleware::from_fn(admin_middleware))
        .layer(require_auth());

    Router::new()
        .nest("/api/auth", auth_routes)
        .nest("/api/exam", exam_routes)
        .nest("/api/history", history_routes)
        .nest("/api/admin", admin_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}
