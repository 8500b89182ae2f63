// src/main.rs

use dotenvy::dotenv;
use mock_exam::config::Config;
use mock_exam::error::AppError;
use mock_exam::models::user::Role;
use mock_exam::routes;
use mock_exam::state::AppState;
use mock_exam::store::{self, IdentityProvider, ProfileStore, SqlIdentityProvider, SqlProfileStore};
use sqlx::SqlitePool;
use std::time::Duration;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // Load .env file (if present)
    dotenv().ok();

    let config = Config::from_env();

    let file_appender = tracing_appender::rolling::daily("logs", "app.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let env_filter = EnvFilter::new(&config.rust_log);
    let stdout_layer = fmt::layer().with_writer(std::io::stdout).with_target(false);
    let file_layer = fmt::layer().with_writer(non_blocking).with_ansi(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .init();

    // Initialize Database Pool with Retry
    let mut retry_count = 0;
    let pool = loop {
        match store::connect(&config.database_url).await {
            Ok(pool) => break pool,
            Err(e) => {
                retry_count += 1;
                if retry_count > 5 {
                    panic!("Failed to open database after 5 retries: {}", e);
                }
                tracing::warn!("Database not ready, retrying in 2s... (Attempt {})", retry_count);
                tokio::time::sleep(Duration::from_secs(2)).await;
            }
        }
    };

    tracing::info!("Database connected...");

    tracing::info!("Running migrations...");
    store::migrate(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Migrations applied successfully.");

    if let Err(e) = seed_admin_user(&pool, &config).await {
        tracing::error!("Failed to seed admin user: {:?}", e);
    }

    let state = AppState::new(pool, config.clone()).expect("Failed to build application state");
    state.exams.spawn_sweeper();
    let app = routes::create_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind listening address");
    tracing::info!("Mock exam server listening on {}", config.bind_addr);

    axum::serve(listener, app).await.expect("Server error");
}

/// Creates the configured admin account on first start.
async fn seed_admin_user(pool: &SqlitePool, config: &Config) -> Result<(), AppError> {
    let (Some(username), Some(password)) = (&config.admin_username, &config.admin_password) else {
        return Ok(());
    };

    let profiles = SqlProfileStore::new(pool.clone());
    if profiles.find_by_username(username).await?.is_some() {
        return Ok(());
    }

    tracing::info!("Seeding admin user: {}", username);
    let identity = SqlIdentityProvider::new(
        pool.clone(),
        config.jwt_secret.clone(),
        config.jwt_expiration,
    );
    let issued = identity.sign_up(username, password).await?;
    identity.sign_out(&issued.token).await?;
    profiles.update_role(&issued.user.id, Role::Admin).await?;
    tracing::info!("Admin user created successfully.");
    Ok(())
}
