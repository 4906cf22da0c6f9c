mod auth;
mod conversation;
mod db;
mod error;
mod message;
mod middleware;
mod notification;
mod pagination;
mod population;
mod routes;
mod state;
mod user;
mod websocket;

#[cfg(test)]
mod testing;

use anyhow::Context;
use conversation::ConversationRepository;
use db::{create_pool, run_migrations};
use message::MessageRepository;
use routes::create_router;
use state::{AppState, Config};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use user::UserRepository;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenv::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,chat_backend=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    tracing::info!("Connecting to database at {}...", config.redacted_database_url());
    let db = create_pool(&config.database_url, config.database_max_connections)
        .await
        .with_context(|| {
            format!(
                "Failed to connect to database at {}",
                config.redacted_database_url()
            )
        })?;

    tracing::info!("Running migrations...");
    run_migrations(&db).await.context("Failed to run migrations")?;

    let users = Arc::new(UserRepository::new(db.clone()));
    let conversations = Arc::new(ConversationRepository::new(db.clone()));
    let messages = Arc::new(MessageRepository::new(db));

    let addr = format!("{}:{}", config.host, config.port);
    let state = AppState::new(config, users, conversations, messages);
    let app = create_router(state);

    tracing::info!("Server starting on http://{}", addr);
    tracing::info!("Swagger UI available at http://{}/swagger-ui", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
