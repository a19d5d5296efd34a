mod api;
mod catalog;
mod config;
mod db;
mod error;
mod ledger;
mod shopping;
mod shortlink;
mod writer;

use std::sync::Arc;

use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use api::AppState;
use config::ServerConfig;

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "foodgram=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::from_env();

    // Initialize database
    let db_path = config.db_path();
    let db = db::init_database(&db_path)
        .await
        .expect("Failed to initialize database");
    tracing::info!("Database initialized at {:?}", db_path);

    let addr = config.bind_addr;
    let state = Arc::new(AppState::new(Arc::new(db), config));

    let app = api::router()
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    tracing::info!("Foodgram server starting on http://{}", addr);
    tracing::info!("  POST /api/users/              - Register new user");
    tracing::info!("  POST /api/auth/token/login/   - Login and get token");
    tracing::info!("  GET  /api/recipes/            - Browse recipes");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind listener");
    axum::serve(listener, app).await.expect("Server error");
}
