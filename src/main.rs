use axum::{routing::get, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use codehive::engine::CompletionEngine;
use codehive::state::{AppConfig, AppState};
use codehive::store::MemoryStore;
use codehive::ws;

#[tokio::main]
async fn main() {
    // Load .env file if present (before any env var reads)
    if let Err(e) = dotenvy::dotenv() {
        // Not an error if .env doesn't exist, only log if it's a different issue
        if !matches!(e, dotenvy::Error::Io(_)) {
            eprintln!("Warning: Failed to load .env file: {}", e);
        }
    }

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "codehive=debug,tower_http=debug,axum=trace".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting codehive...");

    let config = AppConfig::from_env();

    // Initialize the generation engine
    let engine: Option<Arc<dyn CompletionEngine>> = match config.engine.build_engine() {
        Ok(engine) => {
            tracing::info!("Generation engine initialized successfully");
            Some(Arc::new(engine))
        }
        Err(e) => {
            tracing::warn!(
                "Failed to initialize generation engine: {}. AI chat will not be available.",
                e
            );
            None
        }
    };

    // Single-process in-memory store; users and chat history do not survive
    // a restart.
    let store = Arc::new(MemoryStore::new());

    let state = AppState::new(config, engine, store.clone(), store);

    let app = Router::new()
        .route("/ws/chat", get(ws::chat_ws_handler))
        .route("/ws/team/{room_id}", get(ws::team_ws_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], 8000));
    tracing::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}
