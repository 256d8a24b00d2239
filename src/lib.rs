//! Real-time chat relay.
//!
//! Clients connect over a WebSocket at `/ws`, declare who they are, and exchange
//! messages either with everyone connected or privately within a two-person room.
//! Private messages are also written to a [`database::MessageStore`]; the REST
//! routes under `/api/messages` read and mark them.
//!
//! Presence and room membership only live in memory. They are rebuilt as clients
//! reconnect, and nothing is redelivered.
//!
//! # Events
//!
//! Frames are JSON objects tagged by `type`:
//!
//! ```json
//! {"type":"userOnline","username":"alice"}
//! {"type":"joinRoom","senderUsername":"alice","recipientUsername":"bob"}
//! {"type":"sendPrivateMessage","senderUsername":"alice","recipientUsername":"bob","message":"hi"}
//! ```
//!
//! # Environment
//!
//! - `PORT` (default `5000`)
//! - `DATABASE_URL` (PostgreSQL; without it messages are kept in memory)
//! - `CLIENT_ORIGIN` (default `http://localhost:3000`)
//! - `DB_MAX_CONNECTIONS` (default `5`)
//! - `RUST_LOG` (default `info`)
use std::sync::Arc;

use anyhow::Context;
use axum::{
    Router,
    http::{HeaderValue, Method, header::CONTENT_TYPE},
    routing::{get, put},
};
use tokio::{net::TcpListener, signal};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt};

pub mod config;
pub mod database;
pub mod error;
pub mod models;
pub mod presence;
pub mod relay;
pub mod rooms;
pub mod routes;
pub mod state;
pub mod websocket;

use config::Config;
use database::{MemoryMessageStore, MessageStore, PgMessageStore};
use routes::{health_handler, history_handler, mark_read_handler, unread_handler};
use state::ChatState;
use websocket::websocket_handler;

/// Routes without the CORS and tracing layers.
pub fn app(state: ChatState) -> Router {
    Router::new()
        .route("/ws", get(websocket_handler))
        .route("/api/messages/unread", get(unread_handler))
        .route("/api/messages/mark-read", put(mark_read_handler))
        .route("/api/messages/history", get(history_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

/// Browser access for the client at `origin`, limited to the methods the routes accept.
pub fn cors_layer(origin: HeaderValue) -> CorsLayer {
    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::PUT])
        .allow_headers([CONTENT_TYPE])
}

pub async fn start_server() -> anyhow::Result<()> {
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::load();

    info!("Initializing message store...");
    let store: Arc<dyn MessageStore> = match &config.database_url {
        Some(url) => Arc::new(
            PgMessageStore::connect(url, config.db_max_connections)
                .await
                .context("failed to connect to the message database")?,
        ),
        None => {
            warn!("DATABASE_URL not set, private messages will only be kept in memory");
            Arc::new(MemoryMessageStore::new())
        }
    };

    let origin = HeaderValue::from_str(&config.client_origin)
        .with_context(|| format!("invalid CLIENT_ORIGIN {:?}", config.client_origin))?;
    let app = app(ChatState::new(store))
        .layer(cors_layer(origin))
        .layer(TraceLayer::new_for_http());

    let address = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind {address}"))?;
    info!("Server running on {address}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("Server shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");

        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;

        info!("Received terminate signal, shutting down");
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
