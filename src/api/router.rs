//! API router configuration.

use std::sync::Arc;

use axum::{
    middleware::from_fn_with_state,
    routing::{delete, get},
    Router,
};
use tower_http::trace::TraceLayer;

use super::handlers::{add_flash, api_info, destroy_session, health, take_flashes, visits};
use super::middleware::{sessions_middleware, SessionManager};
use crate::session::{MemoryStore, Options};

/// Create the demo router backed by a fresh in-memory store.
pub fn create_router() -> Router {
    let config = ServerConfig::default();
    create_router_with_manager(config.session_manager())
}

/// Create the demo router with a custom session manager.
pub fn create_router_with_manager(manager: SessionManager) -> Router {
    // API v1 routes, all session-aware
    let api_v1 = Router::new()
        .route("/", get(api_info))
        .route("/visits", get(visits))
        .route("/flash", get(take_flashes).post(add_flash))
        .route("/session", delete(destroy_session))
        .layer(from_fn_with_state(manager, sessions_middleware));

    Router::new()
        .route("/health", get(health))
        .nest("/api/v1", api_v1)
        .layer(TraceLayer::new_for_http())
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host address to bind to.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
    /// Name of the session cookie.
    pub session_name: String,
    /// Cookie options for new sessions.
    pub options: Options,
}

impl ServerConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    pub fn with_session_name(mut self, name: impl Into<String>) -> Self {
        self.session_name = name.into();
        self
    }

    pub fn with_options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Build a session manager over a new in-memory store.
    pub fn session_manager(&self) -> SessionManager {
        let store = Arc::new(MemoryStore::with_options(self.options.clone()));
        SessionManager::new(self.session_name.clone(), store).with_options(self.options.clone())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            session_name: "session".to_string(),
            options: Options::default(),
        }
    }
}

/// Start the API server.
pub async fn serve(config: ServerConfig) -> std::io::Result<()> {
    let addr = config.bind_address();
    let router = create_router_with_manager(config.session_manager());

    tracing::info!(
        "Starting request-sessions demo server on {} (session cookie {:?})",
        addr,
        config.session_name
    );

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
}

/// Resolve on Ctrl+C.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received, finishing in-flight requests");
}
