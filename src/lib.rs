//! # request-sessions
//!
//! Per-request session registry for axum.
//!
//! Each request gets a [`Registry`] that hands out at most one [`Session`]
//! per name, creating it lazily through a pluggable [`Store`]. When the
//! request finishes, every modified session is persisted in one pass and
//! any failures are reported together as a [`MultiError`].
//!
//! ## Features
//!
//! - **Lazy sessions**: stores are only consulted for names a handler uses
//! - **Dirty tracking**: untouched sessions are never written back
//! - **Flash messages**: one-shot values consumed on first read
//! - **Multiple sessions**: stack middleware layers, one registry per request
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use axum::{middleware::from_fn_with_state, routing::get, Router};
//! use request_sessions::api::{sessions_middleware, CurrentSession, SessionManager};
//! use request_sessions::MemoryStore;
//!
//! async fn hello(session: CurrentSession) -> request_sessions::Result<String> {
//!     session.add_flash("welcome back")?;
//!     Ok(format!("hello from {}", session.name()))
//! }
//!
//! #[tokio::main]
//! async fn main() -> std::io::Result<()> {
//!     request_sessions::logging::try_init().ok();
//!
//!     let manager = SessionManager::new("sid", Arc::new(MemoryStore::new()));
//!     let app = Router::new()
//!         .route("/", get(hello))
//!         .layer(from_fn_with_state(manager, sessions_middleware));
//!
//!     let listener = tokio::net::TcpListener::bind("127.0.0.1:3000").await?;
//!     axum::serve(listener, app).await
//! }
//! ```

pub mod api;
pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod session;

// Re-export commonly used types
pub use error::{MultiError, Result, SessionError, StoreError};
pub use session::{
    new_cookie, Cookie, MemoryStore, Options, Registry, RequestContext, Session, SessionId, Store,
    FLASHES_KEY,
};
