//! HTTP layer for request-sessions.
//!
//! [`middleware`] is the axum glue that gives each request its own session
//! registry. The remaining modules form a small demo application on top of it.
//!
//! ## Endpoints
//!
//! - `GET /health` - Health check
//! - `GET /api/v1` - API information
//! - `GET /api/v1/visits` - Increment and return the session's visit counter
//! - `POST /api/v1/flash` - Queue a flash message
//! - `GET /api/v1/flash` - Consume queued flash messages
//! - `DELETE /api/v1/session` - Clear the session and expire its cookie
//!
//! ## Example
//!
//! ```no_run
//! use request_sessions::api::{serve, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> std::io::Result<()> {
//!     let config = ServerConfig::new("127.0.0.1", 3000).with_session_name("sid");
//!     serve(config).await
//! }
//! ```

pub mod handlers;
pub mod middleware;
pub mod router;
pub mod types;

// Re-export commonly used types
pub use middleware::{sessions_middleware, CurrentSession, RequestSessions, SessionManager};
pub use router::{create_router, create_router_with_manager, serve, ServerConfig};
pub use types::{ErrorResponse, FlashRequest, FlashesResponse, VisitsResponse};
