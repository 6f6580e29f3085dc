//! REST API handlers for the demo application.

use axum::{http::StatusCode, Json};

use super::middleware::CurrentSession;
use super::types::{FlashRequest, FlashesResponse, VisitsResponse};
use crate::error::Result;

/// Session key holding the visit counter.
pub const VISITS_KEY: &str = "visits";

/// Health check endpoint.
pub async fn health() -> &'static str {
    "OK"
}

/// API information endpoint.
pub async fn api_info(session: CurrentSession) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "name": "request-sessions",
        "version": env!("CARGO_PKG_VERSION"),
        "session": session.name(),
        "status": "running"
    }))
}

/// Count visits in the current session.
pub async fn visits(session: CurrentSession) -> Result<Json<VisitsResponse>> {
    let response = session.with(|s| {
        let visits = s.get_as::<u64>(VISITS_KEY).unwrap_or(0) + 1;
        s.set(VISITS_KEY, visits);
        VisitsResponse {
            visits,
            new_session: s.is_new,
        }
    })?;

    Ok(Json(response))
}

/// Queue a flash message for the next read.
pub async fn add_flash(
    session: CurrentSession,
    Json(req): Json<FlashRequest>,
) -> Result<StatusCode> {
    session.with(|s| match req.key.as_deref() {
        Some(key) => s.add_flash_to(key, req.message),
        None => s.add_flash(req.message),
    })?;

    Ok(StatusCode::ACCEPTED)
}

/// Consume pending flash messages.
pub async fn take_flashes(session: CurrentSession) -> Result<Json<FlashesResponse>> {
    let messages = session.flashes()?;
    Ok(Json(FlashesResponse::new(messages)))
}

/// Clear the session and expire its cookie.
pub async fn destroy_session(session: CurrentSession) -> Result<StatusCode> {
    session.with(|s| {
        s.clear();
        let options = s.options.clone().unwrap_or_default();
        s.options = Some(options.expired());
    })?;

    Ok(StatusCode::NO_CONTENT)
}
