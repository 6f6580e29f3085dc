//! Error types for request-sessions.

use std::fmt;
use std::sync::Arc;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::api::types::ErrorResponse;

/// Errors raised by a [`Store`](crate::session::Store) backend.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Backend-specific failure.
    #[error("store backend error: {0}")]
    Backend(String),

    /// A session value could not be (de)serialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal lock was poisoned.
    #[error("store lock poisoned")]
    LockPoisoned,
}

/// Main error type for session operations.
#[derive(Error, Debug)]
pub enum SessionError {
    /// A tracked session has no store bound at save time.
    #[error("sessions: missing store for session {0:?}")]
    MissingStore(String),

    /// The store failed to persist a session.
    #[error("sessions: error saving session {name:?} -- {source}")]
    Save {
        name: String,
        #[source]
        source: StoreError,
    },

    /// The store failed to create or load a session.
    #[error("sessions: error creating session {name:?} -- {source}")]
    Create {
        name: String,
        #[source]
        source: Arc<StoreError>,
    },

    /// A handler asked for a session but no session middleware ran.
    #[error("sessions: no session middleware installed for this request")]
    NotInstalled,

    /// The request-scoped registry lock was poisoned.
    #[error("sessions: registry lock poisoned")]
    LockPoisoned,

    /// One or more sessions failed to persist.
    #[error(transparent)]
    Persist(#[from] MultiError),
}

/// Convenience Result type for session operations.
pub type Result<T> = std::result::Result<T, SessionError>;

impl SessionError {
    fn code(&self) -> &'static str {
        match self {
            Self::MissingStore(_) => "MISSING_STORE",
            Self::Save { .. } | Self::Persist(_) => "SESSION_SAVE_FAILED",
            Self::Create { .. } => "SESSION_CREATE_FAILED",
            Self::NotInstalled => "SESSIONS_NOT_INSTALLED",
            Self::LockPoisoned => "INTERNAL_ERROR",
        }
    }

    fn details(&self) -> Option<String> {
        match self {
            Self::Save { source, .. } => Some(source.to_string()),
            Self::Create { source, .. } => Some(source.to_string()),
            Self::Persist(errs) => Some(format!("{} session(s) failed to save", errs.len())),
            _ => None,
        }
    }
}

impl IntoResponse for SessionError {
    fn into_response(self) -> Response {
        tracing::error!(error = %self, "session error");
        let mut body = ErrorResponse::new(self.code(), self.to_string());
        if let Some(details) = self.details() {
            body = body.with_details(details);
        }
        (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
    }
}

/// An ordered collection of errors reported as one.
///
/// Empty slots are skipped when counting and rendering. The message is the
/// first error's message followed by a count of the rest.
#[derive(Debug, Default)]
pub struct MultiError(Vec<Option<SessionError>>);

impl MultiError {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Append an error.
    pub fn push(&mut self, err: SessionError) {
        self.0.push(Some(err));
    }

    /// Number of non-empty slots.
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterate over the recorded errors in order, skipping empty slots.
    pub fn iter(&self) -> impl Iterator<Item = &SessionError> {
        self.0.iter().flatten()
    }

    /// `Ok(())` when nothing was recorded, otherwise `Err(self)`.
    pub fn into_result(self) -> std::result::Result<(), MultiError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl From<Vec<Option<SessionError>>> for MultiError {
    fn from(slots: Vec<Option<SessionError>>) -> Self {
        Self(slots)
    }
}

impl fmt::Display for MultiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut errors = self.iter();
        let Some(first) = errors.next() else {
            return f.write_str("(0 errors)");
        };
        match errors.count() {
            0 => write!(f, "{}", first),
            1 => write!(f, "{} (and 1 other error)", first),
            n => write!(f, "{} (and {} other errors)", first, n),
        }
    }
}

impl std::error::Error for MultiError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.iter()
            .next()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}
