//! Session middleware and extractors for axum.
//!
//! [`sessions_middleware`] attaches a per-request [`Registry`] to the
//! request, opens its named session, and flushes modified sessions once the
//! inner service has produced a response. Handlers reach the sessions
//! through the [`RequestSessions`] and [`CurrentSession`] extractors.

use std::sync::{Arc, Mutex, MutexGuard};

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header::SET_COOKIE, request::Parts, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::{debug, error, warn};

use crate::error::{Result, SessionError};
use crate::session::{Options, Registry, RequestContext, Session, Store};

/// Configuration for one named session.
#[derive(Clone)]
pub struct SessionManager {
    name: String,
    store: Arc<dyn Store>,
    options: Options,
}

impl SessionManager {
    /// Create a manager for the session `name` backed by `store`.
    pub fn new(name: impl Into<String>, store: Arc<dyn Store>) -> Self {
        Self {
            name: name.into(),
            store,
            options: Options::default(),
        }
    }

    /// Options applied to sessions the store returns without any.
    pub fn with_options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn options(&self) -> &Options {
        &self.options
    }
}

/// Shared handle to the request's [`Registry`].
///
/// The registry lives in request extensions, which must be `Send + Sync`,
/// so it sits behind a mutex that is never contended within a request.
#[derive(Clone)]
pub struct RequestSessions(Arc<Mutex<Registry>>);

impl RequestSessions {
    pub fn new(registry: Registry) -> Self {
        Self(Arc::new(Mutex::new(registry)))
    }

    fn lock(&self) -> Result<MutexGuard<'_, Registry>> {
        self.0.lock().map_err(|_| SessionError::LockPoisoned)
    }

    /// Run `f` with exclusive access to the registry.
    pub fn with_registry<R>(&self, f: impl FnOnce(&mut Registry) -> R) -> Result<R> {
        let mut registry = self.lock()?;
        Ok(f(&mut registry))
    }

    /// Run `f` on the session `name`, creating it through `store` if needed.
    ///
    /// Fails if the store could not create the session.
    pub fn with_session<R>(
        &self,
        store: Arc<dyn Store>,
        name: &str,
        f: impl FnOnce(&mut Session) -> R,
    ) -> Result<R> {
        let mut registry = self.lock()?;
        let (session, error) = registry.get(store, name);
        if let Some(source) = error {
            return Err(SessionError::Create {
                name: name.to_string(),
                source,
            });
        }
        Ok(f(session))
    }

    /// Register the manager's session, failing if the store could not
    /// create it.
    fn open(&self, manager: &SessionManager) -> Result<()> {
        self.with_session(manager.store.clone(), &manager.name, |session| {
            if session.options.is_none() {
                session.options = Some(manager.options.clone());
            }
        })
    }

    /// Persist modified sessions and copy queued cookies onto `response`.
    fn finish(&self, response: &mut Response) -> Result<()> {
        let mut registry = self.lock()?;

        if let Err(errors) = registry.save_dirty() {
            error!(failed = errors.len(), error = %errors, "failed to persist sessions");
        }

        for cookie in registry.context_mut().take_outgoing() {
            match HeaderValue::from_str(&cookie.to_string()) {
                Ok(value) => {
                    response.headers_mut().append(SET_COOKIE, value);
                }
                Err(_) => warn!(cookie = %cookie.name, "dropping cookie with invalid header value"),
            }
        }
        Ok(())
    }
}

impl<S: Send + Sync> FromRequestParts<S> for RequestSessions {
    type Rejection = SessionError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self> {
        parts
            .extensions
            .get::<RequestSessions>()
            .cloned()
            .ok_or(SessionError::NotInstalled)
    }
}

/// The session opened by the innermost session middleware.
#[derive(Clone)]
struct ActiveSession {
    name: String,
    store: Arc<dyn Store>,
}

/// Extractor for the session the nearest [`sessions_middleware`] opened.
#[derive(Clone)]
pub struct CurrentSession {
    sessions: RequestSessions,
    active: ActiveSession,
}

impl CurrentSession {
    pub fn name(&self) -> &str {
        &self.active.name
    }

    /// Run `f` on the session.
    pub fn with<R>(&self, f: impl FnOnce(&mut Session) -> R) -> Result<R> {
        self.sessions
            .with_session(self.active.store.clone(), &self.active.name, f)
    }

    pub fn get(&self, key: &str) -> Result<Option<serde_json::Value>> {
        self.with(|s| s.get(key).cloned())
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Result<()> {
        self.with(|s| s.set(key, value))
    }

    pub fn delete(&self, key: &str) -> Result<Option<serde_json::Value>> {
        self.with(|s| s.delete(key))
    }

    pub fn add_flash(&self, value: impl Into<serde_json::Value>) -> Result<()> {
        self.with(|s| s.add_flash(value))
    }

    pub fn flashes(&self) -> Result<Vec<serde_json::Value>> {
        self.with(|s| s.flashes())
    }

    /// Handle to every session of the request.
    pub fn sessions(&self) -> &RequestSessions {
        &self.sessions
    }
}

impl<S: Send + Sync> FromRequestParts<S> for CurrentSession {
    type Rejection = SessionError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self> {
        let sessions = RequestSessions::from_request_parts(parts, state).await?;
        let active = parts
            .extensions
            .get::<ActiveSession>()
            .cloned()
            .ok_or(SessionError::NotInstalled)?;
        Ok(Self { sessions, active })
    }
}

/// Session middleware for axum.
///
/// Install with `axum::middleware::from_fn_with_state(manager, sessions_middleware)`.
/// Stacking several layers with different names shares one registry; the
/// outermost layer owns it and performs the single save at the end.
pub async fn sessions_middleware(
    State(manager): State<SessionManager>,
    mut request: Request,
    next: Next,
) -> Response {
    let existing = request.extensions().get::<RequestSessions>().cloned();
    let (sessions, owner) = match existing {
        Some(existing) => (existing, false),
        None => {
            let context = RequestContext::from_headers(request.headers());
            let sessions = RequestSessions::new(Registry::new(context));
            request.extensions_mut().insert(sessions.clone());
            (sessions, true)
        }
    };

    if let Err(err) = sessions.open(&manager) {
        return err.into_response();
    }
    debug!(session = %manager.name, owner, "session attached");

    request.extensions_mut().insert(ActiveSession {
        name: manager.name.clone(),
        store: manager.store.clone(),
    });

    let mut response = next.run(request).await;

    if owner {
        if let Err(err) = sessions.finish(&mut response) {
            error!(error = %err, "session teardown failed");
        }
    }

    response
}
