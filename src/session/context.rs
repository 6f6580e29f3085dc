//! Request-scoped context threaded through store calls.

use std::collections::HashMap;

use axum::http::{header::COOKIE, HeaderMap};

use super::Cookie;

/// Per-request handle passed to every [`Store`](super::Store) call.
///
/// Carries the cookies the client sent and collects the `Set-Cookie`
/// values stores want written back. The registry never looks inside.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// Cookies sent with the request.
    cookies: HashMap<String, String>,
    /// Cookies queued for the response.
    outgoing: Vec<Cookie>,
}

impl RequestContext {
    /// Create an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a context from the request's `Cookie` headers.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let mut ctx = Self::new();
        for value in headers.get_all(COOKIE) {
            ctx.parse_cookie_header(value.as_bytes());
        }
        ctx
    }

    /// Add a request cookie directly.
    pub fn with_cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.cookies.insert(name.into(), value.into());
        self
    }

    /// Parse one `Cookie` header. Pairs that are not UTF-8 are skipped on
    /// their own; the rest of the header still applies.
    fn parse_cookie_header(&mut self, raw: &[u8]) {
        for pair in raw.split(|b| *b == b';') {
            let Ok(pair) = std::str::from_utf8(pair) else {
                continue;
            };
            let Some((name, value)) = pair.split_once('=') else {
                continue;
            };
            let name = name.trim();
            if name.is_empty() {
                continue;
            }
            let value = unquote(value.trim());
            // First occurrence wins, matching how browsers order by path specificity.
            self.cookies
                .entry(name.to_string())
                .or_insert_with(|| value.to_string());
        }
    }

    /// Get a request cookie by name.
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(|s| s.as_str())
    }

    /// Queue a cookie for the response. A later cookie with the same name
    /// replaces an earlier one.
    pub fn set_cookie(&mut self, cookie: Cookie) {
        self.outgoing.retain(|c| c.name != cookie.name);
        self.outgoing.push(cookie);
    }

    /// Cookies queued so far.
    pub fn outgoing(&self) -> &[Cookie] {
        &self.outgoing
    }

    /// Drain the queued cookies.
    pub fn take_outgoing(&mut self) -> Vec<Cookie> {
        std::mem::take(&mut self.outgoing)
    }
}

/// Strip one surrounding pair of double quotes, if present.
fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}
