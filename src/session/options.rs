//! Cookie options and `Set-Cookie` rendering.

use std::fmt;

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Presentation hints for a session or store.
///
/// Fields are a subset of cookie attributes. The registry only carries
/// them; stores and the cookie layer interpret them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    pub path: String,
    pub domain: String,
    /// `0` means no `Max-Age` attribute. Negative means delete the cookie
    /// now. Positive is a lifetime in seconds.
    pub max_age: i64,
    pub secure: bool,
    pub http_only: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            path: "/".to_string(),
            domain: String::new(),
            max_age: 3600,
            secure: false,
            http_only: true,
        }
    }
}

impl Options {
    /// Options that expire the cookie immediately.
    pub fn expired(&self) -> Self {
        Self {
            max_age: -1,
            ..self.clone()
        }
    }
}

/// A cookie ready to be written as a `Set-Cookie` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub path: String,
    pub domain: String,
    pub max_age: i64,
    pub expires: Option<DateTime<Utc>>,
    pub secure: bool,
    pub http_only: bool,
}

/// Build a cookie from a name, value and options.
///
/// `Expires` is derived from `max_age` for clients that ignore `Max-Age`.
pub fn new_cookie(name: impl Into<String>, value: impl Into<String>, options: &Options) -> Cookie {
    let expires = match options.max_age {
        age if age > 0 => {
            Duration::try_seconds(age).and_then(|d| Utc::now().checked_add_signed(d))
        }
        age if age < 0 => Utc.timestamp_opt(1, 0).single(),
        _ => None,
    };

    Cookie {
        name: name.into(),
        value: value.into(),
        path: options.path.clone(),
        domain: options.domain.clone(),
        max_age: options.max_age,
        expires,
        secure: options.secure,
        http_only: options.http_only,
    }
}

impl fmt::Display for Cookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.name, self.value)?;
        if !self.path.is_empty() {
            write!(f, "; Path={}", self.path)?;
        }
        if !self.domain.is_empty() {
            write!(f, "; Domain={}", self.domain)?;
        }
        if let Some(expires) = self.expires {
            write!(f, "; Expires={}", expires.format("%a, %d %b %Y %H:%M:%S GMT"))?;
        }
        match self.max_age {
            age if age > 0 => write!(f, "; Max-Age={}", age)?,
            age if age < 0 => f.write_str("; Max-Age=0")?,
            _ => {}
        }
        if self.http_only {
            f.write_str("; HttpOnly")?;
        }
        if self.secure {
            f.write_str("; Secure")?;
        }
        Ok(())
    }
}
