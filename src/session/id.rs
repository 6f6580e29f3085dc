//! Session identifier type used by [`MemoryStore`](super::MemoryStore).

use std::fmt;
use std::str::FromStr;

use uuid::Uuid;

use crate::error::StoreError;

/// Identifier for a stored session record.
///
/// Backed by a random v4 UUID, so a client holding one ID learns nothing
/// about any other. The cookie form is `sess-` followed by 32 hex digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Create a new random session ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sess-{}", self.0.simple())
    }
}

impl FromStr for SessionId {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.strip_prefix("sess-")
            .filter(|hex| hex.len() == 32)
            .and_then(|hex| Uuid::try_parse(hex).ok())
            .map(SessionId)
            .ok_or_else(|| StoreError::Backend(format!("malformed session id: {s:?}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_uniqueness() {
        let mut ids = HashSet::new();
        for _ in 0..10_000 {
            let id = SessionId::new();
            assert!(ids.insert(id), "Duplicate ID generated: {}", id);
        }
    }

    #[test]
    fn test_display_format() {
        let id = SessionId::new().to_string();
        let hex = id.strip_prefix("sess-").unwrap();
        assert_eq!(hex.len(), 32);
        assert!(hex.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_ids_are_not_sequential() {
        let a = SessionId::new().to_string();
        let b = SessionId::new().to_string();
        // Consecutive IDs share no long common prefix after the tag.
        let shared = a.chars().zip(b.chars()).take_while(|(x, y)| x == y).count();
        assert!(shared < "sess-".len() + 8);
    }

    #[test]
    fn test_parse_invalid() {
        assert!("0123456789abcdef0123456789abcdef".parse::<SessionId>().is_err());
        assert!("session-0123456789abcdef0123456789abcdef".parse::<SessionId>().is_err());
        assert!("sess-ff".parse::<SessionId>().is_err());
        assert!("sess-gggggggggggggggggggggggggggggggg".parse::<SessionId>().is_err());
        assert!("sess-0123456789abcdef-0123456789abcde".parse::<SessionId>().is_err());
        assert!("".parse::<SessionId>().is_err());
    }

    #[test]
    fn test_roundtrip() {
        let id = SessionId::new();
        let parsed: SessionId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }
}
