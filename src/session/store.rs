//! Store capability and the in-memory backend.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::debug;

use super::{new_cookie, Options, RequestContext, Session, SessionId};
use crate::error::StoreError;

type Values = HashMap<String, Value>;

/// Pluggable persistence backend for sessions.
///
/// Implementations are shared across requests and must handle their own
/// synchronization.
pub trait Store: Send + Sync {
    /// Create a new session for `name`, or load the existing one the
    /// request refers to.
    fn new_session(&self, ctx: &RequestContext, name: &str) -> Result<Session, StoreError>;

    /// Persist `session` under its name. May assign `session.id`.
    fn save(&self, ctx: &mut RequestContext, session: &mut Session) -> Result<(), StoreError>;
}

/// A stored session and the moment it stops being valid.
#[derive(Debug)]
struct Record {
    values: Values,
    /// `None` for browser-session cookies (`max_age == 0`).
    expires_at: Option<Instant>,
}

impl Record {
    fn new(values: Values, options: &Options, now: Instant) -> Self {
        let expires_at = u64::try_from(options.max_age)
            .ok()
            .filter(|secs| *secs > 0)
            .and_then(|secs| now.checked_add(Duration::from_secs(secs)));
        Self { values, expires_at }
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Process-local session store.
///
/// Records are keyed by [`SessionId`], which travels in a cookie named
/// after the session. A record lives for the `max_age` it was saved with:
/// once that passes it reads as absent and is purged on the next save
/// that creates a record, or by [`MemoryStore::remove_expired`].
pub struct MemoryStore {
    records: RwLock<HashMap<SessionId, Record>>,
    options: Options,
}

impl MemoryStore {
    /// Create an empty store with default cookie options.
    pub fn new() -> Self {
        Self::with_options(Options::default())
    }

    /// Create an empty store whose sessions start with `options`.
    pub fn with_options(options: Options) -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            options,
        }
    }

    /// Get the number of stored records, expired ones included until purged.
    pub fn count(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    /// Get a copy of the values stored for `id`, if the record is live.
    pub fn get(&self, id: &SessionId) -> Result<Option<Values>, StoreError> {
        let records = self.records.read().map_err(|_| StoreError::LockPoisoned)?;
        let now = Instant::now();
        Ok(records
            .get(id)
            .filter(|record| !record.is_expired(now))
            .map(|record| record.values.clone()))
    }

    /// Drop every expired record, returning how many were removed.
    pub fn remove_expired(&self) -> Result<usize, StoreError> {
        let mut records = self.records.write().map_err(|_| StoreError::LockPoisoned)?;
        Ok(purge_expired(&mut records, Instant::now()))
    }

    fn lookup(
        &self,
        ctx: &RequestContext,
        name: &str,
    ) -> Result<Option<(SessionId, Values)>, StoreError> {
        let Some(raw) = ctx.cookie(name) else {
            return Ok(None);
        };
        let Ok(id) = raw.parse::<SessionId>() else {
            debug!(session = name, "ignoring malformed session cookie");
            return Ok(None);
        };
        Ok(self.get(&id)?.map(|values| (id, values)))
    }
}

fn purge_expired(records: &mut HashMap<SessionId, Record>, now: Instant) -> usize {
    let before = records.len();
    records.retain(|_, record| !record.is_expired(now));
    let removed = before - records.len();
    if removed > 0 {
        debug!(removed, "purged expired sessions");
    }
    removed
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Store for MemoryStore {
    fn new_session(&self, ctx: &RequestContext, name: &str) -> Result<Session, StoreError> {
        let mut session = Session::new(name);
        session.options = Some(self.options.clone());

        if let Some((id, values)) = self.lookup(ctx, name)? {
            debug!(session = name, %id, "loaded session");
            session = session.with_values(values);
            session.id = Some(id.to_string());
            session.is_new = false;
        }

        Ok(session)
    }

    fn save(&self, ctx: &mut RequestContext, session: &mut Session) -> Result<(), StoreError> {
        let options = session.options.clone().unwrap_or_else(|| self.options.clone());
        let existing = session.id.as_deref().and_then(|raw| raw.parse::<SessionId>().ok());
        let now = Instant::now();

        let mut records = self.records.write().map_err(|_| StoreError::LockPoisoned)?;

        if options.max_age < 0 {
            if let Some(id) = existing {
                records.remove(&id);
                debug!(session = session.name(), %id, "deleted session");
            }
            ctx.set_cookie(new_cookie(session.name(), "", &options));
            return Ok(());
        }

        let id = match existing {
            Some(id) => id,
            None => {
                purge_expired(&mut records, now);
                SessionId::new()
            }
        };
        records.insert(id, Record::new(session.values().clone(), &options, now));
        session.id = Some(id.to_string());

        debug!(session = session.name(), %id, "saved session");
        ctx.set_cookie(new_cookie(session.name(), id.to_string(), &options));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;
    use std::thread;

    fn saved(store: &MemoryStore, name: &str, key: &str, value: Value) -> String {
        let mut ctx = RequestContext::new();
        let mut session = store.new_session(&ctx, name).unwrap();
        session.set(key, value);
        store.save(&mut ctx, &mut session).unwrap();
        session.id.unwrap()
    }

    #[test]
    fn test_new_session_without_cookie() {
        let store = MemoryStore::new();
        let session = store.new_session(&RequestContext::new(), "main").unwrap();

        assert!(session.is_new);
        assert!(session.id.is_none());
        assert_eq!(session.options, Some(Options::default()));
        assert_eq!(store.count(), 0);
    }

    #[test]
    fn test_save_assigns_id_and_cookie() {
        let store = MemoryStore::new();
        let mut ctx = RequestContext::new();
        let mut session = store.new_session(&ctx, "main").unwrap();
        session.set("user", "alice");

        store.save(&mut ctx, &mut session).unwrap();

        let id = session.id.clone().unwrap();
        assert!(id.starts_with("sess-"));
        assert_eq!(store.count(), 1);

        let cookies = ctx.outgoing();
        assert_eq!(cookies.len(), 1);
        assert_eq!(cookies[0].name, "main");
        assert_eq!(cookies[0].value, id);
    }

    #[test]
    fn test_load_from_cookie() {
        let store = MemoryStore::new();
        let id = saved(&store, "main", "user", json!("alice"));

        let ctx = RequestContext::new().with_cookie("main", id.clone());
        let session = store.new_session(&ctx, "main").unwrap();

        assert!(!session.is_new);
        assert_eq!(session.id, Some(id));
        assert_eq!(session.get("user"), Some(&json!("alice")));
        assert!(!session.is_dirty());
    }

    #[test]
    fn test_resave_keeps_id() {
        let store = MemoryStore::new();
        let id = saved(&store, "main", "n", json!(1));

        let mut ctx = RequestContext::new().with_cookie("main", id.clone());
        let mut session = store.new_session(&ctx, "main").unwrap();
        session.set("n", 2);
        store.save(&mut ctx, &mut session).unwrap();

        assert_eq!(session.id, Some(id.clone()));
        assert_eq!(store.count(), 1);
        let values = store.get(&id.parse().unwrap()).unwrap().unwrap();
        assert_eq!(values["n"], json!(2));
    }

    #[test]
    fn test_unknown_or_malformed_cookie_starts_fresh() {
        let store = MemoryStore::new();

        let ctx = RequestContext::new().with_cookie("main", SessionId::new().to_string());
        assert!(store.new_session(&ctx, "main").unwrap().is_new);

        let ctx = RequestContext::new().with_cookie("main", "garbage");
        assert!(store.new_session(&ctx, "main").unwrap().is_new);
    }

    #[test]
    fn test_negative_max_age_deletes_record() {
        let store = MemoryStore::new();
        let id = saved(&store, "main", "k", json!("v"));

        let mut ctx = RequestContext::new().with_cookie("main", id);
        let mut session = store.new_session(&ctx, "main").unwrap();
        session.options = Some(Options::default().expired());
        store.save(&mut ctx, &mut session).unwrap();

        assert_eq!(store.count(), 0);
        let cookie = &ctx.outgoing()[0];
        assert_eq!(cookie.value, "");
        assert!(cookie.to_string().contains("Max-Age=0"));
    }

    #[test]
    fn test_neighbouring_id_does_not_load_record() {
        let store = MemoryStore::new();
        let victim = saved(&store, "main", "user", json!("alice"));

        // Flip the last hex digit of a real ID.
        let mut guess = victim.clone();
        let last = guess.pop().unwrap();
        guess.push(if last == '0' { '1' } else { '0' });

        let ctx = RequestContext::new().with_cookie("main", guess);
        let session = store.new_session(&ctx, "main").unwrap();
        assert!(session.is_new);
        assert!(session.id.is_none());
        assert!(session.get("user").is_none());
    }

    /// Make every record in the store already expired.
    fn backdate(store: &MemoryStore) {
        let past = Instant::now().checked_sub(Duration::from_secs(1)).unwrap();
        for record in store.records.write().unwrap().values_mut() {
            record.expires_at = Some(past);
        }
    }

    #[test]
    fn test_record_expiry_follows_max_age() {
        let now = Instant::now();
        let record = Record::new(Values::new(), &Options::default(), now);
        assert_eq!(record.expires_at, Some(now + Duration::from_secs(3600)));
        assert!(!record.is_expired(now));
        assert!(record.is_expired(now + Duration::from_secs(3600)));

        let browser = Options {
            max_age: 0,
            ..Options::default()
        };
        let record = Record::new(Values::new(), &browser, now);
        assert!(record.expires_at.is_none());
        assert!(!record.is_expired(now + Duration::from_secs(86_400)));
    }

    #[test]
    fn test_expired_record_reads_as_absent() {
        let store = MemoryStore::new();
        let id = saved(&store, "main", "user", json!("alice"));
        backdate(&store);

        assert!(store.get(&id.parse().unwrap()).unwrap().is_none());
        let ctx = RequestContext::new().with_cookie("main", id);
        let session = store.new_session(&ctx, "main").unwrap();
        assert!(session.is_new);
        assert!(session.get("user").is_none());
    }

    #[test]
    fn test_remove_expired() {
        let store = MemoryStore::new();
        saved(&store, "main", "n", json!(1));
        saved(&store, "main", "n", json!(2));
        backdate(&store);
        let live = saved(&store, "main", "n", json!(3));

        // The third save already purged the two stale records.
        assert_eq!(store.count(), 1);
        assert_eq!(store.remove_expired().unwrap(), 0);

        backdate(&store);
        assert_eq!(store.remove_expired().unwrap(), 1);
        assert_eq!(store.count(), 0);
        assert!(store.get(&live.parse().unwrap()).unwrap().is_none());
    }

    #[test]
    fn test_new_record_purges_expired() {
        let store = MemoryStore::new();
        for i in 0..10 {
            saved(&store, "main", "i", json!(i));
        }
        backdate(&store);
        assert_eq!(store.count(), 10);

        saved(&store, "main", "i", json!("fresh"));
        assert_eq!(store.count(), 1);
    }

    #[test]
    fn test_concurrent_saves() {
        let store = Arc::new(MemoryStore::new());
        let mut handles = vec![];

        for i in 0..50 {
            let store = Arc::clone(&store);
            handles.push(thread::spawn(move || saved(&store, "main", "i", json!(i))));
        }

        let ids: std::collections::HashSet<String> =
            handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(ids.len(), 50);
        assert_eq!(store.count(), 50);
    }
}
