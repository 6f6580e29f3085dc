//! Per-request cache of named sessions.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use super::{RequestContext, Session, Store};
use crate::error::{MultiError, StoreError};

/// A session and the error, if any, raised while creating it.
struct Tracked {
    session: Session,
    error: Option<Arc<StoreError>>,
}

/// Sessions used during one request.
///
/// Each name maps to exactly one [`Session`] for the life of the registry;
/// the store is only asked to create it once. The registry is not shared
/// between requests and does no locking of its own.
pub struct Registry {
    context: RequestContext,
    sessions: HashMap<String, Tracked>,
}

impl Registry {
    /// Create an empty registry bound to a request context.
    pub fn new(context: RequestContext) -> Self {
        Self {
            context,
            sessions: HashMap::new(),
        }
    }

    /// Get the session registered under `name`, creating it through
    /// `store` on first use.
    ///
    /// A failed creation is cached as well: later calls return the same
    /// empty session and the same error without asking the store again.
    /// The session is always rebound to `store`, so a later call with a
    /// different store redirects where it will be saved.
    pub fn get(
        &mut self,
        store: Arc<dyn Store>,
        name: &str,
    ) -> (&mut Session, Option<Arc<StoreError>>) {
        let tracked = match self.sessions.entry(name.to_string()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let (mut session, error) = match store.new_session(&self.context, name) {
                    Ok(session) => (session, None),
                    Err(err) => {
                        warn!(session = name, error = %err, "failed to create session");
                        (Session::new(name), Some(Arc::new(err)))
                    }
                };
                session.set_name(name);
                debug!(session = name, is_new = session.is_new, "registered session");
                entry.insert(Tracked { session, error })
            }
        };

        tracked.session.bind_store(store);
        (&mut tracked.session, tracked.error.clone())
    }

    /// Register a session that was built without going through a store.
    ///
    /// If `name` is already tracked the existing session is kept and
    /// returned, and `session` is dropped.
    pub fn track(&mut self, name: &str, mut session: Session) -> &mut Session {
        let tracked = self.sessions.entry(name.to_string()).or_insert_with(|| {
            session.set_name(name);
            Tracked {
                session,
                error: None,
            }
        });
        &mut tracked.session
    }

    /// Save every tracked session.
    ///
    /// Each save is attempted even if an earlier one failed. Failures are
    /// collected into one [`MultiError`].
    pub fn save(&mut self) -> Result<(), MultiError> {
        self.save_where(|_| true)
    }

    /// Save only the sessions that were modified during the request.
    pub fn save_dirty(&mut self) -> Result<(), MultiError> {
        self.save_where(Session::is_dirty)
    }

    fn save_where(&mut self, mut filter: impl FnMut(&Session) -> bool) -> Result<(), MultiError> {
        let mut errors = MultiError::new();

        for (name, tracked) in self.sessions.iter_mut() {
            if !filter(&tracked.session) {
                continue;
            }
            match tracked.session.save(&mut self.context) {
                Ok(()) => debug!(session = %name, "session persisted"),
                Err(err) => {
                    warn!(session = %name, error = %err, "session not persisted");
                    errors.push(err);
                }
            }
        }

        errors.into_result()
    }

    /// Check whether `name` is tracked.
    pub fn contains(&self, name: &str) -> bool {
        self.sessions.contains_key(name)
    }

    /// Names of all tracked sessions, in no particular order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.sessions.keys().map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn context(&self) -> &RequestContext {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut RequestContext {
        &mut self.context
    }

    /// Consume the registry, returning its context.
    pub fn into_context(self) -> RequestContext {
        self.context
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SessionError;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Store that counts calls and records the names it saved.
    #[derive(Default)]
    struct RecordingStore {
        created: AtomicUsize,
        saved: Mutex<Vec<String>>,
        fail_new: bool,
        fail_save: bool,
    }

    impl RecordingStore {
        fn failing_new() -> Self {
            Self {
                fail_new: true,
                ..Self::default()
            }
        }

        fn failing_save() -> Self {
            Self {
                fail_save: true,
                ..Self::default()
            }
        }

        fn saved(&self) -> Vec<String> {
            self.saved.lock().unwrap().clone()
        }
    }

    impl Store for RecordingStore {
        fn new_session(&self, _ctx: &RequestContext, name: &str) -> Result<Session, StoreError> {
            self.created.fetch_add(1, Ordering::SeqCst);
            if self.fail_new {
                return Err(StoreError::Backend("cannot reach backend".into()));
            }
            Ok(Session::new(name))
        }

        fn save(&self, _ctx: &mut RequestContext, session: &mut Session) -> Result<(), StoreError> {
            if self.fail_save {
                return Err(StoreError::Backend("write refused".into()));
            }
            self.saved.lock().unwrap().push(session.name().to_string());
            Ok(())
        }
    }

    fn registry() -> Registry {
        Registry::new(RequestContext::new())
    }

    #[test]
    fn test_get_returns_same_instance() {
        let store = Arc::new(RecordingStore::default());
        let mut reg = registry();

        let first: *const Session = reg.get(store.clone(), "main").0;
        let second: *const Session = reg.get(store.clone(), "main").0;

        assert!(std::ptr::eq(first, second));
        assert_eq!(store.created.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_values_survive_lookups() {
        let store = Arc::new(RecordingStore::default());
        let mut reg = registry();

        reg.get(store.clone(), "main").0.set("user", "alice");
        let (session, err) = reg.get(store, "main");

        assert!(err.is_none());
        assert_eq!(session.get("user"), Some(&json!("alice")));
        assert_eq!(session.name(), "main");
    }

    #[test]
    fn test_distinct_names_distinct_sessions() {
        let store = Arc::new(RecordingStore::default());
        let mut reg = registry();

        reg.get(store.clone(), "a").0.set("k", 1);
        assert!(reg.get(store.clone(), "b").0.get("k").is_none());
        assert_eq!(reg.len(), 2);
        assert_eq!(store.created.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_failed_creation_is_cached() {
        let store = Arc::new(RecordingStore::failing_new());
        let mut reg = registry();

        let (session, err) = reg.get(store.clone(), "main");
        assert!(err.is_some());
        // Still usable.
        session.set("k", "v");

        let (session, err) = reg.get(store.clone(), "main");
        assert!(err.unwrap().to_string().contains("cannot reach backend"));
        assert_eq!(session.get("k"), Some(&json!("v")));
        assert_eq!(store.created.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_rebinding_redirects_persistence() {
        let first = Arc::new(RecordingStore::default());
        let second = Arc::new(RecordingStore::default());
        let mut reg = registry();

        reg.get(first.clone(), "main").0.set("k", 1);
        let (session, _) = reg.get(second.clone(), "main");
        assert_eq!(session.get("k"), Some(&json!(1)));

        reg.save().unwrap();
        assert!(first.saved().is_empty());
        assert_eq!(second.saved(), vec!["main".to_string()]);
        assert_eq!(second.created.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_save_aggregates_failures() {
        let good = Arc::new(RecordingStore::default());
        let bad = Arc::new(RecordingStore::failing_save());
        let mut reg = registry();

        reg.track("orphan", Session::new("orphan"));
        reg.get(bad, "broken");
        reg.get(good.clone(), "fine");

        let err = reg.save().unwrap_err();
        assert_eq!(err.len(), 2);
        assert!(err.to_string().ends_with("(and 1 other error)"));
        assert!(err
            .iter()
            .any(|e| matches!(e, SessionError::MissingStore(n) if n == "orphan")));
        assert!(err
            .iter()
            .any(|e| matches!(e, SessionError::Save { name, .. } if name == "broken")));
        assert_eq!(good.saved(), vec!["fine".to_string()]);
    }

    #[test]
    fn test_save_with_nothing_tracked() {
        assert!(registry().save().is_ok());
    }

    #[test]
    fn test_save_dirty_skips_clean_sessions() {
        let store = Arc::new(RecordingStore::default());
        let mut reg = registry();

        reg.get(store.clone(), "read-only");
        reg.get(store.clone(), "written").0.set("k", true);

        reg.save_dirty().unwrap();
        assert_eq!(store.saved(), vec!["written".to_string()]);
    }

    #[test]
    fn test_save_dirty_includes_consumed_flashes() {
        let store = Arc::new(RecordingStore::default());
        let mut reg = registry();

        let (session, _) = reg.get(store.clone(), "main");
        session.add_flash("hello");
        assert_eq!(session.flashes().len(), 1);

        reg.save_dirty().unwrap();
        assert_eq!(store.saved(), vec!["main".to_string()]);
    }

    #[test]
    fn test_track_keeps_existing_entry() {
        let store = Arc::new(RecordingStore::default());
        let mut reg = registry();
        reg.get(store, "main").0.set("k", "original");

        let mut replacement = Session::new("other");
        replacement.set("k", "replacement");
        let session = reg.track("main", replacement);

        assert_eq!(session.get("k"), Some(&json!("original")));
        assert!(session.store().is_some());
    }

    #[test]
    fn test_track_sets_name() {
        let mut reg = registry();
        let session = reg.track("cart", Session::new("whatever"));
        assert_eq!(session.name(), "cart");
        assert!(reg.contains("cart"));
        assert_eq!(reg.names().collect::<Vec<_>>(), vec!["cart"]);
    }

    #[test]
    fn test_context_is_passed_to_store() {
        struct CookieEcho;

        impl Store for CookieEcho {
            fn new_session(&self, ctx: &RequestContext, name: &str) -> Result<Session, StoreError> {
                let mut session = Session::new(name);
                session.id = ctx.cookie(name).map(str::to_string);
                Ok(session)
            }

            fn save(&self, ctx: &mut RequestContext, session: &mut Session) -> Result<(), StoreError> {
                let opts = session.options.clone().unwrap_or_default();
                ctx.set_cookie(crate::session::new_cookie(session.name(), "saved", &opts));
                Ok(())
            }
        }

        let ctx = RequestContext::new().with_cookie("main", "abc");
        let mut reg = Registry::new(ctx);
        assert_eq!(reg.get(Arc::new(CookieEcho), "main").0.id.as_deref(), Some("abc"));

        reg.save().unwrap();
        let ctx = reg.into_context();
        assert_eq!(ctx.outgoing()[0].value, "saved");
    }
}
