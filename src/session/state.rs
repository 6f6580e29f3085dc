//! Session values, flashes and dirty tracking.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

use super::{Options, RequestContext, Store};
use crate::error::{Result, SessionError};

/// Default key for flash messages.
pub const FLASHES_KEY: &str = "_flash";

/// A named key/value bag tracked for the duration of one request.
///
/// Every mutating call marks the session dirty; the flag is never reset,
/// so the end-of-request flush knows which sessions need persisting.
pub struct Session {
    /// Identifier assigned by the store, if any.
    pub id: Option<String>,
    /// Cookie options forwarded to the store.
    pub options: Option<Options>,
    /// True if the store created this session rather than loading it.
    pub is_new: bool,
    values: HashMap<String, Value>,
    store: Option<Arc<dyn Store>>,
    name: String,
    dirty: bool,
}

impl Session {
    /// Create an empty session with no store bound.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: None,
            options: None,
            is_new: true,
            values: HashMap::new(),
            store: None,
            name: name.into(),
            dirty: false,
        }
    }

    /// Create an empty session owned by `store`.
    pub fn with_store(store: Arc<dyn Store>, name: impl Into<String>) -> Self {
        Self {
            store: Some(store),
            ..Self::new(name)
        }
    }

    /// Replace the values wholesale, e.g. after loading from a backend.
    /// Does not mark the session dirty.
    pub fn with_values(mut self, values: HashMap<String, Value>) -> Self {
        self.values = values;
        self
    }

    /// Name the session is registered under.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Store the session will be saved to.
    pub fn store(&self) -> Option<&Arc<dyn Store>> {
        self.store.as_ref()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub(crate) fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
    }

    pub(crate) fn bind_store(&mut self, store: Arc<dyn Store>) {
        self.store = Some(store);
    }

    /// Get the value stored under `key`.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Get the value under `key` deserialized as `T`.
    ///
    /// Returns `None` if the key is absent or holds a different shape.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.values
            .get(key)
            .and_then(|v| T::deserialize(v).ok())
    }

    /// Store `value` under `key`.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(key.into(), value.into());
        self.dirty = true;
    }

    /// Serialize `value` and store it under `key`.
    pub fn set_serialized<T: Serialize>(
        &mut self,
        key: impl Into<String>,
        value: &T,
    ) -> std::result::Result<(), serde_json::Error> {
        let value = serde_json::to_value(value)?;
        self.set(key, value);
        Ok(())
    }

    /// Remove `key`. Marks the session dirty even if the key was absent.
    pub fn delete(&mut self, key: &str) -> Option<Value> {
        self.dirty = true;
        self.values.remove(key)
    }

    /// Remove every value.
    pub fn clear(&mut self) {
        self.values.clear();
        self.dirty = true;
    }

    /// All values.
    pub fn values(&self) -> &HashMap<String, Value> {
        &self.values
    }

    /// Mutable access to all values. Marks the session dirty.
    pub fn values_mut(&mut self) -> &mut HashMap<String, Value> {
        self.dirty = true;
        &mut self.values
    }

    /// Append a flash message under the default key.
    pub fn add_flash(&mut self, value: impl Into<Value>) {
        self.add_flash_to(FLASHES_KEY, value);
    }

    /// Append a flash message under `key`.
    pub fn add_flash_to(&mut self, key: &str, value: impl Into<Value>) {
        let value = value.into();
        match self.values.get_mut(key) {
            Some(Value::Array(items)) => items.push(value),
            Some(other) => {
                let previous = other.take();
                *other = Value::Array(vec![previous, value]);
            }
            None => {
                self.values.insert(key.to_string(), Value::Array(vec![value]));
            }
        }
        self.dirty = true;
    }

    /// Take the flash messages under the default key.
    pub fn flashes(&mut self) -> Vec<Value> {
        self.flashes_from(FLASHES_KEY)
    }

    /// Take the flash messages under `key`, leaving it empty.
    ///
    /// A read that removes something counts as a mutation.
    pub fn flashes_from(&mut self, key: &str) -> Vec<Value> {
        match self.values.remove(key) {
            Some(Value::Array(items)) => {
                self.dirty = true;
                items
            }
            Some(other) => {
                self.dirty = true;
                vec![other]
            }
            None => Vec::new(),
        }
    }

    /// Persist through the bound store.
    pub fn save(&mut self, ctx: &mut RequestContext) -> Result<()> {
        let store = self
            .store
            .clone()
            .ok_or_else(|| SessionError::MissingStore(self.name.clone()))?;

        store.save(ctx, self).map_err(|source| SessionError::Save {
            name: self.name.clone(),
            source,
        })
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("is_new", &self.is_new)
            .field("dirty", &self.dirty)
            .field("has_store", &self.store.is_some())
            .field("options", &self.options)
            .field("values", &self.values)
            .finish()
    }
}
