//! Session management module.
//!
//! A [`Registry`] holds the sessions touched during one request, creating
//! each through a [`Store`] on first use and persisting them together when
//! the request finishes.

mod context;
mod id;
mod options;
mod registry;
mod state;
mod store;

pub use context::RequestContext;
pub use id::SessionId;
pub use options::{new_cookie, Cookie, Options};
pub use registry::Registry;
pub use state::{Session, FLASHES_KEY};
pub use store::{MemoryStore, Store};
