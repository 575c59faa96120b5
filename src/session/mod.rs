//! Session handling
//!
//! - `host`: bridge conventions on the `tower-sessions` host session and the cookie layer
//! - `memory`: the in-process session store with expiry sweeping
//! - `store`: the namespaced key/value store used for transient OAuth state

pub mod host;
pub mod memory;
pub mod store;

pub use host::{session_layer, AccountId, SessionExt, AUTHENTICATED_ACCOUNT_KEY, FLASH_KEY};
pub use memory::{spawn_expiry_sweep, MemorySessionStore};
pub use store::{KeyedSessionStore, DEFAULT_NAMESPACE};

/// A session backed by its own store, outside any request
#[cfg(test)]
pub(crate) fn detached_session() -> tower_sessions::Session {
    tower_sessions::Session::new(None, std::sync::Arc::new(MemorySessionStore::new()), None)
}
