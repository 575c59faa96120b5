//! Namespaced key/value store on top of the host session
//!
//! The provider client keeps its transient protocol state here (state nonce,
//! PKCE verifier, tokens, cached claims). Every key is prefixed with the
//! namespace so the store can share the session with unrelated data, and
//! [`KeyedSessionStore::purge`] only ever touches its own keys.
//!
//! The names written through the store are tracked in an index entry
//! (`_<namespace>_keys`), which cannot collide with a `<namespace>_*` key.

use serde_json::Value;
use tower_sessions::Session;

use crate::error::AuthError;

/// Default namespace prefix for provider state
pub const DEFAULT_NAMESPACE: &str = "oidc";

#[derive(Debug, Clone)]
pub struct KeyedSessionStore {
    session: Session,
    namespace: String,
}

impl KeyedSessionStore {
    pub fn new(session: Session) -> Self {
        Self::with_namespace(session, DEFAULT_NAMESPACE)
    }

    pub fn with_namespace(session: Session, namespace: impl Into<String>) -> Self {
        Self {
            session,
            namespace: namespace.into(),
        }
    }

    /// The underlying host session
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Build the underlying session key for `key`
    pub fn session_key(&self, key: &str) -> Result<String, AuthError> {
        let trimmed = key.trim();
        if trimmed.is_empty() {
            return Err(AuthError::InvalidKey(key.to_string()));
        }
        Ok(format!("{}_{}", self.namespace, trimmed))
    }

    fn index_key(&self) -> String {
        format!("_{}_keys", self.namespace)
    }

    async fn owned_keys(&self) -> Result<Vec<String>, AuthError> {
        Ok(self
            .session
            .get::<Vec<String>>(&self.index_key())
            .await?
            .unwrap_or_default())
    }

    pub async fn get(&self, key: &str, default: Value) -> Result<Value, AuthError> {
        let name = self.session_key(key)?;
        Ok(self.session.get_value(&name).await?.unwrap_or(default))
    }

    /// String value for `key`, `None` when absent or not a string
    pub async fn get_string(&self, key: &str) -> Result<Option<String>, AuthError> {
        Ok(match self.get(key, Value::Null).await? {
            Value::String(s) => Some(s),
            _ => None,
        })
    }

    pub async fn set(&self, key: &str, value: Value) -> Result<(), AuthError> {
        let name = self.session_key(key)?;
        self.session.insert_value(&name, value).await?;

        let mut owned = self.owned_keys().await?;
        if !owned.contains(&name) {
            owned.push(name);
            self.session.insert(&self.index_key(), owned).await?;
        }
        Ok(())
    }

    pub async fn delete(&self, key: &str) -> Result<(), AuthError> {
        let name = self.session_key(key)?;
        self.session.remove_value(&name).await?;

        let mut owned = self.owned_keys().await?;
        if owned.contains(&name) {
            owned.retain(|k| k != &name);
            if owned.is_empty() {
                self.session.remove_value(&self.index_key()).await?;
            } else {
                self.session.insert(&self.index_key(), owned).await?;
            }
        }
        Ok(())
    }

    /// Remove every entry owned by this store and return how many were removed.
    ///
    /// The index is detached from the session before anything is deleted.
    pub async fn purge(&self) -> Result<usize, AuthError> {
        let owned = self
            .session
            .remove::<Vec<String>>(&self.index_key())
            .await?
            .unwrap_or_default();

        let mut removed = 0;
        for key in &owned {
            if self.session.remove_value(key).await?.is_some() {
                removed += 1;
            }
        }

        tracing::debug!(
            namespace = %self.namespace,
            removed,
            "Purged session store"
        );
        Ok(removed)
    }
}
