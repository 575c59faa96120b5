//! Host session conventions on top of `tower-sessions`
//!
//! The session itself is the request-scoped [`Session`] extracted by axum
//! from the [`SessionManagerLayer`]. This module adds what the bridge needs
//! beyond plain attributes: flash notices, the authenticated account, login
//! with id cycling, and a destroy that carries pending notices over.

use async_trait::async_trait;
use time::Duration;
use tower_sessions::{cookie::SameSite, Expiry, Session, SessionManagerLayer, SessionStore};

use crate::config::Config;
use crate::error::AuthError;

/// Local account identifier as issued by the host account system
pub type AccountId = u64;

/// Attribute holding the authenticated account id
pub const AUTHENTICATED_ACCOUNT_KEY: &str = "uid";

/// Attribute holding pending flash notices
pub const FLASH_KEY: &str = "_flash";

/// Bridge-level operations on the host session
#[async_trait]
pub trait SessionExt {
    async fn add_flash(&self, message: &str) -> Result<(), AuthError>;

    /// Consume pending flash notices
    async fn take_flash(&self) -> Result<Vec<String>, AuthError>;

    async fn authenticated_account(&self) -> Result<Option<AccountId>, AuthError>;

    /// Finalize a host login: the session id is cycled to prevent fixation
    async fn login(&self, account_id: AccountId) -> Result<(), AuthError>;

    /// Drop every attribute, leaving pending flash notices alone
    async fn clear_attributes(&self) -> Result<(), AuthError>;

    /// Delete the backing record. Pending flash notices are written into a
    /// fresh anonymous session.
    async fn destroy(&self) -> Result<(), AuthError>;

    /// Whether the session has a backing record or holds data
    async fn is_active(&self) -> bool;
}

#[async_trait]
impl SessionExt for Session {
    async fn add_flash(&self, message: &str) -> Result<(), AuthError> {
        let mut pending: Vec<String> = self.get(FLASH_KEY).await?.unwrap_or_default();
        pending.push(message.to_string());
        self.insert(FLASH_KEY, pending).await?;
        Ok(())
    }

    async fn take_flash(&self) -> Result<Vec<String>, AuthError> {
        Ok(self
            .remove::<Vec<String>>(FLASH_KEY)
            .await?
            .unwrap_or_default())
    }

    async fn authenticated_account(&self) -> Result<Option<AccountId>, AuthError> {
        Ok(self.get::<AccountId>(AUTHENTICATED_ACCOUNT_KEY).await?)
    }

    async fn login(&self, account_id: AccountId) -> Result<(), AuthError> {
        self.cycle_id().await?;
        self.insert(AUTHENTICATED_ACCOUNT_KEY, account_id).await?;
        Ok(())
    }

    async fn clear_attributes(&self) -> Result<(), AuthError> {
        let pending = self.take_flash().await?;
        self.clear().await;
        restore_flash(self, pending).await
    }

    async fn destroy(&self) -> Result<(), AuthError> {
        let pending = self.take_flash().await?;
        self.flush().await?;
        // a flushed record keeps its old id until cycled
        self.cycle_id().await?;
        restore_flash(self, pending).await
    }

    async fn is_active(&self) -> bool {
        self.id().is_some() || !self.is_empty().await
    }
}

async fn restore_flash(session: &Session, pending: Vec<String>) -> Result<(), AuthError> {
    if !pending.is_empty() {
        session.insert(FLASH_KEY, pending).await?;
    }
    Ok(())
}

/// Session cookie layer over `store` with the configured attributes.
///
/// Sessions expire after `session_idle_timeout_secs` without a request, and
/// `Secure` is only set in production. Signing is applied by the caller.
pub fn session_layer<S>(store: S, config: &Config) -> SessionManagerLayer<S>
where
    S: SessionStore + Clone,
{
    let idle = Duration::seconds(i64::from(config.session_idle_timeout_secs));
    let layer = SessionManagerLayer::new(store)
        .with_name(config.session_cookie_name.clone())
        .with_path("/")
        .with_http_only(true)
        .with_same_site(SameSite::Lax)
        .with_secure(config.is_production())
        .with_expiry(Expiry::OnInactivity(idle));

    match &config.cookie_domain {
        Some(domain) => layer.with_domain(domain.clone()),
        None => layer,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::detached_session;
    use serde_json::Value;

    #[tokio::test]
    async fn test_flash_is_consumed_once() {
        let session = detached_session();
        session.add_flash("first").await.unwrap();
        session.add_flash("second").await.unwrap();

        assert_eq!(
            session.take_flash().await.unwrap(),
            vec!["first".to_string(), "second".to_string()]
        );
        assert!(session.take_flash().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_clear_attributes_keeps_flash() {
        let session = detached_session();
        session.insert("uid", 7u64).await.unwrap();
        session.insert("cart", Value::from(2)).await.unwrap();
        session.add_flash("notice").await.unwrap();

        session.clear_attributes().await.unwrap();

        assert_eq!(session.authenticated_account().await.unwrap(), None);
        assert_eq!(session.get_value("cart").await.unwrap(), None);
        assert_eq!(session.take_flash().await.unwrap(), vec!["notice".to_string()]);
    }

    #[tokio::test]
    async fn test_login_cycles_session_id() {
        let session = detached_session();
        session.insert("oidc_state", "abc").await.unwrap();
        session.save().await.unwrap();
        let before = session.id().expect("saved session has an id");

        session.login(42).await.unwrap();
        session.save().await.unwrap();

        assert_ne!(session.id(), Some(before));
        assert_eq!(session.authenticated_account().await.unwrap(), Some(42));
    }

    #[tokio::test]
    async fn test_destroy_carries_flash_into_new_session() {
        let session = detached_session();
        session.login(3).await.unwrap();
        session.save().await.unwrap();
        let old_id = session.id();

        session.add_flash("problem").await.unwrap();
        session.destroy().await.unwrap();

        assert_eq!(session.id(), None);
        assert_eq!(session.authenticated_account().await.unwrap(), None);
        assert_eq!(session.take_flash().await.unwrap(), vec!["problem".to_string()]);

        session.add_flash("again").await.unwrap();
        session.save().await.unwrap();
        assert!(session.id().is_some());
        assert_ne!(session.id(), old_id);
    }

    #[tokio::test]
    async fn test_destroy_without_flash_leaves_empty_session() {
        let session = detached_session();
        session.login(3).await.unwrap();
        session.save().await.unwrap();

        session.destroy().await.unwrap();

        assert!(!session.is_active().await);
    }

    #[tokio::test]
    async fn test_fresh_session_is_inactive() {
        assert!(!detached_session().is_active().await);
    }
}
