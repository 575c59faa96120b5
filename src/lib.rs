//! OIDC login bridge library
//!
//! Connects the host's session and account system to an external OpenID
//! Connect provider: login initiation, callback handling, legacy identity
//! migration, and logout.

#![deny(dead_code)]

pub mod auth;
pub mod config;
pub mod error;
pub mod session;
pub mod web;

use auth::{AccountDirectory, AuthService, LogoutHook, OidcClient};
use config::Config;
use error::AuthError;
use session::MemorySessionStore;
use std::sync::Arc;
use tower_sessions::cookie::Key;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub auth: AuthService,
    pub sessions: MemorySessionStore,
    /// Signs the session cookie; derived from the provider's `cookie_secret`
    pub cookie_key: Key,
}

impl AppState {
    pub fn new(
        config: Config,
        provider: Arc<dyn OidcClient>,
        directory: Arc<dyn AccountDirectory>,
    ) -> Result<Self, AuthError> {
        let cookie_key = config.provider.cookie_key()?;
        let auth = AuthService::new(
            provider,
            directory,
            config.link_tags.clone(),
            config.legacy_claim.clone(),
        )
        .with_referrer(config.provider.referrer.clone());

        Ok(Self {
            config: Arc::new(config),
            auth,
            sessions: MemorySessionStore::new(),
            cookie_key,
        })
    }

    pub fn with_logout_hook(mut self, hook: Arc<dyn LogoutHook>) -> Self {
        self.auth = self.auth.with_logout_hook(hook);
        self
    }
}
