//! Wiring of the login bridge collaborators

use std::sync::Arc;

use super::failure::LogoutHook;
use super::provider::OidcClient;
use super::reconcile::{AccountDirectory, IdentityReconciler, LinkTags};

/// Everything the login, callback and logout flows need, shared across requests
#[derive(Clone)]
pub struct AuthService {
    pub provider: Arc<dyn OidcClient>,
    pub reconciler: IdentityReconciler,
    /// Forwarded to the provider on every login redirect
    pub referrer: Option<String>,
    /// Claim holding the legacy subject
    pub legacy_claim: String,
    pub logout_hooks: Vec<Arc<dyn LogoutHook>>,
}

impl AuthService {
    pub fn new(
        provider: Arc<dyn OidcClient>,
        directory: Arc<dyn AccountDirectory>,
        tags: LinkTags,
        legacy_claim: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            reconciler: IdentityReconciler::new(directory, tags),
            referrer: None,
            legacy_claim: legacy_claim.into(),
            logout_hooks: Vec::new(),
        }
    }

    pub fn with_referrer(mut self, referrer: Option<String>) -> Self {
        self.referrer = referrer;
        self
    }

    pub fn with_logout_hook(mut self, hook: Arc<dyn LogoutHook>) -> Self {
        self.logout_hooks.push(hook);
        self
    }
}
