//! Mapping of external identities onto local accounts
//!
//! Reconciliation order, first match wins:
//!
//! 1. account linked to `(subject, current tag)` - returning user
//! 2. account linked to `(legacy subject, legacy tag)` - migrated once: linked
//!    under the current tag, legacy link removed
//! 3. new account registered and linked under the current tag
//!
//! The host account system is reached only through [`AccountDirectory`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::provider::Claims;
use crate::error::AuthError;
use crate::session::AccountId;

/// Provider tags for the two generations of external identity links
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkTags {
    pub current: String,
    pub legacy: String,
}

impl Default for LinkTags {
    fn default() -> Self {
        Self {
            current: "oidc".to_string(),
            legacy: "oidc_legacy".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountHandle {
    pub id: AccountId,
    pub name: String,
    pub mail: Option<String>,
}

/// Profile data used for just-in-time registration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountProfile {
    pub name: String,
    pub mail: Option<String>,
}

/// The slice of the host account system the bridge needs
#[async_trait]
pub trait AccountDirectory: Send + Sync {
    async fn find_linked_account(
        &self,
        subject: &str,
        tag: &str,
    ) -> Result<Option<AccountHandle>, AuthError>;

    async fn link_account(
        &self,
        subject: &str,
        tag: &str,
        account: &AccountHandle,
    ) -> Result<(), AuthError>;

    /// Create an account linked to `(subject, tag)`. If the subject got linked
    /// in the meantime the existing account is returned instead.
    async fn register_and_login(
        &self,
        subject: &str,
        tag: &str,
        profile: AccountProfile,
    ) -> Result<AccountHandle, AuthError>;

    async fn delete_link(&self, account_id: AccountId, tag: &str) -> Result<(), AuthError>;
}

/// Identity asserted by the provider after a successful exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalIdentity {
    pub subject: String,
    pub legacy_subject: Option<String>,
    pub email: Option<String>,
    pub display_name: Option<String>,
}

impl ExternalIdentity {
    pub fn from_claims(claims: &Claims, legacy_claim: &str) -> Result<Self, AuthError> {
        let subject = claim_string(claims, "sub").ok_or_else(|| {
            AuthError::Reconciliation("provider claims carry no subject".to_string())
        })?;

        Ok(Self {
            subject,
            legacy_subject: claim_string(claims, legacy_claim),
            email: claim_string(claims, "email"),
            display_name: claim_string(claims, "nickname").or_else(|| claim_string(claims, "name")),
        })
    }

    pub fn nickname(&self) -> Option<&str> {
        self.display_name.as_deref()
    }

    /// Registration profile: the email doubles as account name
    pub fn profile(&self) -> AccountProfile {
        let name = self
            .email
            .clone()
            .or_else(|| self.display_name.clone())
            .unwrap_or_else(|| self.subject.clone());
        AccountProfile {
            name,
            mail: self.email.clone(),
        }
    }
}

fn claim_string(claims: &Claims, name: &str) -> Option<String> {
    match claims.get(name)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcilePath {
    Returning,
    Migrated,
    Registered,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    pub account: AccountHandle,
    pub path: ReconcilePath,
}

#[derive(Clone)]
pub struct IdentityReconciler {
    directory: Arc<dyn AccountDirectory>,
    tags: LinkTags,
}

impl IdentityReconciler {
    pub fn new(directory: Arc<dyn AccountDirectory>, tags: LinkTags) -> Self {
        Self { directory, tags }
    }

    pub async fn reconcile(&self, identity: &ExternalIdentity) -> Result<Reconciliation, AuthError> {
        let current = self.tags.current.as_str();

        if let Some(account) = self
            .directory
            .find_linked_account(&identity.subject, current)
            .await?
        {
            tracing::debug!(account_id = account.id, "Returning user");
            return Ok(Reconciliation {
                account,
                path: ReconcilePath::Returning,
            });
        }

        if let Some(legacy_subject) = identity.legacy_subject.as_deref() {
            let legacy = self.tags.legacy.as_str();
            if let Some(account) = self
                .directory
                .find_linked_account(legacy_subject, legacy)
                .await?
            {
                self.directory
                    .link_account(&identity.subject, current, &account)
                    .await?;
                self.directory.delete_link(account.id, legacy).await?;

                tracing::info!(
                    event = "legacy_link_migrated",
                    account_id = account.id,
                    from_tag = legacy,
                    to_tag = current,
                    "Migrated legacy identity link"
                );
                return Ok(Reconciliation {
                    account,
                    path: ReconcilePath::Migrated,
                });
            }
        }

        let account = self
            .directory
            .register_and_login(&identity.subject, current, identity.profile())
            .await?;

        tracing::info!(
            event = "account_registered",
            account_id = account.id,
            tag = current,
            "Registered account for new external identity"
        );
        Ok(Reconciliation {
            account,
            path: ReconcilePath::Registered,
        })
    }
}

// =============================================================================
// In-memory directory
// =============================================================================

#[derive(Debug, Default)]
struct DirectoryState {
    accounts: HashMap<AccountId, AccountHandle>,
    /// (subject, tag) -> account
    links: HashMap<(String, String), AccountId>,
    next_id: AccountId,
}

impl DirectoryState {
    fn allocate_id(&mut self) -> Result<AccountId, AuthError> {
        let id = self.next_id.max(1);
        // next_id stalls at the top of the id space
        if self.accounts.contains_key(&id) {
            return Err(AuthError::Reconciliation(
                "account id space exhausted".to_string(),
            ));
        }
        self.next_id = id.saturating_add(1);
        Ok(id)
    }
}

/// Process-local [`AccountDirectory`]; link-check-and-create runs under one write lock
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    state: RwLock<DirectoryState>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an existing account
    pub async fn insert_account(&self, account: AccountHandle) {
        let mut state = self.state.write().await;
        state.next_id = state.next_id.max(account.id.saturating_add(1));
        state.accounts.insert(account.id, account);
    }

    pub async fn account_count(&self) -> usize {
        self.state.read().await.accounts.len()
    }

    /// All `(subject, tag)` pairs linked to an account, sorted
    pub async fn links_for(&self, account_id: AccountId) -> Vec<(String, String)> {
        let state = self.state.read().await;
        let mut links: Vec<_> = state
            .links
            .iter()
            .filter(|(_, id)| **id == account_id)
            .map(|(key, _)| key.clone())
            .collect();
        links.sort();
        links
    }
}

#[async_trait]
impl AccountDirectory for InMemoryDirectory {
    async fn find_linked_account(
        &self,
        subject: &str,
        tag: &str,
    ) -> Result<Option<AccountHandle>, AuthError> {
        let state = self.state.read().await;
        Ok(state
            .links
            .get(&(subject.to_string(), tag.to_string()))
            .and_then(|id| state.accounts.get(id))
            .cloned())
    }

    async fn link_account(
        &self,
        subject: &str,
        tag: &str,
        account: &AccountHandle,
    ) -> Result<(), AuthError> {
        let mut state = self.state.write().await;
        if !state.accounts.contains_key(&account.id) {
            return Err(AuthError::Reconciliation(format!(
                "account {} does not exist",
                account.id
            )));
        }

        let key = (subject.to_string(), tag.to_string());
        match state.links.get(&key).copied() {
            Some(existing) if existing == account.id => Ok(()),
            Some(existing) => Err(AuthError::Reconciliation(format!(
                "subject already linked to account {} under tag {}",
                existing, tag
            ))),
            None => {
                state.links.insert(key, account.id);
                Ok(())
            }
        }
    }

    async fn register_and_login(
        &self,
        subject: &str,
        tag: &str,
        profile: AccountProfile,
    ) -> Result<AccountHandle, AuthError> {
        let mut state = self.state.write().await;
        let key = (subject.to_string(), tag.to_string());

        let existing = state
            .links
            .get(&key)
            .and_then(|id| state.accounts.get(id))
            .cloned();
        if let Some(account) = existing {
            tracing::debug!(
                account_id = account.id,
                "Subject linked concurrently, reusing account"
            );
            return Ok(account);
        }

        let id = state.allocate_id()?;
        let account = AccountHandle {
            id,
            name: profile.name,
            mail: profile.mail,
        };
        state.accounts.insert(id, account.clone());
        state.links.insert(key, id);
        Ok(account)
    }

    async fn delete_link(&self, account_id: AccountId, tag: &str) -> Result<(), AuthError> {
        let mut state = self.state.write().await;
        state
            .links
            .retain(|(_, link_tag), id| !(*id == account_id && link_tag == tag));
        Ok(())
    }
}
