//! Terminal error sink for the callback flow
//!
//! Every terminal failure ends in [`handle_failure`]: the user gets a generic
//! notice and is sent home, operators get the detail in the log.

use async_trait::async_trait;
use axum::response::Response;
use std::sync::Arc;
use tower_sessions::Session;

use super::helpers::{found_redirect, SITE_ROOT};
use crate::error::AuthError;
use crate::session::{AccountId, KeyedSessionStore, SessionExt};

/// The only failure text an end user ever sees
pub const FAILURE_NOTICE: &str = "There was a problem logging you in, sorry for the inconvenience.";

/// Side effects to run when an authenticated session is torn down
#[async_trait]
pub trait LogoutHook: Send + Sync {
    async fn on_logout(&self, account_id: AccountId);
}

/// Records every logout in the log
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogoutHook;

#[async_trait]
impl LogoutHook for TracingLogoutHook {
    async fn on_logout(&self, account_id: AccountId) {
        tracing::info!(event = "logout", account_id, "Session closed");
    }
}

/// Tear down an authenticated session. Flash notices survive.
///
/// Returns the account that was logged out, or `None` for anonymous sessions,
/// which are left untouched.
pub async fn end_session(
    session: &Session,
    hooks: &[Arc<dyn LogoutHook>],
) -> Result<Option<AccountId>, AuthError> {
    let Some(account_id) = session.authenticated_account().await? else {
        return Ok(None);
    };

    session.clear_attributes().await?;
    for hook in hooks {
        hook.on_logout(account_id).await;
    }
    if session.is_active().await {
        session.destroy().await?;
    }

    Ok(Some(account_id))
}

/// Report a login failure and send the user home
pub async fn handle_failure(
    store: &KeyedSessionStore,
    hooks: &[Arc<dyn LogoutHook>],
    message: &str,
    context: &str,
) -> Response {
    let session = store.session();

    tracing::error!(
        event = "login_failed",
        context,
        error = %message,
        "Login failed"
    );

    if let Err(e) = session.add_flash(FAILURE_NOTICE).await {
        tracing::error!(error = %e, "Failed to record failure notice");
    }

    // Half-finished protocol state must not outlive the failed attempt
    match store.purge().await {
        Ok(0) => {}
        Ok(purged) => tracing::debug!(purged, "Purged provider state after failed login"),
        Err(e) => tracing::error!(error = %e, "Failed to purge provider state"),
    }

    match end_session(session, hooks).await {
        Ok(Some(account_id)) => {
            tracing::warn!(account_id, "Authenticated session closed after failed login")
        }
        Ok(None) => {}
        Err(e) => tracing::error!(error = %e, "Failed to close session after failed login"),
    }

    found_redirect(SITE_ROOT)
}
