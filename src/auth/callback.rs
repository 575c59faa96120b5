//! Provider callback state machine
//!
//! ```text
//! received ─┬─ recoverable provider error ─► fresh login redirect
//!           ├─ any other error ────────────► failure
//!           └─ no error ─► exchange ─► reconcile ─┬─► reconciled
//!                                                 └─► failure
//! ```
//!
//! [`process_callback`] decides the outcome without touching HTTP;
//! [`respond`] turns an outcome into the redirect.

use axum::response::Response;
use url::form_urlencoded;
use url::Url;

use super::failure::handle_failure;
use super::helpers::found_redirect;
use super::login::{initiate_login, LoginState};
use super::reconcile::{AccountHandle, ExternalIdentity, ReconcilePath};
use super::service::AuthService;
use crate::error::AuthError;
use crate::session::{KeyedSessionStore, SessionExt};

/// Provider error codes answered with a fresh interactive login
pub const RECOVERABLE_ERRORS: [&str; 3] =
    ["login_required", "interaction_required", "consent_required"];

/// Recognized callback parameters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

impl CallbackParams {
    /// Parse an urlencoded query string or form body. The first occurrence of
    /// a parameter wins; empty values count as absent.
    pub fn from_form(input: &[u8]) -> Self {
        let mut params = Self::default();
        for (key, value) in form_urlencoded::parse(input) {
            if value.is_empty() {
                continue;
            }
            let slot = match &*key {
                "code" => &mut params.code,
                "state" => &mut params.state,
                "error" => &mut params.error,
                "error_description" => &mut params.error_description,
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(value.into_owned());
            }
        }
        params
    }

    /// Combine query and body parameters, field by field; the query wins
    pub fn merge(query: Self, body: Self) -> Self {
        Self {
            code: query.code.or(body.code),
            state: query.state.or(body.state),
            error: query.error.or(body.error),
            error_description: query.error_description.or(body.error_description),
        }
    }

    /// Provider-reported error code, if any
    pub fn provider_error(&self) -> Option<&str> {
        self.error.as_deref().filter(|e| !e.trim().is_empty())
    }

    pub fn classify(&self) -> CallbackKind {
        let Some(code) = self.provider_error() else {
            return CallbackKind::Exchanging;
        };

        if RECOVERABLE_ERRORS.contains(&code) {
            return CallbackKind::ProviderError(AuthError::ProviderProtocol(code.to_string()));
        }

        let message = self
            .error_description
            .as_deref()
            .filter(|d| !d.trim().is_empty())
            .unwrap_or(code);
        CallbackKind::UserError(AuthError::UserFacing(message.to_string()))
    }
}

/// First branch of the state machine
#[derive(Debug)]
pub enum CallbackKind {
    /// Recoverable: start over with a fresh prompt
    ProviderError(AuthError),
    /// Terminal provider-reported error
    UserError(AuthError),
    Exchanging,
}

#[derive(Debug)]
pub enum CallbackOutcome {
    /// Send the browser back to the provider
    Retry(Url),
    Reconciled {
        account: AccountHandle,
        path: ReconcilePath,
        destination: String,
    },
    Failed(AuthError),
}

/// Run the callback state machine against the session behind `store`
///
/// The host session is marked authenticated only once reconciliation
/// succeeded.
pub async fn process_callback(
    service: &AuthService,
    store: &KeyedSessionStore,
    params: &CallbackParams,
) -> CallbackOutcome {
    match params.classify() {
        CallbackKind::ProviderError(reason) => {
            tracing::info!(
                event = "provider_retry",
                reason = %reason,
                "Provider requested a fresh login"
            );
            let state = LoginState::retry(service.referrer.clone());
            match initiate_login(service.provider.as_ref(), store, &state).await {
                Ok(url) => CallbackOutcome::Retry(url),
                Err(e) => CallbackOutcome::Failed(e),
            }
        }
        CallbackKind::UserError(error) => CallbackOutcome::Failed(error),
        CallbackKind::Exchanging => match exchange_and_reconcile(service, store, params).await {
            Ok((account, path)) => match store.session().login(account.id).await {
                Ok(()) => CallbackOutcome::Reconciled {
                    account,
                    path,
                    destination: LoginState::decode(params.state.as_deref())
                        .resolved_destination(),
                },
                Err(e) => CallbackOutcome::Failed(e),
            },
            Err(e) => CallbackOutcome::Failed(e),
        },
    }
}

async fn exchange_and_reconcile(
    service: &AuthService,
    store: &KeyedSessionStore,
    params: &CallbackParams,
) -> Result<(AccountHandle, ReconcilePath), AuthError> {
    let provider = service.provider.as_ref();

    provider
        .exchange_code_for_tokens(store, params.code.as_deref(), params.state.as_deref())
        .await?;

    let claims = provider
        .get_authenticated_user(store)
        .await?
        .ok_or_else(|| AuthError::Exchange("no user claims after token exchange".to_string()))?;

    let identity = ExternalIdentity::from_claims(&claims, &service.legacy_claim)?;
    let reconciliation = service.reconciler.reconcile(&identity).await?;

    Ok((reconciliation.account, reconciliation.path))
}

/// Turn an outcome into the HTTP response
pub async fn respond(
    service: &AuthService,
    store: &KeyedSessionStore,
    outcome: CallbackOutcome,
) -> Response {
    match outcome {
        CallbackOutcome::Retry(url) => found_redirect(url.as_str()),
        CallbackOutcome::Reconciled {
            account,
            path,
            destination,
        } => {
            tracing::info!(
                event = "login_completed",
                account_id = account.id,
                path = ?path,
                "User logged in"
            );
            found_redirect(&destination)
        }
        CallbackOutcome::Failed(error) => {
            handle_failure(store, &service.logout_hooks, &error.to_string(), error.kind()).await
        }
    }
}
