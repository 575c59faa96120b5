//! Authentication handlers for login, callback, and logout flows
//!
//! This module contains the Axum HTTP handlers for the OIDC login bridge:
//! - `login_handler`: starts the authorization code flow
//! - `authorize_handler`: provider callback (GET query or POSTed form)
//! - `logout_handler`: closes the local session
//!
//! Each handler receives the host session from the session layer and runs
//! the flow against it; the layer persists it and sets the cookie.

use axum::{
    body::Bytes,
    extract::{Query, RawQuery, State},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use std::sync::Arc;
use tower_sessions::Session;

use super::callback::{process_callback, respond, CallbackParams};
use super::failure::end_session;
use super::helpers::{found_redirect, SITE_ROOT};
use super::login::{initiate_login, LoginState};
use crate::session::KeyedSessionStore;
use crate::AppState;

// =============================================================================
// Types
// =============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct LoginQuery {
    pub destination: Option<String>,
}

// =============================================================================
// Handlers
// =============================================================================

/// Login handler - redirects to the provider with a fresh prompt
///
/// The `destination` argument only ever reaches the provider inside `state`.
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LoginQuery>,
    session: Session,
) -> Response {
    tracing::info!(event = "login_start", "Login requested");

    let store = KeyedSessionStore::new(session);
    let login = LoginState::initial(query.destination, state.auth.referrer.clone());

    match initiate_login(state.auth.provider.as_ref(), &store, &login).await {
        Ok(url) => found_redirect(url.as_str()),
        Err(e) => e.into_response(),
    }
}

/// Callback handler - the provider sends the browser back here
///
/// Parameters are read from the query string first, then from a form body.
pub async fn authorize_handler(
    State(state): State<Arc<AppState>>,
    RawQuery(query): RawQuery,
    session: Session,
    body: Bytes,
) -> Response {
    let params = CallbackParams::merge(
        CallbackParams::from_form(query.as_deref().unwrap_or_default().as_bytes()),
        CallbackParams::from_form(&body),
    );

    tracing::info!(
        event = "callback_received",
        has_code = params.code.is_some(),
        has_state = params.state.is_some(),
        error = ?params.provider_error(),
        "Provider callback received"
    );

    let store = KeyedSessionStore::new(session);

    let outcome = process_callback(&state.auth, &store, &params).await;
    respond(&state.auth, &store, outcome).await
}

/// Logout handler - forgets provider state and ends the host session
pub async fn logout_handler(State(state): State<Arc<AppState>>, session: Session) -> Response {
    let store = KeyedSessionStore::new(session);

    if let Err(e) = state.auth.provider.logout(&store).await {
        tracing::warn!(error = %e, "Failed to clear provider state on logout");
    }

    match end_session(store.session(), &state.auth.logout_hooks).await {
        Ok(Some(account_id)) => {
            tracing::info!(event = "logout_complete", account_id, "User logged out")
        }
        Ok(None) => tracing::debug!("Logout requested without an authenticated session"),
        Err(e) => return e.into_response(),
    }

    found_redirect(SITE_ROOT)
}
