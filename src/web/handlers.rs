use crate::{
    auth::reconcile::ExternalIdentity,
    session::{KeyedSessionStore, SessionExt},
    AppState,
};
use axum::extract::State;
use axum::http::{header::CACHE_CONTROL, StatusCode};
use axum::response::{IntoResponse, Response};
use std::fmt::Write;
use std::sync::Arc;
use tower_sessions::Session;

use crate::auth::helpers::PRIVATE_NO_CACHE;
use crate::error::AuthError;

/// Liveness check - always returns OK if the process is running
pub async fn healthz_handler() -> impl IntoResponse {
    StatusCode::OK
}

/// Plain-text landing page: login status plus any pending notices
///
/// Rendering consumes the notices.
pub async fn landing_handler(
    State(state): State<Arc<AppState>>,
    session: Session,
) -> Result<Response, AuthError> {
    let notices = session.take_flash().await?;
    let account = session.authenticated_account().await?;
    let store = KeyedSessionStore::new(session);

    let mut body = String::new();
    for notice in notices {
        let _ = writeln!(body, "! {}", notice);
    }

    match account {
        Some(account_id) => {
            let identity = match state.auth.provider.get_authenticated_user(&store).await {
                Ok(Some(claims)) => {
                    ExternalIdentity::from_claims(&claims, &state.auth.legacy_claim).ok()
                }
                Ok(None) => None,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to read provider claims");
                    None
                }
            };
            match identity.as_ref().and_then(ExternalIdentity::nickname) {
                Some(nickname) => {
                    let _ = writeln!(body, "Signed in as account {} ({})", account_id, nickname);
                }
                None => {
                    let _ = writeln!(body, "Signed in as account {}", account_id);
                }
            }
        }
        None => body.push_str("Not signed in\n"),
    }

    Ok(([(CACHE_CONTROL, PRIVATE_NO_CACHE)], body).into_response())
}
