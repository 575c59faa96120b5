//! Error taxonomy for the login bridge
//!
//! Every terminal error raised while handling a provider callback ends up in
//! [`crate::auth::failure::handle_failure`]. The `Display` text of a variant is
//! what gets written to the operator log; end users only ever see the generic
//! failure notice.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    /// Missing or invalid provider credentials
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Provider asked for a fresh interactive login (`login_required` and friends)
    #[error("provider requested re-authentication: {0}")]
    ProviderProtocol(String),

    /// Any other provider-reported error; carries the description (or raw code) verbatim
    #[error("{0}")]
    UserFacing(String),

    /// Token exchange or claim retrieval failed
    #[error("token exchange failed: {0}")]
    Exchange(String),

    /// Local account lookup, link or registration failed
    #[error("account reconciliation failed: {0}")]
    Reconciliation(String),

    /// Session store key was empty after trimming
    #[error("invalid session key: {0:?}")]
    InvalidKey(String),

    /// The host session could not be read or written
    #[error("session error: {0}")]
    Session(#[from] tower_sessions::session::Error),
}

impl AuthError {
    /// Short, stable label for structured logs
    pub fn kind(&self) -> &'static str {
        match self {
            AuthError::Configuration(_) => "configuration",
            AuthError::ProviderProtocol(_) => "provider_protocol",
            AuthError::UserFacing(_) => "user_facing",
            AuthError::Exchange(_) => "exchange",
            AuthError::Reconciliation(_) => "reconciliation",
            AuthError::InvalidKey(_) => "invalid_key",
            AuthError::Session(_) => "session",
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        tracing::error!(kind = self.kind(), error = %self, "Authentication request failed");

        let message = match self {
            AuthError::Configuration(_) => "OAuth configuration error",
            _ => "Internal server error",
        };

        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "error": message })),
        )
            .into_response()
    }
}
