use super::handlers::{healthz_handler, landing_handler};
use crate::{
    auth::{authorize_handler, login_handler, logout_handler},
    session::session_layer,
    AppState,
};
use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub fn create_router(state: Arc<AppState>) -> Router {
    let sessions =
        session_layer(state.sessions.clone(), &state.config).with_signed(state.cookie_key.clone());

    Router::new()
        .route("/", get(landing_handler))
        .route("/healthz", get(healthz_handler))
        .route("/auth/login", get(login_handler))
        // Providers may answer with a redirect (GET) or form_post (POST)
        .route("/auth/authorize", get(authorize_handler).post(authorize_handler))
        .route("/auth/logout", get(logout_handler).post(logout_handler))
        .layer(sessions)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
