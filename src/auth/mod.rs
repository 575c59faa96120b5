//! Authentication module
//!
//! This module bridges the host session to an external OpenID Connect provider.
//!
//! ## Structure
//!
//! - `provider`: `OidcClient` contract and the `oauth2`-backed implementation
//! - `login`: login state codec and redirect construction
//! - `callback`: callback state machine (retry, exchange, reconcile, fail)
//! - `reconcile`: external subject to local account mapping, legacy migration
//! - `failure`: single sink for terminal login errors
//! - `service`: shared collaborators for the handlers
//! - `helpers`: Pure helper functions (redirects, destination checks, HTTP client)
//! - `handlers`: HTTP handlers for login, callback, and logout flows
//!
//! ## Authentication Flow
//!
//! 1. User visits `/auth/login?destination=/x` → redirect to the provider
//! 2. Provider authenticates → redirect to `/auth/authorize`
//! 3. Bridge exchanges the code, reconciles the account, logs the session in → redirect to `/x`
//! 4. User visits `/auth/logout` → provider state purged, session destroyed → redirect to `/`

pub mod callback;
pub mod failure;
pub mod handlers;
pub mod helpers;
pub mod login;
pub mod provider;
pub mod reconcile;
pub mod service;

// Re-export handlers for convenient routing
pub use handlers::{authorize_handler, login_handler, logout_handler, LoginQuery};

pub use callback::{process_callback, CallbackKind, CallbackOutcome, CallbackParams};
pub use failure::{handle_failure, LogoutHook, TracingLogoutHook, FAILURE_NOTICE};
pub use login::{initiate_login, LoginState, PromptMode};
pub use provider::{AuthorizationParams, Claims, OAuth2Provider, OidcClient};
pub use reconcile::{
    AccountDirectory, AccountHandle, AccountProfile, ExternalIdentity, IdentityReconciler,
    InMemoryDirectory, LinkTags, ReconcilePath, Reconciliation,
};
pub use service::AuthService;
