//! Identity provider client
//!
//! [`OidcClient`] is the contract the callback state machine depends on. The
//! production implementation, [`OAuth2Provider`], drives the authorization
//! code flow with PKCE through the `oauth2` crate and reads the user's claims
//! from the provider's userinfo endpoint. All transient protocol state lives
//! in the [`KeyedSessionStore`] handed in by the caller.

use async_trait::async_trait;
use oauth2::{
    basic::{BasicErrorResponseType, BasicTokenType},
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, EndpointSet, ExtraTokenFields,
    PkceCodeChallenge, PkceCodeVerifier, RedirectUrl, Scope, StandardErrorResponse,
    StandardRevocableToken, StandardTokenIntrospectionResponse, StandardTokenResponse,
    TokenResponse, TokenUrl,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use super::helpers::create_http_client;
use super::login::PromptMode;
use crate::config::ProviderConfig;
use crate::error::AuthError;
use crate::session::KeyedSessionStore;

/// Claim set returned by the provider
pub type Claims = serde_json::Map<String, Value>;

/// Store keys owned by the provider client
pub const STATE_KEY: &str = "state";
pub const PKCE_VERIFIER_KEY: &str = "pkce_verifier";
pub const ACCESS_TOKEN_KEY: &str = "access_token";
pub const ID_TOKEN_KEY: &str = "id_token";
pub const USER_KEY: &str = "user";

/// Parameters for one authorization request
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuthorizationParams {
    pub prompt: PromptMode,
    /// Value for the `state` parameter; a random nonce is used when absent
    pub state: Option<String>,
    pub referrer: Option<String>,
}

/// Capability interface over the provider SDK
#[async_trait]
pub trait OidcClient: Send + Sync {
    /// Build the authorization endpoint URL and remember the pending state
    async fn build_login_url(
        &self,
        store: &KeyedSessionStore,
        params: &AuthorizationParams,
    ) -> Result<Url, AuthError>;

    /// Exchange the callback's authorization code for tokens
    async fn exchange_code_for_tokens(
        &self,
        store: &KeyedSessionStore,
        code: Option<&str>,
        state: Option<&str>,
    ) -> Result<(), AuthError>;

    /// Claims of the user authenticated by the last exchange, if any
    async fn get_authenticated_user(
        &self,
        store: &KeyedSessionStore,
    ) -> Result<Option<Claims>, AuthError>;

    /// Forget everything the client stored for this session
    async fn logout(&self, store: &KeyedSessionStore) -> Result<(), AuthError>;
}

/// Custom extra fields to capture id_token from OIDC response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OidcTokenFields {
    pub id_token: Option<String>,
}

impl ExtraTokenFields for OidcTokenFields {}

/// Type alias for our configured OAuth client with OIDC support
type ConfiguredOAuthClient = oauth2::Client<
    StandardErrorResponse<BasicErrorResponseType>,
    StandardTokenResponse<OidcTokenFields, BasicTokenType>,
    StandardTokenIntrospectionResponse<OidcTokenFields, BasicTokenType>,
    StandardRevocableToken,
    StandardErrorResponse<oauth2::RevocationErrorResponseType>,
    EndpointSet,            // HasAuthUrl
    oauth2::EndpointNotSet, // HasDeviceAuthUrl
    oauth2::EndpointNotSet, // HasIntrospectionUrl
    oauth2::EndpointNotSet, // HasRevocationUrl
    EndpointSet,            // HasTokenUrl
>;

/// Authorization-code client for an Auth0-style provider
pub struct OAuth2Provider {
    client: ConfiguredOAuthClient,
    userinfo_url: Url,
    http_client: reqwest::Client,
}

impl OAuth2Provider {
    /// Build the client; an incomplete config fails closed
    pub fn new(
        config: &ProviderConfig,
        connect_timeout_secs: u64,
        request_timeout_secs: u64,
    ) -> Result<Self, AuthError> {
        config.validate()?;
        let base = config.issuer_base_url();

        let auth_url = AuthUrl::new(format!("{}/authorize", base))
            .map_err(|e| AuthError::Configuration(format!("Invalid auth URL: {}", e)))?;
        let token_url = TokenUrl::new(format!("{}/oauth/token", base))
            .map_err(|e| AuthError::Configuration(format!("Invalid token URL: {}", e)))?;
        let redirect_url = RedirectUrl::new(config.redirect_uri.clone())
            .map_err(|e| AuthError::Configuration(format!("Invalid redirect URL: {}", e)))?;
        let userinfo_url = Url::parse(&format!("{}/userinfo", base))
            .map_err(|e| AuthError::Configuration(format!("Invalid userinfo URL: {}", e)))?;

        let http_client = create_http_client(connect_timeout_secs, request_timeout_secs)
            .map_err(|e| AuthError::Configuration(format!("Failed to build HTTP client: {}", e)))?;

        let client = oauth2::Client::new(ClientId::new(config.client_id.clone()))
            .set_client_secret(ClientSecret::new(config.client_secret.clone()))
            .set_auth_uri(auth_url)
            .set_token_uri(token_url)
            .set_redirect_uri(redirect_url);

        tracing::info!(
            issuer = %base,
            client_id = %config.client_id,
            "OIDC provider client initialized"
        );

        Ok(Self {
            client,
            userinfo_url,
            http_client,
        })
    }

    async fn fetch_claims(&self, access_token: &str) -> Result<Claims, AuthError> {
        self.http_client
            .get(self.userinfo_url.clone())
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| AuthError::Exchange(format!("userinfo request failed: {}", e)))?
            .error_for_status()
            .map_err(|e| AuthError::Exchange(format!("userinfo request rejected: {}", e)))?
            .json::<Claims>()
            .await
            .map_err(|e| AuthError::Exchange(format!("userinfo response unreadable: {}", e)))
    }
}

#[async_trait]
impl OidcClient for OAuth2Provider {
    async fn build_login_url(
        &self,
        store: &KeyedSessionStore,
        params: &AuthorizationParams,
    ) -> Result<Url, AuthError> {
        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();
        let state = params.state.clone();

        let mut request = self
            .client
            .authorize_url(move || state.map(CsrfToken::new).unwrap_or_else(CsrfToken::new_random))
            .add_scope(Scope::new("openid".to_string()))
            .add_scope(Scope::new("profile".to_string()))
            .add_scope(Scope::new("email".to_string()))
            .set_pkce_challenge(pkce_challenge);

        if let Some(prompt) = params.prompt.as_param() {
            request = request.add_extra_param("prompt", prompt);
        }
        if let Some(referrer) = &params.referrer {
            request = request.add_extra_param("referrer", referrer.clone());
        }

        let (auth_url, csrf_token) = request.url();

        store
            .set(STATE_KEY, Value::String(csrf_token.secret().clone()))
            .await?;
        store
            .set(PKCE_VERIFIER_KEY, Value::String(pkce_verifier.secret().clone()))
            .await?;

        Ok(auth_url)
    }

    async fn exchange_code_for_tokens(
        &self,
        store: &KeyedSessionStore,
        code: Option<&str>,
        state: Option<&str>,
    ) -> Result<(), AuthError> {
        let code = code
            .filter(|c| !c.is_empty())
            .ok_or_else(|| AuthError::Exchange("missing authorization code".to_string()))?;

        let expected_state = store.get_string(STATE_KEY).await?;
        let verifier = store.get_string(PKCE_VERIFIER_KEY).await?;

        // Pending state is single-use whatever the outcome
        store.delete(STATE_KEY).await?;
        store.delete(PKCE_VERIFIER_KEY).await?;

        let expected_state = expected_state.ok_or_else(|| {
            AuthError::Exchange("no authorization request pending for this session".to_string())
        })?;
        if state != Some(expected_state.as_str()) {
            tracing::warn!(
                has_state = state.is_some(),
                "CSRF validation failed: state mismatch (callback vs session)"
            );
            return Err(AuthError::Exchange("invalid state".to_string()));
        }
        let verifier = verifier
            .ok_or_else(|| AuthError::Exchange("missing PKCE verifier".to_string()))?;

        tracing::debug!(code_length = code.len(), "Exchanging authorization code for tokens");

        let token_response = self
            .client
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .set_pkce_verifier(PkceCodeVerifier::new(verifier))
            .request_async(&self.http_client)
            .await
            .map_err(|e| AuthError::Exchange(e.to_string()))?;

        let access_token = token_response.access_token().secret().clone();
        let claims = self.fetch_claims(&access_token).await?;

        store
            .set(ACCESS_TOKEN_KEY, Value::String(access_token))
            .await?;
        match &token_response.extra_fields().id_token {
            Some(id_token) => {
                store.set(ID_TOKEN_KEY, Value::String(id_token.clone())).await?;
            }
            None => tracing::warn!("No id_token received from provider"),
        }
        store.set(USER_KEY, Value::Object(claims)).await?;

        tracing::info!("Successfully obtained tokens and user claims");
        Ok(())
    }

    async fn get_authenticated_user(
        &self,
        store: &KeyedSessionStore,
    ) -> Result<Option<Claims>, AuthError> {
        Ok(match store.get(USER_KEY, Value::Null).await? {
            Value::Object(claims) => Some(claims),
            _ => None,
        })
    }

    async fn logout(&self, store: &KeyedSessionStore) -> Result<(), AuthError> {
        store.purge().await?;
        Ok(())
    }
}
