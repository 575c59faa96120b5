//! Login initiation and the round-tripped login state
//!
//! The post-login destination travels through the provider inside the
//! `state` parameter as unpadded URL-safe base64 JSON
//! (`{"destination": "/path"}`), so it survives a provider that echoes it
//! back without percent-encoding.
//! Prompt mode and referrer are sent as their own authorization parameters.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::{Deserialize, Serialize};
use url::Url;

use super::helpers::{is_external, SITE_ROOT};
use super::provider::{AuthorizationParams, OidcClient};
use crate::error::AuthError;
use crate::session::KeyedSessionStore;

/// Query parameter carrying the client-supplied destination
pub const DESTINATION_PARAM: &str = "destination";

/// Whether the provider must re-prompt for credentials
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PromptMode {
    Login,
    #[default]
    Default,
}

impl PromptMode {
    /// Value of the `prompt` authorization parameter, if any
    pub fn as_param(&self) -> Option<&'static str> {
        match self {
            PromptMode::Login => Some("login"),
            PromptMode::Default => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoginState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
    #[serde(skip)]
    pub prompt: PromptMode,
    #[serde(skip)]
    pub referrer: Option<String>,
}

impl LoginState {
    /// State for a user-initiated login; always forces a fresh prompt
    pub fn initial(destination: Option<String>, referrer: Option<String>) -> Self {
        Self {
            destination: destination.filter(|d| !d.trim().is_empty()),
            prompt: PromptMode::Login,
            referrer,
        }
    }

    /// State for the loop-back after a recoverable provider error
    pub fn retry(referrer: Option<String>) -> Self {
        Self::initial(None, referrer)
    }

    /// Opaque `state` value, `None` when there is nothing to carry
    pub fn encode(&self) -> Option<String> {
        self.destination.as_ref()?;
        match serde_json::to_vec(self) {
            Ok(json) => Some(URL_SAFE_NO_PAD.encode(json)),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to serialize login state");
                None
            }
        }
    }

    /// Decode a `state` value. Missing, empty or unreadable state is an empty state.
    pub fn decode(raw: Option<&str>) -> Self {
        let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
            return Self::default();
        };

        let bytes = match URL_SAFE_NO_PAD.decode(raw) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(error = %e, "Discarding undecodable login state");
                return Self::default();
            }
        };

        match serde_json::from_slice(&bytes) {
            Ok(state) => state,
            Err(e) => {
                tracing::warn!(error = %e, "Discarding malformed login state");
                Self::default()
            }
        }
    }

    /// Where to send the user after a successful login
    ///
    /// Off-site destinations are replaced by the site root.
    pub fn resolved_destination(&self) -> String {
        match self.destination.as_deref() {
            Some(destination) if is_external(destination) => {
                tracing::warn!(
                    event = "external_destination_discarded",
                    "Discarding external destination from login state"
                );
                SITE_ROOT.to_string()
            }
            Some(destination) if !destination.trim().is_empty() => destination.to_string(),
            _ => SITE_ROOT.to_string(),
        }
    }

    pub fn authorization_params(&self) -> AuthorizationParams {
        AuthorizationParams {
            prompt: self.prompt,
            state: self.encode(),
            referrer: self.referrer.clone(),
        }
    }
}

/// Build the provider redirect for `state`, persisting protocol state in `store`
pub async fn initiate_login(
    provider: &dyn OidcClient,
    store: &KeyedSessionStore,
    state: &LoginState,
) -> Result<Url, AuthError> {
    let url = provider
        .build_login_url(store, &state.authorization_params())
        .await?;

    tracing::info!(
        event = "login_redirect",
        has_destination = state.destination.is_some(),
        has_referrer = state.referrer.is_some(),
        prompt = ?state.prompt,
        "Redirecting to identity provider"
    );

    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_is_base64_json_destination() {
        let state = LoginState::initial(Some("/events/12".to_string()), None);

        let encoded = state.encode().unwrap();
        let json = URL_SAFE_NO_PAD.decode(&encoded).unwrap();

        assert_eq!(json, br#"{"destination":"/events/12"}"#);
    }

    #[test]
    fn test_relative_destination_round_trips() {
        for destination in ["/", "/events/12", "/search?q=jazz&page=2", "node/5"] {
            let encoded = LoginState::initial(Some(destination.to_string()), None)
                .encode()
                .unwrap();

            let decoded = LoginState::decode(Some(&encoded));

            assert_eq!(decoded.resolved_destination(), destination);
        }
    }

    #[test]
    fn test_external_destination_falls_back_to_root() {
        for destination in [
            "https://evil.example.com/phish",
            "//evil.example.com",
            "/\\evil.example.com",
            "javascript:alert(1)",
        ] {
            let encoded = URL_SAFE_NO_PAD.encode(
                serde_json::json!({ "destination": destination }).to_string(),
            );

            let decoded = LoginState::decode(Some(&encoded));

            assert_eq!(decoded.resolved_destination(), SITE_ROOT);
        }
    }

    #[test]
    fn test_missing_or_empty_state_is_empty() {
        assert_eq!(LoginState::decode(None), LoginState::default());
        assert_eq!(LoginState::decode(Some("")), LoginState::default());
        assert_eq!(LoginState::decode(None).resolved_destination(), SITE_ROOT);
    }

    #[test]
    fn test_garbage_state_is_empty() {
        assert_eq!(LoginState::decode(Some("%%%not-base64")), LoginState::default());
        let not_json = URL_SAFE_NO_PAD.encode("destination=/x");
        assert_eq!(LoginState::decode(Some(&not_json)), LoginState::default());
    }

    #[test]
    fn test_state_needs_no_percent_encoding() {
        // '>>>' and '???' hit the alphabet positions that differ from standard base64
        for destination in ["/a>>>", "/b???", "/events/12"] {
            let encoded = LoginState::initial(Some(destination.to_string()), None)
                .encode()
                .unwrap();
            assert!(
                encoded
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'),
                "{}",
                encoded
            );

            let echoed = Url::parse(&format!("https://app.example.com/cb?state={}", encoded))
                .unwrap();
            let state = echoed
                .query_pairs()
                .find(|(k, _)| k == "state")
                .map(|(_, v)| v.into_owned());

            assert_eq!(state.as_deref(), Some(encoded.as_str()));
            assert_eq!(
                LoginState::decode(state.as_deref()).resolved_destination(),
                destination
            );
        }
    }

    #[test]
    fn test_retry_has_prompt_and_referrer_but_no_destination() {
        let state = LoginState::retry(Some("festival-x".to_string()));
        let params = state.authorization_params();

        assert_eq!(params.prompt, PromptMode::Login);
        assert_eq!(params.referrer.as_deref(), Some("festival-x"));
        assert_eq!(params.state, None);
    }

    #[test]
    fn test_blank_destination_is_ignored() {
        let state = LoginState::initial(Some("  ".to_string()), None);
        assert_eq!(state.destination, None);
        assert_eq!(state.encode(), None);
    }
}
