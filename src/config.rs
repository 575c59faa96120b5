use std::env;
use std::fmt;
use tower_sessions::cookie::Key;

use crate::auth::reconcile::LinkTags;
use crate::error::AuthError;

/// Shortest accepted `cookie_secret`, in bytes
pub const MIN_COOKIE_SECRET_LEN: usize = 64;

#[derive(Debug, Clone, PartialEq)]
pub enum Environment {
    Development,
    Production,
}

/// Identity provider credentials
///
/// Every field except `referrer` is required. The provider client refuses to
/// build from a config that fails [`ProviderConfig::validate`]. The
/// `cookie_secret` signs the session cookie.
#[derive(Clone, PartialEq)]
pub struct ProviderConfig {
    pub issuer_host: String,
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub cookie_secret: String,
    /// Optional tag forwarded to the provider on every login redirect
    pub referrer: Option<String>,
}

impl ProviderConfig {
    pub fn new(
        issuer_host: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_uri: impl Into<String>,
        cookie_secret: impl Into<String>,
    ) -> Self {
        Self {
            issuer_host: normalize_host(&issuer_host.into()),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            redirect_uri: redirect_uri.into(),
            cookie_secret: cookie_secret.into(),
            referrer: None,
        }
    }

    pub fn with_referrer(mut self, referrer: Option<String>) -> Self {
        self.referrer = referrer.filter(|r| !r.trim().is_empty());
        self
    }

    /// Check that all required fields are present
    pub fn validate(&self) -> Result<(), AuthError> {
        let missing: Vec<&str> = [
            ("issuer_host", &self.issuer_host),
            ("client_id", &self.client_id),
            ("client_secret", &self.client_secret),
            ("redirect_uri", &self.redirect_uri),
            ("cookie_secret", &self.cookie_secret),
        ]
        .iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| *name)
        .collect();

        if !missing.is_empty() {
            return Err(AuthError::Configuration(format!(
                "missing provider settings: {}",
                missing.join(", ")
            )));
        }
        self.cookie_key().map(|_| ())
    }

    /// Signing key for the session cookie
    pub fn cookie_key(&self) -> Result<Key, AuthError> {
        if self.cookie_secret.len() < MIN_COOKIE_SECRET_LEN {
            return Err(AuthError::Configuration(format!(
                "cookie_secret must be at least {} bytes",
                MIN_COOKIE_SECRET_LEN
            )));
        }
        Key::try_from(self.cookie_secret.as_bytes())
            .map_err(|e| AuthError::Configuration(format!("unusable cookie_secret: {}", e)))
    }

    /// Base URL of the provider; bare hosts are served over https
    pub fn issuer_base_url(&self) -> String {
        if self.issuer_host.starts_with("http://") || self.issuer_host.starts_with("https://") {
            self.issuer_host.clone()
        } else {
            format!("https://{}", self.issuer_host)
        }
    }
}

// Secrets must never reach the logs
impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("issuer_host", &self.issuer_host)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("redirect_uri", &self.redirect_uri)
            .field("cookie_secret", &"<redacted>")
            .field("referrer", &self.referrer)
            .finish()
    }
}

fn normalize_host(raw: &str) -> String {
    raw.trim().trim_matches('/').to_string()
}

#[derive(Debug, Clone)]
pub struct Config {
    // Environment configuration
    pub environment: Environment,

    // Server configuration
    pub server_host: String,
    pub server_port: u16,

    // Identity provider
    pub provider: ProviderConfig,
    /// Claim carrying the subject from the legacy identity scheme
    pub legacy_claim: String,
    pub link_tags: LinkTags,

    // Session cookie configuration (None = host-only cookie, Some = domain cookie)
    pub session_cookie_name: String,
    pub cookie_domain: Option<String>,

    // Session lifetime (in seconds): idle expiry and how often expired records are swept
    pub session_idle_timeout_secs: u32,
    pub session_sweep_interval_secs: u64,

    // HTTP client timeout configuration (in seconds)
    pub http_connect_timeout_secs: u64,
    pub http_request_timeout_secs: u64,
}

impl Config {
    /// Configuration with defaults for everything but the provider
    pub fn new(provider: ProviderConfig) -> Self {
        Self {
            environment: Environment::Development,
            server_host: "0.0.0.0".to_string(),
            server_port: 3000,
            provider,
            legacy_claim: "legacyId".to_string(),
            link_tags: LinkTags::default(),
            session_cookie_name: "bridge_session".to_string(),
            cookie_domain: None,
            session_idle_timeout_secs: 8 * 60 * 60,
            session_sweep_interval_secs: 60,
            http_connect_timeout_secs: 10,
            http_request_timeout_secs: 30,
        }
    }

    /// Load configuration from environment variables using std::env::var
    pub fn load() -> anyhow::Result<Self> {
        let environment = match env::var("ENVIRONMENT")
            .unwrap_or_else(|_| "development".to_string())
            .to_lowercase()
            .as_str()
        {
            "production" | "prod" => Environment::Production,
            _ => Environment::Development,
        };

        // Required variables
        let issuer_host = required("OIDC_ISSUER_HOST")?;
        let client_id = required("OIDC_CLIENT_ID")?;
        let client_secret = required("OIDC_CLIENT_SECRET")?;
        let redirect_uri = required("OIDC_REDIRECT_URI")?;
        let cookie_secret = required("OIDC_COOKIE_SECRET")?;

        let provider = ProviderConfig::new(
            issuer_host,
            client_id,
            client_secret,
            redirect_uri,
            cookie_secret,
        )
        .with_referrer(env::var("OIDC_REFERRER").ok());

        // Empty values pass the presence check above but are still unusable
        provider.validate()?;

        let mut config = Config::new(provider);
        config.environment = environment;

        if let Ok(host) = env::var("SERVER_HOST") {
            config.server_host = host;
        }
        if let Some(port) = env::var("SERVER_PORT").ok().and_then(|s| s.parse::<u16>().ok()) {
            config.server_port = port;
        }
        if let Some(claim) = non_empty("OIDC_LEGACY_CLAIM") {
            config.legacy_claim = claim;
        }
        if let Some(tag) = non_empty("LINK_TAG_CURRENT") {
            config.link_tags.current = tag;
        }
        if let Some(tag) = non_empty("LINK_TAG_LEGACY") {
            config.link_tags.legacy = tag;
        }
        if let Some(name) = non_empty("SESSION_COOKIE_NAME") {
            config.session_cookie_name = name;
        }

        // Cookie domain: if not set or empty, use host-only cookies (no Domain attribute)
        config.cookie_domain = non_empty("COOKIE_DOMAIN");

        if let Some(secs) = env::var("SESSION_IDLE_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .filter(|secs| *secs > 0)
        {
            config.session_idle_timeout_secs = secs;
        }
        if let Some(secs) = env::var("SESSION_SWEEP_INTERVAL_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .filter(|secs| *secs > 0)
        {
            config.session_sweep_interval_secs = secs;
        }

        if let Some(secs) = env::var("HTTP_CONNECT_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
        {
            config.http_connect_timeout_secs = secs;
        }
        if let Some(secs) = env::var("HTTP_REQUEST_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
        {
            config.http_request_timeout_secs = secs;
        }

        if config.link_tags.current == config.link_tags.legacy {
            anyhow::bail!("LINK_TAG_CURRENT and LINK_TAG_LEGACY must differ");
        }

        Ok(config)
    }

    /// Check if running in production mode
    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }

    /// Get bind address for server
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }
}

fn required(name: &str) -> anyhow::Result<String> {
    env::var(name).map_err(|_| anyhow::anyhow!("{} environment variable is required", name))
}

fn non_empty(name: &str) -> Option<String> {
    env::var(name).ok().filter(|s| !s.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> ProviderConfig {
        ProviderConfig::new(
            "account.example.com",
            "client",
            "secret",
            "https://app.example.com/auth/authorize",
            "cookie-secret-".repeat(5),
        )
    }

    #[test]
    fn test_validate_accepts_complete_config() {
        assert!(provider().validate().is_ok());
    }

    #[test]
    fn test_validate_lists_missing_fields() {
        let mut config = provider();
        config.client_secret = String::new();
        config.cookie_secret = "  ".to_string();

        let err = config.validate().unwrap_err();

        assert!(matches!(err, AuthError::Configuration(_)));
        let message = err.to_string();
        assert!(message.contains("client_secret"));
        assert!(message.contains("cookie_secret"));
        assert!(!message.contains("client_id,"));
    }

    #[test]
    fn test_issuer_host_is_normalized() {
        let config = ProviderConfig::new(" /account.example.com/ ", "c", "s", "r", "k");
        assert_eq!(config.issuer_host, "account.example.com");
        assert_eq!(config.issuer_base_url(), "https://account.example.com");
    }

    #[test]
    fn test_explicit_scheme_is_kept() {
        let config = ProviderConfig::new("http://127.0.0.1:8080/", "c", "s", "r", "k");
        assert_eq!(config.issuer_base_url(), "http://127.0.0.1:8080");
    }

    #[test]
    fn test_empty_referrer_is_absent() {
        let config = provider().with_referrer(Some("  ".to_string()));
        assert_eq!(config.referrer, None);

        let config = provider().with_referrer(Some("festival-x".to_string()));
        assert_eq!(config.referrer.as_deref(), Some("festival-x"));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let rendered = format!("{:?}", provider());
        assert!(!rendered.contains("cookie-secret"));
        assert!(!rendered.contains("\"secret\""));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn test_short_cookie_secret_is_rejected() {
        let mut config = provider();
        config.cookie_secret = "too-short".to_string();

        let err = config.validate().unwrap_err();

        assert!(matches!(err, AuthError::Configuration(_)));
        assert!(err.to_string().contains("cookie_secret"));
        assert!(config.cookie_key().is_err());
    }

    #[test]
    fn test_cookie_key_is_derived_from_secret() {
        let key = provider().cookie_key().unwrap();
        let again = provider().cookie_key().unwrap();
        assert_eq!(key.signing(), again.signing());

        let mut other = provider();
        other.cookie_secret = "another-secret-".repeat(5);
        assert_ne!(other.cookie_key().unwrap().signing(), key.signing());
    }
}
