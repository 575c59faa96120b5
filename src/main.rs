use anyhow::Result;
use idbridge::{
    auth::{InMemoryDirectory, OAuth2Provider, TracingLogoutHook},
    session::spawn_expiry_sweep,
    web, AppState,
};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting login bridge");

    // Load configuration from environment
    let config = idbridge::config::Config::load()?;
    tracing::info!(
        environment = ?config.environment,
        issuer_host = %config.provider.issuer_host,
        current_tag = %config.link_tags.current,
        legacy_tag = %config.link_tags.legacy,
        "Configuration loaded"
    );

    // Provider client refuses incomplete credentials
    let provider = Arc::new(
        OAuth2Provider::new(
            &config.provider,
            config.http_connect_timeout_secs,
            config.http_request_timeout_secs,
        )
        .map_err(|e| anyhow::anyhow!("Failed to initialize OIDC provider client: {}", e))?,
    );

    // Accounts live in process memory; a host integration supplies its own directory
    let directory = Arc::new(InMemoryDirectory::new());

    let bind_address = config.bind_address();
    let sweep_interval = Duration::from_secs(config.session_sweep_interval_secs);
    let state = Arc::new(
        AppState::new(config, provider, directory)
            .map_err(|e| anyhow::anyhow!("Failed to initialize session signing: {}", e))?
            .with_logout_hook(Arc::new(TracingLogoutHook)),
    );

    // Abandoned logins and idle sessions are reclaimed in the background
    spawn_expiry_sweep(state.sessions.clone(), sweep_interval);

    let app = web::create_router(state);

    // Bind and serve
    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    tracing::info!("Login bridge listening on {}", bind_address);

    axum::serve(listener, app).await?;

    Ok(())
}
