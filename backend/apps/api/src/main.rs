//! API Server Entry Point
//!
//! Application entry point and server initialization.
//! Uses `anyhow` for startup errors; request errors are rendered by the
//! security crate.

use anyhow::Context;
use axum::{
    Router, http,
    http::{Method, header},
};
use platform::password::{ClearTextPassword, HashAlgorithm, PasswordHasher};
use security::config::{RateLimitConfig, SecurityConfig};
use security::{
    MemoryCredentialRepository, MemoryRateLimitStore, MemorySessionRepository, SecurityAppState,
    security_router,
};
use std::env;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::cors::{AllowHeaders, AllowMethods, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "api=info,security=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Security configuration
    let mut config = if cfg!(debug_assertions) {
        SecurityConfig::development()
    } else {
        SecurityConfig::default()
    };
    if let Some(secure) = env_parse::<bool>("COOKIE_SECURE")? {
        config.session.cookie.secure = secure;
    }
    if let Some(trust_proxy) = env_parse::<bool>("TRUST_PROXY")? {
        config.trust_proxy = trust_proxy;
    }
    let limit = env_parse::<u32>("RATE_LIMIT_MAX")?.unwrap_or(config.rate_limit.limit);
    let window_secs =
        env_parse::<u64>("RATE_LIMIT_WINDOW_SECS")?.unwrap_or(config.rate_limit.window.as_secs());
    config.rate_limit = RateLimitConfig::new(limit, window_secs);
    if let Some(algorithm) = env_parse::<HashAlgorithm>("PASSWORD_ALGORITHM")? {
        config.hasher.algorithm = algorithm;
    }
    if let Some(idle_secs) = env_parse::<u64>("SESSION_IDLE_SECS")? {
        config.session.idle_timeout = Duration::from_secs(idle_secs);
    }

    tracing::info!(
        cookie = %config.session.name(),
        secure = config.session.cookie.secure,
        rate_limit = config.rate_limit.limit,
        window_secs = config.rate_limit.window.as_secs(),
        idle_secs = config.session.idle_timeout.as_secs(),
        algorithm = %config.hasher.algorithm.as_str(),
        "Security configuration loaded"
    );

    // In-memory backends
    let sessions = Arc::new(MemorySessionRepository::new());
    let rate_limits = Arc::new(MemoryRateLimitStore::new());
    let credentials = Arc::new(MemoryCredentialRepository::new());

    if let (Ok(user), Ok(password)) = (env::var("DEMO_USER"), env::var("DEMO_PASSWORD")) {
        let hasher = PasswordHasher::new(config.hasher)?;
        let hash = hasher.compute(&ClearTextPassword::new(password))?;
        credentials.insert(user.as_str(), hash.as_str());
        tracing::info!(user = %user, "Demo user registered");
    }

    // Periodic cleanup: drop elapsed rate limit windows and idle sessions
    let purge_limits = rate_limits.clone();
    let purge_sessions = sessions.clone();
    let purge_config = config.rate_limit.clone();
    let max_idle = config.session.idle_timeout;
    tokio::spawn(async move {
        let period = purge_config
            .window
            .min(max_idle)
            .max(Duration::from_secs(1));
        let mut interval = tokio::time::interval(period);
        loop {
            interval.tick().await;
            purge_limits.purge_expired(&purge_config);
            purge_sessions.purge_idle(max_idle);
        }
    });

    let state = SecurityAppState::new(sessions, rate_limits, credentials, config)?;

    // CORS configuration
    let frontend_origins = env::var("FRONTEND_ORIGINS")
        .unwrap_or_else(|_| "http://localhost:40922,http://127.0.0.1:40922".to_string());

    let allowed_origins: Vec<http::HeaderValue> = frontend_origins
        .split(',')
        .filter_map(|origin| origin.trim().parse().ok())
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(allowed_origins)
        .allow_methods(AllowMethods::list([
            Method::GET,
            Method::POST,
            Method::OPTIONS,
        ]))
        .allow_headers(AllowHeaders::list([header::CONTENT_TYPE, header::ACCEPT]))
        .allow_credentials(true);

    // Build router
    let app = Router::new()
        .nest("/api/security", security_router(state))
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    // Start server
    let addr: SocketAddr = env::var("BIND_ADDR")
        .unwrap_or_else(|_| "0.0.0.0:31113".to_string())
        .parse()
        .context("BIND_ADDR must be a socket address")?;
    tracing::info!("Listening on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

/// Parse an optional environment variable
fn env_parse<T>(name: &str) -> anyhow::Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("{name} is invalid: {e}")),
        Err(_) => Ok(None),
    }
}
