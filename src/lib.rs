//! Followgate - a page gate for GitHub followers and YouTube subscribers
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Route Dispatcher (Axum)                   │
//! │  - /, /login, /protected (guarded), /logout                  │
//! │  - /auth/{github,google}[/callback]                          │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Authorization Decision                     │
//! │  - GitHub: follows target account, or rejected               │
//! │  - Google: subscribed to target channel, or prompted         │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │          Provider adapters / verifiers (reqwest)             │
//! │  - OAuth code exchange, profile fetch                        │
//! │  - Follow check, subscription list                           │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       Session Store                          │
//! │  - SessionStore trait, in-memory (moka) implementation       │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - `auth`: OAuth flows, relationship checks, decision, sessions, guard
//! - `api`: Operational endpoints (metrics)
//! - `pages`: Static HTML
//! - `config`: Configuration management
//! - `error`: Error types
//! - `metrics`: Prometheus instruments

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod metrics;
pub mod pages;

use std::sync::Arc;
use std::time::Duration;

/// Application state shared across all handlers
///
/// This struct is cloned for each request and contains
/// shared resources like the session store and HTTP client.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<config::AppConfig>,

    /// Session storage, keyed by session id
    pub sessions: Arc<dyn auth::SessionStore>,

    /// HTTP client for provider APIs
    pub http_client: reqwest::Client,

    /// GitHub OAuth client registration
    pub github: Arc<auth::OAuthProvider>,

    /// Google OAuth client registration
    pub google: Arc<auth::OAuthProvider>,
}

impl AppState {
    /// Initialize application state with the in-memory session store
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be built
    pub fn new(config: config::AppConfig) -> Result<Self, error::AppError> {
        let max_age = Duration::from_secs(config.auth.session_max_age.max(1) as u64);
        let sessions = Arc::new(auth::MemorySessionStore::new(max_age));
        Self::with_session_store(config, sessions)
    }

    /// Initialize application state with a caller-provided session store
    pub fn with_session_store(
        config: config::AppConfig,
        sessions: Arc<dyn auth::SessionStore>,
    ) -> Result<Self, error::AppError> {
        tracing::info!("Initializing application state...");

        let http_client = reqwest::Client::builder()
            .user_agent(config.upstream.user_agent.clone())
            .timeout(Duration::from_secs(config.upstream.timeout_seconds))
            .build()
            .map_err(|e| error::AppError::Internal(e.into()))?;

        let github = auth::OAuthProvider::github(&config);
        let google = auth::OAuthProvider::google(&config);

        tracing::info!(
            github_target = %config.github.target_account,
            youtube_channel = %config.google.target_channel_id,
            "Application state initialized successfully"
        );

        Ok(Self {
            config: Arc::new(config),
            sessions,
            http_client,
            github: Arc::new(github),
            google: Arc::new(google),
        })
    }
}

/// Build the Axum router with all routes.
///
/// This is shared by the binary and integration tests to keep route
/// composition consistent across environments.
pub fn build_router(state: AppState) -> axum::Router {
    use axum::{Router, middleware};
    use tower_http::trace::TraceLayer;

    let cors_layer = build_cors_layer(&state.config.server);
    let metrics_enabled = state.config.metrics.enabled;

    let router = Router::new()
        .route("/health", axum::routing::get(health_check))
        .merge(auth::gate_router(state.clone()))
        .merge(auth::auth_router())
        .layer(middleware::from_fn(track_http_requests))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer)
        .with_state(state);

    if metrics_enabled {
        router.merge(api::metrics_router())
    } else {
        router
    }
}

fn build_cors_layer(server: &config::ServerConfig) -> tower_http::cors::CorsLayer {
    use axum::http::HeaderValue;
    use tower_http::cors::{Any, CorsLayer};

    if !server.protocol.eq_ignore_ascii_case("https") {
        return CorsLayer::permissive();
    }

    let allowed_origin = server.base_url();
    match HeaderValue::from_str(&allowed_origin) {
        Ok(origin) => CorsLayer::new()
            .allow_origin([origin])
            .allow_methods(Any)
            .allow_headers(Any),
        Err(error) => {
            tracing::error!(
                %error,
                origin = %allowed_origin,
                "Failed to parse CORS origin from server base URL; denying cross-origin requests"
            );
            CorsLayer::new().allow_methods(Any).allow_headers(Any)
        }
    }
}

/// Count requests per matched route
async fn track_http_requests(
    request: axum::extract::Request,
    next: axum::middleware::Next,
) -> axum::response::Response {
    let method = request.method().to_string();
    let endpoint = request
        .extensions()
        .get::<axum::extract::MatchedPath>()
        .map(|path| path.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let response = next.run(request).await;

    metrics::HTTP_REQUESTS_TOTAL
        .with_label_values(&[method.as_str(), endpoint.as_str(), response.status().as_str()])
        .inc();
    response
}

async fn health_check() -> &'static str {
    "OK"
}
