//! Configuration management
//!
//! Loads configuration from:
//! 1. Default values
//! 2. Configuration file (config/local.toml)
//! 3. Environment variables (override), including a `.env` file

use serde::Deserialize;
use std::collections::HashMap;
use std::net::IpAddr;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub github: GitHubConfig,
    pub google: GoogleConfig,
    pub upstream: UpstreamConfig,
    pub metrics: MetricsConfig,
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0")
    pub host: String,
    /// Port number (e.g., 3000)
    pub port: u16,
    /// Public domain, optionally with port (e.g., "localhost:3000")
    pub domain: String,
    /// Protocol ("http" or "https")
    pub protocol: String,
}

impl ServerConfig {
    /// Get the base URL for the gate
    ///
    /// # Returns
    /// Full URL like "http://localhost:3000"
    pub fn base_url(&self) -> String {
        format!("{}://{}", self.protocol, self.domain)
    }
}

/// Session configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Session secret key (32+ bytes)
    pub session_secret: String,
    /// Session max age in seconds (default: 86400 = 1 day)
    pub session_max_age: i64,
}

/// GitHub OAuth and follow-check configuration
#[derive(Debug, Clone, Deserialize)]
pub struct GitHubConfig {
    pub client_id: String,
    pub client_secret: String,
    /// Account a visitor must follow
    pub target_account: String,
    /// Overrides `<base_url>/auth/github/callback`
    pub callback_url: Option<String>,
    pub authorize_url: String,
    pub token_url: String,
    /// REST API root, e.g. "https://api.github.com"
    pub api_base_url: String,
}

/// Google OAuth and YouTube subscription-check configuration
#[derive(Debug, Clone, Deserialize)]
pub struct GoogleConfig {
    pub client_id: String,
    pub client_secret: String,
    /// Channel a visitor must be subscribed to
    pub target_channel_id: String,
    /// Where unsubscribed visitors are sent
    pub subscribe_url: String,
    /// Overrides `<base_url>/auth/google/callback`
    pub callback_url: Option<String>,
    pub authorize_url: String,
    pub token_url: String,
    pub userinfo_url: String,
    /// YouTube Data API root, e.g. "https://www.googleapis.com"
    pub youtube_api_base_url: String,
}

/// Outbound HTTP configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamConfig {
    /// Timeout for every provider call, in seconds
    pub timeout_seconds: u64,
    pub user_agent: String,
}

/// Metrics endpoint configuration
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    /// Mount `/metrics` (default: false)
    pub enabled: bool,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    pub level: String,
    /// Log format: "pretty" or "json"
    pub format: String,
}

impl LoggingConfig {
    /// Filter used when `RUST_LOG` is not set
    pub fn default_filter(&self) -> String {
        format!("followgate={},tower_http=debug", self.level)
    }

    pub fn is_json(&self) -> bool {
        self.format.eq_ignore_ascii_case("json")
    }
}

impl AppConfig {
    /// Load configuration from file and environment
    ///
    /// # Loading Order
    /// 1. Default values
    /// 2. config/default.toml (if exists)
    /// 3. config/local.toml (if exists)
    /// 4. Environment variables (FOLLOWGATE_*)
    /// 5. Plain provider variables (SESSION_SECRET, GITHUB_CLIENT_ID, ...)
    ///
    /// Variables in a `.env` file count as environment variables but never
    /// replace ones already set in the process.
    ///
    /// # Errors
    /// Returns error if configuration is invalid
    pub fn load() -> Result<Self, crate::error::AppError> {
        Self::load_from_env(environment_with_dotenv(dotenvy::dotenv_iter().ok()))
    }

    /// Load configuration with `vars` standing in for the process environment
    pub(crate) fn load_from_env(
        vars: HashMap<String, String>,
    ) -> Result<Self, crate::error::AppError> {
        use config::{Config, Environment, File};

        let config = Config::builder()
            // Start with default values
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 3000)?
            .set_default("server.domain", "localhost:3000")?
            .set_default("server.protocol", "http")?
            .set_default("auth.session_max_age", 86400)?
            .set_default("github.target_account", "bytemait")?
            .set_default(
                "github.authorize_url",
                "https://github.com/login/oauth/authorize",
            )?
            .set_default(
                "github.token_url",
                "https://github.com/login/oauth/access_token",
            )?
            .set_default("github.api_base_url", "https://api.github.com")?
            .set_default("google.target_channel_id", "UCwk8Ji_KtnPLm2rj5XkuUZQ")?
            .set_default(
                "google.subscribe_url",
                "https://www.youtube.com/@BYTE-mait?sub_confirmation=1",
            )?
            .set_default(
                "google.authorize_url",
                "https://accounts.google.com/o/oauth2/v2/auth",
            )?
            .set_default("google.token_url", "https://oauth2.googleapis.com/token")?
            .set_default(
                "google.userinfo_url",
                "https://www.googleapis.com/oauth2/v3/userinfo",
            )?
            .set_default("google.youtube_api_base_url", "https://www.googleapis.com")?
            .set_default("upstream.timeout_seconds", 10)?
            .set_default(
                "upstream.user_agent",
                concat!("followgate/", env!("CARGO_PKG_VERSION")),
            )?
            .set_default("metrics.enabled", false)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")?
            // Load from config/default.toml if it exists
            .add_source(File::with_name("config/default").required(false))
            // Load from config/local.toml if it exists (overrides default)
            .add_source(File::with_name("config/local").required(false))
            // Load from environment variables (FOLLOWGATE_*)
            .add_source(
                Environment::with_prefix("FOLLOWGATE")
                    .separator("__")
                    .try_parsing(true)
                    .source(Some(vars.clone())),
            )
            // Plain variable names used by existing deployments
            .set_override_option("auth.session_secret", env_var(&vars, "SESSION_SECRET"))?
            .set_override_option("github.client_id", env_var(&vars, "GITHUB_CLIENT_ID"))?
            .set_override_option(
                "github.client_secret",
                env_var(&vars, "GITHUB_CLIENT_SECRET"),
            )?
            .set_override_option("google.client_id", env_var(&vars, "GOOGLE_CLIENT_ID"))?
            .set_override_option(
                "google.client_secret",
                env_var(&vars, "GOOGLE_CLIENT_SECRET"),
            )?
            .build()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?;

        let app_config: Self = config
            .try_deserialize()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?;
        app_config.validate()?;
        Ok(app_config)
    }

    /// Callback URL registered with GitHub
    pub fn github_callback_url(&self) -> String {
        self.github
            .callback_url
            .clone()
            .unwrap_or_else(|| format!("{}/auth/github/callback", self.server.base_url()))
    }

    /// Callback URL registered with Google
    pub fn google_callback_url(&self) -> String {
        self.google
            .callback_url
            .clone()
            .unwrap_or_else(|| format!("{}/auth/google/callback", self.server.base_url()))
    }

    pub fn should_use_secure_cookies(&self) -> bool {
        self.server.protocol.eq_ignore_ascii_case("https")
            || !is_local_server_domain(&self.server.domain)
    }

    pub(crate) fn validate(&self) -> Result<(), crate::error::AppError> {
        use crate::error::AppError;

        const MIN_SESSION_SECRET_BYTES: usize = 32;

        if self.auth.session_secret.len() < MIN_SESSION_SECRET_BYTES {
            return Err(AppError::Config(format!(
                "auth.session_secret must be at least {} bytes",
                MIN_SESSION_SECRET_BYTES
            )));
        }

        if self.auth.session_max_age <= 0 {
            return Err(AppError::Config(
                "auth.session_max_age must be greater than 0".to_string(),
            ));
        }

        if self.upstream.timeout_seconds == 0 {
            return Err(AppError::Config(
                "upstream.timeout_seconds must be greater than 0".to_string(),
            ));
        }

        let required = [
            ("github.client_id", &self.github.client_id),
            ("github.client_secret", &self.github.client_secret),
            ("github.target_account", &self.github.target_account),
            ("google.client_id", &self.google.client_id),
            ("google.client_secret", &self.google.client_secret),
            ("google.target_channel_id", &self.google.target_channel_id),
        ];
        for (key, value) in required {
            if value.trim().is_empty() {
                return Err(AppError::Config(format!("{key} must not be empty")));
            }
        }

        let urls = [
            ("github.authorize_url", self.github.authorize_url.clone()),
            ("github.token_url", self.github.token_url.clone()),
            ("github.api_base_url", self.github.api_base_url.clone()),
            ("github.callback_url", self.github_callback_url()),
            ("google.subscribe_url", self.google.subscribe_url.clone()),
            ("google.authorize_url", self.google.authorize_url.clone()),
            ("google.token_url", self.google.token_url.clone()),
            ("google.userinfo_url", self.google.userinfo_url.clone()),
            (
                "google.youtube_api_base_url",
                self.google.youtube_api_base_url.clone(),
            ),
            ("google.callback_url", self.google_callback_url()),
        ];
        for (key, value) in urls {
            url::Url::parse(&value)
                .map_err(|e| AppError::Config(format!("{key} is not a valid URL: {e}")))?;
        }

        if !self.should_use_secure_cookies() {
            let host = normalized_server_host(&self.server.domain);
            tracing::warn!(
                host = %host,
                protocol = %self.server.protocol,
                "Using insecure session cookies for local development"
            );
        } else if !self.server.protocol.eq_ignore_ascii_case("https") {
            return Err(AppError::Config(
                "server.protocol must be https for non-local server domains".to_string(),
            ));
        }

        Ok(())
    }
}

/// Process environment layered over the entries of a `.env` file
fn environment_with_dotenv(
    dotenv: Option<dotenvy::Iter<std::fs::File>>,
) -> HashMap<String, String> {
    let mut vars: HashMap<String, String> = dotenv
        .into_iter()
        .flatten()
        .filter_map(Result::ok)
        .collect();
    vars.extend(std::env::vars());
    vars
}

fn env_var(vars: &HashMap<String, String>, name: &str) -> Option<String> {
    vars.get(name).filter(|value| !value.is_empty()).cloned()
}

fn normalized_server_host(domain: &str) -> String {
    let trimmed = domain.trim();
    let parsed_host = url::Url::parse(&format!("http://{trimmed}"))
        .ok()
        .and_then(|url| url.host_str().map(|host| host.to_string()));
    let host = parsed_host.unwrap_or_else(|| trimmed.to_string());
    host.trim_end_matches('.').to_ascii_lowercase()
}

fn is_local_server_domain(domain: &str) -> bool {
    let host = normalized_server_host(domain);
    if host == "localhost" || host.ends_with(".localhost") {
        return true;
    }

    // IPv6 hosts come back from `Url` wrapped in brackets
    let bare = host.trim_start_matches('[').trim_end_matches(']');
    if let Ok(ip) = bare.parse::<IpAddr>() {
        return ip.is_loopback() || ip.is_unspecified();
    }

    false
}
