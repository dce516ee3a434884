//! OAuth 2.0 authorization code flow
//!
//! Shared by both identity providers: builds the consent redirect,
//! guards the round trip with a state cookie and exchanges the returned
//! code for an access token.

use axum_extra::extract::CookieJar;
use axum_extra::extract::cookie::{Cookie, SameSite};
use serde::Deserialize;
use subtle::ConstantTimeEq;

use super::session::ProviderKind;
use crate::config::AppConfig;
use crate::error::AppError;

/// Cookie carrying the CSRF state between redirect and callback
pub const OAUTH_STATE_COOKIE: &str = "oauth_state";

const OAUTH_STATE_MAX_AGE_SECS: i64 = 600;

/// Client registration and endpoints for one provider
#[derive(Debug, Clone)]
pub struct OAuthProvider {
    pub kind: ProviderKind,
    pub client_id: String,
    pub client_secret: String,
    pub authorize_url: String,
    pub token_url: String,
    pub callback_url: String,
    pub scopes: Vec<String>,
}

impl OAuthProvider {
    /// GitHub, scope `user:follow`
    pub fn github(config: &AppConfig) -> Self {
        Self {
            kind: ProviderKind::GitHub,
            client_id: config.github.client_id.clone(),
            client_secret: config.github.client_secret.clone(),
            authorize_url: config.github.authorize_url.clone(),
            token_url: config.github.token_url.clone(),
            callback_url: config.github_callback_url(),
            scopes: vec!["user:follow".to_string()],
        }
    }

    /// Google, with read-only YouTube access plus profile and email
    pub fn google(config: &AppConfig) -> Self {
        Self {
            kind: ProviderKind::Google,
            client_id: config.google.client_id.clone(),
            client_secret: config.google.client_secret.clone(),
            authorize_url: config.google.authorize_url.clone(),
            token_url: config.google.token_url.clone(),
            callback_url: config.google_callback_url(),
            scopes: vec![
                "https://www.googleapis.com/auth/youtube.readonly".to_string(),
                "profile".to_string(),
                "email".to_string(),
            ],
        }
    }

    /// Build the provider consent URL
    pub fn authorize_url(&self, state: &str) -> Result<String, AppError> {
        let mut url = url::Url::parse(&self.authorize_url)
            .map_err(|e| AppError::Config(format!("invalid authorize URL: {e}")))?;

        url.query_pairs_mut()
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", &self.callback_url)
            .append_pair("response_type", "code")
            .append_pair("scope", &self.scopes.join(" "))
            .append_pair("state", state);

        Ok(url.to_string())
    }

    /// Exchange an authorization code for an access token
    ///
    /// Every failure here, including transport errors, is an
    /// authentication failure rather than an upstream outage.
    pub async fn exchange_code(
        &self,
        http_client: &reqwest::Client,
        code: &str,
    ) -> Result<String, AppError> {
        let started = std::time::Instant::now();
        let api = match self.kind {
            ProviderKind::GitHub => "github_token",
            ProviderKind::Google => "google_token",
        };

        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.callback_url.as_str()),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
        ];

        let response = http_client
            .post(&self.token_url)
            .header(reqwest::header::ACCEPT, "application/json")
            .form(&params)
            .send()
            .await
            .map_err(|e| {
                crate::metrics::observe_upstream(api, "error", started);
                AppError::Authentication(format!("{} token exchange failed: {e}", self.kind))
            })?;

        let status = response.status();
        crate::metrics::observe_upstream(api, status.as_str(), started);
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Authentication(format!(
                "{} token exchange failed with status {}: {}",
                self.kind, status, body
            )));
        }

        let token: TokenResponse = response.json().await.map_err(|e| {
            AppError::Authentication(format!("{} token response unreadable: {e}", self.kind))
        })?;

        match token {
            TokenResponse {
                access_token: Some(access_token),
                ..
            } if !access_token.is_empty() => Ok(access_token),
            TokenResponse {
                error,
                error_description,
                ..
            } => Err(AppError::Authentication(format!(
                "{} returned no access token: {} {}",
                self.kind,
                error.unwrap_or_default(),
                error_description.unwrap_or_default()
            ))),
        }
    }
}

/// Token endpoint response
///
/// GitHub answers 200 with an `error` field for bad codes, so every
/// field is optional.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

/// Query parameters on a provider callback
#[derive(Debug, Default, Deserialize)]
pub struct CallbackQuery {
    /// Authorization code
    pub code: Option<String>,
    /// CSRF state token
    pub state: Option<String>,
    /// Set when the visitor denied consent
    pub error: Option<String>,
}

/// Generate a random CSRF state token bound to a provider
pub fn generate_csrf_state(provider: ProviderKind) -> String {
    use base64::{Engine as _, engine::general_purpose};
    use rand::RngCore;

    let mut bytes = [0_u8; 24];
    rand::thread_rng().fill_bytes(&mut bytes);
    format!(
        "{}:{}",
        provider,
        general_purpose::URL_SAFE_NO_PAD.encode(bytes)
    )
}

pub fn build_state_cookie(state: String, secure: bool) -> Cookie<'static> {
    Cookie::build((OAUTH_STATE_COOKIE, state))
        .path("/auth")
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .max_age(time::Duration::seconds(OAUTH_STATE_MAX_AGE_SECS))
        .build()
}

pub fn clear_state_cookie() -> Cookie<'static> {
    let mut cookie = Cookie::build((OAUTH_STATE_COOKIE, "")).path("/auth").build();
    cookie.make_removal();
    cookie
}

/// Verify CSRF state from cookie matches callback state and provider
pub fn verify_csrf_state(
    provider: ProviderKind,
    query: &CallbackQuery,
    jar: &CookieJar,
) -> Result<(), AppError> {
    let expected = jar
        .get(OAUTH_STATE_COOKIE)
        .map(|cookie| cookie.value())
        .ok_or_else(|| AppError::Authentication("missing OAuth state cookie".to_string()))?;
    let received = query
        .state
        .as_deref()
        .ok_or_else(|| AppError::Authentication("missing OAuth state parameter".to_string()))?;

    let bound_to_provider = expected
        .split_once(':')
        .is_some_and(|(prefix, _)| prefix == provider.as_str());

    let matches: bool = expected.as_bytes().ct_eq(received.as_bytes()).into();
    if !bound_to_provider || !matches {
        return Err(AppError::Authentication("OAuth state mismatch".to_string()));
    }
    Ok(())
}

/// Validate a callback and return its authorization code
pub fn callback_code(
    provider: ProviderKind,
    query: &CallbackQuery,
    jar: &CookieJar,
) -> Result<String, AppError> {
    if let Some(error) = &query.error {
        return Err(AppError::Authentication(format!(
            "{provider} denied authorization: {error}"
        )));
    }
    verify_csrf_state(provider, query, jar)?;
    query
        .code
        .clone()
        .filter(|code| !code.is_empty())
        .ok_or_else(|| AppError::Authentication("missing authorization code".to_string()))
}
