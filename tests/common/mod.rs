//! Common test utilities for E2E tests
//!
//! Each `TestServer` runs the real router plus a fake upstream that plays
//! GitHub and Google. Visitor behavior is keyed by the authorization code:
//!
//! - GitHub: `follower` follows the target, `stranger` does not,
//!   `slowpoke` answers slower than the client timeout, `bad` is refused
//! - Google: `subscriber` is subscribed, `viewer` is not, `broken` makes
//!   the subscriptions API fail

#![allow(dead_code)]

use std::collections::HashMap;
use std::time::Duration;

use axum::{
    Form, Json, Router,
    extract::{Path, Query},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use followgate::{AppState, config};
use tokio::net::TcpListener;

pub const TARGET_ACCOUNT: &str = "bytemait";
pub const TARGET_CHANNEL: &str = "UCwk8Ji_KtnPLm2rj5XkuUZQ";
pub const SUBSCRIBE_URL: &str = "https://www.youtube.com/@BYTE-mait?sub_confirmation=1";

/// Test server instance
pub struct TestServer {
    pub addr: String,
    pub upstream: String,
    pub state: AppState,
    pub client: reqwest::Client,
}

impl TestServer {
    /// Create a new test server instance
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Create a test server after adjusting the default test configuration
    pub async fn with_config(adjust: impl FnOnce(&mut config::AppConfig)) -> Self {
        let upstream = spawn(fake_upstream()).await;

        // Create test configuration
        let mut config = config::AppConfig {
            server: config::ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0, // Let OS assign port
                domain: "127.0.0.1".to_string(),
                protocol: "http".to_string(),
            },
            auth: config::AuthConfig {
                session_secret: "test-secret-key-32-bytes-long!!!".to_string(),
                session_max_age: 3600,
            },
            github: config::GitHubConfig {
                client_id: "test-github-client".to_string(),
                client_secret: "test-github-secret".to_string(),
                target_account: TARGET_ACCOUNT.to_string(),
                callback_url: None,
                authorize_url: format!("{upstream}/github/authorize"),
                token_url: format!("{upstream}/github/token"),
                api_base_url: format!("{upstream}/github/api"),
            },
            google: config::GoogleConfig {
                client_id: "test-google-client".to_string(),
                client_secret: "test-google-secret".to_string(),
                target_channel_id: TARGET_CHANNEL.to_string(),
                subscribe_url: SUBSCRIBE_URL.to_string(),
                callback_url: None,
                authorize_url: format!("{upstream}/google/authorize"),
                token_url: format!("{upstream}/google/token"),
                userinfo_url: format!("{upstream}/google/userinfo"),
                youtube_api_base_url: format!("{upstream}/google"),
            },
            upstream: config::UpstreamConfig {
                timeout_seconds: 1,
                user_agent: "followgate-test".to_string(),
            },
            metrics: config::MetricsConfig { enabled: false },
            logging: config::LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        };
        adjust(&mut config);

        // Initialize app state
        let state = AppState::new(config).unwrap();

        // Create HTTP client; redirects stay visible to assertions
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap();

        let addr = spawn(followgate::build_router(state.clone())).await;

        Self {
            addr,
            upstream,
            state,
            client,
        }
    }

    /// Get base URL for requests
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.addr, path)
    }

    /// GET with an optional Cookie header
    pub async fn get(&self, path: &str, cookie: Option<&str>) -> reqwest::Response {
        let mut request = self.client.get(self.url(path));
        if let Some(cookie) = cookie {
            request = request.header("Cookie", cookie);
        }
        request.send().await.expect("request succeeds")
    }

    /// Run a full sign-in round trip for `provider` ("github" or "google")
    ///
    /// `code` selects the fake visitor. `session` is sent along if given.
    pub async fn sign_in(
        &self,
        provider: &str,
        code: &str,
        session: Option<&str>,
    ) -> reqwest::Response {
        let start = self.get(&format!("/auth/{provider}"), None).await;
        assert!(start.status().is_redirection());

        let state_cookie = cookie_value(&start, "oauth_state").expect("state cookie set");
        let location = location(&start).expect("provider location");
        let state_param = url::Url::parse(&location)
            .expect("absolute provider URL")
            .query_pairs()
            .find(|(key, _)| key == "state")
            .map(|(_, value)| value.into_owned())
            .expect("state parameter");

        let mut cookie = format!("oauth_state={state_cookie}");
        if let Some(session) = session {
            cookie.push_str(&format!("; session={session}"));
        }

        self.get(
            &format!(
                "/auth/{provider}/callback?code={}&state={}",
                urlencoding::encode(code),
                urlencoding::encode(&state_param)
            ),
            Some(&cookie),
        )
        .await
    }
}

/// Decoded value of a cookie set by the response, ignoring removals
///
/// Cookies go out percent-encoded, so `github:abc` arrives as `github%3Aabc`.
pub fn cookie_value(response: &reqwest::Response, name: &str) -> Option<String> {
    response
        .headers()
        .get_all("set-cookie")
        .iter()
        .filter_map(|value| value.to_str().ok())
        .filter_map(|value| value.split(';').next())
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, value)| key.trim() == name && !value.is_empty())
        .and_then(|(_, value)| urlencoding::decode(value).ok())
        .map(|value| value.into_owned())
}

/// All Set-Cookie header values
pub fn set_cookies(response: &reqwest::Response) -> Vec<String> {
    response
        .headers()
        .get_all("set-cookie")
        .iter()
        .filter_map(|value| value.to_str().ok().map(ToString::to_string))
        .collect()
}

pub fn location(response: &reqwest::Response) -> Option<String> {
    response
        .headers()
        .get("location")
        .and_then(|value| value.to_str().ok())
        .map(ToString::to_string)
}

async fn spawn(app: Router) -> String {
    // Bind to random port
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    // Spawn server in background
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://{}", addr)
}

// =============================================================================
// Fake GitHub / Google
// =============================================================================

fn fake_upstream() -> Router {
    Router::new()
        .route("/github/token", post(github_token))
        .route("/github/api/user", get(github_user))
        .route(
            "/github/api/users/:login/following/:target",
            get(github_following),
        )
        .route("/google/token", post(google_token))
        .route("/google/userinfo", get(google_userinfo))
        .route("/google/youtube/v3/subscriptions", get(youtube_subscriptions))
}

fn bearer(headers: &HeaderMap, scheme: &str, prefix: &str) -> Option<String> {
    headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix(scheme))
        .and_then(|token| token.strip_prefix(prefix))
        .map(ToString::to_string)
}

async fn github_token(Form(form): Form<HashMap<String, String>>) -> Json<serde_json::Value> {
    let code = form.get("code").cloned().unwrap_or_default();
    if code == "bad" || form.get("client_secret").map(String::as_str) != Some("test-github-secret")
    {
        return Json(serde_json::json!({
            "error": "bad_verification_code",
            "error_description": "The code passed is incorrect or expired."
        }));
    }
    Json(serde_json::json!({
        "access_token": format!("gh-{code}"),
        "token_type": "bearer",
        "scope": "user:follow"
    }))
}

async fn github_user(headers: HeaderMap) -> Response {
    match bearer(&headers, "token ", "gh-") {
        Some(login) => Json(serde_json::json!({
            "login": login,
            "id": login.len() as u64 + 1000,
            "name": null
        }))
        .into_response(),
        None => StatusCode::UNAUTHORIZED.into_response(),
    }
}

async fn github_following(Path((login, target)): Path<(String, String)>) -> StatusCode {
    match (login.as_str(), target.as_str()) {
        ("follower", TARGET_ACCOUNT) => StatusCode::NO_CONTENT,
        ("slowpoke", _) => {
            tokio::time::sleep(Duration::from_secs(3)).await;
            StatusCode::NO_CONTENT
        }
        _ => StatusCode::NOT_FOUND,
    }
}

async fn google_token(Form(form): Form<HashMap<String, String>>) -> Response {
    let code = form.get("code").cloned().unwrap_or_default();
    if form.get("grant_type").map(String::as_str) != Some("authorization_code") {
        return StatusCode::BAD_REQUEST.into_response();
    }
    Json(serde_json::json!({
        "access_token": format!("yt-{code}"),
        "token_type": "Bearer",
        "expires_in": 3599
    }))
    .into_response()
}

async fn google_userinfo(headers: HeaderMap) -> Response {
    match bearer(&headers, "Bearer ", "yt-") {
        Some(name) => Json(serde_json::json!({
            "sub": format!("g-{name}"),
            "email": format!("{name}@example.com"),
            "name": name
        }))
        .into_response(),
        None => StatusCode::UNAUTHORIZED.into_response(),
    }
}

async fn youtube_subscriptions(
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    if params.get("forChannelId").map(String::as_str) != Some(TARGET_CHANNEL)
        || params.get("mine").map(String::as_str) != Some("true")
    {
        return StatusCode::BAD_REQUEST.into_response();
    }

    match bearer(&headers, "Bearer ", "yt-").as_deref() {
        Some("subscriber") => Json(serde_json::json!({
            "kind": "youtube#subscriptionListResponse",
            "items": [{ "id": "sub-1", "snippet": { "resourceId": { "channelId": TARGET_CHANNEL } } }]
        }))
        .into_response(),
        Some("broken") => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
        Some(_) => Json(serde_json::json!({
            "kind": "youtube#subscriptionListResponse",
            "items": []
        }))
        .into_response(),
        None => StatusCode::UNAUTHORIZED.into_response(),
    }
}
