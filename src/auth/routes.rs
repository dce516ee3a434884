//! Gate routes
//!
//! Login pages, provider redirects and callbacks, logout, and the
//! protected page itself.

use axum::{
    Router,
    extract::{Query, State},
    middleware,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use axum_extra::extract::CookieJar;
use axum_extra::extract::cookie::{Cookie, SameSite};

use super::decision::{Decision, LOGIN_PATH, RelationshipCheck, decide};
use super::github::GitHubApi;
use super::google::GoogleApi;
use super::middleware::{CurrentUser, SESSION_COOKIE, require_principal, session_id_from_jar};
use super::oauth::{
    CallbackQuery, OAuthProvider, build_state_cookie, callback_code, clear_state_cookie,
    generate_csrf_state,
};
use super::session::{Principal, ProviderKind, SessionRecord, new_session_id, sign_session_id};
use crate::AppState;
use crate::error::{AppError, Result};
use crate::metrics::AUTH_CALLBACKS_TOTAL;
use crate::pages;

/// Create authentication router
///
/// Routes:
/// - GET /auth/github - Redirect to GitHub
/// - GET /auth/github/callback - OAuth callback
/// - GET /auth/google - Redirect to Google
/// - GET /auth/google/callback - OAuth callback
/// - POST /logout - Logout
pub fn auth_router() -> Router<AppState> {
    Router::new()
        .route("/auth/github", get(github_redirect))
        .route("/auth/github/callback", get(github_callback))
        .route("/auth/google", get(google_redirect))
        .route("/auth/google/callback", get(google_callback))
        .route("/logout", post(logout))
}

/// Create the page router
///
/// `/` and `/login` are public; `/protected` sits behind the access guard.
pub fn gate_router(state: AppState) -> Router<AppState> {
    let protected_routes = Router::new()
        .route("/protected", get(protected_page))
        .route_layer(middleware::from_fn_with_state(state, require_principal));

    Router::new()
        .route("/", get(root))
        .route("/login", get(login_page))
        .merge(protected_routes)
}

// =============================================================================
// Pages
// =============================================================================

/// GET /
async fn root() -> Response {
    pages::found(LOGIN_PATH)
}

/// GET /login
async fn login_page() -> Html<&'static str> {
    Html(pages::LOGIN_PAGE)
}

/// GET /protected
async fn protected_page(CurrentUser(session): CurrentUser) -> Html<&'static str> {
    tracing::debug!(
        provider = %session.principal.provider,
        username = %session.principal.username,
        "Protected page served"
    );
    Html(pages::PROTECTED_PAGE)
}

// =============================================================================
// Provider redirects
// =============================================================================

/// GET /auth/github
async fn github_redirect(State(state): State<AppState>, jar: CookieJar) -> Result<Response> {
    begin_sign_in(&state, &state.github, jar)
}

/// GET /auth/google
async fn google_redirect(State(state): State<AppState>, jar: CookieJar) -> Result<Response> {
    begin_sign_in(&state, &state.google, jar)
}

/// Store a fresh state token in a cookie and send the visitor to the provider
fn begin_sign_in(state: &AppState, provider: &OAuthProvider, jar: CookieJar) -> Result<Response> {
    let csrf_state = generate_csrf_state(provider.kind);
    let location = provider.authorize_url(&csrf_state)?;
    let jar = jar.add(build_state_cookie(
        csrf_state,
        state.config.should_use_secure_cookies(),
    ));

    tracing::debug!(provider = %provider.kind, "Redirecting to provider");
    Ok((jar, pages::found(&location)).into_response())
}

// =============================================================================
// Callbacks
// =============================================================================

/// GET /auth/github/callback
///
/// Signs in only visitors who follow the configured account.
async fn github_callback(
    State(state): State<AppState>,
    Query(query): Query<CallbackQuery>,
    jar: CookieJar,
) -> Response {
    let outcome = github_sign_in(&state, &query, &jar).await;
    complete_sign_in(&state, ProviderKind::GitHub, jar, outcome).await
}

/// GET /auth/google/callback
///
/// Signs in every visitor; only subscribers are authorized.
async fn google_callback(
    State(state): State<AppState>,
    Query(query): Query<CallbackQuery>,
    jar: CookieJar,
) -> Response {
    let outcome = google_sign_in(&state, &query, &jar).await;
    complete_sign_in(&state, ProviderKind::Google, jar, outcome).await
}

async fn github_sign_in(
    state: &AppState,
    query: &CallbackQuery,
    jar: &CookieJar,
) -> Result<Decision> {
    let code = callback_code(ProviderKind::GitHub, query, jar)?;
    let access_token = state.github.exchange_code(&state.http_client, &code).await?;

    let api = GitHubApi::new(
        &state.http_client,
        &state.config.github.api_base_url,
        &access_token,
    );
    let principal = api.fetch_profile().await?;
    let check = api
        .check_follows(&principal.username, &state.config.github.target_account)
        .await?;

    Ok(decide(
        principal,
        RelationshipCheck::GitHub(check),
        &state.config.google.subscribe_url,
    ))
}

async fn google_sign_in(
    state: &AppState,
    query: &CallbackQuery,
    jar: &CookieJar,
) -> Result<Decision> {
    let code = callback_code(ProviderKind::Google, query, jar)?;
    let access_token = state.google.exchange_code(&state.http_client, &code).await?;

    let api = GoogleApi::new(&state.http_client, &access_token);
    let principal = api.fetch_profile(&state.config.google.userinfo_url).await?;
    let subscribed = api
        .check_subscription(
            &state.config.google.youtube_api_base_url,
            &state.config.google.target_channel_id,
        )
        .await?;

    Ok(decide(
        principal,
        RelationshipCheck::Google { subscribed },
        &state.config.google.subscribe_url,
    ))
}

/// Apply a callback decision: record it, update the session, redirect
///
/// The state cookie is cleared whatever the outcome.
async fn complete_sign_in(
    state: &AppState,
    provider: ProviderKind,
    jar: CookieJar,
    outcome: Result<Decision>,
) -> Response {
    let jar = jar.remove(clear_state_cookie());

    let decision = match outcome {
        Ok(decision) => decision,
        Err(error) => {
            AUTH_CALLBACKS_TOTAL
                .with_label_values(&[provider.as_str(), "failed"])
                .inc();
            return (jar, error).into_response();
        }
    };

    AUTH_CALLBACKS_TOTAL
        .with_label_values(&[provider.as_str(), decision.outcome()])
        .inc();

    let principal = match &decision {
        Decision::Rejected { reason } => {
            return (jar, AppError::Rejected(reason.clone())).into_response();
        }
        Decision::Authorized(principal) | Decision::Unauthorized { principal, .. } => {
            principal.clone()
        }
    };

    tracing::info!(
        %provider,
        username = %principal.username,
        authorized = principal.authorized,
        "Visitor signed in"
    );

    match start_session(state, &jar, principal).await {
        Ok(cookie) => {
            (jar.add(cookie), pages::found(decision.redirect_target())).into_response()
        }
        Err(error) => (jar, error).into_response(),
    }
}

/// Store the principal under a new session id and build the session cookie
///
/// Any session already attached to the request is destroyed first.
async fn start_session(
    state: &AppState,
    jar: &CookieJar,
    principal: Principal,
) -> Result<Cookie<'static>> {
    let secret = &state.config.auth.session_secret;
    if let Some(previous) = session_id_from_jar(jar, secret) {
        state.sessions.destroy(&previous).await?;
    }

    let id = new_session_id();
    let record = SessionRecord::new(principal, state.config.auth.session_max_age);
    state.sessions.set(&id, record).await?;

    Ok(Cookie::build((SESSION_COOKIE, sign_session_id(&id, secret)?))
        .path("/")
        .http_only(true)
        .secure(state.config.should_use_secure_cookies())
        .same_site(SameSite::Lax)
        .max_age(time::Duration::seconds(state.config.auth.session_max_age))
        .build())
}

// =============================================================================
// Logout
// =============================================================================

/// POST /logout
///
/// Destroys the server-side session, clears cookies and redirects to login.
async fn logout(State(state): State<AppState>, jar: CookieJar) -> Result<(CookieJar, Response)> {
    if let Some(id) = session_id_from_jar(&jar, &state.config.auth.session_secret) {
        state.sessions.destroy(&id).await?;
        tracing::info!("Session destroyed");
    }

    let mut session_cookie = Cookie::build((SESSION_COOKIE, "")).path("/").build();
    session_cookie.make_removal();

    let jar = jar.remove(session_cookie).remove(clear_state_cookie());
    Ok((jar, pages::found(LOGIN_PATH)))
}
