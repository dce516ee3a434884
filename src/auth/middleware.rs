//! Access guard
//!
//! Protects routes that require a signed-in, authorized visitor.

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts, State},
    http::{HeaderMap, Request, request::Parts},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::CookieJar;

use super::session::{SessionRecord, verify_session_cookie};
use crate::AppState;
use crate::error::AppError;

/// Cookie holding the signed session id
pub const SESSION_COOKIE: &str = "session";

/// Read the session id from the cookie jar, if signed correctly
pub(crate) fn session_id_from_jar(jar: &CookieJar, secret: &str) -> Option<String> {
    let cookie = jar.get(SESSION_COOKIE)?;
    verify_session_cookie(cookie.value(), secret).ok()
}

async fn load_session(
    headers: &HeaderMap,
    state: &AppState,
) -> Result<Option<SessionRecord>, AppError> {
    let jar = CookieJar::from_headers(headers);
    match session_id_from_jar(&jar, &state.config.auth.session_secret) {
        Some(id) => state.sessions.get(&id).await,
        None => Ok(None),
    }
}

/// Middleware to require an authorized principal
///
/// Authorization is only evaluated at callback time; this guard trusts the
/// stored flag and never calls a provider.
///
/// - no session: redirect to `/login`
/// - session with an unauthorized principal: redirect to the subscribe prompt
///
/// # Usage
/// ```ignore
/// let protected_routes = Router::new()
///     .route("/protected", ...)
///     .route_layer(middleware::from_fn_with_state(state, require_principal));
/// ```
pub async fn require_principal(
    State(state): State<AppState>,
    mut request: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, AppError> {
    let session = load_session(request.headers(), &state)
        .await?
        .ok_or(AppError::Unauthorized)?;

    if !session.principal.authorized {
        tracing::debug!(
            provider = %session.principal.provider,
            username = %session.principal.username,
            "Unauthorized principal sent to subscribe prompt"
        );
        return Ok(crate::pages::found(&state.config.google.subscribe_url));
    }

    request.extensions_mut().insert(session);

    Ok(next.run(request).await)
}

/// Extractor for the current session
///
/// # Usage
/// ```ignore
/// async fn handler(
///     CurrentUser(session): CurrentUser,
/// ) -> impl IntoResponse {
///     format!("Hello, {}", session.principal.username)
/// }
/// ```
#[derive(Debug, Clone)]
pub struct CurrentUser(pub SessionRecord);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(session) = parts.extensions.get::<SessionRecord>().cloned() {
            return Ok(CurrentUser(session));
        }

        let state = AppState::from_ref(state);
        let session = load_session(&parts.headers, &state)
            .await?
            .ok_or(AppError::Unauthorized)?;
        parts.extensions.insert(session.clone());

        Ok(CurrentUser(session))
    }
}
