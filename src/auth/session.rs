//! Session management
//!
//! Sessions live server-side behind the `SessionStore` trait. The browser
//! only holds the session id, signed with HMAC so forged ids are rejected
//! before the store is consulted.

use std::sync::Arc;
use std::time::Duration;

use axum::async_trait;
use chrono::{DateTime, Utc};
use moka::future::Cache;
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Identity provider a principal signed in with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    GitHub,
    Google,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::GitHub => "github",
            ProviderKind::Google => "google",
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Visitor identity as reported by a provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    /// Provider-issued account id (opaque)
    pub id: String,
    /// GitHub login or Google email
    pub username: String,
    pub display_name: Option<String>,
    pub provider: ProviderKind,
    /// Set only when the follow/subscription check succeeded
    pub authorized: bool,
}

/// Stored session data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub principal: Principal,
    /// When session was created
    pub created_at: DateTime<Utc>,
    /// When session expires
    pub expires_at: DateTime<Utc>,
}

impl SessionRecord {
    pub fn new(principal: Principal, max_age_secs: i64) -> Self {
        let now = Utc::now();
        Self {
            principal,
            created_at: now,
            expires_at: now + chrono::Duration::seconds(max_age_secs),
        }
    }

    /// Check if session is expired
    pub fn is_expired(&self) -> bool {
        self.expires_at < Utc::now()
    }
}

/// Server-side session storage keyed by session id
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, id: &str) -> Result<Option<SessionRecord>, AppError>;
    async fn set(&self, id: &str, record: SessionRecord) -> Result<(), AppError>;
    async fn destroy(&self, id: &str) -> Result<(), AppError>;
}

/// In-process session store
///
/// Volatile: every session is lost on restart. Entries are evicted once
/// `max_age` has elapsed since they were written.
pub struct MemorySessionStore {
    sessions: Cache<String, Arc<SessionRecord>>,
}

impl MemorySessionStore {
    /// Create new session store
    ///
    /// # Arguments
    /// * `max_age` - Time-to-live for each session
    pub fn new(max_age: Duration) -> Self {
        let sessions = Cache::builder().time_to_live(max_age).build();
        Self { sessions }
    }

    /// Number of live sessions, after evicting expired ones
    pub async fn active_sessions(&self) -> u64 {
        self.sessions.run_pending_tasks().await;
        self.sessions.entry_count()
    }

    async fn record_size(&self) {
        use crate::metrics::SESSIONS_ACTIVE;
        SESSIONS_ACTIVE.set(self.active_sessions().await as i64);
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn get(&self, id: &str) -> Result<Option<SessionRecord>, AppError> {
        let Some(record) = self.sessions.get(id).await else {
            self.record_size().await;
            return Ok(None);
        };
        if record.is_expired() {
            self.sessions.invalidate(id).await;
            self.record_size().await;
            return Ok(None);
        }
        Ok(Some(record.as_ref().clone()))
    }

    async fn set(&self, id: &str, record: SessionRecord) -> Result<(), AppError> {
        self.sessions.insert(id.to_string(), Arc::new(record)).await;
        self.record_size().await;
        Ok(())
    }

    async fn destroy(&self, id: &str) -> Result<(), AppError> {
        self.sessions.invalidate(id).await;
        self.record_size().await;
        Ok(())
    }
}

/// Generate a fresh session id
pub fn new_session_id() -> String {
    ulid::Ulid::new().to_string()
}

/// Sign a session id for the session cookie
///
/// Token format: id.base64(hmac_sha256(id))
pub fn sign_session_id(id: &str, secret: &str) -> Result<String, AppError> {
    use base64::{Engine as _, engine::general_purpose};
    use hmac::Mac;

    let mac = session_mac(id, secret)?;
    let signature = mac.finalize().into_bytes();
    let signature_b64 = general_purpose::URL_SAFE_NO_PAD.encode(signature);

    Ok(format!("{}.{}", id, signature_b64))
}

/// Verify a session cookie value and return the session id
///
/// # Errors
/// Returns `Unauthorized` if the token is malformed or the signature is invalid
pub fn verify_session_cookie(token: &str, secret: &str) -> Result<String, AppError> {
    use base64::{Engine as _, engine::general_purpose};
    use hmac::Mac;

    let (id, signature_b64) = token.split_once('.').ok_or(AppError::Unauthorized)?;
    if id.is_empty() {
        return Err(AppError::Unauthorized);
    }

    let signature = general_purpose::URL_SAFE_NO_PAD
        .decode(signature_b64)
        .map_err(|_| AppError::Unauthorized)?;

    session_mac(id, secret)?
        .verify_slice(&signature)
        .map_err(|_| AppError::Unauthorized)?;

    Ok(id.to_string())
}

fn session_mac(id: &str, secret: &str) -> Result<hmac::Hmac<sha2::Sha256>, AppError> {
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .map_err(|e| AppError::Internal(anyhow::anyhow!("invalid session secret: {e}")))?;
    mac.update(id.as_bytes());
    Ok(mac)
}
