//! GitHub and Google OAuth authentication
//!
//! Handles:
//! - OAuth flows for both providers
//! - Follow and subscription checks
//! - The authorization decision
//! - Session management
//! - The access guard for the protected page

pub mod decision;
pub mod github;
pub mod google;
mod middleware;
pub mod oauth;
mod routes;
pub mod session;

pub use middleware::{CurrentUser, SESSION_COOKIE, require_principal};
pub use oauth::OAuthProvider;
pub use routes::{auth_router, gate_router};
pub use session::{MemorySessionStore, Principal, ProviderKind, SessionRecord, SessionStore};
