//! Authorization decision
//!
//! Turns a provider callback outcome into where the visitor goes next and
//! what, if anything, is stored in their session.
//!
//! The two providers differ:
//! - GitHub: not following blocks sign-in entirely.
//! - Google: the visitor is always signed in; an unsubscribed visitor keeps
//!   a session with `authorized = false` and is sent to the subscribe prompt.

use super::github::FollowCheck;
use super::session::Principal;

pub const PROTECTED_PATH: &str = "/protected";
pub const LOGIN_PATH: &str = "/login";

/// Relationship check result for either provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelationshipCheck {
    GitHub(FollowCheck),
    Google { subscribed: bool },
}

/// Terminal state of a callback
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Store the principal, send to the protected page
    Authorized(Principal),
    /// Store the principal unauthorized, send to the subscribe prompt
    Unauthorized {
        principal: Principal,
        prompt_url: String,
    },
    /// Store nothing, send back to login
    Rejected { reason: String },
}

impl Decision {
    pub fn redirect_target(&self) -> &str {
        match self {
            Decision::Authorized(_) => PROTECTED_PATH,
            Decision::Unauthorized { prompt_url, .. } => prompt_url,
            Decision::Rejected { .. } => LOGIN_PATH,
        }
    }

    /// Label for metrics and logs
    pub fn outcome(&self) -> &'static str {
        match self {
            Decision::Authorized(_) => "authorized",
            Decision::Unauthorized { .. } => "unauthorized",
            Decision::Rejected { .. } => "rejected",
        }
    }
}

/// Decide the outcome of an authenticated callback
pub fn decide(mut principal: Principal, check: RelationshipCheck, subscribe_url: &str) -> Decision {
    match check {
        RelationshipCheck::GitHub(FollowCheck::Follows) => {
            principal.authorized = true;
            Decision::Authorized(principal)
        }
        RelationshipCheck::GitHub(FollowCheck::NotFollowing { reason }) => {
            Decision::Rejected { reason }
        }
        RelationshipCheck::Google { subscribed: true } => {
            principal.authorized = true;
            Decision::Authorized(principal)
        }
        RelationshipCheck::Google { subscribed: false } => {
            principal.authorized = false;
            Decision::Unauthorized {
                principal,
                prompt_url: subscribe_url.to_string(),
            }
        }
    }
}
