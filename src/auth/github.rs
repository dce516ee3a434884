//! GitHub identity and follow check

use reqwest::StatusCode;
use serde::Deserialize;

use super::session::{Principal, ProviderKind};
use crate::error::AppError;

/// GitHub user info
#[derive(Debug, Deserialize)]
struct GitHubUser {
    login: String,
    id: u64,
    name: Option<String>,
}

/// Result of the follow lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FollowCheck {
    Follows,
    NotFollowing { reason: String },
}

/// GitHub REST client scoped to one access token
pub struct GitHubApi<'a> {
    http_client: &'a reqwest::Client,
    api_base_url: &'a str,
    access_token: &'a str,
}

impl<'a> GitHubApi<'a> {
    pub fn new(
        http_client: &'a reqwest::Client,
        api_base_url: &'a str,
        access_token: &'a str,
    ) -> Self {
        Self {
            http_client,
            api_base_url: api_base_url.trim_end_matches('/'),
            access_token,
        }
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.http_client
            .get(format!("{}{}", self.api_base_url, path))
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
            .header(
                reqwest::header::AUTHORIZATION,
                format!("token {}", self.access_token),
            )
    }

    /// Fetch the signed-in user
    ///
    /// The returned principal is not yet authorized.
    pub async fn fetch_profile(&self) -> Result<Principal, AppError> {
        let started = std::time::Instant::now();
        let response = self.get("/user").send().await.map_err(|e| {
            crate::metrics::observe_upstream("github_user", "error", started);
            AppError::Authentication(format!("GitHub profile request failed: {e}"))
        })?;

        let status = response.status();
        crate::metrics::observe_upstream("github_user", status.as_str(), started);
        if !status.is_success() {
            return Err(AppError::Authentication(format!(
                "GitHub profile request failed with status {status}"
            )));
        }

        let user: GitHubUser = response.json().await.map_err(|e| {
            AppError::Authentication(format!("GitHub profile unreadable: {e}"))
        })?;

        Ok(Principal {
            id: user.id.to_string(),
            username: user.login,
            display_name: user.name,
            provider: ProviderKind::GitHub,
            authorized: false,
        })
    }

    /// Check whether `username` follows `target_account`
    ///
    /// GitHub answers 204 when the relationship exists. Any other status is
    /// a negative answer; only transport failures are errors.
    pub async fn check_follows(
        &self,
        username: &str,
        target_account: &str,
    ) -> Result<FollowCheck, AppError> {
        let path = format!(
            "/users/{}/following/{}",
            urlencoding::encode(username),
            urlencoding::encode(target_account)
        );

        let started = std::time::Instant::now();
        let response = self.get(&path).send().await.inspect_err(|_| {
            crate::metrics::observe_upstream("github_following", "error", started);
        })?;

        let status = response.status();
        crate::metrics::observe_upstream("github_following", status.as_str(), started);
        tracing::debug!(%username, target = %target_account, %status, "GitHub follow check");

        if status == StatusCode::NO_CONTENT {
            Ok(FollowCheck::Follows)
        } else {
            Ok(FollowCheck::NotFollowing {
                reason: format!("Please follow {target_account} on GitHub."),
            })
        }
    }
}
