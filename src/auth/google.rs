//! Google identity and YouTube subscription check

use serde::Deserialize;

use super::session::{Principal, ProviderKind};
use crate::error::AppError;

/// OpenID Connect userinfo response
#[derive(Debug, Deserialize)]
struct GoogleUser {
    /// v3 endpoint
    sub: Option<String>,
    /// v2 endpoint
    id: Option<String>,
    email: Option<String>,
    name: Option<String>,
}

/// `subscriptions.list` response, reduced to what the check needs
#[derive(Debug, Deserialize)]
struct SubscriptionList {
    #[serde(default)]
    items: Vec<serde_json::Value>,
}

/// Google/YouTube client scoped to one access token
pub struct GoogleApi<'a> {
    http_client: &'a reqwest::Client,
    access_token: &'a str,
}

impl<'a> GoogleApi<'a> {
    pub fn new(http_client: &'a reqwest::Client, access_token: &'a str) -> Self {
        Self {
            http_client,
            access_token,
        }
    }

    /// Fetch the signed-in user from the userinfo endpoint
    pub async fn fetch_profile(&self, userinfo_url: &str) -> Result<Principal, AppError> {
        let started = std::time::Instant::now();
        let response = self
            .http_client
            .get(userinfo_url)
            .bearer_auth(self.access_token)
            .send()
            .await
            .map_err(|e| {
                crate::metrics::observe_upstream("google_userinfo", "error", started);
                AppError::Authentication(format!("Google profile request failed: {e}"))
            })?;

        let status = response.status();
        crate::metrics::observe_upstream("google_userinfo", status.as_str(), started);
        if !status.is_success() {
            return Err(AppError::Authentication(format!(
                "Google profile request failed with status {status}"
            )));
        }

        let user: GoogleUser = response.json().await.map_err(|e| {
            AppError::Authentication(format!("Google profile unreadable: {e}"))
        })?;

        let id = user
            .sub
            .or(user.id)
            .ok_or_else(|| AppError::Authentication("Google profile has no id".to_string()))?;
        let username = user.email.clone().unwrap_or_else(|| id.clone());

        Ok(Principal {
            id,
            username,
            display_name: user.name,
            provider: ProviderKind::Google,
            authorized: false,
        })
    }

    /// Check whether the signed-in user subscribes to `channel_id`
    ///
    /// Lists the caller's own subscriptions filtered to the channel; a
    /// non-empty page means subscribed.
    pub async fn check_subscription(
        &self,
        youtube_api_base_url: &str,
        channel_id: &str,
    ) -> Result<bool, AppError> {
        let url = format!(
            "{}/youtube/v3/subscriptions",
            youtube_api_base_url.trim_end_matches('/')
        );

        let started = std::time::Instant::now();
        let response = self
            .http_client
            .get(url)
            .bearer_auth(self.access_token)
            .query(&[
                ("part", "snippet"),
                ("mine", "true"),
                ("forChannelId", channel_id),
            ])
            .send()
            .await
            .inspect_err(|_| {
                crate::metrics::observe_upstream("youtube_subscriptions", "error", started);
            })?;

        let status = response.status();
        crate::metrics::observe_upstream("youtube_subscriptions", status.as_str(), started);
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Upstream(format!(
                "YouTube subscriptions request failed with status {status}: {body}"
            )));
        }

        let list: SubscriptionList = response.json().await?;
        tracing::debug!(
            channel = %channel_id,
            matches = list.items.len(),
            "YouTube subscription check"
        );

        Ok(!list.items.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        Json, Router,
        extract::Query,
        http::{HeaderMap, StatusCode},
        routing::get,
    };
    use std::collections::HashMap;

    async fn spawn(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn fake_google() -> Router {
        Router::new()
            .route(
                "/userinfo",
                get(|| async {
                    Json(serde_json::json!({
                        "sub": "1098",
                        "email": "viewer@example.com",
                        "name": "Viewer"
                    }))
                }),
            )
            .route(
                "/youtube/v3/subscriptions",
                get(
                    |headers: HeaderMap, Query(params): Query<HashMap<String, String>>| async move {
                        if headers.get("authorization").and_then(|v| v.to_str().ok())
                            != Some("Bearer yt-token")
                        {
                            return Err(StatusCode::UNAUTHORIZED);
                        }
                        assert_eq!(params.get("mine").map(String::as_str), Some("true"));
                        assert_eq!(params.get("part").map(String::as_str), Some("snippet"));
                        let items = match params.get("forChannelId").map(String::as_str) {
                            Some("subscribed-channel") => {
                                serde_json::json!([{ "id": "sub-1" }])
                            }
                            Some("broken-channel") => return Err(StatusCode::BAD_GATEWAY),
                            _ => serde_json::json!([]),
                        };
                        Ok(Json(serde_json::json!({
                            "kind": "youtube#subscriptionListResponse",
                            "items": items
                        })))
                    },
                ),
            )
    }

    #[tokio::test]
    async fn fetch_profile_uses_sub_and_email() {
        let base = spawn(fake_google()).await;
        let client = reqwest::Client::new();

        let principal = GoogleApi::new(&client, "yt-token")
            .fetch_profile(&format!("{base}/userinfo"))
            .await
            .unwrap();

        assert_eq!(principal.id, "1098");
        assert_eq!(principal.username, "viewer@example.com");
        assert_eq!(principal.provider, ProviderKind::Google);
        assert!(!principal.authorized);
    }

    #[tokio::test]
    async fn non_empty_items_means_subscribed() {
        let base = spawn(fake_google()).await;
        let client = reqwest::Client::new();
        let api = GoogleApi::new(&client, "yt-token");

        assert!(api
            .check_subscription(&base, "subscribed-channel")
            .await
            .unwrap());
        assert!(!api.check_subscription(&base, "other-channel").await.unwrap());
    }

    #[tokio::test]
    async fn api_error_is_upstream_error() {
        let base = spawn(fake_google()).await;
        let client = reqwest::Client::new();
        let api = GoogleApi::new(&client, "yt-token");

        let result = api.check_subscription(&base, "broken-channel").await;
        assert!(matches!(result, Err(AppError::Upstream(_))));

        let unauthorized = GoogleApi::new(&client, "wrong")
            .check_subscription(&base, "subscribed-channel")
            .await;
        assert!(matches!(unauthorized, Err(AppError::Upstream(_))));
    }
}
