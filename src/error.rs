//! Error types for Followgate
//!
//! All errors in the application are converted to `AppError`,
//! which implements `IntoResponse`. Browser-facing failures become
//! redirects to `/login`; upstream outages render a retry page.

use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};

use crate::pages::found;
use thiserror::Error;

/// Application-wide error type
#[derive(Debug, Error)]
pub enum AppError {
    /// Provider rejected the visitor, or the code exchange failed (302 /login)
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Follow condition not met on the GitHub path (302 /login)
    #[error("Access rejected: {0}")]
    Rejected(String),

    /// No valid session (302 /login)
    #[error("Authentication required")]
    Unauthorized,

    /// Provider API failed during a relationship check (503)
    #[error("Upstream service error: {0}")]
    Upstream(String),

    /// Configuration error (500)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal server error (500)
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            AppError::Upstream(format!("request timed out: {err}"))
        } else {
            AppError::Upstream(err.to_string())
        }
    }
}

impl AppError {
    fn error_type(&self) -> &'static str {
        match self {
            AppError::Authentication(_) => "authentication",
            AppError::Rejected(_) => "rejected",
            AppError::Unauthorized => "unauthorized",
            AppError::Upstream(_) => "upstream",
            AppError::Config(_) => "config",
            AppError::Internal(_) => "internal",
        }
    }
}

impl IntoResponse for AppError {
    /// Convert error to HTTP response
    ///
    /// Authentication-type failures never surface details to the visitor;
    /// they are logged and answered with a redirect to the login page.
    fn into_response(self) -> Response {
        use crate::metrics::ERRORS_TOTAL;
        ERRORS_TOTAL.with_label_values(&[self.error_type()]).inc();

        match &self {
            AppError::Authentication(reason) => {
                tracing::warn!(%reason, "Authentication failed");
                found("/login")
            }
            AppError::Rejected(reason) => {
                tracing::info!(%reason, "Access rejected");
                found("/login")
            }
            AppError::Unauthorized => found("/login"),
            AppError::Upstream(message) => {
                tracing::error!(error = %message, "Upstream service error");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    Html(crate::pages::SERVICE_UNAVAILABLE_PAGE),
                )
                    .into_response()
            }
            AppError::Config(message) => {
                tracing::error!(error = %message, "Configuration error");
                (StatusCode::INTERNAL_SERVER_ERROR, "Configuration error").into_response()
            }
            AppError::Internal(error) => {
                tracing::error!(error = %error, "Internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
            }
        }
    }
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;
