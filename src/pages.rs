//! Static pages and browser redirects
//!
//! HTML is embedded at build time from `views/`.

use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};

pub const LOGIN_PAGE: &str = include_str!("../views/login.html");
pub const PROTECTED_PAGE: &str = include_str!("../views/protected.html");

/// Shown when a provider API failed mid sign-in
pub const SERVICE_UNAVAILABLE_PAGE: &str = include_str!("../views/unavailable.html");

/// 302 Found to `location`
///
/// Every browser redirect in the gate uses 302, including the ones that
/// follow a POST.
pub fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location)]).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn found_is_302_with_location() {
        let response = found("/login");
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(
            response
                .headers()
                .get(header::LOCATION)
                .and_then(|value| value.to_str().ok()),
            Some("/login")
        );
    }

    #[test]
    fn found_keeps_absolute_urls_intact() {
        let url = "https://www.youtube.com/@BYTE-mait?sub_confirmation=1";
        let response = found(url);
        assert_eq!(
            response
                .headers()
                .get(header::LOCATION)
                .and_then(|value| value.to_str().ok()),
            Some(url)
        );
    }
}
