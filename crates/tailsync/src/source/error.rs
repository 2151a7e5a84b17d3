//! Error types for upstream feed access.

use thiserror::Error;

use crate::http::HttpError;

/// Errors that can occur when fetching or decoding an upstream page.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The request never produced a response (connection, TLS, timeout).
    #[error("Transport error: {0}")]
    Transport(String),

    /// The upstream answered with a non-2xx status.
    #[error("Upstream error ({status}): {body}")]
    Upstream { status: u16, body: String },

    /// The response body could not be decoded.
    #[error("Decode error: {0}")]
    Decode(String),

    /// The client could not be constructed.
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl ApiError {
    /// Create an upstream error, replacing an empty body with a generic payload.
    pub fn upstream(status: u16, body: &[u8]) -> Self {
        let body = String::from_utf8_lossy(body).trim().to_string();
        let body = if body.is_empty() {
            format!("{{\"status\":{status},\"message\":\"request failed\"}}")
        } else {
            body
        };
        Self::Upstream { status, body }
    }

    /// HTTP status, when the upstream answered.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Upstream { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<HttpError> for ApiError {
    fn from(err: HttpError) -> Self {
        ApiError::Transport(err.to_string())
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::Decode(err.to_string())
    }
}

/// Check if an error is an upstream rate limit (HTTP 429).
pub fn is_rate_limited(err: &ApiError) -> bool {
    err.status() == Some(429)
}

/// Extract a short error message suitable for display.
///
/// Takes the first line of the error message and caps it at 200 characters,
/// since upstream bodies can be whole HTML error pages.
pub fn short_error_message(e: &impl std::error::Error) -> String {
    let full = e.to_string();
    let line = full.lines().next().unwrap_or(&full);
    if line.chars().count() > 200 {
        let truncated: String = line.chars().take(200).collect();
        format!("{truncated}...")
    } else {
        line.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limited() {
        let limited = ApiError::upstream(429, b"{\"message\":\"slow down\"}");
        assert!(is_rate_limited(&limited));
        assert_eq!(limited.status(), Some(429));

        let server = ApiError::upstream(502, b"bad gateway");
        assert!(!is_rate_limited(&server));
        assert!(!is_rate_limited(&ApiError::Transport("reset".into())));
    }

    #[test]
    fn test_upstream_empty_body_gets_generic_payload() {
        let err = ApiError::upstream(503, b"  ");
        match err {
            ApiError::Upstream { status, body } => {
                assert_eq!(status, 503);
                assert!(body.contains("request failed"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_short_error_message_truncates() {
        let err = ApiError::Decode(format!("{}\nsecond line", "x".repeat(300)));
        let short = short_error_message(&err);
        assert!(short.ends_with("..."));
        assert!(!short.contains("second line"));
        assert!(short.chars().count() <= 203);
    }

    #[test]
    fn test_http_error_maps_to_transport() {
        let err: ApiError = HttpError::Timeout("100s".into()).into();
        assert!(matches!(err, ApiError::Transport(m) if m.contains("timed out")));
    }
}
