//! Upstream failure taxonomy.

use reqwest::StatusCode;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum UpstreamError {
    /// Required credentials or settings are missing. Raised on first use.
    #[error("upstream configuration error: {0}")]
    Config(String),

    /// Credentials were rejected (401/403) or a token could not be obtained.
    #[error("upstream authentication failed ({status:?}): {detail}")]
    Auth {
        status: Option<u16>,
        detail: String,
    },

    /// Network error, timeout or 5xx. Retried with backoff.
    #[error("upstream temporarily unavailable ({status:?}): {detail}")]
    Transient {
        status: Option<u16>,
        detail: String,
    },

    /// Any other 4xx. Not retried.
    #[error("upstream rejected request ({status}): {detail}")]
    Rejected { status: u16, detail: String },

    /// Response body did not match the provider's schema.
    #[error("upstream response could not be decoded: {0}")]
    Decode(String),
}

impl UpstreamError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, UpstreamError::Transient { .. })
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, UpstreamError::Auth { .. })
    }

    /// HTTP status reported by the provider, when there was one.
    pub fn status(&self) -> Option<u16> {
        match self {
            UpstreamError::Auth { status, .. } | UpstreamError::Transient { status, .. } => *status,
            UpstreamError::Rejected { status, .. } => Some(*status),
            UpstreamError::Config(_) | UpstreamError::Decode(_) => None,
        }
    }

    /// Map a non-success HTTP status and body excerpt onto the taxonomy.
    pub fn from_status(status: StatusCode, body: &str) -> Self {
        let detail = excerpt(body, status);
        let code = status.as_u16();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            UpstreamError::Auth {
                status: Some(code),
                detail,
            }
        } else if status.is_server_error() {
            UpstreamError::Transient {
                status: Some(code),
                detail,
            }
        } else {
            UpstreamError::Rejected {
                status: code,
                detail,
            }
        }
    }
}

impl From<reqwest::Error> for UpstreamError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_builder() {
            return UpstreamError::Config(format!("invalid upstream request: {err}"));
        }
        if err.is_decode() {
            return UpstreamError::Decode(err.to_string());
        }
        if let Some(status) = err.status() {
            return UpstreamError::from_status(status, "");
        }
        let detail = if err.is_timeout() {
            format!("request timed out: {err}")
        } else {
            err.to_string()
        };
        UpstreamError::Transient {
            status: None,
            detail,
        }
    }
}

fn excerpt(body: &str, status: StatusCode) -> String {
    const MAX_CHARS: usize = 200;
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return status
            .canonical_reason()
            .unwrap_or("no response body")
            .to_string();
    }
    trimmed.chars().take(MAX_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert!(UpstreamError::from_status(StatusCode::UNAUTHORIZED, "").is_auth());
        assert!(UpstreamError::from_status(StatusCode::FORBIDDEN, "nope").is_auth());
        assert!(UpstreamError::from_status(StatusCode::BAD_GATEWAY, "").is_retryable());
        assert!(UpstreamError::from_status(StatusCode::SERVICE_UNAVAILABLE, "").is_retryable());

        let rejected = UpstreamError::from_status(StatusCode::TOO_MANY_REQUESTS, "slow down");
        assert!(!rejected.is_retryable());
        assert!(!rejected.is_auth());
        assert_eq!(rejected.status(), Some(429));
    }

    #[test]
    fn detail_falls_back_to_reason() {
        let err = UpstreamError::from_status(StatusCode::NOT_FOUND, "   ");
        assert!(err.to_string().contains("Not Found"));
    }

    #[test]
    fn malformed_request_is_a_config_error() {
        let err = reqwest::Client::new()
            .get("not a url")
            .build()
            .expect_err("relative url must not build");
        assert!(err.is_builder());

        let mapped = UpstreamError::from(err);
        assert!(matches!(mapped, UpstreamError::Config(_)), "{mapped:?}");
        assert!(!mapped.is_retryable());
    }

    #[test]
    fn detail_is_truncated() {
        let body = "x".repeat(1000);
        match UpstreamError::from_status(StatusCode::BAD_REQUEST, &body) {
            UpstreamError::Rejected { detail, .. } => assert_eq!(detail.len(), 200),
            other => panic!("unexpected {other:?}"),
        }
    }
}
