//! Error types shared by every provider client.
//!
//! [`ProviderError`] is the uniform failure shape of submit/poll/fetch.
//! Each client maps its own HTTP responses into these classes through
//! [`classify_status`], so the orchestrator can decide retries without
//! knowing which provider it talks to.

use reqwest::StatusCode;
use thiserror::Error;

use crate::error::ErrorKind;

/// Failures a provider call can surface.
///
/// Only [`Transport`](ProviderError::Transport) is considered transient; the
/// orchestrator never retries the other classes beyond its small
/// not-found and integrity allowances.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    /// Missing or rejected credential (HTTP 401/403).
    #[error("authentication rejected: {0}")]
    Auth(String),

    /// The request violates provider constraints (HTTP 400/413/422).
    #[error("request rejected by provider: {0}")]
    Validation(String),

    /// Network failure, timeout, rate limit or 5xx.
    #[error("transport error: {0}")]
    Transport(String),

    /// The job is unknown or expired on the provider side.
    #[error("job not found: {0}")]
    NotFound(String),

    /// Empty, corrupt or unavailable result payload.
    #[error("integrity error: {0}")]
    Integrity(String),
}

impl ProviderError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProviderError::Auth(_) => ErrorKind::Auth,
            ProviderError::Validation(_) => ErrorKind::Validation,
            ProviderError::Transport(_) => ErrorKind::Transport,
            ProviderError::NotFound(_) => ErrorKind::NotFound,
            ProviderError::Integrity(_) => ErrorKind::Integrity,
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, ProviderError::Transport(_))
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        ProviderError::Transport(err.to_string())
    }
}

/// Map a non-success HTTP status and its body to a provider error class.
pub fn classify_status(status: StatusCode, body: &str) -> ProviderError {
    let message = if body.trim().is_empty() {
        format!("status {}", status.as_u16())
    } else {
        format!("status {}: {}", status.as_u16(), body.trim())
    };

    match status.as_u16() {
        401 | 403 => ProviderError::Auth(message),
        404 => ProviderError::NotFound(message),
        408 | 429 => ProviderError::Transport(message),
        400..=499 => ProviderError::Validation(message),
        _ => ProviderError::Transport(message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_auth_statuses() {
        assert!(matches!(
            classify_status(StatusCode::UNAUTHORIZED, "bad key"),
            ProviderError::Auth(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::FORBIDDEN, ""),
            ProviderError::Auth(_)
        ));
    }

    #[test]
    fn classify_validation_statuses() {
        let err = classify_status(StatusCode::UNPROCESSABLE_ENTITY, "video too long");
        assert_eq!(
            err,
            ProviderError::Validation("status 422: video too long".into())
        );
        assert!(matches!(
            classify_status(StatusCode::BAD_REQUEST, "{}"),
            ProviderError::Validation(_)
        ));
    }

    #[test]
    fn classify_transient_statuses() {
        for status in [
            StatusCode::TOO_MANY_REQUESTS,
            StatusCode::REQUEST_TIMEOUT,
            StatusCode::INTERNAL_SERVER_ERROR,
            StatusCode::BAD_GATEWAY,
        ] {
            let err = classify_status(status, "");
            assert!(err.is_transient(), "{status} should be transient");
        }
    }

    #[test]
    fn classify_not_found() {
        assert_eq!(
            classify_status(StatusCode::NOT_FOUND, ""),
            ProviderError::NotFound("status 404".into())
        );
    }

    #[test]
    fn only_transport_is_transient() {
        assert!(ProviderError::Transport("x".into()).is_transient());
        assert!(!ProviderError::Auth("x".into()).is_transient());
        assert!(!ProviderError::Validation("x".into()).is_transient());
        assert!(!ProviderError::Integrity("x".into()).is_transient());
    }
}
