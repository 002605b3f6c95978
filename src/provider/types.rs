//! Wire shapes shared by provider clients.

use serde::{Deserialize, Serialize};

/// Provider-side job status, normalised across providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RemoteStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

/// Result of one status query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollResponse {
    pub status: RemoteStatus,
    /// Fraction in `0.0..=1.0` when the provider reports one.
    pub progress: Option<f32>,
    pub result_url: Option<String>,
    pub error_detail: Option<String>,
}

impl PollResponse {
    pub fn running() -> Self {
        Self {
            status: RemoteStatus::Running,
            progress: None,
            result_url: None,
            error_detail: None,
        }
    }

    pub fn succeeded(url: impl Into<String>) -> Self {
        Self {
            status: RemoteStatus::Succeeded,
            progress: Some(1.0),
            result_url: Some(url.into()),
            error_detail: None,
        }
    }

    pub fn failed(detail: impl Into<String>) -> Self {
        Self {
            status: RemoteStatus::Failed,
            progress: None,
            result_url: None,
            error_detail: Some(detail.into()),
        }
    }
}

/// `{"url": ...}` as used for provider image/video inputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UrlRef {
    pub url: String,
}
