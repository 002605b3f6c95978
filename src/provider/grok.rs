//! xAI Grok Imagine video client (video edits and text-to-video).

use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::error::ProviderError;
use super::http::{HttpTimeouts, build_client, check_status, download};
use super::types::{PollResponse, UrlRef};
use super::{ProviderClient, ProviderKind, require_url};
use crate::request::{GenerationRequest, SourceMedia};

const API_URL: &str = "https://api.x.ai/v1";
pub const DEFAULT_MODEL: &str = "grok-imagine-video";

#[derive(Debug, Serialize)]
struct EditBody<'a> {
    model: &'a str,
    prompt: &'a str,
    video: UrlRef,
    #[serde(skip_serializing_if = "Option::is_none")]
    aspect_ratio: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    resolution: Option<&'static str>,
}

#[derive(Debug, Serialize)]
struct GenerationBody<'a> {
    model: &'a str,
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    aspect_ratio: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    resolution: Option<&'static str>,
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    request_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    video: Option<VideoAsset>,
    state: Option<String>,
    status: Option<String>,
    failure_reason: Option<String>,
    error: Option<String>,
    progress: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct VideoAsset {
    url: Option<String>,
}

pub struct GrokClient {
    api_key: String,
    client: Client,
    base_url: String,
    model: String,
}

impl GrokClient {
    pub fn new(api_key: String, timeouts: HttpTimeouts) -> Result<Self, ProviderError> {
        Self::with_base_url(api_key, API_URL.to_string(), timeouts)
    }

    /// Create a client pointing at a custom base URL (useful for testing).
    pub fn with_base_url(
        api_key: String,
        base_url: String,
        timeouts: HttpTimeouts,
    ) -> Result<Self, ProviderError> {
        Ok(Self {
            api_key,
            client: build_client(timeouts)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: DEFAULT_MODEL.to_string(),
        })
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}

impl ProviderClient for GrokClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::VideoEdit
    }

    async fn submit(&self, request: &GenerationRequest) -> Result<String, ProviderError> {
        let params = &request.parameters;
        let aspect_ratio = params.aspect_ratio.map(|a| a.as_str());
        let resolution = params.resolution.map(|r| r.as_str());

        let builder = match &request.source_media {
            Some(SourceMedia::Clip(media)) => {
                let body = EditBody {
                    model: &self.model,
                    prompt: &request.prompt,
                    video: UrlRef {
                        url: require_url(media)?.to_string(),
                    },
                    aspect_ratio,
                    resolution,
                };
                self.client
                    .post(format!("{}/videos/edits", self.base_url))
                    .json(&body)
            }
            None => {
                let body = GenerationBody {
                    model: &self.model,
                    prompt: &request.prompt,
                    duration: params.duration_secs.map(|d| d.round().clamp(1.0, 15.0) as u32),
                    aspect_ratio,
                    resolution,
                };
                self.client
                    .post(format!("{}/videos/generations", self.base_url))
                    .json(&body)
            }
            Some(SourceMedia::Keyframes { .. }) => {
                return Err(ProviderError::Validation(
                    "video edits take a single clip, not keyframes".into(),
                ));
            }
        };

        let response = builder.bearer_auth(&self.api_key).send().await?;
        let response = check_status(response).await?;
        let body: SubmitResponse = response.json().await?;
        body.request_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ProviderError::Validation("no request_id in response".into()))
    }

    async fn poll(&self, job_id: &str) -> Result<PollResponse, ProviderError> {
        let response = self
            .client
            .get(format!("{}/videos/{job_id}", self.base_url))
            .bearer_auth(&self.api_key)
            .send()
            .await?;
        let response = check_status(response).await?;
        let body: StatusResponse = response.json().await?;

        if let Some(url) = body.video.and_then(|v| v.url) {
            return Ok(PollResponse::succeeded(url));
        }
        let failed = [&body.state, &body.status]
            .iter()
            .any(|s| s.as_deref() == Some("failed"));
        if failed {
            let reason = body
                .failure_reason
                .or(body.error)
                .unwrap_or_else(|| "Unknown error".to_string());
            return Ok(PollResponse::failed(reason));
        }
        Ok(PollResponse {
            progress: body.progress,
            ..PollResponse::running()
        })
    }

    async fn fetch(&self, result_url: &str) -> Result<Vec<u8>, ProviderError> {
        download(&self.client, result_url).await
    }
}
