//! Luma Dream Machine client for keyframe-to-keyframe transitions.

use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::error::ProviderError;
use super::http::{HttpTimeouts, build_client, check_status, download};
use super::types::PollResponse;
use super::{ProviderClient, ProviderKind, RemoteStatus, require_url};
use crate::request::{AspectRatio, GenerationRequest, SourceMedia};

const API_URL: &str = "https://api.lumalabs.ai/dream-machine/v1";

#[derive(Debug, Serialize)]
struct GenerationBody<'a> {
    prompt: &'a str,
    keyframes: Keyframes,
    aspect_ratio: &'static str,
    #[serde(rename = "loop")]
    loop_video: bool,
}

#[derive(Debug, Serialize)]
struct Keyframes {
    frame0: ImageKeyframe,
    frame1: ImageKeyframe,
}

#[derive(Debug, Serialize)]
struct ImageKeyframe {
    #[serde(rename = "type")]
    kind: &'static str,
    url: String,
}

impl ImageKeyframe {
    fn image(url: &str) -> Self {
        Self {
            kind: "image",
            url: url.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GenerationResponse {
    state: String,
    #[serde(default)]
    assets: Option<Assets>,
    failure_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Assets {
    video: Option<String>,
}

pub struct LumaClient {
    api_key: String,
    client: Client,
    base_url: String,
}

impl LumaClient {
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
        })
    }
}

impl ProviderClient for LumaClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Transition
    }

    async fn submit(&self, request: &GenerationRequest) -> Result<String, ProviderError> {
        let Some(SourceMedia::Keyframes { first, last }) = &request.source_media else {
            return Err(ProviderError::Validation(
                "transitions need a first and a last keyframe".into(),
            ));
        };

        let body = GenerationBody {
            prompt: &request.prompt,
            keyframes: Keyframes {
                frame0: ImageKeyframe::image(require_url(first)?),
                frame1: ImageKeyframe::image(require_url(last)?),
            },
            aspect_ratio: request
                .parameters
                .aspect_ratio
                .unwrap_or(AspectRatio::Wide)
                .as_str(),
            loop_video: request.parameters.loop_video,
        };

        let response = self
            .client
            .post(format!("{}/generations", self.base_url))
            .bearer_auth(&self.api_key)
            .header("accept", "application/json")
            .json(&body)
            .send()
            .await?;
        let response = check_status(response).await?;
        let body: SubmitResponse = response.json().await?;
        body.id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ProviderError::Validation("no generation id in response".into()))
    }

    async fn poll(&self, job_id: &str) -> Result<PollResponse, ProviderError> {
        let response = self
            .client
            .get(format!("{}/generations/{job_id}", self.base_url))
            .bearer_auth(&self.api_key)
            .header("accept", "application/json")
            .send()
            .await?;
        let response = check_status(response).await?;
        let body: GenerationResponse = response.json().await?;

        Ok(match body.state.as_str() {
            "completed" => PollResponse {
                status: RemoteStatus::Succeeded,
                progress: Some(1.0),
                result_url: body.assets.and_then(|a| a.video),
                error_detail: None,
            },
            "failed" => PollResponse::failed(
                body.failure_reason
                    .unwrap_or_else(|| "Unknown error".to_string()),
            ),
            "queued" => PollResponse {
                status: RemoteStatus::Pending,
                ..PollResponse::running()
            },
            _ => PollResponse::running(),
        })
    }

    async fn fetch(&self, result_url: &str) -> Result<Vec<u8>, ProviderError> {
        download(&self.client, result_url).await
    }
}
