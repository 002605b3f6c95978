//! ElevenLabs sound-generation client.
//!
//! The API answers synchronously with audio bytes. To keep the uniform
//! submit/poll/fetch shape, `submit` holds the bytes under a synthetic job
//! id, `poll` reports the job as finished with an `elevenlabs://` url and
//! `fetch` hands the bytes over.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use reqwest::Client;
use serde::Serialize;
use uuid::Uuid;

use super::error::ProviderError;
use super::http::{HttpTimeouts, build_client, check_status};
use super::types::PollResponse;
use super::{ProviderClient, ProviderKind};
use crate::request::{DEFAULT_PROMPT_INFLUENCE, GenerationRequest};

const API_URL: &str = "https://api.elevenlabs.io/v1";
const RESULT_SCHEME: &str = "elevenlabs://";
pub const OUTPUT_FORMAT: &str = "mp3_44100_128";

#[derive(Debug, Serialize)]
struct SoundGenerationBody<'a> {
    text: &'a str,
    output_format: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration_seconds: Option<f64>,
    prompt_influence: f32,
}

pub struct ElevenLabsClient {
    api_key: String,
    client: Client,
    base_url: String,
    results: Mutex<HashMap<String, Vec<u8>>>,
}

impl ElevenLabsClient {
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
            results: Mutex::new(HashMap::new()),
        })
    }

    fn results(&self) -> MutexGuard<'_, HashMap<String, Vec<u8>>> {
        self.results.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl ProviderClient for ElevenLabsClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::SoundEffect
    }

    async fn submit(&self, request: &GenerationRequest) -> Result<String, ProviderError> {
        let body = SoundGenerationBody {
            text: &request.prompt,
            output_format: OUTPUT_FORMAT,
            duration_seconds: request.parameters.duration_secs,
            prompt_influence: request
                .parameters
                .prompt_influence
                .unwrap_or(DEFAULT_PROMPT_INFLUENCE),
        };

        let response = self
            .client
            .post(format!("{}/sound-generation", self.base_url))
            .header("xi-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;
        let response = check_status(response).await?;

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        if !content_type.starts_with("audio") {
            let text = response.text().await.unwrap_or_default();
            return Err(ProviderError::Validation(format!(
                "expected audio, got {content_type:?}: {text}"
            )));
        }

        let bytes = response.bytes().await?;
        let job_id = format!("sfx-{}", Uuid::new_v4());
        self.results().insert(job_id.clone(), bytes.to_vec());
        Ok(job_id)
    }

    async fn poll(&self, job_id: &str) -> Result<PollResponse, ProviderError> {
        if self.results().contains_key(job_id) {
            Ok(PollResponse::succeeded(format!("{RESULT_SCHEME}{job_id}")))
        } else {
            Err(ProviderError::NotFound(format!("no sound generation {job_id}")))
        }
    }

    async fn fetch(&self, result_url: &str) -> Result<Vec<u8>, ProviderError> {
        let job_id = result_url.strip_prefix(RESULT_SCHEME).ok_or_else(|| {
            ProviderError::Integrity(format!("not an elevenlabs result: {result_url}"))
        })?;
        match self.results().remove(job_id) {
            Some(bytes) if !bytes.is_empty() => Ok(bytes),
            Some(_) => Err(ProviderError::Integrity("empty audio payload".into())),
            None => Err(ProviderError::Integrity(format!(
                "result {job_id} already taken or unknown"
            ))),
        }
    }
}
