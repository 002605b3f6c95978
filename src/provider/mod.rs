pub mod elevenlabs;
pub mod error;
pub mod grok;
pub mod http;
pub mod luma;
pub mod publish;
pub mod types;

#[cfg(test)]
pub(crate) mod mock;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use elevenlabs::ElevenLabsClient;
pub use error::ProviderError;
pub use grok::GrokClient;
pub use http::HttpTimeouts;
pub use luma::LumaClient;
pub use publish::{MediaPublisher, TmpfilesPublisher};
pub use types::{PollResponse, RemoteStatus};

use crate::request::{GenerationRequest, MediaRef};

/// The three generation use cases, one provider each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    VideoEdit,
    Transition,
    SoundEffect,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 3] = [
        ProviderKind::VideoEdit,
        ProviderKind::Transition,
        ProviderKind::SoundEffect,
    ];

    /// Table name under `[providers]` in the config file.
    pub fn config_key(self) -> &'static str {
        match self {
            ProviderKind::VideoEdit => "video_edit",
            ProviderKind::Transition => "transition",
            ProviderKind::SoundEffect => "sound_effect",
        }
    }

    /// Key under `[credentials]` in the config file.
    pub fn credential_name(self) -> &'static str {
        match self {
            ProviderKind::VideoEdit => "grok",
            ProviderKind::Transition => "luma",
            ProviderKind::SoundEffect => "elevenlabs",
        }
    }

    pub fn env_var(self) -> &'static str {
        match self {
            ProviderKind::VideoEdit => "GROK_API_KEY",
            ProviderKind::Transition => "LUMA_API_KEY",
            ProviderKind::SoundEffect => "ELEVENLABS_API_KEY",
        }
    }

    pub fn artifact_extension(self) -> &'static str {
        match self {
            ProviderKind::VideoEdit | ProviderKind::Transition => "mp4",
            ProviderKind::SoundEffect => "mp3",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderKind::VideoEdit => write!(f, "video edit"),
            ProviderKind::Transition => write!(f, "transition"),
            ProviderKind::SoundEffect => write!(f, "sound effect"),
        }
    }
}

/// Uniform submit/poll/fetch interface over a generation provider.
///
/// Implementations classify failures into [`ProviderError`] and never retry
/// on their own; retry policy belongs to the orchestrator.
#[allow(async_fn_in_trait)]
pub trait ProviderClient {
    fn kind(&self) -> ProviderKind;

    /// Start a remote job and return the provider's job id.
    async fn submit(&self, request: &GenerationRequest) -> Result<String, ProviderError>;

    async fn poll(&self, job_id: &str) -> Result<PollResponse, ProviderError>;

    /// Download the finished artifact.
    async fn fetch(&self, result_url: &str) -> Result<Vec<u8>, ProviderError>;
}

/// Providers only read source media by URL.
pub(crate) fn require_url(media: &MediaRef) -> Result<&str, ProviderError> {
    media.as_url().ok_or_else(|| {
        ProviderError::Validation(format!("source media must be published first: {media:?}"))
    })
}

/// Provider chosen at runtime from the request kind.
pub enum AnyProvider {
    Grok(GrokClient),
    Luma(LumaClient),
    ElevenLabs(ElevenLabsClient),
}

impl AnyProvider {
    pub fn new(
        kind: ProviderKind,
        api_key: String,
        base_url: Option<String>,
        timeouts: HttpTimeouts,
    ) -> Result<Self, ProviderError> {
        Ok(match (kind, base_url) {
            (ProviderKind::VideoEdit, Some(url)) => {
                AnyProvider::Grok(GrokClient::with_base_url(api_key, url, timeouts)?)
            }
            (ProviderKind::VideoEdit, None) => AnyProvider::Grok(GrokClient::new(api_key, timeouts)?),
            (ProviderKind::Transition, Some(url)) => {
                AnyProvider::Luma(LumaClient::with_base_url(api_key, url, timeouts)?)
            }
            (ProviderKind::Transition, None) => AnyProvider::Luma(LumaClient::new(api_key, timeouts)?),
            (ProviderKind::SoundEffect, Some(url)) => {
                AnyProvider::ElevenLabs(ElevenLabsClient::with_base_url(api_key, url, timeouts)?)
            }
            (ProviderKind::SoundEffect, None) => {
                AnyProvider::ElevenLabs(ElevenLabsClient::new(api_key, timeouts)?)
            }
        })
    }
}

impl ProviderClient for AnyProvider {
    fn kind(&self) -> ProviderKind {
        match self {
            AnyProvider::Grok(c) => c.kind(),
            AnyProvider::Luma(c) => c.kind(),
            AnyProvider::ElevenLabs(c) => c.kind(),
        }
    }

    async fn submit(&self, request: &GenerationRequest) -> Result<String, ProviderError> {
        match self {
            AnyProvider::Grok(c) => c.submit(request).await,
            AnyProvider::Luma(c) => c.submit(request).await,
            AnyProvider::ElevenLabs(c) => c.submit(request).await,
        }
    }

    async fn poll(&self, job_id: &str) -> Result<PollResponse, ProviderError> {
        match self {
            AnyProvider::Grok(c) => c.poll(job_id).await,
            AnyProvider::Luma(c) => c.poll(job_id).await,
            AnyProvider::ElevenLabs(c) => c.poll(job_id).await,
        }
    }

    async fn fetch(&self, result_url: &str) -> Result<Vec<u8>, ProviderError> {
        match self {
            AnyProvider::Grok(c) => c.fetch(result_url).await,
            AnyProvider::Luma(c) => c.fetch(result_url).await,
            AnyProvider::ElevenLabs(c) => c.fetch(result_url).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn any_provider_matches_kind() {
        for kind in ProviderKind::ALL {
            let provider = AnyProvider::new(kind, "k".into(), None, HttpTimeouts::default()).unwrap();
            assert_eq!(provider.kind(), kind);
        }
    }

    #[test]
    fn kind_metadata() {
        assert_eq!(ProviderKind::VideoEdit.env_var(), "GROK_API_KEY");
        assert_eq!(ProviderKind::Transition.credential_name(), "luma");
        assert_eq!(ProviderKind::SoundEffect.artifact_extension(), "mp3");
        assert_eq!(ProviderKind::SoundEffect.to_string(), "sound effect");
    }

    #[test]
    fn kind_serializes_snake_case() {
        let json = serde_json::to_string(&ProviderKind::VideoEdit).unwrap();
        assert_eq!(json, "\"video_edit\"");
    }

    #[test]
    fn require_url_rejects_local_media() {
        assert_eq!(require_url(&MediaRef::Url("https://a".into())).unwrap(), "https://a");
        assert!(require_url(&MediaRef::TimelineFrame { frame: 10 }).is_err());
    }
}
