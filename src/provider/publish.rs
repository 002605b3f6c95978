//! Publishing local source media at a URL providers can read.

use std::path::Path;

use reqwest::Client;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use tracing::debug;

use super::error::ProviderError;
use super::http::{HttpTimeouts, build_client, check_status};
use crate::error::{ReelgenError, Result};

const UPLOAD_URL: &str = "https://tmpfiles.org/api/v1/upload";

/// Makes a local file reachable by URL.
#[allow(async_fn_in_trait)]
pub trait MediaPublisher {
    async fn publish(&self, path: &Path) -> Result<String>;
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    data: Option<UploadData>,
}

#[derive(Debug, Deserialize)]
struct UploadData {
    url: String,
}

/// Uploads to tmpfiles.org and returns the direct-download link.
pub struct TmpfilesPublisher {
    client: Client,
    upload_url: String,
}

impl TmpfilesPublisher {
    pub fn new(timeouts: HttpTimeouts) -> std::result::Result<Self, ProviderError> {
        Self::with_upload_url(UPLOAD_URL.to_string(), timeouts)
    }

    /// Create a publisher pointing at a custom upload URL (useful for testing).
    pub fn with_upload_url(
        upload_url: String,
        timeouts: HttpTimeouts,
    ) -> std::result::Result<Self, ProviderError> {
        Ok(Self {
            client: build_client(timeouts)?,
            upload_url,
        })
    }
}

/// The upload API answers with a preview page; `/dl/` serves the raw file.
fn direct_link(url: &str) -> String {
    if url.contains("tmpfiles.org/dl/") {
        url.to_string()
    } else {
        url.replacen("tmpfiles.org/", "tmpfiles.org/dl/", 1)
    }
}

impl MediaPublisher for TmpfilesPublisher {
    async fn publish(&self, path: &Path) -> Result<String> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| ReelgenError::Storage(format!("cannot read {}: {e}", path.display())))?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload.bin".to_string());

        let form = Form::new().part("file", Part::bytes(bytes).file_name(file_name));
        let response = self
            .client
            .post(&self.upload_url)
            .multipart(form)
            .send()
            .await
            .map_err(ProviderError::from)?;
        let response = check_status(response).await?;
        let body: UploadResponse = response.json().await.map_err(ProviderError::from)?;
        let url = body
            .data
            .map(|d| direct_link(&d.url))
            .ok_or_else(|| ProviderError::Validation("upload response has no url".into()))?;

        debug!(path = %path.display(), %url, "published source media");
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn direct_link_rewrites_once() {
        assert_eq!(
            direct_link("https://tmpfiles.org/123/clip.mp4"),
            "https://tmpfiles.org/dl/123/clip.mp4"
        );
        assert_eq!(
            direct_link("https://tmpfiles.org/dl/123/clip.mp4"),
            "https://tmpfiles.org/dl/123/clip.mp4"
        );
    }

    #[tokio::test]
    async fn publish_uploads_and_returns_direct_link() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/upload"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "success",
                "data": {"url": "http://tmpfiles.org/555/still.png"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("still.png");
        std::fs::write(&file, b"PNG").unwrap();

        let publisher = TmpfilesPublisher::with_upload_url(
            format!("{}/api/v1/upload", server.uri()),
            HttpTimeouts::default(),
        )
        .unwrap();
        let url = publisher.publish(&file).await.unwrap();
        assert_eq!(url, "http://tmpfiles.org/dl/555/still.png");
    }

    #[tokio::test]
    async fn publish_missing_file_is_storage_error() {
        let publisher = TmpfilesPublisher::with_upload_url(
            "http://127.0.0.1:9/upload".into(),
            HttpTimeouts::default(),
        )
        .unwrap();
        let err = publisher
            .publish(Path::new("/definitely/not/here.mp4"))
            .await
            .unwrap_err();
        assert!(matches!(err, ReelgenError::Storage(_)));
    }

    #[tokio::test]
    async fn publish_server_error_is_transport() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("clip.mp4");
        std::fs::write(&file, b"MP4").unwrap();

        let publisher =
            TmpfilesPublisher::with_upload_url(server.uri(), HttpTimeouts::default()).unwrap();
        let err = publisher.publish(&file).await.unwrap_err();
        assert!(matches!(
            err,
            ReelgenError::Provider(ProviderError::Transport(_))
        ));
    }
}
