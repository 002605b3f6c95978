//! HTTP plumbing shared by the provider clients.

use std::time::Duration;

use reqwest::{Client, Response};

use super::error::{ProviderError, classify_status};

/// Connect and per-request timeouts for a provider client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpTimeouts {
    pub connect: Duration,
    pub request: Duration,
}

impl Default for HttpTimeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(10),
            request: Duration::from_secs(120),
        }
    }
}

pub fn build_client(timeouts: HttpTimeouts) -> Result<Client, ProviderError> {
    Client::builder()
        .connect_timeout(timeouts.connect)
        .timeout(timeouts.request)
        .build()
        .map_err(|e| ProviderError::Transport(format!("failed to build HTTP client: {e}")))
}

/// Pass successful responses through; classify everything else.
pub async fn check_status(response: Response) -> Result<Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(classify_status(status, &body))
}

/// Download a finished artifact.
///
/// A missing or expired result (any 4xx) and an empty body are integrity
/// failures; 5xx and network errors stay transient.
pub async fn download(client: &Client, url: &str) -> Result<Vec<u8>, ProviderError> {
    let response = client.get(url).send().await?;
    let status = response.status();
    if status.is_client_error() {
        return Err(ProviderError::Integrity(format!(
            "result unavailable (status {}) at {url}",
            status.as_u16()
        )));
    }
    let response = check_status(response).await?;
    let bytes = response.bytes().await?;
    if bytes.is_empty() {
        return Err(ProviderError::Integrity(format!("empty payload at {url}")));
    }
    Ok(bytes.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn download_returns_bytes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/out.mp4"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"MP4DATA".to_vec()))
            .mount(&server)
            .await;

        let client = build_client(HttpTimeouts::default()).unwrap();
        let bytes = download(&client, &format!("{}/out.mp4", server.uri()))
            .await
            .unwrap();
        assert_eq!(bytes, b"MP4DATA");
    }

    #[tokio::test]
    async fn download_empty_body_is_integrity() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let client = build_client(HttpTimeouts::default()).unwrap();
        let err = download(&client, &server.uri()).await.unwrap_err();
        assert!(matches!(err, ProviderError::Integrity(_)));
    }

    #[tokio::test]
    async fn download_expired_url_is_integrity() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(410))
            .mount(&server)
            .await;

        let client = build_client(HttpTimeouts::default()).unwrap();
        let err = download(&client, &server.uri()).await.unwrap_err();
        assert!(matches!(err, ProviderError::Integrity(_)));
    }

    #[tokio::test]
    async fn download_server_error_is_transport() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .mount(&server)
            .await;

        let client = build_client(HttpTimeouts::default()).unwrap();
        let err = download(&client, &server.uri()).await.unwrap_err();
        assert_eq!(err, ProviderError::Transport("status 502: bad gateway".into()));
    }
}
