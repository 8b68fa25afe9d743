//! HTTP fetcher backed by reqwest.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use tracing::debug;

use super::config::FetchConfig;
use super::traits::Fetcher;
use super::types::{FetchError, FetchErrorKind, FetchedContent};

/// Fetches URLs over HTTP(S).
pub struct HttpFetcher {
    client: Client,
    max_body_bytes: Option<u64>,
}

impl HttpFetcher {
    /// Creates a fetcher using the timeout and User-Agent from the configuration.
    pub fn new(config: &FetchConfig) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| FetchError::network(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            max_body_bytes: config.max_body_bytes,
        })
    }

    fn classify(e: reqwest::Error) -> FetchError {
        if e.is_timeout() {
            FetchError::timeout(e.to_string())
        } else {
            FetchError::network(e.to_string())
        }
    }

    fn too_large(&self, size: u64) -> Option<FetchError> {
        match self.max_body_bytes {
            Some(max) if size > max => Some(FetchError::new(
                FetchErrorKind::ConversionError,
                format!("body of {} bytes exceeds limit of {} bytes", size, max),
            )),
            _ => None,
        }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    fn name(&self) -> &str {
        "http"
    }

    async fn fetch(&self, url: &str) -> Result<FetchedContent, FetchError> {
        let mut response = self.client.get(url).send().await.map_err(Self::classify)?;

        let status = response.status();
        if !status.is_success() {
            debug!(url = url, status = status.as_u16(), "Fetch returned error status");
            return Err(FetchError::http(status.as_u16()));
        }

        if let Some(err) = response.content_length().and_then(|len| self.too_large(len)) {
            return Err(err);
        }

        let final_url = response.url().to_string();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(String::from);

        let mut bytes = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(Self::classify)? {
            bytes.extend_from_slice(&chunk);
            if let Some(err) = self.too_large(bytes.len() as u64) {
                return Err(err);
            }
        }

        Ok(FetchedContent {
            url: final_url,
            status: status.as_u16(),
            content_type,
            bytes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fetcher(config: FetchConfig) -> HttpFetcher {
        HttpFetcher::new(&config).unwrap()
    }

    #[tokio::test]
    async fn test_fetch_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/doc.pdf"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "application/pdf")
                    .set_body_bytes(b"%PDF-1.4 body".to_vec()),
            )
            .mount(&server)
            .await;

        let content = fetcher(FetchConfig::default())
            .fetch(&format!("{}/doc.pdf", server.uri()))
            .await
            .unwrap();

        assert_eq!(content.status, 200);
        assert_eq!(content.content_type.as_deref(), Some("application/pdf"));
        assert_eq!(content.bytes, b"%PDF-1.4 body");
    }

    #[tokio::test]
    async fn test_sends_user_agent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header("user-agent", "pdfharvest-test"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"ok".to_vec()))
            .mount(&server)
            .await;

        let config = FetchConfig {
            user_agent: "pdfharvest-test".to_string(),
            ..Default::default()
        };
        let result = fetcher(config).fetch(&server.uri()).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_http_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = fetcher(FetchConfig::default())
            .fetch(&format!("{}/missing.pdf", server.uri()))
            .await
            .unwrap_err();
        assert_eq!(err.kind, FetchErrorKind::HttpError(404));
    }

    #[tokio::test]
    async fn test_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(b"slow".to_vec())
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;

        let config = FetchConfig::default().with_timeout_secs(1);
        let err = fetcher(config).fetch(&server.uri()).await.unwrap_err();
        assert_eq!(err.kind, FetchErrorKind::Timeout);
    }

    #[tokio::test]
    async fn test_unreachable_host_is_network_error() {
        // Port 1 on loopback is not listening in test environments.
        let err = fetcher(FetchConfig::default())
            .fetch("http://127.0.0.1:1/doc.pdf")
            .await
            .unwrap_err();
        assert_eq!(err.kind, FetchErrorKind::NetworkError);
    }

    #[tokio::test]
    async fn test_invalid_url_is_network_error() {
        let err = fetcher(FetchConfig::default())
            .fetch("not a url")
            .await
            .unwrap_err();
        assert_eq!(err.kind, FetchErrorKind::NetworkError);
    }

    #[tokio::test]
    async fn test_body_limit() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![b'x'; 2048]))
            .mount(&server)
            .await;

        let config = FetchConfig {
            max_body_bytes: Some(1024),
            ..Default::default()
        };
        let err = fetcher(config).fetch(&server.uri()).await.unwrap_err();
        assert_eq!(err.kind, FetchErrorKind::ConversionError);
    }
}
