use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use super::{HttpClient, HttpResponse};
use crate::error::FetchError;

/// reqwest-backed implementation of [`HttpClient`].
///
/// Every request is bounded by the timeout given at construction. Redirects
/// are followed with reqwest's default policy.
#[derive(Clone)]
pub struct ReqwestHttpClient {
    client: reqwest::Client,
    timeout: Duration,
}

impl ReqwestHttpClient {
    /// Create a client with the given per-request timeout.
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("thumb-cache/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FetchError::Connection(e.to_string()))?;

        Ok(Self { client, timeout })
    }

    /// Wrap an existing reqwest client.
    pub fn from_client(client: reqwest::Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        url: &str,
        read_body: bool,
    ) -> Result<HttpResponse, FetchError> {
        let response = request.send().await.map_err(|e| map_reqwest_error(e, url))?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();

        let body = if read_body {
            response
                .bytes()
                .await
                .map_err(|e| map_reqwest_error(e, url))?
        } else {
            Bytes::new()
        };

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn get(&self, url: &str) -> Result<HttpResponse, FetchError> {
        let parsed = parse_http_url(url)?;
        self.send(self.client.get(parsed), url, true).await
    }

    async fn head(&self, url: &str) -> Result<HttpResponse, FetchError> {
        let parsed = parse_http_url(url)?;
        self.send(self.client.head(parsed), url, false).await
    }
}

fn parse_http_url(url: &str) -> Result<url::Url, FetchError> {
    let parsed = url::Url::parse(url).map_err(|e| FetchError::InvalidUrl(format!("{}: {}", url, e)))?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        other => Err(FetchError::InvalidUrl(format!(
            "{}: unsupported scheme '{}'",
            url, other
        ))),
    }
}

fn map_reqwest_error(err: reqwest::Error, url: &str) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout(url.to_string())
    } else {
        FetchError::Connection(format!("{}: {}", url, err))
    }
}
