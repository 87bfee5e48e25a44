use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;

use crate::error::{FetchError, ThumbnailError};

/// Response from an [`HttpClient`] request.
///
/// Header names are stored lowercased so lookups are case-insensitive.
#[derive(Debug, Clone, Default)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl HttpResponse {
    /// Create a response with the given status and body and no headers.
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    /// Add a header, lowercasing its name.
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_ascii_lowercase(), value.into()));
        self
    }

    /// Returns `true` for any 2xx status.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Look up a header value by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        let name = name.to_ascii_lowercase();
        self.headers
            .iter()
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Minimal HTTP client used for remote thumbnail sources.
///
/// Implementations return `Ok` for any completed exchange regardless of
/// status; status interpretation belongs to the caller. Transport failures,
/// including timeouts, are reported as [`FetchError`].
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Fetch the full resource.
    async fn get(&self, url: &str) -> Result<HttpResponse, FetchError>;

    /// Fetch headers only.
    async fn head(&self, url: &str) -> Result<HttpResponse, FetchError>;
}

#[async_trait]
impl<T: HttpClient + ?Sized> HttpClient for std::sync::Arc<T> {
    async fn get(&self, url: &str) -> Result<HttpResponse, FetchError> {
        (**self).get(url).await
    }

    async fn head(&self, url: &str) -> Result<HttpResponse, FetchError> {
        (**self).head(url).await
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// GET `url` and return its body, treating any non-2xx status or transport
/// failure as a missing source.
pub async fn fetch_content<C: HttpClient + ?Sized>(
    client: &C,
    url: &str,
) -> Result<Bytes, ThumbnailError> {
    match client.get(url).await {
        Ok(response) if response.is_success() => Ok(response.body),
        Ok(response) => {
            debug!(url, status = response.status, "Remote GET failed");
            Err(ThumbnailError::url_not_found(url))
        }
        Err(e) => {
            debug!(url, error = %e, "Remote GET failed");
            Err(ThumbnailError::url_not_found(url))
        }
    }
}

/// HEAD `url` and return its `Last-Modified` header.
///
/// A non-2xx status, transport failure, or missing header is a missing source.
pub async fn fetch_last_modified<C: HttpClient + ?Sized>(
    client: &C,
    url: &str,
) -> Result<String, ThumbnailError> {
    let response = match client.head(url).await {
        Ok(response) if response.is_success() => response,
        Ok(response) => {
            debug!(url, status = response.status, "Remote HEAD failed");
            return Err(ThumbnailError::url_not_found(url));
        }
        Err(e) => {
            debug!(url, error = %e, "Remote HEAD failed");
            return Err(ThumbnailError::url_not_found(url));
        }
    };

    match response.header("last-modified") {
        Some(value) if !value.trim().is_empty() => Ok(value.to_string()),
        _ => {
            debug!(url, "Remote HEAD response has no Last-Modified header");
            Err(ThumbnailError::SourceNotFound {
                message: format!("URL {} doesn't exist (no Last-Modified header)", url),
            })
        }
    }
}
