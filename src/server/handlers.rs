//! HTTP request handlers for the thumbnail API.
//!
//! # Endpoints
//!
//! - `GET /health` - Health check endpoint
//! - `GET /thumbnail` - Thumbnail image bytes
//! - `GET /thumbnail/path` - Cache entry path as JSON
//! - `GET /thumbnail/url` - Public URL as JSON
//! - `GET /thumbnail/markup` - `<img>` tag as HTML
//! - `DELETE /cache` - Clear the whole cache
//!
//! Local sources are resolved relative to the configured web root and may
//! not escape it. Remote sources are passed through unchanged.

use std::path::Path;
use std::sync::Arc;

use axum::{
    extract::{Query, RawQuery, State},
    http::{header, HeaderName, StatusCode},
    response::{Html, IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::error::{ClearCacheError, ThumbnailError};
use crate::io::paths::{resolve_within, strip_alias};
use crate::io::HttpClient;
use crate::render::{ImagePipeline, ResizeMode};
use crate::thumbnail::{FreshnessPolicy, SourceRef, ThumbnailCache, ThumbnailRequest};

/// Response header reporting whether the entry was reused.
pub const CACHE_HIT_HEADER: HeaderName = HeaderName::from_static("x-thumbnail-cache-hit");

/// Response header carrying the entry fingerprint.
pub const FINGERPRINT_HEADER: HeaderName = HeaderName::from_static("x-thumbnail-fingerprint");

// =============================================================================
// Application State
// =============================================================================

/// Shared application state containing the thumbnail cache.
///
/// This is passed to all handlers via Axum's State extractor.
pub struct AppState<H: HttpClient, P: ImagePipeline> {
    /// The thumbnail cache serving every request
    pub cache: Arc<ThumbnailCache<H, P>>,

    /// Cache-Control max-age in seconds for image responses
    pub cache_max_age: u32,
}

impl<H: HttpClient, P: ImagePipeline> AppState<H, P> {
    /// Create a new application state with a one hour max-age.
    pub fn new(cache: ThumbnailCache<H, P>) -> Self {
        Self::with_cache_max_age(cache, 3600)
    }

    /// Create a new application state with custom cache max-age.
    pub fn with_cache_max_age(cache: ThumbnailCache<H, P>, cache_max_age: u32) -> Self {
        Self {
            cache: Arc::new(cache),
            cache_max_age,
        }
    }
}

impl<H: HttpClient, P: ImagePipeline> Clone for AppState<H, P> {
    fn clone(&self) -> Self {
        Self {
            cache: Arc::clone(&self.cache),
            cache_max_age: self.cache_max_age,
        }
    }
}

// =============================================================================
// Request Parameters
// =============================================================================

/// Query parameters shared by every thumbnail endpoint.
///
/// `mode` and `check` are kept as strings so that bad values surface as
/// `invalid_request` errors rather than extractor rejections.
#[derive(Debug, Deserialize)]
pub struct ThumbnailQueryParams {
    /// Path relative to the web root (optionally `@webroot/...`) or http(s) URL
    pub source: String,

    /// Target width in pixels
    pub width: u32,

    /// Target height in pixels
    pub height: u32,

    /// `outbound` (default) or `inset`
    #[serde(default)]
    pub mode: Option<String>,

    /// Quality override (1-100)
    #[serde(default)]
    pub quality: Option<u8>,

    /// Remote freshness check: `none`, `crc`, `header` or `1`-`3`
    #[serde(default)]
    pub check: Option<String>,
}

impl ThumbnailQueryParams {
    /// Build a cache request, confining local sources to `web_root`.
    pub fn to_request(&self, web_root: &Path) -> Result<ThumbnailRequest, ThumbnailError> {
        let source = confine_source(&self.source, web_root)?;

        let mut request = ThumbnailRequest::new(source, self.width, self.height);
        if let Some(mode) = &self.mode {
            request = request.with_mode(mode.parse::<ResizeMode>()?);
        }
        if let Some(check) = &self.check {
            request = request.with_freshness(check.parse::<FreshnessPolicy>()?);
        }
        if let Some(quality) = self.quality {
            request = request.with_quality(quality);
        }
        Ok(request)
    }
}

/// Map a request-supplied source onto the filesystem under `web_root`.
pub fn confine_source(raw: &str, web_root: &Path) -> Result<String, ThumbnailError> {
    if SourceRef::parse(raw).is_remote() {
        return Ok(raw.to_string());
    }

    let relative = strip_alias(raw).unwrap_or(raw);
    match resolve_within(web_root, relative) {
        Some(path) => Ok(path.to_string_lossy().into_owned()),
        None => Err(ThumbnailError::invalid_config(format!(
            "source {} is outside the web root",
            raw
        ))),
    }
}

/// `attr=name=value` pairs from a raw query string, in order.
pub fn markup_attributes(raw_query: Option<&str>) -> Vec<(String, String)> {
    let Some(raw) = raw_query else {
        return Vec::new();
    };

    url::form_urlencoded::parse(raw.as_bytes())
        .filter(|(key, _)| key == "attr")
        .filter_map(|(_, value)| {
            value
                .split_once('=')
                .map(|(name, val)| (name.to_string(), val.to_string()))
        })
        .collect()
}

// =============================================================================
// Response Types
// =============================================================================

/// JSON error response returned for all error conditions.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error type identifier (e.g., "not_found", "invalid_request")
    pub error: String,

    /// Human-readable error message
    pub message: String,

    /// HTTP status code (included for convenience)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            status: None,
        }
    }

    pub fn with_status(
        error: impl Into<String>,
        message: impl Into<String>,
        status: StatusCode,
    ) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            status: Some(status.as_u16()),
        }
    }
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Response from the path endpoint.
#[derive(Debug, Serialize)]
pub struct PathResponse {
    /// Filesystem path of the cache entry
    pub path: String,

    /// Fingerprint naming the entry
    pub fingerprint: String,

    /// Whether the entry was reused
    pub cache_hit: bool,
}

/// Response from the URL endpoint.
#[derive(Debug, Serialize)]
pub struct UrlResponse {
    /// Public URL, or the fallback string if the thumbnail could not be produced
    pub url: String,
}

// =============================================================================
// Error Mapping
// =============================================================================

/// Log an error response by severity and build its JSON body.
fn error_response(status: StatusCode, error_type: &str, message: String) -> Response {
    if status.is_server_error() {
        error!(
            error_type = error_type,
            status = status.as_u16(),
            "Server error: {}",
            message
        );
    } else if status == StatusCode::NOT_FOUND {
        debug!(
            error_type = error_type,
            status = status.as_u16(),
            "Resource not found: {}",
            message
        );
    } else {
        warn!(
            error_type = error_type,
            status = status.as_u16(),
            "Client error: {}",
            message
        );
    }

    let body = ErrorResponse::with_status(error_type, message, status);
    (status, Json(body)).into_response()
}

/// Convert ThumbnailError to HTTP response.
///
/// - 5xx errors are logged at ERROR level
/// - 404 is logged at DEBUG level
/// - other 4xx errors are logged at WARN level
impl IntoResponse for ThumbnailError {
    fn into_response(self) -> Response {
        let (status, error_type) = match &self {
            ThumbnailError::SourceNotFound { .. } => (StatusCode::NOT_FOUND, "not_found"),
            ThumbnailError::InvalidConfiguration { .. } => {
                (StatusCode::BAD_REQUEST, "invalid_request")
            }
            ThumbnailError::RenderFailure { .. } => {
                (StatusCode::UNPROCESSABLE_ENTITY, "render_failed")
            }
            ThumbnailError::StorageFailure { .. } => {
                (StatusCode::INTERNAL_SERVER_ERROR, "storage_error")
            }
        };

        error_response(status, error_type, self.to_string())
    }
}

impl IntoResponse for ClearCacheError {
    fn into_response(self) -> Response {
        error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "storage_error",
            self.to_string(),
        )
    }
}

/// Content type for a cache entry, from its extension.
pub fn content_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    match ext.as_deref() {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => "application/octet-stream",
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// Handle thumbnail image requests.
///
/// # Endpoint
///
/// `GET /thumbnail?source=img/cat.png&width=100&height=100`
///
/// # Query Parameters
///
/// - `source`: path under the web root or http(s) URL
/// - `width`, `height`: target box in pixels
/// - `mode`: `outbound` (default) or `inset`
/// - `quality`: 1-100 (default from configuration)
/// - `check`: `none` (default), `crc` or `header`
///
/// # Response
///
/// - `200 OK`: image bytes with a content type matching the source extension
/// - `400 Bad Request`: invalid parameters
/// - `404 Not Found`: source missing or unreachable
/// - `422 Unprocessable Entity`: source could not be decoded or encoded
/// - `500 Internal Server Error`: cache directory not writable
///
/// # Headers
///
/// - `Cache-Control: public, max-age={cache_max_age}`
/// - `X-Thumbnail-Cache-Hit: true|false`
/// - `X-Thumbnail-Fingerprint: <fingerprint>`
pub async fn thumbnail_handler<H, P>(
    State(state): State<AppState<H, P>>,
    Query(query): Query<ThumbnailQueryParams>,
) -> Result<Response, ThumbnailError>
where
    H: HttpClient + 'static,
    P: ImagePipeline + 'static,
{
    let request = query.to_request(&state.cache.config().web_root)?;
    let response = state.cache.thumbnail(&request).await?;

    let bytes = tokio::fs::read(&response.path)
        .await
        .map_err(|e| ThumbnailError::storage(&response.path, e))?;

    let headers = [
        (
            header::CONTENT_TYPE,
            content_type_for(&response.path).to_string(),
        ),
        (
            header::CACHE_CONTROL,
            format!("public, max-age={}", state.cache_max_age),
        ),
        (CACHE_HIT_HEADER, response.cache_hit.to_string()),
        (FINGERPRINT_HEADER, response.fingerprint.to_string()),
    ];

    Ok((StatusCode::OK, headers, bytes).into_response())
}

/// Handle path requests.
///
/// # Endpoint
///
/// `GET /thumbnail/path?source=...&width=...&height=...`
///
/// Same parameters and error statuses as `GET /thumbnail`.
pub async fn path_handler<H, P>(
    State(state): State<AppState<H, P>>,
    Query(query): Query<ThumbnailQueryParams>,
) -> Result<Json<PathResponse>, ThumbnailError>
where
    H: HttpClient + 'static,
    P: ImagePipeline + 'static,
{
    let request = query.to_request(&state.cache.config().web_root)?;
    let response = state.cache.thumbnail(&request).await?;

    Ok(Json(PathResponse {
        path: response.path.to_string_lossy().into_owned(),
        fingerprint: response.fingerprint.to_string(),
        cache_hit: response.cache_hit,
    }))
}

/// Handle URL requests.
///
/// # Endpoint
///
/// `GET /thumbnail/url?source=...&width=...&height=...`
///
/// # Response
///
/// `200 OK` with JSON body `{"url": "..."}`. Rendering errors do not change
/// the status: a missing source yields its "doesn't exist" message and any
/// other failure yields `"Error <code>"`. Only malformed parameters fail
/// with `400 Bad Request`.
pub async fn url_handler<H, P>(
    State(state): State<AppState<H, P>>,
    Query(query): Query<ThumbnailQueryParams>,
) -> Result<Json<UrlResponse>, ThumbnailError>
where
    H: HttpClient + 'static,
    P: ImagePipeline + 'static,
{
    let request = query.to_request(&state.cache.config().web_root)?;
    let url = state.cache.thumbnail_file_url(&request).await;
    Ok(Json(UrlResponse { url }))
}

/// Handle markup requests.
///
/// # Endpoint
///
/// `GET /thumbnail/markup?source=...&width=...&height=...&attr=alt=Cat`
///
/// `attr` may be repeated; each value is `name=value`. Follows the URL
/// fallback of `GET /thumbnail/url`.
pub async fn markup_handler<H, P>(
    State(state): State<AppState<H, P>>,
    Query(query): Query<ThumbnailQueryParams>,
    RawQuery(raw_query): RawQuery,
) -> Result<Html<String>, ThumbnailError>
where
    H: HttpClient + 'static,
    P: ImagePipeline + 'static,
{
    let request = query.to_request(&state.cache.config().web_root)?;
    let attributes = markup_attributes(raw_query.as_deref());
    let markup = state.cache.thumbnail_markup(&request, attributes).await;
    Ok(Html(markup))
}

/// Handle cache clear requests.
///
/// # Endpoint
///
/// `DELETE /cache`
///
/// # Response
///
/// - `204 No Content`: cache root removed and recreated empty
/// - `500 Internal Server Error`: removal or recreation failed
pub async fn clear_cache_handler<H, P>(
    State(state): State<AppState<H, P>>,
) -> Result<StatusCode, ClearCacheError>
where
    H: HttpClient + 'static,
    P: ImagePipeline + 'static,
{
    state.cache.clear_cache().await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Handle health check requests.
///
/// # Endpoint
///
/// `GET /health`
///
/// # Response
///
/// `200 OK` with JSON body:
/// ```json
/// {
///   "status": "healthy",
///   "version": "0.1.0"
/// }
/// ```
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// =============================================================================
// Tests
// =============================================================================
