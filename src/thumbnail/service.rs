//! ThumbnailCache: the public entry points.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                          ThumbnailCache                          │
//! │  thumbnail_markup ─► thumbnail_file_url ─┐                       │
//! │  thumbnail_image ──► thumbnail_file_path ┴─► thumbnail()         │
//! │                                               │                  │
//! │   1. validate request    3. lookup entry      │                  │
//! │   2. derive fingerprint  4. render on miss ◄──┘                  │
//! │           │                     │                  │             │
//! │           ▼                     ▼                  ▼             │
//! │     ┌────────────┐      ┌──────────────┐   ┌───────────────┐     │
//! │     │ HttpClient │      │  CacheStore  │   │ ImagePipeline │     │
//! │     └────────────┘      └──────────────┘   └───────────────┘     │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Only [`ThumbnailCache::thumbnail_file_url`] (and the markup helper built
//! on it) turns errors into strings. Everything else returns `Result`.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Instant;

use tracing::{debug, info, warn};

use super::key::{derive_fingerprint, DerivedKey, Fingerprint, FreshnessPolicy, SourceRef, TransformSpec};
use super::markup::img_tag;
use super::store::{CacheStore, Lookup};
use crate::config::CacheConfig;
use crate::error::{ClearCacheError, ThumbnailError};
use crate::io::paths::{normalize_path, resolve_alias};
use crate::io::{fetch_content, HttpClient, ReqwestHttpClient};
use crate::render::{is_valid_quality, ImagePipeline, RasterPipeline, ResizeMode};

// =============================================================================
// Thumbnail Request
// =============================================================================

/// A request for a thumbnail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThumbnailRequest {
    /// Local path, `@webroot/...` alias, or http(s) URL
    pub source: String,

    /// Target width in pixels
    pub width: u32,

    /// Target height in pixels
    pub height: u32,

    /// Resize mode (defaults to outbound)
    pub mode: ResizeMode,

    /// Quality override; the configured default applies when `None`
    pub quality: Option<u8>,

    /// Remote freshness check (defaults to none)
    pub freshness: FreshnessPolicy,
}

impl ThumbnailRequest {
    /// Create an outbound request with default quality and no freshness check.
    pub fn new(source: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            source: source.into(),
            width,
            height,
            mode: ResizeMode::Outbound,
            quality: None,
            freshness: FreshnessPolicy::None,
        }
    }

    pub fn with_mode(mut self, mode: ResizeMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_quality(mut self, quality: u8) -> Self {
        self.quality = Some(quality);
        self
    }

    pub fn with_freshness(mut self, freshness: FreshnessPolicy) -> Self {
        self.freshness = freshness;
        self
    }
}

// =============================================================================
// Thumbnail Response
// =============================================================================

/// A cache entry produced or reused for a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThumbnailResponse {
    /// Path of the cache entry
    pub path: PathBuf,

    /// Fingerprint naming the entry
    pub fingerprint: Fingerprint,

    /// Whether the entry already existed and was still valid
    pub cache_hit: bool,
}

impl ThumbnailResponse {
    /// `<fingerprint><extension>`
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.fingerprint.to_string())
    }
}

// =============================================================================
// Thumbnail Cache
// =============================================================================

/// On-demand thumbnail generator with a content-addressed disk cache.
///
/// # Type Parameters
///
/// * `H` - HTTP client used for remote sources
/// * `P` - Image pipeline used for rendering
///
/// # Example
///
/// ```ignore
/// use thumb_cache::{CacheConfig, ThumbnailCache, ThumbnailRequest};
///
/// let cache = ThumbnailCache::from_config(CacheConfig::new("/srv/www"))?;
/// let request = ThumbnailRequest::new("@webroot/img/cat.png", 100, 100);
///
/// let path = cache.thumbnail_file_path(&request).await?;
/// let url = cache.thumbnail_file_url(&request).await;
/// ```
pub struct ThumbnailCache<H: HttpClient, P: ImagePipeline> {
    config: CacheConfig,
    store: CacheStore,
    http: H,
    pipeline: P,
}

impl ThumbnailCache<ReqwestHttpClient, RasterPipeline> {
    /// Create a cache using reqwest and the `image` crate.
    pub fn from_config(config: CacheConfig) -> Result<Self, ThumbnailError> {
        let http = ReqwestHttpClient::new(config.http_timeout())
            .map_err(|e| ThumbnailError::invalid_config(e.to_string()))?;
        Self::new(config, http, RasterPipeline::new())
    }
}

impl<H: HttpClient, P: ImagePipeline> ThumbnailCache<H, P> {
    /// Create a cache with explicit collaborators. Fails on invalid configuration.
    ///
    /// A relative `web_root` is resolved against the current directory here,
    /// so every path handed out afterwards is absolute.
    pub fn new(mut config: CacheConfig, http: H, pipeline: P) -> Result<Self, ThumbnailError> {
        config.validate()?;
        config.web_root = normalize_path(&config.web_root).map_err(|e| {
            ThumbnailError::invalid_config(format!(
                "cannot resolve web root {}: {}",
                config.web_root.display(),
                e
            ))
        })?;
        let store = CacheStore::from_config(&config);
        Ok(Self {
            config,
            store,
            http,
            pipeline,
        })
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    pub fn http(&self) -> &H {
        &self.http
    }

    pub fn pipeline(&self) -> &P {
        &self.pipeline
    }

    /// Classify a raw source string and expand `@webroot` aliases.
    pub fn resolve_source(&self, raw: &str) -> SourceRef {
        match SourceRef::parse(raw) {
            SourceRef::LocalPath(_) => {
                SourceRef::LocalPath(resolve_alias(raw, &self.config.web_root))
            }
            remote => remote,
        }
    }

    /// Produce (or reuse) the cache entry for a request.
    ///
    /// # Errors
    ///
    /// - `InvalidConfiguration` for a zero dimension or out-of-range quality
    /// - `SourceNotFound` if the source file or URL is unavailable
    /// - `RenderFailure` if the image cannot be decoded, resized, or encoded
    /// - `StorageFailure` if the cache tree cannot be written
    pub async fn thumbnail(
        &self,
        request: &ThumbnailRequest,
    ) -> Result<ThumbnailResponse, ThumbnailError> {
        let transform = self.transform_for(request)?;
        let source = self.resolve_source(&request.source);

        let key = derive_fingerprint(&source, &transform, request.freshness, &self.http).await?;
        let path = self
            .store
            .entry_path(&key.fingerprint, &key.source.extension());

        if self.store.lookup(&path).await? == Lookup::Hit {
            debug!(path = %path.display(), source = %key.source, "Thumbnail cache hit");
            return Ok(ThumbnailResponse {
                path,
                fingerprint: key.fingerprint,
                cache_hit: true,
            });
        }

        debug!(path = %path.display(), source = %key.source, "Thumbnail cache miss");
        self.render(&key, &transform, &path).await?;

        Ok(ThumbnailResponse {
            path,
            fingerprint: key.fingerprint,
            cache_hit: false,
        })
    }

    /// Path of the cache entry. Propagates every error.
    pub async fn thumbnail_file_path(
        &self,
        request: &ThumbnailRequest,
    ) -> Result<PathBuf, ThumbnailError> {
        Ok(self.thumbnail(request).await?.path)
    }

    /// Decoded cache entry. Propagates every error.
    pub async fn thumbnail_image(
        &self,
        request: &ThumbnailRequest,
    ) -> Result<P::Image, ThumbnailError> {
        let path = self.thumbnail_file_path(request).await?;
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| ThumbnailError::storage(&path, e))?;
        self.pipeline.decode(&bytes)
    }

    /// Public URL of the cache entry, propagating errors.
    pub async fn try_thumbnail_file_url(
        &self,
        request: &ThumbnailRequest,
    ) -> Result<String, ThumbnailError> {
        let response = self.thumbnail(request).await?;
        Ok(self.public_url(&response))
    }

    /// Public URL of the cache entry.
    ///
    /// Never fails: a missing source yields its "doesn't exist" message, any
    /// other error is logged and yields `"Error <code>"`.
    pub async fn thumbnail_file_url(&self, request: &ThumbnailRequest) -> String {
        match self.try_thumbnail_file_url(request).await {
            Ok(url) => url,
            Err(err) => error_to_string(&err, &request.source),
        }
    }

    /// `<img>` tag pointing at the thumbnail URL, with extra attributes.
    ///
    /// Inherits the string fallback of [`Self::thumbnail_file_url`].
    pub async fn thumbnail_markup<K, V>(
        &self,
        request: &ThumbnailRequest,
        attributes: impl IntoIterator<Item = (K, V)>,
    ) -> String
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let url = self.thumbnail_file_url(request).await;
        img_tag(&url, attributes)
    }

    /// Public URL for a response: `<cache url>/<shard>/<file name>`.
    pub fn public_url(&self, response: &ThumbnailResponse) -> String {
        format!(
            "{}/{}/{}",
            self.config.cache_url(),
            response.fingerprint.shard(),
            response.file_name()
        )
    }

    /// Delete every cache entry and recreate the empty root.
    pub async fn clear_cache(&self) -> Result<(), ClearCacheError> {
        self.store.clear().await?;
        info!(root = %self.store.root().display(), "Thumbnail cache cleared");
        Ok(())
    }

    /// [`Self::clear_cache`] reduced to success or failure. Failures are logged.
    pub async fn clear_cache_succeeded(&self) -> bool {
        match self.clear_cache().await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Failed to clear thumbnail cache");
                false
            }
        }
    }

    fn transform_for(&self, request: &ThumbnailRequest) -> Result<TransformSpec, ThumbnailError> {
        if request.width == 0 || request.height == 0 {
            return Err(ThumbnailError::invalid_config(format!(
                "thumbnail dimensions must be positive, got {}x{}",
                request.width, request.height
            )));
        }

        let quality = request.quality.unwrap_or(self.config.quality);
        if !is_valid_quality(quality) {
            return Err(ThumbnailError::invalid_config(format!(
                "quality must be between 1 and 100, got {}",
                quality
            )));
        }

        Ok(TransformSpec::new(request.width, request.height, request.mode).with_quality(quality))
    }

    async fn render(
        &self,
        key: &DerivedKey,
        transform: &TransformSpec,
        path: &Path,
    ) -> Result<(), ThumbnailError> {
        if let Some(dir) = path.parent() {
            self.store.ensure_dir(dir).await?;
        }

        let bytes = match (&key.prefetched, &key.source) {
            (Some(bytes), _) => bytes.clone(),
            (None, SourceRef::RemoteUrl(url)) => fetch_content(&self.http, url).await?,
            (None, SourceRef::LocalPath(source)) => read_local(source).await?.into(),
        };

        let started = Instant::now();
        self.store.write_atomic(path, |temp| {
            let image = self.pipeline.decode(&bytes)?;
            let image =
                self.pipeline
                    .resize(image, transform.width, transform.height, transform.mode)?;
            self.pipeline.encode(&image, temp, transform.quality)
        })?;

        info!(
            path = %path.display(),
            source = %key.source,
            width = transform.width,
            height = transform.height,
            mode = %transform.mode,
            quality = transform.quality,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Rendered thumbnail"
        );

        Ok(())
    }
}

async fn read_local(path: &Path) -> Result<Vec<u8>, ThumbnailError> {
    tokio::fs::read(path).await.map_err(|e| {
        if e.kind() == ErrorKind::NotFound {
            ThumbnailError::file_not_found(path)
        } else {
            ThumbnailError::storage(path, e)
        }
    })
}

/// String form of a failed request for callers embedding output directly.
pub fn error_to_string(err: &ThumbnailError, source: &str) -> String {
    if let ThumbnailError::SourceNotFound { message } = err {
        return message.clone();
    }

    warn!(code = err.code(), source, error = %err, "Thumbnail generation failed");
    format!("Error {}", err.code())
}

// =============================================================================
// Tests
// =============================================================================
