//! # thumb-cache
//!
//! On-demand image thumbnails with a content-addressed disk cache.
//!
//! Given a source image (a local file or an http(s) URL), a target box and a
//! resize mode, the cache renders a thumbnail once, stores it under a path
//! derived from a fingerprint of the request, and hands back a reference to
//! it: a file path, a decoded image, a public URL, or an `<img>` tag.
//!
//! ## Features
//!
//! - **Content addressing**: the cache path is a pure function of the source
//!   identity, the transform and a freshness signal
//! - **Freshness**: local files are keyed by modification time; remote URLs
//!   can be keyed by a CRC32 of their body or their `Last-Modified` header
//! - **Expiry**: optional time-based invalidation of cache entries
//! - **Atomic writes**: entries are rendered to a temporary file and renamed
//!   into place, so readers never see a partial thumbnail
//! - **HTTP front end**: axum routes for every operation plus static serving
//!   of the cache directory
//!
//! ## Architecture
//!
//! - [`io`] - HTTP client seam, reqwest implementation, path helpers
//! - [`render`] - image pipeline seam and its `image` crate implementation
//! - [`thumbnail`] - key derivation, disk store, the cache service, markup
//! - [`server`] - Axum-based HTTP server and routes
//! - [`config`] - cache configuration and CLI types
//!
//! ## Example
//!
//! ```rust,no_run
//! use thumb_cache::{CacheConfig, ResizeMode, ThumbnailCache, ThumbnailRequest};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), thumb_cache::ThumbnailError> {
//!     let config = CacheConfig::new("/srv/www").with_base_url("https://static.example.com");
//!     let cache = ThumbnailCache::from_config(config)?;
//!
//!     let request = ThumbnailRequest::new("@webroot/img/cat.jpg", 200, 200)
//!         .with_mode(ResizeMode::Inset);
//!
//!     let path = cache.thumbnail_file_path(&request).await?;
//!     let tag = cache.thumbnail_markup(&request, [("alt", "A cat")]).await;
//!     println!("{} {}", path.display(), tag);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod io;
pub mod render;
pub mod server;
pub mod thumbnail;

// Re-export commonly used types
pub use config::{CacheConfig, Cli, Command, ServeConfig};
pub use error::{ClearCacheError, FetchError, ThumbnailError};
pub use io::{HttpClient, HttpResponse, ReqwestHttpClient};
pub use render::{ImagePipeline, RasterPipeline, ResizeMode, DEFAULT_QUALITY};
pub use server::{create_router, AppState, RouterConfig};
pub use thumbnail::{
    error_to_string, img_tag, CacheStore, Fingerprint, FreshnessPolicy, SourceRef,
    ThumbnailCache, ThumbnailRequest, ThumbnailResponse, TransformSpec,
};
