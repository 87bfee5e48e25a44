//! Router configuration for the thumbnail server.
//!
//! # Route Structure
//!
//! ```text
//! /health                  - Health check
//! /thumbnail               - Thumbnail image bytes
//! /thumbnail/path          - Cache entry path (JSON)
//! /thumbnail/url           - Public URL (JSON)
//! /thumbnail/markup        - <img> tag (HTML)
//! /cache                   - DELETE clears the cache
//! /<cache_alias>/...       - Static cache entries (optional)
//! ```
//!
//! The static route makes URLs returned by `/thumbnail/url` resolve when the
//! configured base URL points at this server.
//!
//! # Example
//!
//! ```ignore
//! use thumb_cache::server::{create_router, RouterConfig};
//! use thumb_cache::{CacheConfig, ThumbnailCache};
//!
//! let cache = ThumbnailCache::from_config(CacheConfig::new("/srv/www"))?;
//! let config = RouterConfig::new()
//!     .with_cors_origins(vec!["https://example.com".to_string()]);
//!
//! let router = create_router(cache, config);
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//! axum::serve(listener, router).await?;
//! ```

use std::time::Duration;

use axum::{
    routing::{delete, get},
    Router,
};
use http::header::CONTENT_TYPE;
use http::Method;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use super::handlers::{
    clear_cache_handler, health_handler, markup_handler, path_handler, thumbnail_handler,
    url_handler, AppState,
};
use crate::config::DEFAULT_CACHE_MAX_AGE;
use crate::io::HttpClient;
use crate::render::ImagePipeline;
use crate::thumbnail::ThumbnailCache;

// =============================================================================
// Router Configuration
// =============================================================================

/// Configuration for the HTTP router.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Allowed CORS origins (None = allow any origin)
    pub cors_origins: Option<Vec<String>>,

    /// Cache-Control max-age in seconds
    pub cache_max_age: u32,

    /// Whether to enable request tracing
    pub enable_tracing: bool,

    /// Whether to serve the cache directory under its public prefix
    pub serve_static: bool,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl RouterConfig {
    /// Create a new router configuration.
    ///
    /// By default:
    /// - CORS allows any origin
    /// - Cache max-age is 1 hour (3600 seconds)
    /// - Tracing is enabled
    /// - The cache directory is served statically
    pub fn new() -> Self {
        Self {
            cors_origins: None,
            cache_max_age: DEFAULT_CACHE_MAX_AGE,
            enable_tracing: true,
            serve_static: true,
        }
    }

    /// Set specific allowed CORS origins.
    ///
    /// Pass an empty vec to disallow all cross-origin requests.
    pub fn with_cors_origins(mut self, origins: Vec<String>) -> Self {
        self.cors_origins = Some(origins);
        self
    }

    pub fn with_cors_any_origin(mut self) -> Self {
        self.cors_origins = None;
        self
    }

    pub fn with_cache_max_age(mut self, seconds: u32) -> Self {
        self.cache_max_age = seconds;
        self
    }

    pub fn with_tracing(mut self, enabled: bool) -> Self {
        self.enable_tracing = enabled;
        self
    }

    pub fn with_static(mut self, enabled: bool) -> Self {
        self.serve_static = enabled;
        self
    }
}

// =============================================================================
// Router Builder
// =============================================================================

/// Create the main application router.
///
/// # Arguments
///
/// * `cache` - The thumbnail cache backing every route
/// * `config` - Router configuration
pub fn create_router<H, P>(cache: ThumbnailCache<H, P>, config: RouterConfig) -> Router
where
    H: HttpClient + 'static,
    P: ImagePipeline + 'static,
{
    let static_root = cache.config().cache_root();
    let static_prefix = format!("/{}", cache.config().cache_alias.trim_matches('/'));

    let app_state = AppState::with_cache_max_age(cache, config.cache_max_age);
    let cors = build_cors_layer(&config);

    let mut router = Router::new()
        .route("/health", get(health_handler))
        .route("/thumbnail", get(thumbnail_handler::<H, P>))
        .route("/thumbnail/path", get(path_handler::<H, P>))
        .route("/thumbnail/url", get(url_handler::<H, P>))
        .route("/thumbnail/markup", get(markup_handler::<H, P>))
        .route("/cache", delete(clear_cache_handler::<H, P>))
        .with_state(app_state);

    if config.serve_static {
        router = router.nest_service(&static_prefix, ServeDir::new(static_root));
    }

    let router = router.layer(cors);

    if config.enable_tracing {
        router.layer(TraceLayer::new_for_http())
    } else {
        router
    }
}

/// Build the CORS layer based on configuration.
fn build_cors_layer(config: &RouterConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::HEAD, Method::DELETE, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE])
        .max_age(Duration::from_secs(86400));

    match &config.cors_origins {
        None => cors.allow_origin(Any),
        Some(origins) if origins.is_empty() => cors,
        Some(origins) => {
            let parsed_origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();
            cors.allow_origin(parsed_origins)
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
