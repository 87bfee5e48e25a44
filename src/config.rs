//! Configuration management for thumb-cache.
//!
//! This module provides:
//! - [`CacheConfig`], the explicit configuration handed to
//!   [`ThumbnailCache`](crate::thumbnail::ThumbnailCache) at construction
//! - Command-line arguments via clap, with environment variable fallbacks
//!
//! # Environment Variables
//!
//! - `THUMB_WEB_ROOT` - Directory that local aliases and the cache root resolve under (default: .)
//! - `THUMB_BASE_URL` - Public base URL matching the web root (default: empty)
//! - `THUMB_CACHE_ALIAS` - Cache directory relative to the web root (default: assets/thumbnails)
//! - `THUMB_CACHE_EXPIRE` - Seconds before a cache entry is re-rendered, 0 = never (default: 0)
//! - `THUMB_QUALITY` - Default render quality 1-100 (default: 75)
//! - `THUMB_DIR_MODE` - Octal mode for created cache directories (default: 755)
//! - `THUMB_HTTP_TIMEOUT` - Remote fetch timeout in seconds (default: 30)
//! - `THUMB_HOST` / `THUMB_PORT` - Server bind address (default: 0.0.0.0:3000)

use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use serde::{Deserialize, Serialize};

use crate::error::ThumbnailError;
use crate::render::{is_valid_quality, ResizeMode, DEFAULT_QUALITY};
use crate::thumbnail::FreshnessPolicy;

// =============================================================================
// Default Values
// =============================================================================

/// Default cache directory, relative to the web root.
pub const DEFAULT_CACHE_ALIAS: &str = "assets/thumbnails";

/// Default mode for created cache directories (owner rwx, group/other rx).
pub const DEFAULT_DIR_MODE: u32 = 0o755;

/// Default remote fetch timeout in seconds.
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

/// Default server host.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default server port.
pub const DEFAULT_PORT: u16 = 3000;

/// Default HTTP cache max-age in seconds (1 hour).
pub const DEFAULT_CACHE_MAX_AGE: u32 = 3600;

// =============================================================================
// Cache Configuration
// =============================================================================

/// Settings for a [`ThumbnailCache`](crate::thumbnail::ThumbnailCache).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Directory that `@webroot` aliases and the cache alias resolve under.
    pub web_root: PathBuf,

    /// Public URL corresponding to `web_root` (may be empty for root-relative URLs).
    pub base_url: String,

    /// Cache directory relative to both `web_root` and `base_url`.
    pub cache_alias: String,

    /// Seconds after which an entry is re-rendered. Zero disables expiry.
    pub cache_expire: u64,

    /// Render quality used when a request does not override it.
    pub quality: u8,

    /// Permission bits for created cache directories (Unix only).
    pub dir_mode: u32,

    /// Timeout for remote GET/HEAD requests, in seconds.
    pub http_timeout_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            web_root: PathBuf::from("."),
            base_url: String::new(),
            cache_alias: DEFAULT_CACHE_ALIAS.to_string(),
            cache_expire: 0,
            quality: DEFAULT_QUALITY,
            dir_mode: DEFAULT_DIR_MODE,
            http_timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
        }
    }
}

impl CacheConfig {
    /// Create a configuration rooted at `web_root` with default settings.
    pub fn new(web_root: impl Into<PathBuf>) -> Self {
        Self {
            web_root: web_root.into(),
            ..Self::default()
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_cache_alias(mut self, alias: impl Into<String>) -> Self {
        self.cache_alias = alias.into();
        self
    }

    pub fn with_cache_expire(mut self, seconds: u64) -> Self {
        self.cache_expire = seconds;
        self
    }

    pub fn with_quality(mut self, quality: u8) -> Self {
        self.quality = quality;
        self
    }

    pub fn with_dir_mode(mut self, mode: u32) -> Self {
        self.dir_mode = mode;
        self
    }

    pub fn with_http_timeout(mut self, seconds: u64) -> Self {
        self.http_timeout_secs = seconds;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ThumbnailError> {
        if !is_valid_quality(self.quality) {
            return Err(ThumbnailError::invalid_config(format!(
                "quality must be between 1 and 100, got {}",
                self.quality
            )));
        }

        let alias = Path::new(self.cache_alias.trim_matches('/'));
        if alias.as_os_str().is_empty() {
            return Err(ThumbnailError::invalid_config("cache_alias must not be empty"));
        }
        if self.cache_alias.starts_with('/')
            || alias
                .components()
                .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(ThumbnailError::invalid_config(format!(
                "cache_alias must be a relative path without '..': {}",
                self.cache_alias
            )));
        }
        // The alias is also a URL path and the static route prefix
        if self.cache_alias.contains(['{', '}', '*', '?', '#']) {
            return Err(ThumbnailError::invalid_config(format!(
                "cache_alias must not contain '{{', '}}', '*', '?' or '#': {}",
                self.cache_alias
            )));
        }

        if self.http_timeout_secs == 0 {
            return Err(ThumbnailError::invalid_config(
                "http_timeout_secs must be greater than 0",
            ));
        }

        if self.dir_mode > 0o7777 {
            return Err(ThumbnailError::invalid_config(format!(
                "dir_mode {:o} is not a valid permission mode",
                self.dir_mode
            )));
        }

        Ok(())
    }

    /// Absolute-or-relative filesystem root of the cache tree.
    pub fn cache_root(&self) -> PathBuf {
        self.web_root.join(self.cache_alias.trim_matches('/'))
    }

    /// Public URL prefix of the cache tree, without a trailing slash.
    pub fn cache_url(&self) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            self.cache_alias.trim_matches('/')
        )
    }

    /// Expiry duration, or `None` when expiry is disabled.
    pub fn expiry(&self) -> Option<Duration> {
        (self.cache_expire > 0).then(|| Duration::from_secs(self.cache_expire))
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

// =============================================================================
// CLI Arguments
// =============================================================================

/// thumb-cache - on-demand image thumbnails with a disk cache.
#[derive(Parser, Debug, Clone)]
#[command(name = "thumb-cache")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn into_command(self) -> Command {
        self.command
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run the HTTP front end
    Serve(ServeConfig),

    /// Render (or reuse) a thumbnail and print its file path
    Path(RequestArgs),

    /// Render (or reuse) a thumbnail and print its public URL
    Url(RequestArgs),

    /// Render (or reuse) a thumbnail and print an <img> tag
    Markup(MarkupArgs),

    /// Delete every cached thumbnail
    Clear(ClearArgs),
}

/// Cache settings shared by every subcommand.
#[derive(Args, Debug, Clone)]
pub struct CacheArgs {
    /// Directory that `@webroot/...` sources and the cache alias resolve under.
    #[arg(long, default_value = ".", env = "THUMB_WEB_ROOT")]
    pub web_root: PathBuf,

    /// Public URL corresponding to the web root.
    #[arg(long, default_value = "", env = "THUMB_BASE_URL")]
    pub base_url: String,

    /// Cache directory relative to the web root.
    #[arg(long, default_value = DEFAULT_CACHE_ALIAS, env = "THUMB_CACHE_ALIAS")]
    pub cache_alias: String,

    /// Seconds before a cached thumbnail is re-rendered (0 = never).
    #[arg(long, default_value_t = 0, env = "THUMB_CACHE_EXPIRE")]
    pub cache_expire: u64,

    /// Default render quality (1-100).
    #[arg(long, default_value_t = DEFAULT_QUALITY, env = "THUMB_QUALITY")]
    pub quality: u8,

    /// Octal permission mode for created cache directories.
    #[arg(long, default_value = "755", value_parser = parse_octal_mode, env = "THUMB_DIR_MODE")]
    pub dir_mode: u32,

    /// Timeout for remote fetches, in seconds.
    #[arg(long, default_value_t = DEFAULT_HTTP_TIMEOUT_SECS, env = "THUMB_HTTP_TIMEOUT")]
    pub http_timeout: u64,
}

impl CacheArgs {
    pub fn to_cache_config(&self) -> CacheConfig {
        CacheConfig {
            web_root: self.web_root.clone(),
            base_url: self.base_url.clone(),
            cache_alias: self.cache_alias.clone(),
            cache_expire: self.cache_expire,
            quality: self.quality,
            dir_mode: self.dir_mode,
            http_timeout_secs: self.http_timeout,
        }
    }
}

fn parse_octal_mode(value: &str) -> Result<u32, String> {
    let digits = value.trim_start_matches("0o");
    u32::from_str_radix(digits, 8).map_err(|e| format!("invalid octal mode '{}': {}", value, e))
}

/// Parameters of a single thumbnail request on the command line.
#[derive(Args, Debug, Clone)]
pub struct RequestArgs {
    /// Source image: a local path, an `@webroot/...` alias, or an http(s) URL.
    pub source: String,

    /// Target width in pixels.
    #[arg(long, short = 'W')]
    pub width: u32,

    /// Target height in pixels.
    #[arg(long, short = 'H')]
    pub height: u32,

    /// Resize mode: outbound (crop to fill) or inset (fit within).
    #[arg(long, default_value = "outbound")]
    pub mode: ResizeMode,

    /// Render quality override (1-100).
    #[arg(long)]
    pub quality: Option<u8>,

    /// Remote freshness check: none, crc, or header (or 1, 2, 3).
    #[arg(long, default_value = "none")]
    pub check: FreshnessPolicy,

    /// Print the result as JSON.
    #[arg(long, default_value_t = false)]
    pub json: bool,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,

    #[command(flatten)]
    pub cache: CacheArgs,
}

#[derive(Args, Debug, Clone)]
pub struct MarkupArgs {
    #[command(flatten)]
    pub request: RequestArgs,

    /// Extra attribute for the <img> tag, as name=value (repeatable).
    #[arg(long = "attr", value_parser = parse_attribute)]
    pub attributes: Vec<(String, String)>,
}

fn parse_attribute(value: &str) -> Result<(String, String), String> {
    match value.split_once('=') {
        Some((name, val)) if !name.is_empty() => Ok((name.to_string(), val.to_string())),
        _ => Err(format!("attribute must be name=value, got '{}'", value)),
    }
}

#[derive(Args, Debug, Clone)]
pub struct ClearArgs {
    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,

    #[command(flatten)]
    pub cache: CacheArgs,
}

/// Configuration for the `serve` subcommand.
#[derive(Args, Debug, Clone)]
pub struct ServeConfig {
    /// Host address to bind the server to.
    #[arg(long, default_value = DEFAULT_HOST, env = "THUMB_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(short, long, default_value_t = DEFAULT_PORT, env = "THUMB_PORT")]
    pub port: u16,

    /// HTTP Cache-Control max-age in seconds for served thumbnails.
    #[arg(long, default_value_t = DEFAULT_CACHE_MAX_AGE, env = "THUMB_CACHE_MAX_AGE")]
    pub cache_max_age: u32,

    /// Allowed CORS origins (comma-separated). Any origin if unset.
    #[arg(long, env = "THUMB_CORS_ORIGINS", value_delimiter = ',')]
    pub cors_origins: Option<Vec<String>>,

    /// Do not serve the cache directory under its public URL prefix.
    #[arg(long, default_value_t = false)]
    pub no_static: bool,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,

    /// Disable request tracing.
    #[arg(long, default_value_t = false)]
    pub no_tracing: bool,

    #[command(flatten)]
    pub cache: CacheArgs,
}

impl ServeConfig {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        self.cache
            .to_cache_config()
            .validate()
            .map_err(|e| e.to_string())
    }

    /// Get the server bind address as "host:port".
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// =============================================================================
// Tests
// =============================================================================
