//! Cache key derivation.
//!
//! A thumbnail's cache file is named by a [`Fingerprint`] computed over the
//! source identity, the target box, the resize mode, and a freshness signal:
//!
//! | Source                      | Identity        | Freshness signal               |
//! |-----------------------------|-----------------|--------------------------------|
//! | Local path                  | normalized path | mtime (seconds)                |
//! | URL, `FreshnessPolicy::None`| URL             | none, no network call          |
//! | URL, `RemoteContentHash`    | URL             | CRC-32 of the fetched body     |
//! | URL, `RemoteHeaderDate`     | URL             | `Last-Modified` of a HEAD      |
//!
//! A changed source therefore produces a new fingerprint and a cache miss,
//! with no stored metadata to compare at read time. Quality is deliberately
//! not part of the key.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::UNIX_EPOCH;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::ThumbnailError;
use crate::io::paths::normalize_path;
use crate::io::{fetch_content, fetch_last_modified, HttpClient};
use crate::render::{ResizeMode, DEFAULT_QUALITY};

/// Number of digest bytes kept in a fingerprint (128 bits).
const FINGERPRINT_BYTES: usize = 16;

/// Separator between hashed fields.
const FIELD_SEPARATOR: &[u8] = b"\0";

// =============================================================================
// Source Reference
// =============================================================================

/// Where a thumbnail's source image lives.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SourceRef {
    LocalPath(PathBuf),
    RemoteUrl(String),
}

impl SourceRef {
    /// Classify a raw source string.
    ///
    /// Strings starting with `http://` or `https://` (any case) are remote;
    /// everything else is a local path.
    pub fn parse(raw: &str) -> Self {
        if is_http_url(raw) {
            SourceRef::RemoteUrl(raw.to_string())
        } else {
            SourceRef::LocalPath(PathBuf::from(raw))
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, SourceRef::RemoteUrl(_))
    }

    /// String used as the source identity in the fingerprint.
    pub fn identity(&self) -> String {
        match self {
            SourceRef::LocalPath(path) => path.to_string_lossy().into_owned(),
            SourceRef::RemoteUrl(url) => url.clone(),
        }
    }

    /// Original extension including the dot, or an empty string.
    ///
    /// For URLs the extension comes from the last path segment, ignoring the
    /// query string and fragment.
    pub fn extension(&self) -> String {
        let ext = match self {
            SourceRef::LocalPath(path) => path
                .extension()
                .map(|e| e.to_string_lossy().into_owned()),
            SourceRef::RemoteUrl(url) => url_extension(url),
        };

        match ext {
            Some(ext) if !ext.is_empty() => format!(".{}", ext),
            _ => String::new(),
        }
    }
}

impl fmt::Display for SourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceRef::LocalPath(path) => write!(f, "{}", path.display()),
            SourceRef::RemoteUrl(url) => f.write_str(url),
        }
    }
}

fn is_http_url(raw: &str) -> bool {
    let lower = raw.get(..8).unwrap_or(raw).to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

fn url_extension(raw: &str) -> Option<String> {
    let last_segment = match url::Url::parse(raw) {
        Ok(parsed) => parsed
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .map(|s| s.to_string()),
        Err(_) => {
            let path = raw.split(['?', '#']).next().unwrap_or(raw);
            path.rsplit('/').next().map(|s| s.to_string())
        }
    }?;

    Path::new(&last_segment)
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
}

// =============================================================================
// Transform and Freshness
// =============================================================================

/// Target dimensions, resize mode, and render quality.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransformSpec {
    pub width: u32,
    pub height: u32,
    pub mode: ResizeMode,
    /// Render option only; never part of the fingerprint.
    pub quality: u8,
}

impl TransformSpec {
    pub fn new(width: u32, height: u32, mode: ResizeMode) -> Self {
        Self {
            width,
            height,
            mode,
            quality: DEFAULT_QUALITY,
        }
    }

    pub fn with_quality(mut self, quality: u8) -> Self {
        self.quality = quality;
        self
    }
}

/// How a remote source's current state is folded into the fingerprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FreshnessPolicy {
    /// Trust the URL alone. No network call during key derivation.
    #[default]
    None,

    /// Fetch the body and hash it with CRC-32.
    RemoteContentHash,

    /// Issue a HEAD and use the `Last-Modified` header.
    RemoteHeaderDate,
}

impl FreshnessPolicy {
    /// Parse the numeric policy codes (1 = none, 2 = content hash, 3 = header date).
    pub fn from_code(code: u8) -> Result<Self, ThumbnailError> {
        match code {
            1 => Ok(FreshnessPolicy::None),
            2 => Ok(FreshnessPolicy::RemoteContentHash),
            3 => Ok(FreshnessPolicy::RemoteHeaderDate),
            other => Err(ThumbnailError::invalid_config(format!(
                "unknown freshness policy code {}",
                other
            ))),
        }
    }

    pub fn code(&self) -> u8 {
        match self {
            FreshnessPolicy::None => 1,
            FreshnessPolicy::RemoteContentHash => 2,
            FreshnessPolicy::RemoteHeaderDate => 3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FreshnessPolicy::None => "none",
            FreshnessPolicy::RemoteContentHash => "crc",
            FreshnessPolicy::RemoteHeaderDate => "header",
        }
    }
}

impl fmt::Display for FreshnessPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FreshnessPolicy {
    type Err = ThumbnailError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(code) = s.parse::<u8>() {
            return Self::from_code(code);
        }
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(FreshnessPolicy::None),
            "crc" | "content-hash" | "content_hash" | "remote_content_hash" => {
                Ok(FreshnessPolicy::RemoteContentHash)
            }
            "header" | "header-date" | "header_date" | "remote_header_date" => {
                Ok(FreshnessPolicy::RemoteHeaderDate)
            }
            other => Err(ThumbnailError::invalid_config(format!(
                "unknown freshness policy '{}'",
                other
            ))),
        }
    }
}

// =============================================================================
// Fingerprint
// =============================================================================

/// 128-bit cache key rendered as 32 lowercase hex characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Hash the identity, box, mode, and optional freshness signal.
    pub fn compute(identity: &str, transform: &TransformSpec, signal: Option<&str>) -> Self {
        let width = transform.width.to_string();
        let height = transform.height.to_string();

        let mut hasher = Sha256::new();
        for field in [
            identity.as_bytes(),
            width.as_bytes(),
            height.as_bytes(),
            transform.mode.as_str().as_bytes(),
        ] {
            hasher.update(field);
            hasher.update(FIELD_SEPARATOR);
        }
        if let Some(signal) = signal {
            hasher.update(signal.as_bytes());
        }

        let digest = hasher.finalize();
        Fingerprint(hex::encode(&digest[..FINGERPRINT_BYTES]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First two hex characters, used as the shard directory.
    pub fn shard(&self) -> &str {
        &self.0[..2]
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// Derivation
// =============================================================================

/// Result of key derivation.
#[derive(Debug, Clone)]
pub struct DerivedKey {
    pub fingerprint: Fingerprint,

    /// The source with local paths made absolute and normalized.
    pub source: SourceRef,

    /// Body fetched during a content-hash check, reused by the renderer.
    pub prefetched: Option<Bytes>,
}

/// Compute the fingerprint for `source` under `policy`.
///
/// Local sources must be existing regular files. Remote sources may trigger
/// a GET or HEAD depending on `policy`; any failure there is
/// [`ThumbnailError::SourceNotFound`].
pub async fn derive_fingerprint<C: HttpClient + ?Sized>(
    source: &SourceRef,
    transform: &TransformSpec,
    policy: FreshnessPolicy,
    client: &C,
) -> Result<DerivedKey, ThumbnailError> {
    let derived = match source {
        SourceRef::LocalPath(path) => {
            let path = normalize_path(path).map_err(|_| ThumbnailError::file_not_found(path))?;
            let mtime = local_mtime(&path).await?;
            let identity = path.to_string_lossy().into_owned();
            DerivedKey {
                fingerprint: Fingerprint::compute(&identity, transform, Some(&mtime.to_string())),
                source: SourceRef::LocalPath(path),
                prefetched: None,
            }
        }
        SourceRef::RemoteUrl(url) => match policy {
            FreshnessPolicy::None => DerivedKey {
                fingerprint: Fingerprint::compute(url, transform, None),
                source: source.clone(),
                prefetched: None,
            },
            FreshnessPolicy::RemoteContentHash => {
                let content = fetch_content(client, url).await?;
                let crc = crc32fast::hash(&content);
                DerivedKey {
                    fingerprint: Fingerprint::compute(url, transform, Some(&crc.to_string())),
                    source: source.clone(),
                    prefetched: Some(content),
                }
            }
            FreshnessPolicy::RemoteHeaderDate => {
                let last_modified = fetch_last_modified(client, url).await?;
                DerivedKey {
                    fingerprint: Fingerprint::compute(url, transform, Some(&last_modified)),
                    source: source.clone(),
                    prefetched: None,
                }
            }
        },
    };

    debug!(
        source = %derived.source,
        fingerprint = %derived.fingerprint,
        policy = %policy,
        "Derived thumbnail fingerprint"
    );

    Ok(derived)
}

/// Modification time of a regular file, in whole seconds since the epoch.
async fn local_mtime(path: &Path) -> Result<u64, ThumbnailError> {
    let metadata = match tokio::fs::metadata(path).await {
        Ok(metadata) if metadata.is_file() => metadata,
        _ => return Err(ThumbnailError::file_not_found(path)),
    };

    let modified = metadata
        .modified()
        .map_err(|e| ThumbnailError::storage(path, e))?;

    Ok(modified
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0))
}

// =============================================================================
// Tests
// =============================================================================
