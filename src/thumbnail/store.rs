//! On-disk cache tree.
//!
//! # Layout
//!
//! ```text
//! <root>/
//!   ab/
//!     ab3f...e1.png        <fingerprint><original extension>
//!     .ab3f...e1-4242-7.tmp.png   in-flight write, renamed into place
//!   c0/
//!     ...
//! ```
//!
//! Entries are never modified in place. A write goes to a uniquely named
//! hidden file in the same shard directory and is renamed over the final
//! path, so readers see either the old file, the new file, or nothing.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};

use tracing::{debug, warn};

use super::key::Fingerprint;
use crate::config::CacheConfig;
use crate::error::{ClearCacheError, ThumbnailError};

/// Per-process counter for temporary file names.
static TEMP_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Outcome of a cache lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    Hit,
    Miss,
}

/// The cache directory tree.
#[derive(Debug, Clone)]
pub struct CacheStore {
    root: PathBuf,
    expiry: Option<Duration>,
    dir_mode: u32,
}

impl CacheStore {
    /// Create a store. `expiry` of `None` disables time-based invalidation.
    pub fn new(root: impl Into<PathBuf>, expiry: Option<Duration>, dir_mode: u32) -> Self {
        Self {
            root: root.into(),
            expiry,
            dir_mode,
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.cache_root(), config.expiry(), config.dir_mode)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn expiry(&self) -> Option<Duration> {
        self.expiry
    }

    /// `<fingerprint><extension>`
    pub fn entry_file_name(fingerprint: &Fingerprint, extension: &str) -> String {
        format!("{}{}", fingerprint, extension)
    }

    /// `<root>/<shard>/<fingerprint><extension>`
    pub fn entry_path(&self, fingerprint: &Fingerprint, extension: &str) -> PathBuf {
        self.root
            .join(fingerprint.shard())
            .join(Self::entry_file_name(fingerprint, extension))
    }

    /// Check whether a valid entry exists at `path`.
    ///
    /// An entry older than the expiry duration is deleted and reported as a
    /// miss. A concurrent deletion of the same entry is not an error.
    pub async fn lookup(&self, path: &Path) -> Result<Lookup, ThumbnailError> {
        let metadata = match tokio::fs::metadata(path).await {
            Ok(metadata) if metadata.is_file() => metadata,
            Ok(_) => return Ok(Lookup::Miss),
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Lookup::Miss),
            Err(e) => return Err(ThumbnailError::storage(path, e)),
        };

        let Some(expiry) = self.expiry else {
            return Ok(Lookup::Hit);
        };

        let modified = metadata
            .modified()
            .map_err(|e| ThumbnailError::storage(path, e))?;

        if !is_expired(modified, SystemTime::now(), expiry) {
            return Ok(Lookup::Hit);
        }

        debug!(path = %path.display(), expiry_secs = expiry.as_secs(), "Cache entry expired");
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(Lookup::Miss),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Lookup::Miss),
            Err(e) => Err(ThumbnailError::storage(path, e)),
        }
    }

    /// Create `dir` and any missing parents with the configured mode.
    pub async fn ensure_dir(&self, dir: &Path) -> Result<(), ThumbnailError> {
        create_dir_all(dir, self.dir_mode)
            .await
            .map_err(|e| ThumbnailError::storage(dir, e))
    }

    /// Write an entry by handing `write` a temporary path next to `target`
    /// and renaming the result into place.
    ///
    /// The temporary file keeps `target`'s extension so format detection
    /// from the path still works. It is removed if `write` or the rename fails.
    pub fn write_atomic<F>(&self, target: &Path, write: F) -> Result<(), ThumbnailError>
    where
        F: FnOnce(&Path) -> Result<(), ThumbnailError>,
    {
        let temp = temp_path_for(target);

        if let Err(e) = write(&temp) {
            remove_quietly(&temp);
            return Err(e);
        }

        if let Err(e) = std::fs::rename(&temp, target) {
            remove_quietly(&temp);
            return Err(ThumbnailError::storage(target, e));
        }

        Ok(())
    }

    /// Remove the whole cache tree and recreate an empty root.
    pub async fn clear(&self) -> Result<(), ClearCacheError> {
        match tokio::fs::remove_dir_all(&self.root).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                return Err(ClearCacheError::Remove {
                    path: self.root.clone(),
                    message: e.to_string(),
                })
            }
        }

        create_dir_all(&self.root, self.dir_mode)
            .await
            .map_err(|e| ClearCacheError::Recreate {
                path: self.root.clone(),
                message: e.to_string(),
            })
    }
}

/// Whole-second elapsed time compared against `expiry`.
///
/// Modification times in the future are treated as fresh.
pub fn is_expired(modified: SystemTime, now: SystemTime, expiry: Duration) -> bool {
    match now.duration_since(modified) {
        Ok(elapsed) => elapsed.as_secs() > expiry.as_secs(),
        Err(_) => false,
    }
}

async fn create_dir_all(dir: &Path, mode: u32) -> std::io::Result<()> {
    let mut builder = tokio::fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    builder.mode(mode);
    #[cfg(not(unix))]
    let _ = mode;
    builder.create(dir).await
}

fn temp_path_for(target: &Path) -> PathBuf {
    let seq = TEMP_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    let stem = target
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = target
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    let name = format!(".{}-{}-{}.tmp{}", stem, std::process::id(), seq, ext);

    match target.parent() {
        Some(parent) => parent.join(name),
        None => PathBuf::from(name),
    }
}

fn remove_quietly(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        if e.kind() != ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "Failed to remove temporary cache file");
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
