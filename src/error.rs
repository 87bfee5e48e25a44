use std::path::PathBuf;

use thiserror::Error;

/// Transport-level errors from the HTTP client seam.
///
/// These never escape the thumbnail core: key derivation and rendering map
/// every variant to [`ThumbnailError::SourceNotFound`].
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    /// The request did not complete within the configured timeout
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// Network or connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// The URL could not be parsed or is not fetchable
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

/// Errors produced by the thumbnail cache.
#[derive(Debug, Clone, Error)]
pub enum ThumbnailError {
    /// Local file missing, or remote fetch/HEAD did not succeed
    #[error("{message}")]
    SourceNotFound { message: String },

    /// Unrecognized freshness policy, resize mode, or invalid settings
    #[error("Invalid configuration: {message}")]
    InvalidConfiguration { message: String },

    /// Decode, resize, or encode step failed
    #[error("Render failure: {message}")]
    RenderFailure { message: String },

    /// Directory creation, file write, or cache entry removal failed
    #[error("Storage failure at {}: {message}", path.display())]
    StorageFailure { path: PathBuf, message: String },
}

impl ThumbnailError {
    /// Missing local file.
    pub fn file_not_found(path: impl AsRef<std::path::Path>) -> Self {
        Self::SourceNotFound {
            message: format!("File {} doesn't exist", path.as_ref().display()),
        }
    }

    /// Remote resource that could not be fetched.
    pub fn url_not_found(url: &str) -> Self {
        Self::SourceNotFound {
            message: format!("URL {} doesn't exist", url),
        }
    }

    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            message: message.into(),
        }
    }

    pub fn render(message: impl ToString) -> Self {
        Self::RenderFailure {
            message: message.to_string(),
        }
    }

    pub fn storage(path: impl Into<PathBuf>, err: impl ToString) -> Self {
        Self::StorageFailure {
            path: path.into(),
            message: err.to_string(),
        }
    }

    /// Numeric code for this error kind.
    ///
    /// Codes follow HTTP status semantics so the server layer can reuse them
    /// directly; the URL fallback string is `"Error <code>"`.
    pub fn code(&self) -> u16 {
        match self {
            ThumbnailError::SourceNotFound { .. } => 404,
            ThumbnailError::InvalidConfiguration { .. } => 400,
            ThumbnailError::RenderFailure { .. } => 422,
            ThumbnailError::StorageFailure { .. } => 500,
        }
    }

    /// Returns `true` for [`ThumbnailError::SourceNotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(self, ThumbnailError::SourceNotFound { .. })
    }
}

/// Errors from a full cache clear.
///
/// Removal and recreation failures are reported separately so callers can
/// tell a half-cleared tree from a missing root.
#[derive(Debug, Clone, Error)]
pub enum ClearCacheError {
    /// The existing cache tree could not be removed
    #[error("Failed to remove cache directory {}: {message}", path.display())]
    Remove { path: PathBuf, message: String },

    /// The empty cache root could not be recreated
    #[error("Failed to recreate cache directory {}: {message}", path.display())]
    Recreate { path: PathBuf, message: String },
}
