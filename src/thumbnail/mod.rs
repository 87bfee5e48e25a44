//! Thumbnail cache.
//!
//! This module turns a source image plus a target box into a file inside a
//! content-addressed cache tree:
//!
//! ```text
//! <web_root>/<cache_alias>/<fp[0..2]>/<fp><ext>
//! ```
//!
//! The fingerprint `fp` covers the source identity, the transform (width,
//! height, mode) and a freshness signal: the modification time for local
//! files, and optionally a CRC32 of the body or the `Last-Modified` header
//! for remote ones. A changed source therefore produces a new entry instead
//! of overwriting the old one.
//!
//! - [`key`] - source classification and fingerprint derivation
//! - [`store`] - cache tree layout, expiry, atomic writes, clearing
//! - [`markup`] - `<img>` tag generation
//! - [`service`] - [`ThumbnailCache`], the public entry points

pub mod key;
pub mod markup;
pub mod service;
pub mod store;

pub use key::{derive_fingerprint, DerivedKey, Fingerprint, FreshnessPolicy, SourceRef, TransformSpec};
pub use markup::{html_escape, img_tag};
pub use service::{error_to_string, ThumbnailCache, ThumbnailRequest, ThumbnailResponse};
pub use store::{is_expired, CacheStore, Lookup};
