//! Path alias expansion and lexical normalization for local sources.
//!
//! Normalization is purely lexical: `.` components are dropped and `..`
//! pops the previous component. Symlinks are not resolved, so two different
//! links to the same file produce two different cache identities.

use std::path::{Component, Path, PathBuf};

/// Alias prefix that expands to the configured web root.
pub const WEBROOT_ALIAS: &str = "@webroot";

/// The part of `raw` after a leading `@webroot` alias.
///
/// Only the exact alias, alone or followed by a separator, counts:
/// `@webrootx/a.png` is not aliased.
pub fn strip_alias(raw: &str) -> Option<&str> {
    match raw.strip_prefix(WEBROOT_ALIAS) {
        Some(rest) if rest.is_empty() || rest.starts_with(['/', '\\']) => {
            Some(rest.trim_start_matches(['/', '\\']))
        }
        _ => None,
    }
}

/// Expand a leading `@webroot` alias against `web_root`.
///
/// Non-alias paths are returned unchanged.
pub fn resolve_alias(raw: &str, web_root: &Path) -> PathBuf {
    match strip_alias(raw) {
        Some("") => web_root.to_path_buf(),
        Some(rest) => web_root.join(rest),
        None => PathBuf::from(raw),
    }
}

/// Make `path` absolute against the current directory and normalize it.
pub fn normalize_path(path: &Path) -> std::io::Result<PathBuf> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };
    Ok(normalize_lexically(&absolute))
}

/// Remove `.` and resolve `..` components without touching the filesystem.
///
/// `..` at the root stays at the root.
pub fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !matches!(
                    out.components().next_back(),
                    None | Some(Component::RootDir) | Some(Component::Prefix(_))
                ) {
                    out.pop();
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Join a request-supplied relative path onto `root`, refusing escapes.
///
/// Returns `None` if the normalized result would leave `root`.
pub fn resolve_within(root: &Path, relative: &str) -> Option<PathBuf> {
    let relative = relative.trim_start_matches(['/', '\\']);
    let root = normalize_lexically(root);
    let joined = normalize_lexically(&root.join(relative));
    joined.starts_with(&root).then_some(joined)
}
