//! Cache behaviour integration tests for local sources.
//!
//! Tests verify:
//! - Repeated requests reuse the cached entry without re-rendering
//! - Entry paths follow the sharded content-addressed layout
//! - Expiry and source modification invalidate entries
//! - Clearing the cache forces re-rendering
//! - Concurrent identical requests leave a single valid entry

use std::time::{Duration, SystemTime};

use filetime::{set_file_mtime, FileTime};

use thumb_cache::{ResizeMode, ThumbnailError, ThumbnailRequest};

use super::test_utils::{image_dimensions, list_files, TestCache};

fn request_for(path: &std::path::Path, width: u32, height: u32) -> ThumbnailRequest {
    ThumbnailRequest::new(path.to_string_lossy(), width, height)
}

// =============================================================================
// Hits and Layout
// =============================================================================

#[tokio::test]
async fn test_cache_hit_avoids_rerender() {
    let t = TestCache::new();
    let source = t.write_png("img/cat.png", 120, 80);
    let request = request_for(&source, 40, 40);

    let first = t.cache.thumbnail(&request).await.unwrap();
    assert!(!first.cache_hit);
    assert_eq!(t.pipeline.render_count(), 1);

    let second = t.cache.thumbnail(&request).await.unwrap();
    assert!(second.cache_hit);
    assert_eq!(second.path, first.path);
    assert_eq!(t.pipeline.render_count(), 1);
}

#[tokio::test]
async fn test_entry_layout() {
    let t = TestCache::new();
    let source = t.write_png("img/cat.png", 64, 64);

    let path = t
        .cache
        .thumbnail_file_path(&request_for(&source, 100, 100))
        .await
        .unwrap();

    let file_name = path.file_name().unwrap().to_string_lossy().into_owned();
    let fingerprint = file_name.strip_suffix(".png").unwrap();
    assert_eq!(fingerprint.len(), 32);
    assert!(fingerprint.chars().all(|c| c.is_ascii_hexdigit()));

    let shard = path.parent().unwrap();
    assert_eq!(shard.file_name().unwrap().to_string_lossy(), &fingerprint[..2]);
    assert_eq!(shard.parent().unwrap(), t.cache_root());
}

#[tokio::test]
async fn test_alias_and_absolute_path_share_entry() {
    let t = TestCache::new();
    let source = t.write_png("img/cat.png", 64, 64);

    let via_alias = t
        .cache
        .thumbnail_file_path(&ThumbnailRequest::new("@webroot/img/cat.png", 30, 30))
        .await
        .unwrap();
    let via_path = t
        .cache
        .thumbnail_file_path(&request_for(&source, 30, 30))
        .await
        .unwrap();

    assert_eq!(via_alias, via_path);
    assert_eq!(t.pipeline.render_count(), 1);
}

#[tokio::test]
async fn test_transform_changes_entry() {
    let t = TestCache::new();
    let source = t.write_png("img/cat.png", 64, 64);

    let base = t
        .cache
        .thumbnail_file_path(&request_for(&source, 30, 30))
        .await
        .unwrap();
    let wider = t
        .cache
        .thumbnail_file_path(&request_for(&source, 31, 30))
        .await
        .unwrap();
    let inset = t
        .cache
        .thumbnail_file_path(&request_for(&source, 30, 30).with_mode(ResizeMode::Inset))
        .await
        .unwrap();

    assert_ne!(base, wider);
    assert_ne!(base, inset);
    assert_ne!(wider, inset);
    assert_eq!(list_files(&t.cache_root()).len(), 3);
}

#[tokio::test]
async fn test_quality_only_difference_shares_entry() {
    let t = TestCache::new();
    let source = t.write_png("img/cat.png", 64, 64);

    let low = t
        .cache
        .thumbnail(&request_for(&source, 30, 30).with_quality(20))
        .await
        .unwrap();
    let high = t
        .cache
        .thumbnail(&request_for(&source, 30, 30).with_quality(95))
        .await
        .unwrap();

    assert_eq!(low.path, high.path);
    assert!(high.cache_hit);
    assert_eq!(t.pipeline.render_count(), 1);
}

#[tokio::test]
async fn test_resize_modes_produce_expected_dimensions() {
    let t = TestCache::new();
    let source = t.write_png("img/wide.png", 300, 100);

    let outbound = t
        .cache
        .thumbnail_file_path(&request_for(&source, 50, 50))
        .await
        .unwrap();
    assert_eq!(image_dimensions(&outbound), (50, 50));

    let inset = t
        .cache
        .thumbnail_file_path(&request_for(&source, 60, 60).with_mode(ResizeMode::Inset))
        .await
        .unwrap();
    assert_eq!(image_dimensions(&inset), (60, 20));

    let no_upscale = t
        .cache
        .thumbnail_file_path(&request_for(&source, 600, 600).with_mode(ResizeMode::Inset))
        .await
        .unwrap();
    assert_eq!(image_dimensions(&no_upscale), (300, 100));
}

// =============================================================================
// Invalidation
// =============================================================================

#[tokio::test]
async fn test_expired_entry_is_rerendered() {
    let t = TestCache::with_config(|config| config.with_cache_expire(1));
    let source = t.write_png("img/cat.png", 64, 64);
    let request = request_for(&source, 20, 20);

    let first = t.cache.thumbnail(&request).await.unwrap();
    let aged = SystemTime::now() - Duration::from_secs(10);
    set_file_mtime(&first.path, FileTime::from_system_time(aged)).unwrap();

    let second = t.cache.thumbnail(&request).await.unwrap();
    assert!(!second.cache_hit);
    assert_eq!(second.path, first.path);
    assert_eq!(t.pipeline.render_count(), 2);

    let modified = std::fs::metadata(&second.path).unwrap().modified().unwrap();
    assert!(modified > aged);
}

#[tokio::test]
async fn test_old_entry_kept_without_expiry() {
    let t = TestCache::new();
    let source = t.write_png("img/cat.png", 64, 64);
    let request = request_for(&source, 20, 20);

    let first = t.cache.thumbnail(&request).await.unwrap();
    let ancient = SystemTime::now() - Duration::from_secs(365 * 24 * 3600);
    set_file_mtime(&first.path, FileTime::from_system_time(ancient)).unwrap();

    let second = t.cache.thumbnail(&request).await.unwrap();
    assert!(second.cache_hit);
    assert_eq!(t.pipeline.render_count(), 1);
}

#[tokio::test]
async fn test_modified_source_creates_new_entry() {
    let t = TestCache::new();
    let source = t.write_png("img/cat.png", 64, 64);
    let request = request_for(&source, 20, 20);

    set_file_mtime(&source, FileTime::from_unix_time(1_600_000_000, 0)).unwrap();
    let before = t.cache.thumbnail_file_path(&request).await.unwrap();

    set_file_mtime(&source, FileTime::from_unix_time(1_700_000_000, 0)).unwrap();
    let after = t.cache.thumbnail_file_path(&request).await.unwrap();

    assert_ne!(before, after);
    assert!(before.is_file(), "old entry is left in place");
    assert!(after.is_file());
    assert_eq!(t.pipeline.render_count(), 2);
}

// =============================================================================
// Clear
// =============================================================================

#[tokio::test]
async fn test_clear_cache_forces_rerender() {
    let t = TestCache::new();
    let source = t.write_png("img/cat.png", 64, 64);
    let request = request_for(&source, 20, 20);

    let path = t.cache.thumbnail_file_path(&request).await.unwrap();
    assert!(path.is_file());

    t.cache.clear_cache().await.unwrap();
    assert!(t.cache_root().is_dir());
    assert!(list_files(&t.cache_root()).is_empty());
    assert!(source.is_file(), "sources outside the cache root survive");

    let again = t.cache.thumbnail(&request).await.unwrap();
    assert!(!again.cache_hit);
    assert_eq!(again.path, path);
    assert_eq!(t.pipeline.render_count(), 2);
}

#[tokio::test]
async fn test_clear_cache_without_root() {
    let t = TestCache::new();
    assert!(!t.cache_root().exists());

    assert!(t.cache.clear_cache_succeeded().await);
    assert!(t.cache_root().is_dir());
}

#[cfg(unix)]
#[tokio::test]
async fn test_cache_directories_use_configured_mode() {
    use std::os::unix::fs::PermissionsExt;

    let t = TestCache::with_config(|config| config.with_dir_mode(0o750));
    let source = t.write_png("img/cat.png", 64, 64);

    let path = t
        .cache
        .thumbnail_file_path(&request_for(&source, 20, 20))
        .await
        .unwrap();
    let shard = path.parent().unwrap();
    let mode = std::fs::metadata(shard).unwrap().permissions().mode() & 0o777;
    // umask can only remove bits
    assert_eq!(mode & !0o750, 0);
}

// =============================================================================
// Concurrency
// =============================================================================

#[tokio::test]
async fn test_concurrent_identical_requests() {
    let t = TestCache::new();
    let source = t.write_png("img/cat.png", 200, 150);
    let request = request_for(&source, 64, 64);

    let (a, b) = tokio::join!(
        t.cache.thumbnail_file_path(&request),
        t.cache.thumbnail_file_path(&request)
    );
    let a = a.unwrap();
    let b = b.unwrap();

    assert_eq!(a, b);
    assert_eq!(image_dimensions(&a), (64, 64));

    let files = list_files(&t.cache_root());
    assert_eq!(files, vec![a], "no temporary files are left behind");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requests_across_threads() {
    let t = TestCache::new();
    let source = t.write_png("img/cat.png", 200, 150);
    let cache = std::sync::Arc::new(t.cache);

    let mut handles = Vec::new();
    for _ in 0..8 {
        let cache = std::sync::Arc::clone(&cache);
        let request = request_for(&source, 48, 48);
        handles.push(tokio::spawn(async move {
            cache.thumbnail_file_path(&request).await
        }));
    }

    let mut paths = Vec::new();
    for handle in handles {
        paths.push(handle.await.unwrap().unwrap());
    }
    paths.dedup();
    assert_eq!(paths.len(), 1);
    assert_eq!(image_dimensions(&paths[0]), (48, 48));
    assert_eq!(list_files(&cache.config().cache_root()).len(), 1);
}

// =============================================================================
// Failures
// =============================================================================

#[tokio::test]
async fn test_missing_source() {
    let t = TestCache::new();
    let missing = t.web_root().join("img/missing.png");
    let request = request_for(&missing, 20, 20);

    let err = t.cache.thumbnail_file_path(&request).await.unwrap_err();
    assert!(matches!(err, ThumbnailError::SourceNotFound { .. }));
    assert!(err.to_string().contains("missing.png"));

    let url = t.cache.thumbnail_file_url(&request).await;
    assert_eq!(url, err.to_string());
    assert!(!t.cache_root().exists(), "nothing is written for a missing source");
}

#[tokio::test]
async fn test_directory_source_is_not_found() {
    let t = TestCache::new();
    std::fs::create_dir_all(t.web_root().join("img")).unwrap();

    let err = t
        .cache
        .thumbnail_file_path(&ThumbnailRequest::new("@webroot/img", 20, 20))
        .await
        .unwrap_err();
    assert!(matches!(err, ThumbnailError::SourceNotFound { .. }));
}

#[tokio::test]
async fn test_source_without_extension_fails_cleanly() {
    let t = TestCache::new();
    let source = t.write_png("img/photo", 64, 64);

    let err = t
        .cache
        .thumbnail_file_path(&request_for(&source, 20, 20))
        .await
        .unwrap_err();
    assert!(matches!(err, ThumbnailError::RenderFailure { .. }));
    assert!(list_files(&t.cache_root()).is_empty());
    assert_eq!(t.cache.thumbnail_file_url(&request_for(&source, 20, 20)).await, "Error 422");
}

#[tokio::test]
async fn test_undecodable_source_leaves_no_entry() {
    let t = TestCache::new();
    let source = t.web_root().join("broken.jpg");
    std::fs::write(&source, b"not an image at all").unwrap();

    let err = t
        .cache
        .thumbnail_file_path(&request_for(&source, 20, 20))
        .await
        .unwrap_err();
    assert!(matches!(err, ThumbnailError::RenderFailure { .. }));
    assert!(list_files(&t.cache_root()).is_empty());
}

#[tokio::test]
async fn test_unwritable_cache_root_is_storage_failure() {
    let t = TestCache::new();
    let source = t.write_png("img/cat.png", 64, 64);

    // A regular file where the cache root should be makes directory creation fail.
    let root = t.cache_root();
    std::fs::create_dir_all(root.parent().unwrap()).unwrap();
    std::fs::write(&root, b"occupied").unwrap();

    let err = t
        .cache
        .thumbnail_file_path(&request_for(&source, 20, 20))
        .await
        .unwrap_err();
    assert!(matches!(err, ThumbnailError::StorageFailure { .. }));
    assert_eq!(err.code(), 500);
}
