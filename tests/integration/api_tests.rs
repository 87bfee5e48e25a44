//! API integration tests for the HTTP front end.
//!
//! Tests verify:
//! - Thumbnail, path, URL and markup endpoints
//! - Static serving of cache entries under the public URL prefix
//! - Error statuses and JSON error bodies
//! - Cache clearing over HTTP

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use tower::ServiceExt;

use thumb_cache::{create_router, RouterConfig};

use super::test_utils::{create_test_jpeg, list_files, TestCache};

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec()
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

/// Router over a fresh cache with `img/cat.png` (120x90) in its web root.
fn router_with_cat(config: RouterConfig) -> (TestCache, Router) {
    let t = TestCache::new();
    t.write_png("img/cat.png", 120, 90);
    let cache = thumb_cache::ThumbnailCache::new(
        t.cache.config().clone(),
        t.http.clone(),
        t.pipeline.clone(),
    )
    .unwrap();
    let router = create_router(cache, config.with_tracing(false));
    (t, router)
}

// =============================================================================
// Health Endpoint
// =============================================================================

#[tokio::test]
async fn test_health_endpoint() {
    let (_t, router) = router_with_cat(RouterConfig::new());

    let response = router.oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let health = body_json(response).await;
    assert_eq!(health["status"], "healthy");
    assert!(health["version"].is_string());
}

// =============================================================================
// Thumbnail Endpoints
// =============================================================================

#[tokio::test]
async fn test_thumbnail_image_and_cache_hit_header() {
    let (t, router) = router_with_cat(RouterConfig::new().with_cache_max_age(60));
    let uri = "/thumbnail?source=img/cat.png&width=40&height=30";

    let response = router.clone().oneshot(get(uri)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers().get("content-type").unwrap(), "image/png");
    assert_eq!(
        response.headers().get("cache-control").unwrap(),
        "public, max-age=60"
    );
    assert_eq!(
        response.headers().get("x-thumbnail-cache-hit").unwrap(),
        "false"
    );
    let fingerprint = response
        .headers()
        .get("x-thumbnail-fingerprint")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert_eq!(fingerprint.len(), 32);

    let body = body_bytes(response).await;
    let img = image::load_from_memory(&body).unwrap();
    assert_eq!((img.width(), img.height()), (40, 30));

    let response = router.oneshot(get(uri)).await.unwrap();
    assert_eq!(
        response.headers().get("x-thumbnail-cache-hit").unwrap(),
        "true"
    );
    assert_eq!(t.pipeline.render_count(), 1);
}

#[tokio::test]
async fn test_path_endpoint() {
    let (t, router) = router_with_cat(RouterConfig::new());

    let response = router
        .oneshot(get(
            "/thumbnail/path?source=@webroot/img/cat.png&width=20&height=20&mode=inset",
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["cache_hit"], false);
    let path = std::path::PathBuf::from(json["path"].as_str().unwrap());
    assert!(path.starts_with(t.cache_root()));
    assert!(path.is_file());
    assert!(json["fingerprint"].as_str().unwrap().len() == 32);
}

#[tokio::test]
async fn test_url_endpoint_resolves_through_static_route() {
    let (_t, router) = router_with_cat(RouterConfig::new());

    let response = router
        .clone()
        .oneshot(get("/thumbnail/url?source=img/cat.png&width=32&height=32"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    let url = json["url"].as_str().unwrap().to_string();
    assert!(url.starts_with("/assets/thumbnails/"), "got {}", url);
    assert!(url.ends_with(".png"));

    let response = router.oneshot(get(&url)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let img = image::load_from_memory(&body_bytes(response).await).unwrap();
    assert_eq!((img.width(), img.height()), (32, 32));
}

#[tokio::test]
async fn test_static_route_can_be_disabled() {
    let (_t, router) = router_with_cat(RouterConfig::new().with_static(false));

    let response = router
        .clone()
        .oneshot(get("/thumbnail/url?source=img/cat.png&width=32&height=32"))
        .await
        .unwrap();
    let url = body_json(response).await["url"]
        .as_str()
        .unwrap()
        .to_string();

    let response = router.oneshot(get(&url)).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_markup_endpoint() {
    let (_t, router) = router_with_cat(RouterConfig::new());

    let response = router
        .oneshot(get(
            "/thumbnail/markup?source=img/cat.png&width=32&height=32&attr=alt%3DA%20cat&attr=class=thumb&attr=src=evil.png",
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap()
        .starts_with("text/html"));

    let html = String::from_utf8(body_bytes(response).await).unwrap();
    assert!(html.starts_with("<img src=\"/assets/thumbnails/"), "got {}", html);
    assert!(html.ends_with(".png\" alt=\"A cat\" class=\"thumb\">"), "got {}", html);
    assert!(!html.contains("evil.png"));
}

#[tokio::test]
async fn test_remote_source_over_http() {
    let (t, router) = router_with_cat(RouterConfig::new());
    let url = "https://cdn.example.com/img/dog.jpg";
    t.http.serve(url, create_test_jpeg(100, 100)).await;

    let response = router
        .oneshot(get(
            "/thumbnail?source=https%3A%2F%2Fcdn.example.com%2Fimg%2Fdog.jpg&width=25&height=25&check=crc&quality=60",
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers().get("content-type").unwrap(), "image/jpeg");
    assert_eq!(t.http.get_count(), 1);
}

// =============================================================================
// Errors
// =============================================================================

#[tokio::test]
async fn test_missing_source_returns_404() {
    let (_t, router) = router_with_cat(RouterConfig::new());

    let response = router
        .oneshot(get("/thumbnail?source=img/missing.png&width=20&height=20"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let json = body_json(response).await;
    assert_eq!(json["error"], "not_found");
    assert_eq!(json["status"], 404);
    assert!(json["message"].as_str().unwrap().contains("missing.png"));
}

#[tokio::test]
async fn test_url_endpoint_falls_back_to_message() {
    let (_t, router) = router_with_cat(RouterConfig::new());

    let response = router
        .oneshot(get("/thumbnail/url?source=img/missing.png&width=20&height=20"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    let url = json["url"].as_str().unwrap();
    assert!(url.starts_with("File "));
    assert!(url.ends_with("missing.png doesn't exist"));
}

#[tokio::test]
async fn test_source_outside_web_root_rejected() {
    let (_t, router) = router_with_cat(RouterConfig::new());

    let response = router
        .oneshot(get("/thumbnail?source=../../etc/passwd&width=20&height=20"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "invalid_request");
}

#[tokio::test]
async fn test_invalid_parameters_rejected() {
    let (_t, router) = router_with_cat(RouterConfig::new());

    for uri in [
        "/thumbnail?source=img/cat.png&width=20&height=20&mode=stretch",
        "/thumbnail?source=img/cat.png&width=20&height=20&check=7",
        "/thumbnail?source=img/cat.png&width=20&height=20&quality=0",
        "/thumbnail?source=img/cat.png&width=0&height=20",
    ] {
        let response = router.clone().oneshot(get(uri)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{}", uri);
        assert_eq!(body_json(response).await["error"], "invalid_request", "{}", uri);
    }

    let response = router
        .oneshot(get("/thumbnail?source=img/cat.png&height=20"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_undecodable_source_returns_422() {
    let (t, router) = router_with_cat(RouterConfig::new());
    std::fs::write(t.web_root().join("img/broken.png"), b"garbage").unwrap();

    let response = router
        .oneshot(get("/thumbnail?source=img/broken.png&width=20&height=20"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body_json(response).await["error"], "render_failed");
}

// =============================================================================
// Cache Clear
// =============================================================================

#[tokio::test]
async fn test_delete_cache() {
    let (t, router) = router_with_cat(RouterConfig::new());

    let response = router
        .clone()
        .oneshot(get("/thumbnail?source=img/cat.png&width=20&height=20"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(list_files(&t.cache_root()).len(), 1);

    let request = Request::builder()
        .method("DELETE")
        .uri("/cache")
        .body(Body::empty())
        .unwrap();
    let response = router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert!(t.cache_root().is_dir());
    assert!(list_files(&t.cache_root()).is_empty());

    let response = router
        .oneshot(get("/thumbnail?source=img/cat.png&width=20&height=20"))
        .await
        .unwrap();
    assert_eq!(
        response.headers().get("x-thumbnail-cache-hit").unwrap(),
        "false"
    );
    assert_eq!(t.pipeline.render_count(), 2);
}
