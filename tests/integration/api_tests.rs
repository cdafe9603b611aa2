//! API integration tests for tile retrieval and error handling.
//!
//! Tests verify:
//! - Tile retrieval with and without a tile extension
//! - Empty tiles (204) versus engine failures (500)
//! - Out-of-range rejection (404) and bad requests (400)
//! - Pool exhaustion and shutdown (503)
//! - HTTP response codes and headers

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

use mvt_streamer::server::{create_router, RouterConfig, MVT_CONTENT_TYPE};

use super::test_utils::{
    fake_router, fake_service_with, get, payload_for, EngineState, POPULATED, TEST_VERSION,
};

// =============================================================================
// Basic Tile Retrieval
// =============================================================================

#[tokio::test]
async fn test_tile_retrieval_success() {
    let (router, _service, _state) = fake_router(2).await;

    let response = get(&router, "/tiles/14/3680/7300.pbf").await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("content-type").unwrap(),
        MVT_CONTENT_TYPE
    );
    assert_eq!(
        response.headers().get("cache-control").unwrap(),
        "public, max-age=86400"
    );
    assert_eq!(
        response.headers().get("x-cache-version").unwrap(),
        TEST_VERSION
    );
    assert_eq!(
        response.headers().get("x-cache-key").unwrap(),
        "test-v1/14/3680/7300"
    );
    assert_eq!(response.headers().get("x-tile-cache-hit").unwrap(), "false");

    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(body.as_ref(), payload_for(14, 3680, 7300).as_slice());
}

#[tokio::test]
async fn test_tile_retrieval_extensions() {
    let (router, _service, _state) = fake_router(2).await;

    for uri in [
        "/tiles/14/3680/7300",
        "/tiles/14/3680/7300.pbf",
        "/tiles/14/3680/7300.mvt",
    ] {
        let response = get(&router, uri).await;
        assert_eq!(response.status(), StatusCode::OK, "{}", uri);
    }
}

#[tokio::test]
async fn test_second_request_is_cache_hit() {
    let (router, _service, state) = fake_router(2).await;

    let first = get(&router, "/tiles/14/3681/7300.pbf").await;
    assert_eq!(first.headers().get("x-tile-cache-hit").unwrap(), "false");
    let first_body = first.into_body().collect().await.unwrap().to_bytes();

    let second = get(&router, "/tiles/14/3681/7300.pbf").await;
    assert_eq!(second.headers().get("x-tile-cache-hit").unwrap(), "true");
    let second_body = second.into_body().collect().await.unwrap().to_bytes();

    assert_eq!(first_body, second_body);
    assert_eq!(state.fetches(), 1);
}

#[tokio::test]
async fn test_custom_cache_max_age() {
    let state = EngineState::with_tiles(POPULATED);
    let service = fake_service_with(1, state, |s| s).await;
    let router = create_router(
        service,
        RouterConfig::new()
            .with_cache_max_age(600)
            .with_tracing(false),
    );

    let response = get(&router, "/tiles/14/3680/7300.pbf").await;
    assert_eq!(
        response.headers().get("cache-control").unwrap(),
        "public, max-age=600"
    );
}

// =============================================================================
// Empty Tiles
// =============================================================================

#[tokio::test]
async fn test_empty_tile_returns_no_content() {
    let (router, _service, state) = fake_router(2).await;

    // Open ocean, nowhere near the dataset
    let response = get(&router, "/tiles/10/100/600.pbf").await;

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert!(response.headers().get("content-type").is_none());
    assert!(response.headers().get("cache-control").is_none());
    assert_eq!(
        response.headers().get("x-cache-key").unwrap(),
        "test-v1/10/100/600"
    );

    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert!(body.is_empty());

    // Cached as empty: no second engine call
    let again = get(&router, "/tiles/10/100/600.pbf").await;
    assert_eq!(again.status(), StatusCode::NO_CONTENT);
    assert_eq!(again.headers().get("x-tile-cache-hit").unwrap(), "true");
    assert_eq!(state.fetches(), 1);
}

// =============================================================================
// Error Handling
// =============================================================================

#[tokio::test]
async fn test_zoom_out_of_range_returns_404() {
    let (router, _service, state) = fake_router(2).await;

    for uri in [
        "/tiles/5/0/0.pbf",
        "/tiles/7/10/10.pbf",
        "/tiles/23/0/0.pbf",
        "/tiles/25/1/1.pbf",
    ] {
        let response = get(&router, uri).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "{}", uri);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let error: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(error["error"], "out_of_range");
        assert_eq!(error["status"], 404);
    }

    assert_eq!(state.fetches(), 0);
}

#[tokio::test]
async fn test_coordinate_outside_grid_returns_404() {
    let (router, _service, _state) = fake_router(2).await;

    // At z=10 the grid is 1024 x 1024
    let response = get(&router, "/tiles/10/1024/0.pbf").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = get(&router, "/tiles/10/0/-1.pbf").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_oversized_coordinates_return_404() {
    let (router, _service, state) = fake_router(2).await;

    for uri in [
        "/tiles/99999999999999999999/0/0.pbf",
        "/tiles/14/99999999999999999999/7300.pbf",
        "/tiles/14/3680/99999999999999999999.pbf",
        "/tiles/14/-99999999999999999999/7300",
    ] {
        let response = get(&router, uri).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "{}", uri);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let error: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(error["error"], "out_of_range", "{}", uri);
    }

    assert_eq!(state.fetches(), 0);
}

#[tokio::test]
async fn test_unparseable_row_returns_400() {
    let (router, _service, _state) = fake_router(2).await;

    let response = get(&router, "/tiles/14/3680/abc.pbf").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = response.into_body().collect().await.unwrap().to_bytes();
    let error: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(error["error"], "bad_request");
}

#[tokio::test]
async fn test_unparseable_zoom_rejected() {
    let (router, _service, _state) = fake_router(2).await;

    for uri in ["/tiles/abc/0/0.pbf", "/tiles/14/1.5/7300.pbf"] {
        let response = get(&router, uri).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{}", uri);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let error: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(error["error"], "bad_request");
    }
}

#[tokio::test]
async fn test_invalid_version_returns_400() {
    let (router, _service, state) = fake_router(2).await;

    let response = get(&router, "/tiles/14/3680/7300.pbf?v=no%20spaces").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = response.into_body().collect().await.unwrap().to_bytes();
    let error: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(error["error"], "invalid_version");
    assert_eq!(state.fetches(), 0);
}

#[tokio::test]
async fn test_engine_failure_returns_500_and_is_not_cached() {
    let (router, _service, state) = fake_router(2).await;
    state.set_failing(true);

    let response = get(&router, "/tiles/14/3680/7300.pbf").await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let body = response.into_body().collect().await.unwrap().to_bytes();
    let error: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(error["error"], "engine_error");

    // Recovery renders afresh
    state.set_failing(false);
    let response = get(&router, "/tiles/14/3680/7300.pbf").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers().get("x-tile-cache-hit").unwrap(), "false");
    assert_eq!(state.fetches(), 2);
}

#[tokio::test]
async fn test_pool_exhausted_returns_503() {
    let state = EngineState::with_tiles(POPULATED);
    let service = fake_service_with(1, state, |s| {
        s.with_acquire_timeout(Some(Duration::from_millis(20)))
    })
    .await;
    let router = create_router(Arc::clone(&service), RouterConfig::new().with_tracing(false));

    let _held = service.pool().acquire().await.unwrap();

    let response = get(&router, "/tiles/14/3680/7300.pbf").await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert!(response.headers().contains_key("retry-after"));

    let body = response.into_body().collect().await.unwrap().to_bytes();
    let error: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(error["error"], "pool_exhausted");
}

#[tokio::test]
async fn test_closed_pool_returns_503() {
    let (router, service, _state) = fake_router(2).await;
    service.shutdown().await;

    let response = get(&router, "/tiles/14/3680/7300.pbf").await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    let body = response.into_body().collect().await.unwrap().to_bytes();
    let error: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(error["error"], "pool_closed");
}

#[tokio::test]
async fn test_cached_tile_served_after_pool_shutdown() {
    let (router, service, _state) = fake_router(1).await;

    let response = get(&router, "/tiles/14/3680/7300.pbf").await;
    assert_eq!(response.status(), StatusCode::OK);

    service.shutdown().await;

    // Cache hits never touch the pool
    let response = get(&router, "/tiles/14/3680/7300.pbf").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers().get("x-tile-cache-hit").unwrap(), "true");
}

// =============================================================================
// Health and Info
// =============================================================================

#[tokio::test]
async fn test_health_healthy() {
    let (router, _service, state) = fake_router(2).await;

    let response = get(&router, "/health").await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = response.into_body().collect().await.unwrap().to_bytes();
    let health: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(health["status"], "healthy");
    assert_eq!(health["version"], env!("CARGO_PKG_VERSION"));
    assert_eq!(health["pool_size"], 2);
    assert_eq!(health["idle_connections"], 2);
    assert!(health.get("error").is_none());

    assert_eq!(state.pings.load(std::sync::atomic::Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_health_unhealthy_still_200() {
    let (router, _service, state) = fake_router(2).await;
    state.set_failing(true);

    let response = get(&router, "/health").await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = response.into_body().collect().await.unwrap().to_bytes();
    let health: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(health["status"], "unhealthy");
    assert!(health["error"].as_str().unwrap().contains("server closed"));
    // The connection went back to the pool
    assert_eq!(health["idle_connections"], 2);
}

#[tokio::test]
async fn test_health_after_shutdown_is_unhealthy() {
    let (router, service, _state) = fake_router(2).await;
    service.shutdown().await;

    let response = get(&router, "/health").await;
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let health: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(health["status"], "unhealthy");
}

#[tokio::test]
async fn test_index_reports_service_info() {
    let (router, _service, _state) = fake_router(2).await;

    let _ = get(&router, "/tiles/14/3680/7300.pbf").await;
    let response = get(&router, "/").await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = response.into_body().collect().await.unwrap().to_bytes();
    let info: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(info["name"], "mvt-streamer");
    assert_eq!(info["min_zoom"], 8);
    assert_eq!(info["max_zoom"], 22);
    assert_eq!(info["cache_version"], TEST_VERSION);
    assert_eq!(info["cache_entries"], 1);
    assert_eq!(info["cache_capacity"], 2048);
}

// =============================================================================
// Middleware
// =============================================================================

#[tokio::test]
async fn test_gzip_when_accepted() {
    let (router, _service, _state) = fake_router(1).await;

    let request = Request::builder()
        .uri("/tiles/14/3680/7300.pbf")
        .header("accept-encoding", "gzip")
        .body(Body::empty())
        .unwrap();
    let response = router.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers().get("content-encoding").unwrap(), "gzip");
}

#[tokio::test]
async fn test_cors_headers_present() {
    let (router, _service, _state) = fake_router(1).await;

    let request = Request::builder()
        .uri("/tiles/14/3680/7300.pbf")
        .header("origin", "https://maps.example.com")
        .body(Body::empty())
        .unwrap();
    let response = router.oneshot(request).await.unwrap();

    assert_eq!(
        response
            .headers()
            .get("access-control-allow-origin")
            .unwrap(),
        "*"
    );
}

#[tokio::test]
async fn test_unknown_route_returns_404() {
    let (router, _service, _state) = fake_router(1).await;

    let response = get(&router, "/layers").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
