//! HTTP server for blob proxy endpoints
//!
//! Provides /health, GET and DELETE /blob/:did/:cid, and DELETE /cache.

use crate::service::{BlobService, CacheStatus};
use crate::types::{ClearResponse, HealthResponse};
use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{delete, get},
    Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{debug, info, warn};

/// Shared state for the HTTP server
pub struct ServerState {
    pub service: BlobService,
    /// Backend name reported by /health
    pub backend: &'static str,
    pub started_at: DateTime<Utc>,
}

impl ServerState {
    pub fn new(service: BlobService, backend: &'static str) -> Self {
        Self {
            service,
            backend,
            started_at: Utc::now(),
        }
    }
}

pub type SharedState = Arc<ServerState>;

/// Error response
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// Create the HTTP router
pub fn create_router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/blob/{did}/{cid}", get(get_blob).delete(purge_blob))
        .route("/cache", delete(clear_cache))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Start the HTTP server, returning once `shutdown` resolves
pub async fn start_server(
    state: SharedState,
    port: u16,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let router = create_router(state);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
}

/// Health check endpoint
async fn health(State(state): State<SharedState>) -> Json<HealthResponse> {
    let cache = state.service.store().get_stats().await;
    let coalescer = state.service.coalescer();
    let uptime_secs = (Utc::now() - state.started_at).num_seconds().max(0) as u64;

    Json(HealthResponse {
        status: "ok".to_string(),
        uptime_secs,
        backend: state.backend,
        cache,
        in_flight: coalescer.in_flight_count(),
        waiting_callers: coalescer.total_callers_count(),
    })
}

/// Get a blob by DID and CID
async fn get_blob(
    State(state): State<SharedState>,
    Path((did, cid)): Path<(String, String)>,
) -> Response {
    match state.service.get_blob(&did, &cid).await {
        Ok((blob, status)) => {
            let blob = Arc::unwrap_or_clone(blob);
            blob_response(blob.data, &blob.content_type, status)
        }
        Err(e) if e.is_not_found() => {
            debug!(did = %did, cid = %cid, "Blob not found at origin");
            not_found()
        }
        Err(e) => {
            warn!(did = %did, cid = %cid, error = %e, "Failed to fetch blob");
            not_found()
        }
    }
}

/// Remove a blob from the cache
async fn purge_blob(
    State(state): State<SharedState>,
    Path((did, cid)): Path<(String, String)>,
) -> Response {
    if state.service.purge(&did, &cid).await {
        StatusCode::NO_CONTENT.into_response()
    } else {
        not_found()
    }
}

/// Remove every blob in the cache namespace
async fn clear_cache(State(state): State<SharedState>) -> Json<ClearResponse> {
    let removed = state.service.store().clear().await;
    info!(removed, "Cleared blob cache");
    Json(ClearResponse { removed })
}

fn blob_response(data: Vec<u8>, content_type: &str, status: CacheStatus) -> Response {
    let headers = [
        (header::CONTENT_TYPE, content_type.to_string()),
        (header::CACHE_CONTROL, "public, max-age=86400".to_string()),
        (header::HeaderName::from_static("x-cache"), status.as_header().to_string()),
    ];
    (StatusCode::OK, headers, Body::from(data)).into_response()
}

fn not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse {
            error: "Blob not found".to_string(),
        }),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::tests::{service_with, MockOrigin};
    use axum::http::Request;
    use std::sync::atomic::Ordering;
    use std::time::Duration;
    use tower::ServiceExt;

    fn create_test_state(origin: Arc<MockOrigin>) -> SharedState {
        Arc::new(ServerState::new(service_with(origin, 0.999), "memory"))
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn delete_request(uri: &str) -> Request<Body> {
        Request::builder()
            .method("DELETE")
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let state = create_test_state(Arc::new(MockOrigin::new(Duration::ZERO)));
        let router = create_router(state);

        let response = router.oneshot(get_request("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = json_body(response).await;
        assert_eq!(json["status"], "ok");
        assert_eq!(json["backend"], "memory");
        assert!(json["uptime_secs"].as_u64().is_some());
        assert_eq!(json["cache"]["key_count"], 0);
        assert_eq!(json["in_flight"], 0);
    }

    #[tokio::test]
    async fn test_blob_miss_then_hit() {
        let origin = Arc::new(MockOrigin::new(Duration::ZERO));
        let router = create_router(create_test_state(origin.clone()));

        let response = router
            .clone()
            .oneshot(get_request("/blob/did:plc:alice/bafyimage"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-cache"], "MISS");
        assert_eq!(response.headers()[header::CONTENT_TYPE], "image/jpeg");

        let response = router
            .oneshot(get_request("/blob/did:plc:alice/bafyimage"))
            .await
            .unwrap();
        assert_eq!(response.headers()["x-cache"], "HIT");
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], b"did:plc:alice/bafyimage");
        assert_eq!(origin.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_blob_endpoint_not_found() {
        let router = create_router(create_test_state(Arc::new(MockOrigin::new(Duration::ZERO))));

        let response = router
            .oneshot(get_request("/blob/did:plc:alice/bafymissing"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(json_body(response).await["error"], "Blob not found");
    }

    #[tokio::test]
    async fn test_concurrent_requests_coalesce() {
        let origin = Arc::new(MockOrigin::new(Duration::from_millis(50)));
        let router = create_router(create_test_state(origin.clone()));

        let responses = futures::future::join_all((0..8).map(|_| {
            router
                .clone()
                .oneshot(get_request("/blob/did:plc:alice/bafyhot"))
        }))
        .await;

        for response in responses {
            assert_eq!(response.unwrap().status(), StatusCode::OK);
        }
        assert_eq!(origin.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_purge_blob() {
        let router = create_router(create_test_state(Arc::new(MockOrigin::new(Duration::ZERO))));

        let response = router
            .clone()
            .oneshot(delete_request("/blob/did:plc:alice/bafyimage"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        router
            .clone()
            .oneshot(get_request("/blob/did:plc:alice/bafyimage"))
            .await
            .unwrap();

        let response = router
            .oneshot(delete_request("/blob/did:plc:alice/bafyimage"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_clear_cache() {
        let router = create_router(create_test_state(Arc::new(MockOrigin::new(Duration::ZERO))));

        for cid in ["bafy1", "bafy2", "bafy3"] {
            router
                .clone()
                .oneshot(get_request(&format!("/blob/did:plc:alice/{cid}")))
                .await
                .unwrap();
        }

        let response = router
            .clone()
            .oneshot(delete_request("/cache"))
            .await
            .unwrap();
        assert_eq!(json_body(response).await["removed"], 3);

        let response = router.oneshot(delete_request("/cache")).await.unwrap();
        assert_eq!(json_body(response).await["removed"], 0);
    }

    #[test]
    fn test_server_state_new() {
        let state = ServerState::new(
            service_with(Arc::new(MockOrigin::new(Duration::ZERO)), 0.5),
            "memory",
        );

        // started_at should be close to now
        let diff = (Utc::now() - state.started_at).num_seconds();
        assert!((0..5).contains(&diff));
    }
}
