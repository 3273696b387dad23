//! PDS resolution and blob fetching

use crate::error::{BlobResolverError, Result};
use crate::types::{Blob, PlcDirectoryResponse};
use moka::future::Cache;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_PLC_DIRECTORY_URL: &str = "https://plc.directory";
const PDS_CACHE_TTL_SECS: u64 = 300; // 5 minutes
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// HTTP client for fetching blobs from PDS servers
pub struct BlobResolver {
    client: Client,
    plc_directory_url: String,
    /// DID to PDS endpoint
    pds_cache: Cache<String, String>,
}

impl BlobResolver {
    /// Create a resolver against the public PLC directory
    pub fn new() -> Self {
        Self::with_plc_directory(DEFAULT_PLC_DIRECTORY_URL)
    }

    /// Create a resolver against a custom PLC directory
    pub fn with_plc_directory(plc_directory_url: &str) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .unwrap_or_default();

        let pds_cache = Cache::builder()
            .max_capacity(10_000)
            .time_to_live(Duration::from_secs(PDS_CACHE_TTL_SECS))
            .build();

        Self {
            client,
            plc_directory_url: plc_directory_url.trim_end_matches('/').to_string(),
            pds_cache,
        }
    }

    /// Resolve the DID's PDS and download the blob from it
    pub async fn get_blob(&self, did: &str, cid: &str) -> Result<Blob> {
        let pds_url = self.resolve_pds_url(did).await?;
        self.fetch_blob(&pds_url, did, cid).await
    }

    /// Resolve a DID to its PDS URL
    pub async fn resolve_pds_url(&self, did: &str) -> Result<String> {
        if let Some(cached) = self.pds_cache.get(did).await {
            return Ok(cached);
        }

        let pds_url = if did.starts_with("did:plc:") {
            self.resolve_plc_did(did).await?
        } else if did.starts_with("did:web:") {
            self.resolve_web_did(did)?
        } else {
            return Err(BlobResolverError::DidResolution(format!(
                "Unsupported DID method: {}",
                did
            )));
        };

        self.pds_cache
            .insert(did.to_string(), pds_url.clone())
            .await;
        Ok(pds_url)
    }

    /// Resolve a did:plc: DID via the PLC directory
    async fn resolve_plc_did(&self, did: &str) -> Result<String> {
        let url = format!("{}/{}", self.plc_directory_url, did);
        debug!(did, url = %url, "Resolving PLC DID");

        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            return Err(BlobResolverError::DidResolution(format!(
                "PLC directory returned status {}",
                response.status()
            )));
        }

        let doc: PlcDirectoryResponse = response.json().await?;
        let pds_url = doc.pds_endpoint().ok_or_else(|| {
            BlobResolverError::DidResolution("No PDS service found in DID document".to_string())
        })?;

        debug!(did, pds_url = %pds_url, "Resolved PDS URL");
        Ok(pds_url)
    }

    /// Resolve a did:web: DID by constructing URL from domain
    fn resolve_web_did(&self, did: &str) -> Result<String> {
        let domain = did
            .strip_prefix("did:web:")
            .filter(|domain| !domain.is_empty())
            .ok_or_else(|| BlobResolverError::DidResolution("Invalid did:web format".to_string()))?
            .replace("%3A", ":");

        Ok(format!("https://{}", domain))
    }

    /// Fetch a blob from a PDS server
    pub async fn fetch_blob(&self, pds_url: &str, did: &str, cid: &str) -> Result<Blob> {
        let url = format!(
            "{}/xrpc/com.atproto.sync.getBlob?did={}&cid={}",
            pds_url.trim_end_matches('/'),
            urlencoding::encode(did),
            urlencoding::encode(cid)
        );

        debug!(url = %url, "Fetching blob from PDS");

        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            warn!(status = %response.status(), url = %url, "Failed to fetch blob");
            return Err(BlobResolverError::BlobStatus {
                status: response.status(),
                cid: cid.to_string(),
            });
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_string();

        let data = response.bytes().await?.to_vec();

        debug!(
            size = data.len(),
            content_type = %content_type,
            "Fetched blob from PDS"
        );

        Ok(Blob { data, content_type })
    }
}

impl Default for BlobResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::{Path, Query, State};
    use axum::http::{header, StatusCode};
    use axum::response::{IntoResponse, Response};
    use axum::routing::get;
    use axum::{Json, Router};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Serves both the PLC directory and the PDS on one local port
    async fn spawn_origin(plc_hits: Arc<AtomicUsize>) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());

        let pds = base.clone();
        let router = Router::new()
            .route(
                "/{did}",
                get(
                    move |State(hits): State<Arc<AtomicUsize>>, Path(did): Path<String>| {
                        let pds = pds.clone();
                        async move {
                            hits.fetch_add(1, Ordering::SeqCst);
                            if did != "did:plc:alice" {
                                return StatusCode::NOT_FOUND.into_response();
                            }
                            Json(serde_json::json!({
                                "service": [{
                                    "id": "#atproto_pds",
                                    "type": "AtprotoPersonalDataServer",
                                    "serviceEndpoint": pds,
                                }]
                            }))
                            .into_response()
                        }
                    },
                ),
            )
            .route(
                "/xrpc/com.atproto.sync.getBlob",
                get(|Query(params): Query<HashMap<String, String>>| async move {
                    match params.get("cid").map(String::as_str) {
                        Some("bafyimage") => Response::builder()
                            .header(header::CONTENT_TYPE, "image/jpeg")
                            .body(axum::body::Body::from(vec![0xFF, 0xD8, 0xFF]))
                            .unwrap(),
                        _ => StatusCode::BAD_REQUEST.into_response(),
                    }
                }),
            )
            .with_state(plc_hits);

        tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });
        base
    }

    #[test]
    fn test_resolve_web_did() {
        let resolver = BlobResolver::new();

        // Simple domain
        let result = resolver.resolve_web_did("did:web:example.com");
        assert_eq!(result.unwrap(), "https://example.com");

        // Domain with port (URL encoded colon)
        let result = resolver.resolve_web_did("did:web:example.com%3A8080");
        assert_eq!(result.unwrap(), "https://example.com:8080");
    }

    #[test]
    fn test_resolve_web_did_invalid() {
        let resolver = BlobResolver::new();

        assert!(resolver.resolve_web_did("did:plc:abc123").is_err());
        assert!(resolver.resolve_web_did("did:web:").is_err());
    }

    #[tokio::test]
    async fn test_resolve_pds_url_unsupported_method() {
        let resolver = BlobResolver::new();

        let result = resolver.resolve_pds_url("did:key:abc123").await;
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Unsupported DID method"));
    }

    #[tokio::test]
    async fn test_get_blob_from_mock_pds() {
        let hits = Arc::new(AtomicUsize::new(0));
        let base = spawn_origin(hits.clone()).await;
        let resolver = BlobResolver::with_plc_directory(&base);

        let blob = resolver.get_blob("did:plc:alice", "bafyimage").await.unwrap();
        assert_eq!(blob.data, vec![0xFF, 0xD8, 0xFF]);
        assert_eq!(blob.content_type, "image/jpeg");

        // PDS endpoint is served from the resolver's cache the second time
        resolver.get_blob("did:plc:alice", "bafyimage").await.unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_get_blob_missing_cid() {
        let base = spawn_origin(Arc::new(AtomicUsize::new(0))).await;
        let resolver = BlobResolver::with_plc_directory(&base);

        let err = resolver
            .get_blob("did:plc:alice", "bafymissing")
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_unknown_plc_did() {
        let base = spawn_origin(Arc::new(AtomicUsize::new(0))).await;
        let resolver = BlobResolver::with_plc_directory(&base);

        let err = resolver.resolve_pds_url("did:plc:nobody").await.unwrap_err();
        assert!(matches!(err, BlobResolverError::DidResolution(_)));
    }
}
