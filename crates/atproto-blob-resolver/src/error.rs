//! Error types for the AT Protocol blob resolver

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BlobResolverError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("DID resolution error: {0}")]
    DidResolution(String),
    #[error("PDS returned status {status} for blob {cid}")]
    BlobStatus {
        status: reqwest::StatusCode,
        cid: String,
    },
}

impl BlobResolverError {
    /// Whether the origin answered that the blob does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            BlobResolverError::BlobStatus { status, .. }
                if *status == reqwest::StatusCode::NOT_FOUND
                    || *status == reqwest::StatusCode::BAD_REQUEST
        )
    }
}

pub type Result<T> = std::result::Result<T, BlobResolverError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_did_resolution_error_display() {
        let err = BlobResolverError::DidResolution("invalid DID format".to_string());
        assert_eq!(
            format!("{}", err),
            "DID resolution error: invalid DID format"
        );
    }

    #[test]
    fn test_blob_status_not_found() {
        let err = BlobResolverError::BlobStatus {
            status: reqwest::StatusCode::NOT_FOUND,
            cid: "bafytest".to_string(),
        };
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "PDS returned status 404 Not Found for blob bafytest");

        let err = BlobResolverError::BlobStatus {
            status: reqwest::StatusCode::BAD_GATEWAY,
            cid: "bafytest".to_string(),
        };
        assert!(!err.is_not_found());
    }
}
