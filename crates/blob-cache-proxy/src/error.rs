//! Error types for the blob cache proxy

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Cache backend error: {0}")]
    Backend(#[from] blob_cache_store::BackendError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<tracing_subscriber::filter::ParseError> for ProxyError {
    fn from(err: tracing_subscriber::filter::ParseError) -> Self {
        ProxyError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ProxyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let err = ProxyError::Config("invalid CACHE_BETA".to_string());
        assert_eq!(format!("{}", err), "Configuration error: invalid CACHE_BETA");
    }

    #[test]
    fn test_backend_error_display() {
        let err = ProxyError::from(blob_cache_store::BackendError::Unavailable(
            "connection refused".to_string(),
        ));
        assert!(format!("{}", err).contains("connection refused"));
    }

    #[test]
    fn test_io_error_converts() {
        let err: ProxyError = std::io::Error::new(std::io::ErrorKind::AddrInUse, "port taken").into();
        assert!(matches!(err, ProxyError::Io(_)));
    }
}
