//! AT Protocol types for DID resolution and blob transfer

use serde::Deserialize;

/// Response from the PLC directory for DID resolution
#[derive(Debug, Deserialize)]
pub struct PlcDirectoryResponse {
    pub service: Option<Vec<PlcService>>,
}

impl PlcDirectoryResponse {
    /// Endpoint of the `#atproto_pds` service, if the document declares one
    pub fn pds_endpoint(self) -> Option<String> {
        self.service?
            .into_iter()
            .find(|s| s.id == "#atproto_pds")
            .map(|s| s.service_endpoint)
    }
}

#[derive(Debug, Deserialize)]
pub struct PlcService {
    pub id: String,
    #[serde(rename = "type")]
    #[allow(dead_code)]
    pub service_type: String,
    #[serde(rename = "serviceEndpoint")]
    pub service_endpoint: String,
}

/// A blob as served by its PDS
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    pub data: Vec<u8>,
    pub content_type: String,
}
