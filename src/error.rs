use thiserror::Error;
use warp::http::StatusCode;

/// Failure of a single outbound HTTP call.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Network(String),

    #[error("upstream returned status {0}")]
    Status(u16),

    #[error("invalid response body: {0}")]
    Decode(String),
}

/// Either DoH query failed; no partial result is kept.
#[derive(Debug, Error)]
#[error("An error occurred while resolving DNS for {domain} - {source}")]
pub struct DnsResolutionError {
    pub domain: String,
    #[source]
    pub source: FetchError,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("invalid settings: {0}")]
    Validation(String),

    #[error("invalid settings payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error(transparent)]
    Resolution(#[from] DnsResolutionError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl DatasetError {
    pub fn status(&self) -> StatusCode {
        match self {
            DatasetError::Validation(_) | DatasetError::Payload(_) => StatusCode::BAD_REQUEST,
            DatasetError::Resolution(_) => StatusCode::BAD_GATEWAY,
            DatasetError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Debug, Error)]
pub enum GeoLookupError {
    #[error("not an IP address or domain: {0:?}")]
    InvalidInput(String),

    #[error("geolocation lookup failed: {0}")]
    Upstream(#[from] FetchError),
}

impl GeoLookupError {
    pub fn status(&self) -> StatusCode {
        match self {
            GeoLookupError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            GeoLookupError::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }
}
