use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, error};
use url::Url;

use crate::dns::HttpFetch;
use crate::error::{FetchError, GeoLookupError};
use crate::validation::{is_domain, is_ip_address};

/// Relays geolocation lookups for a client-supplied address to a third-party service.
pub struct GeoLocator {
    endpoint: Url,
    fetch: Arc<dyn HttpFetch>,
}

impl GeoLocator {
    pub fn new(endpoint: &str, fetch: Arc<dyn HttpFetch>) -> anyhow::Result<Self> {
        // Trailing slash so that `join` appends rather than replaces the last segment.
        let normalized = format!("{}/", endpoint.trim_end_matches('/'));
        let endpoint = Url::parse(&normalized)
            .map_err(|e| anyhow::anyhow!("Invalid geolocation endpoint '{}': {}", endpoint, e))?;

        Ok(Self { endpoint, fetch })
    }

    pub fn lookup_url(&self, address: &str, nocache: u128) -> Result<Url, GeoLookupError> {
        let mut url = self
            .endpoint
            .join(address)
            .map_err(|_| GeoLookupError::InvalidInput(address.to_string()))?;
        url.query_pairs_mut()
            .append_pair("nocache", &nocache.to_string());
        Ok(url)
    }

    /// Returns the upstream JSON object unchanged.
    pub async fn lookup(&self, raw: &str) -> Result<serde_json::Value, GeoLookupError> {
        let address = raw.trim();
        if !is_ip_address(address) && !is_domain(address) {
            return Err(GeoLookupError::InvalidInput(address.to_string()));
        }

        let nocache = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();
        let url = self.lookup_url(address, nocache)?;
        debug!("Geolocation lookup for {}", address);

        let body = self
            .fetch
            .get_json(url, "application/json")
            .await
            .inspect_err(|e| error!("Error fetching IP address: {}", e))?;

        if !body.is_object() {
            error!("Geolocation service returned a non-object body");
            return Err(FetchError::Decode("expected a JSON object".into()).into());
        }
        Ok(body)
    }
}
