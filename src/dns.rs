use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};
use url::Url;

use crate::error::{DnsResolutionError, FetchError};

pub const DNS_JSON: &str = "application/dns-json";

/// Outbound HTTP capability used by the resolver and the geolocation relay.
#[async_trait]
pub trait HttpFetch: Send + Sync {
    async fn get_json(&self, url: Url, accept: &str) -> Result<serde_json::Value, FetchError>;
}

pub struct ReqwestFetch {
    client: reqwest::Client,
}

impl ReqwestFetch {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("edge-panel/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait]
impl HttpFetch for ReqwestFetch {
    async fn get_json(&self, url: Url, accept: &str) -> Result<serde_json::Value, FetchError> {
        let response = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, accept)
            .send()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        response
            .json()
            .await
            .map_err(|e| FetchError::Decode(e.to_string()))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionResult {
    pub ipv4: Vec<String>,
    pub ipv6: Vec<String>,
}

impl ResolutionResult {
    pub fn is_empty(&self) -> bool {
        self.ipv4.is_empty() && self.ipv6.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordType {
    A,
    Aaaa,
}

impl RecordType {
    fn as_str(self) -> &'static str {
        match self {
            RecordType::A => "A",
            RecordType::Aaaa => "AAAA",
        }
    }
}

#[derive(Debug, Deserialize)]
struct DohResponse {
    #[serde(rename = "Answer")]
    answer: Option<Vec<DohAnswer>>,
}

#[derive(Debug, Deserialize)]
struct DohAnswer {
    data: String,
}

pub struct DnsResolver {
    endpoint: Url,
    fetch: Arc<dyn HttpFetch>,
}

impl DnsResolver {
    pub fn new(endpoint: &str, fetch: Arc<dyn HttpFetch>) -> anyhow::Result<Self> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| anyhow::anyhow!("Invalid DoH endpoint '{}': {}", endpoint, e))?;

        Ok(Self { endpoint, fetch })
    }

    pub fn query_url(&self, domain: &str, record: RecordType) -> Url {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .append_pair("name", domain)
            .append_pair("type", record.as_str());
        url
    }

    async fn query(&self, domain: &str, record: RecordType) -> Result<Vec<String>, FetchError> {
        let body = self
            .fetch
            .get_json(self.query_url(domain, record), DNS_JSON)
            .await?;

        let response: DohResponse =
            serde_json::from_value(body).map_err(|e| FetchError::Decode(e.to_string()))?;

        Ok(response
            .answer
            .map(|answers| answers.into_iter().map(|a| a.data).collect())
            .unwrap_or_default())
    }

    /// Resolves A and AAAA records concurrently. Fails as a whole if either query fails.
    pub async fn resolve(&self, domain: &str) -> Result<ResolutionResult, DnsResolutionError> {
        debug!("Resolving {} via DoH", domain);

        let joined = tokio::try_join!(
            self.query(domain, RecordType::A),
            self.query(domain, RecordType::Aaaa)
        );

        match joined {
            Ok((ipv4, ipv6)) => Ok(ResolutionResult { ipv4, ipv6 }),
            Err(source) => {
                error!("Error resolving DNS for {}: {}", domain, source);
                Err(DnsResolutionError {
                    domain: domain.to_string(),
                    source,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CannedFetch {
        a: Result<serde_json::Value, u16>,
        aaaa: Result<serde_json::Value, u16>,
        calls: AtomicUsize,
    }

    impl CannedFetch {
        fn new(a: Result<serde_json::Value, u16>, aaaa: Result<serde_json::Value, u16>) -> Arc<Self> {
            Arc::new(Self {
                a,
                aaaa,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl HttpFetch for CannedFetch {
        async fn get_json(&self, url: Url, accept: &str) -> Result<serde_json::Value, FetchError> {
            assert_eq!(accept, DNS_JSON);
            self.calls.fetch_add(1, Ordering::SeqCst);
            let record = url
                .query_pairs()
                .find(|(k, _)| k == "type")
                .map(|(_, v)| v.into_owned())
                .unwrap_or_default();
            let canned = if record == "A" { &self.a } else { &self.aaaa };
            canned.clone().map_err(FetchError::Status)
        }
    }

    fn resolver(fetch: Arc<CannedFetch>) -> DnsResolver {
        DnsResolver::new("https://cloudflare-dns.com/dns-query", fetch).expect("valid endpoint")
    }

    #[test]
    fn test_query_url_encodes_name_and_type() {
        let resolver = resolver(CannedFetch::new(Ok(json!({})), Ok(json!({}))));
        let url = resolver.query_url("ex ample.com", RecordType::Aaaa);
        assert_eq!(
            url.as_str(),
            "https://cloudflare-dns.com/dns-query?name=ex+ample.com&type=AAAA"
        );
    }

    #[test]
    fn test_invalid_endpoint() {
        let fetch = CannedFetch::new(Ok(json!({})), Ok(json!({})));
        let result = DnsResolver::new("not a url", fetch);
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_resolve_ipv4_only() {
        let fetch = CannedFetch::new(
            Ok(json!({"Status": 0, "Answer": [
                {"name": "example.com", "type": 1, "TTL": 300, "data": "93.184.216.34"},
                {"name": "example.com", "type": 1, "TTL": 300, "data": "93.184.216.35"}
            ]})),
            Ok(json!({"Status": 0})),
        );
        let result = resolver(fetch.clone()).resolve("example.com").await.expect("resolves");

        assert_eq!(result.ipv4, vec!["93.184.216.34", "93.184.216.35"]);
        assert!(result.ipv6.is_empty());
        assert_eq!(fetch.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_resolve_no_records() {
        let fetch = CannedFetch::new(Ok(json!({"Status": 3})), Ok(json!({"Status": 3})));
        let result = resolver(fetch).resolve("nothing-here.example").await.expect("resolves");
        assert_eq!(result, ResolutionResult::default());
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn test_resolve_fails_when_ipv6_query_fails() {
        let fetch = CannedFetch::new(
            Ok(json!({"Answer": [{"data": "1.2.3.4"}]})),
            Err(503),
        );
        let err = resolver(fetch).resolve("example.com").await.unwrap_err();
        assert_eq!(err.domain, "example.com");
        assert!(matches!(err.source, FetchError::Status(503)));
    }

    #[tokio::test]
    async fn test_resolve_fails_when_ipv4_query_fails() {
        let fetch = CannedFetch::new(Err(500), Ok(json!({"Answer": [{"data": "::1"}]})));
        let result = resolver(fetch).resolve("example.com").await;
        assert!(result.is_err());
    }

    /// Answers only once both record queries are waiting, so sequential queries would hang.
    struct RendezvousFetch {
        barrier: tokio::sync::Barrier,
    }

    #[async_trait]
    impl HttpFetch for RendezvousFetch {
        async fn get_json(&self, _url: Url, _accept: &str) -> Result<serde_json::Value, FetchError> {
            self.barrier.wait().await;
            Ok(json!({"Answer": [{"data": "192.0.2.1"}]}))
        }
    }

    #[tokio::test]
    async fn test_record_queries_run_concurrently() {
        let fetch = Arc::new(RendezvousFetch {
            barrier: tokio::sync::Barrier::new(2),
        });
        let resolver = DnsResolver::new("https://cloudflare-dns.com/dns-query", fetch)
            .expect("valid endpoint");

        let result = tokio::time::timeout(Duration::from_secs(2), resolver.resolve("example.com"))
            .await
            .expect("A and AAAA queries should be in flight together")
            .expect("resolves");
        assert_eq!(result.ipv4, vec!["192.0.2.1"]);
        assert_eq!(result.ipv6, vec!["192.0.2.1"]);
    }

    #[tokio::test]
    async fn test_resolve_rejects_malformed_answer() {
        let fetch = CannedFetch::new(Ok(json!({"Answer": [{"type": 1}]})), Ok(json!({})));
        let err = resolver(fetch).resolve("example.com").await.unwrap_err();
        assert!(matches!(err.source, FetchError::Decode(_)));
    }
}
