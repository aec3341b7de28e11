// Library module for the edge panel
// This allows the code to be used as both a library and binary

pub mod api;
pub mod auth;
pub mod config;
pub mod dataset;
pub mod dns;
pub mod error;
pub mod geo;
pub mod panel;
pub mod render;
pub mod shutdown;
pub mod store;
pub mod validation;

// Re-export main types for external use
pub use api::{routes, AppState};
pub use auth::{Authenticator, SessionAuthenticator};
pub use config::Config;
pub use dataset::{DatasetLookup, DatasetStore, KvDataset, ProxySettings, ProxyTarget};
pub use dns::{DnsResolver, HttpFetch, ReqwestFetch, ResolutionResult};
pub use error::{DatasetError, DnsResolutionError, FetchError, GeoLookupError, StoreError};
pub use geo::GeoLocator;
pub use panel::{PanelController, PanelOutcome, PanelRequest, RequestContext};
pub use store::{FileKvStore, KvStore, MemoryKvStore};
pub use validation::{is_domain, is_valid_uuid};
