//! Persisted proxy configuration and the store that validates writes to it.
//!
//! Every target is checked before it reaches the store: IP literals are kept
//! as addresses, anything else must be a syntactically valid domain that
//! resolves to at least one address over DoH.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::dns::DnsResolver;
use crate::error::{DatasetError, StoreError};
use crate::store::{KvStore, SETTINGS_KEY};
use crate::validation::{is_domain, is_valid_uuid};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ProxyTarget {
    Domain {
        name: String,
        ipv4: Vec<String>,
        ipv6: Vec<String>,
    },
    Address {
        ip: IpAddr,
    },
}

impl ProxyTarget {
    pub fn label(&self) -> String {
        match self {
            ProxyTarget::Domain { name, .. } => name.clone(),
            ProxyTarget::Address { ip } => ip.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PanelMetadata {
    pub version: String,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxySettings {
    pub uuid: String,
    pub targets: Vec<ProxyTarget>,
    pub panel: PanelMetadata,
}

/// Body accepted by the update path.
#[derive(Debug, Clone, Deserialize)]
pub struct SettingsUpdate {
    pub uuid: String,
    pub targets: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DatasetLookup {
    NotFound,
    Found(ProxySettings),
}

#[async_trait]
pub trait DatasetStore: Send + Sync {
    async fn get_dataset(&self) -> Result<DatasetLookup, DatasetError>;
    async fn update_dataset(&self, body: &[u8]) -> Result<(), DatasetError>;
}

pub struct KvDataset {
    store: Arc<dyn KvStore>,
    resolver: Arc<DnsResolver>,
}

impl KvDataset {
    pub fn new(store: Arc<dyn KvStore>, resolver: Arc<DnsResolver>) -> Self {
        Self { store, resolver }
    }

    async fn resolve_target(&self, raw: &str) -> Result<ProxyTarget, DatasetError> {
        if let Ok(ip) = raw.parse::<IpAddr>() {
            return Ok(ProxyTarget::Address { ip });
        }
        if !is_domain(raw) {
            return Err(DatasetError::Validation(format!(
                "{:?} is neither a domain nor an IP address",
                raw
            )));
        }

        let resolved = self.resolver.resolve(raw).await?;
        if resolved.is_empty() {
            return Err(DatasetError::Validation(format!("{} does not resolve", raw)));
        }

        Ok(ProxyTarget::Domain {
            name: raw.to_string(),
            ipv4: resolved.ipv4,
            ipv6: resolved.ipv6,
        })
    }

    /// Validates an update and resolves its domain targets concurrently.
    pub async fn build_settings(&self, update: SettingsUpdate) -> Result<ProxySettings, DatasetError> {
        if !is_valid_uuid(&update.uuid) {
            return Err(DatasetError::Validation(format!(
                "{:?} is not a version 4 UUID",
                update.uuid
            )));
        }

        let raw_targets: Vec<&str> = update.targets.iter().map(|t| t.trim()).collect();
        if raw_targets.is_empty() {
            return Err(DatasetError::Validation("at least one target is required".into()));
        }
        let mut seen = HashSet::new();
        if let Some(dup) = raw_targets
            .iter()
            .find(|t| !seen.insert(t.to_ascii_lowercase()))
        {
            return Err(DatasetError::Validation(format!("duplicate target {}", dup)));
        }

        let targets =
            future::try_join_all(raw_targets.iter().map(|raw| self.resolve_target(raw))).await?;

        Ok(ProxySettings {
            uuid: update.uuid.to_ascii_lowercase(),
            targets,
            panel: PanelMetadata {
                version: env!("CARGO_PKG_VERSION").to_string(),
                updated_at: Utc::now(),
            },
        })
    }
}

#[async_trait]
impl DatasetStore for KvDataset {
    async fn get_dataset(&self) -> Result<DatasetLookup, DatasetError> {
        match self.store.get(SETTINGS_KEY).await? {
            None => Ok(DatasetLookup::NotFound),
            Some(raw) => {
                let settings = serde_json::from_str(&raw).map_err(StoreError::Corrupt)?;
                Ok(DatasetLookup::Found(settings))
            }
        }
    }

    async fn update_dataset(&self, body: &[u8]) -> Result<(), DatasetError> {
        let update: SettingsUpdate = serde_json::from_slice(body)?;
        let settings = match self.build_settings(update).await {
            Ok(settings) => settings,
            Err(e) => {
                warn!("Rejected settings update: {}", e);
                return Err(e);
            }
        };

        let raw = serde_json::to_string(&settings).map_err(StoreError::Corrupt)?;
        self.store.set(SETTINGS_KEY, &raw).await?;
        info!("Stored proxy settings with {} targets", settings.targets.len());
        debug!("Targets: {:?}", settings.targets.iter().map(ProxyTarget::label).collect::<Vec<_>>());
        Ok(())
    }
}
