use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

pub const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub bind_address: String,
    pub doh_endpoint: String,
    pub geo_endpoint: String,
    pub http_timeout_seconds: u64,
    /// JSON file backing the key-value store; in-memory when unset.
    pub store_path: Option<String>,
    /// Origin used for redirects; derived from the request when unset.
    pub public_origin: Option<String>,
    /// Written to the store at startup if no password is stored yet.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:9700".to_string(),
            doh_endpoint: "https://cloudflare-dns.com/dns-query".to_string(),
            geo_endpoint: "http://ip-api.com/json".to_string(),
            http_timeout_seconds: 10,
            store_path: Some("panel-store.json".to_string()),
            public_origin: None,
            password: None,
        }
    }
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(CONFIG_FILE)
    }

    /// Reads `path`, or writes the defaults there when it does not exist yet.
    pub fn load_from(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(config_str) => {
                let config: Config = serde_json::from_str(&config_str)
                    .map_err(|e| anyhow::anyhow!("Invalid config file '{}': {}", path.display(), e))?;
                config.validate()?;
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let config = Config::default();
                let config_str = serde_json::to_string_pretty(&config)?;
                std::fs::write(path, config_str)?;
                Ok(config)
            }
            Err(e) => Err(anyhow::anyhow!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            )),
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.bind_addr()?;
        if let Some(password) = &self.password {
            if password.chars().count() < crate::panel::MIN_PASSWORD_LEN {
                anyhow::bail!(
                    "Configured password must be at least {} characters",
                    crate::panel::MIN_PASSWORD_LEN
                );
            }
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> anyhow::Result<SocketAddr> {
        self.bind_address.parse()
            .map_err(|e| anyhow::anyhow!("Invalid bind address '{}': {}", self.bind_address, e))
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_seconds)
    }
}
