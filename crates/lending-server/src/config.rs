use std::net::{Ipv4Addr, SocketAddr};
use std::path::Path;

use lending_core::EngineConfig;
use lending_store::StoreConfig;
use serde::{Deserialize, Serialize};

use crate::error::{ServerError, ServerResult};

pub const DEFAULT_PORT: u16 = 8080;

/// Server configuration, loaded from TOML. Every section is optional.
///
/// ```toml
/// bind_addr = "0.0.0.0:8080"
///
/// [engine]
/// loan_period_days = 21
///
/// [store]
/// shards = 32
/// lock_timeout_ms = 2000
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub engine: EngineConfig,
    pub store: StoreConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, DEFAULT_PORT)),
            engine: EngineConfig::default(),
            store: StoreConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn from_toml_str(s: &str) -> ServerResult<Self> {
        let config: Self = toml::from_str(s).map_err(|e| ServerError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> ServerResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
            .map_err(|e| ServerError::Config(format!("{}: {e}", path.display())))
    }

    pub fn to_toml_string(&self) -> ServerResult<String> {
        toml::to_string_pretty(self).map_err(|e| ServerError::Config(e.to_string()))
    }

    pub fn validate(&self) -> ServerResult<()> {
        self.engine
            .validate()
            .map_err(|e| ServerError::Config(format!("[engine] {e}")))?;
        self.store
            .validate()
            .map_err(|e| ServerError::Config(format!("[store] {e}")))?;
        Ok(())
    }
}
