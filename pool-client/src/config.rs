//! Configuration for the pool client

use crate::{
    registry::ReplicaRegistry,
    types::{HostAddress, ReplicaId},
    Error, Result,
};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, path::PathBuf, str::FromStr};

/// Client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Client name; also the default signer's identifier
    pub name: String,

    /// Base directory for client data
    pub base_dir: PathBuf,

    /// Request id of the last request sent; numbering resumes after it
    pub last_req_id: u64,

    /// Static replica registry (name -> client address); empty means the
    /// registry is discovered from the pool ledger
    pub replicas: BTreeMap<String, HostAddress>,

    /// Pool ledger genesis file, one JSON transaction per line
    pub pool_genesis_file: Option<PathBuf>,

    /// Service loop configuration
    pub service: ServiceConfig,
}

/// Service loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Maximum transport events handled per service call
    pub limit: usize,

    /// Interval between service calls (ms)
    pub interval_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            name: "client1".to_string(),
            base_dir: PathBuf::from("./data/clients"),
            last_req_id: 0,
            replicas: BTreeMap::new(),
            pool_genesis_file: None,
            service: ServiceConfig::default(),
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            limit: 100,
            interval_ms: 50,
        }
    }
}

impl ClientConfig {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: ClientConfig = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = ClientConfig::default();

        if let Ok(name) = std::env::var("POOL_CLIENT_NAME") {
            config.name = name;
        }

        if let Ok(base_dir) = std::env::var("POOL_CLIENT_BASE_DIR") {
            config.base_dir = PathBuf::from(base_dir);
        }

        if let Ok(genesis) = std::env::var("POOL_CLIENT_GENESIS_FILE") {
            config.pool_genesis_file = Some(PathBuf::from(genesis));
        }

        if let Some(last_req_id) = parse_env("POOL_CLIENT_LAST_REQ_ID")? {
            config.last_req_id = last_req_id;
        }

        if let Some(limit) = parse_env("POOL_CLIENT_SERVICE_LIMIT")? {
            config.service.limit = limit;
        }

        if let Some(interval) = parse_env("POOL_CLIENT_SERVICE_INTERVAL_MS")? {
            config.service.interval_ms = interval;
        }

        Ok(config)
    }

    /// Static registry, if replicas are configured
    pub fn static_registry(&self) -> Option<ReplicaRegistry> {
        if self.replicas.is_empty() {
            return None;
        }
        Some(ReplicaRegistry::from_addresses(
            self.replicas
                .iter()
                .map(|(name, address)| (ReplicaId::new(name.as_str()), address.clone())),
        ))
    }
}

fn parse_env<T: FromStr>(key: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .parse()
            .map(Some)
            .map_err(|e| Error::Config(format!("Invalid {}: {}", key, e))),
        Err(_) => Ok(None),
    }
}
