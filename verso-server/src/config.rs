use serde::{Deserialize, Serialize};
use std::time::Duration;
use verso_core::{RegistryBuilder, Result, RolloutConfig, VersoError};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub node: NodeConfig,
    pub registry: RegistryConfig,
    #[serde(default)]
    pub rollout: RolloutSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    pub node_id: String,
    pub bind_addr: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    pub backend: RegistryBackend,
    #[serde(default)]
    pub namespace: Option<String>,
    pub etcd: Option<EtcdConfig>,
    pub redis: Option<RedisConfig>,
}

impl RegistryConfig {
    pub fn namespace_or_default(&self) -> &str {
        self.namespace
            .as_deref()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or("default")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistryBackend {
    Memory,
    Etcd,
    Redis,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EtcdConfig {
    pub endpoints: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    pub url: String,
}

/// Rollout knobs; every field falls back to the protocol defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RolloutSection {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_replica_cap")]
    pub replica_cap: usize,
    #[serde(default = "default_load_batch_size")]
    pub load_batch_size: usize,
    /// Deadline the HTTP read path puts around discovery; the core loop
    /// itself never times out.
    #[serde(default = "default_discover_timeout_ms")]
    pub discover_timeout_ms: u64,
}

impl Default for RolloutSection {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            replica_cap: default_replica_cap(),
            load_batch_size: default_load_batch_size(),
            discover_timeout_ms: default_discover_timeout_ms(),
        }
    }
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_replica_cap() -> usize {
    10
}

fn default_load_batch_size() -> usize {
    500
}

fn default_discover_timeout_ms() -> u64 {
    5000
}

impl Config {
    pub fn from_file(path: &str) -> Result<Self> {
        // Nested keys use a double underscore after the prefix, e.g.
        // VERSO_ROLLOUT__POLL_INTERVAL_MS overrides rollout.poll_interval_ms.
        let settings = ::config::Config::builder()
            .add_source(::config::File::with_name(path))
            .add_source(
                ::config::Environment::with_prefix("VERSO")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()
            .map_err(|e| VersoError::Config(e.to_string()))?;

        let config: Config = settings
            .try_deserialize()
            .map_err(|e| VersoError::Config(e.to_string()))?;

        Ok(config)
    }

    pub fn registry_builder(&self) -> RegistryBuilder {
        let builder = RegistryBuilder::new().namespace(self.registry.namespace_or_default());

        match self.registry.backend {
            RegistryBackend::Memory => builder.backend("memory"),
            RegistryBackend::Etcd => {
                let endpoints = self
                    .registry
                    .etcd
                    .as_ref()
                    .map(|cfg| cfg.endpoints.clone())
                    .unwrap_or_default();

                builder.backend("etcd").etcd_endpoints(endpoints)
            }
            RegistryBackend::Redis => {
                let url = self
                    .registry
                    .redis
                    .as_ref()
                    .map(|cfg| cfg.url.clone())
                    .unwrap_or_default();

                builder.backend("redis").redis_url(url)
            }
        }
    }

    pub fn rollout_config(&self) -> RolloutConfig {
        RolloutConfig {
            poll_interval: Duration::from_millis(self.rollout.poll_interval_ms),
            replica_cap: self.rollout.replica_cap,
            load_batch_size: self.rollout.load_batch_size,
        }
    }

    pub fn discover_timeout(&self) -> Duration {
        Duration::from_millis(self.rollout.discover_timeout_ms)
    }
}
