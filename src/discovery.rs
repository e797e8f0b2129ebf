//! Backend discovery: sources that enumerate backends, and the periodic cycle that
//! rebuilds the registry from them.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::{DiscoveryConfig, DiscoverySource};
use crate::registry::{BackendDescriptor, Registry, RegistryUpdate};

/// The discovery source itself could not produce a backend list.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("Discovery source unreachable: {0}")]
    Unreachable(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Malformed backend manifest: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid backend entry: {0}")]
    Invalid(String),
    #[error("Discovery source reported no backends")]
    Empty,
}

/// Produces the full current backend list. Every call is a complete replacement.
#[async_trait]
pub trait BackendDiscovery: Send + Sync {
    async fn discover(&self) -> Result<Vec<BackendDescriptor>, DiscoveryError>;
}

/// Shared credentials for sources that only know addresses.
#[derive(Debug, Clone)]
pub struct SharedCredentials {
    pub access_key: String,
    pub secret_key: String,
    pub listable: bool,
}

impl SharedCredentials {
    fn descriptor(&self, address: String) -> BackendDescriptor {
        BackendDescriptor::new(
            address.clone(),
            address,
            self.access_key.clone(),
            self.secret_key.clone(),
            self.listable,
        )
    }
}

/// A fixed list of `host[:port]` entries.
pub struct StaticDiscovery {
    descriptors: Vec<BackendDescriptor>,
}

impl StaticDiscovery {
    pub fn new(entries: &[String], default_port: u16, credentials: &SharedCredentials) -> Self {
        let descriptors = entries
            .iter()
            .map(|entry| {
                let has_port = entry
                    .rsplit_once(':')
                    .is_some_and(|(_, port)| port.parse::<u16>().is_ok());
                if has_port {
                    entry.clone()
                } else {
                    format!("{entry}:{default_port}")
                }
            })
            .map(|address| credentials.descriptor(address))
            .collect();
        Self { descriptors }
    }
}

#[async_trait]
impl BackendDiscovery for StaticDiscovery {
    async fn discover(&self) -> Result<Vec<BackendDescriptor>, DiscoveryError> {
        Ok(self.descriptors.clone())
    }
}

#[derive(Deserialize)]
struct ManifestEntry {
    address: String,
    access_key: String,
    secret_key: String,
    #[serde(default)]
    listable: bool,
}

/// A JSON manifest mapping backend id to address, credentials and listability,
/// re-read on every cycle. Backends are ordered by id.
///
/// ```json
/// { "minio-1": { "address": "172.17.0.2:9000", "access_key": "...", "secret_key": "...", "listable": true } }
/// ```
pub struct FileDiscovery {
    path: PathBuf,
}

impl FileDiscovery {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl BackendDiscovery for FileDiscovery {
    async fn discover(&self) -> Result<Vec<BackendDescriptor>, DiscoveryError> {
        let raw = tokio::fs::read_to_string(&self.path).await?;
        let manifest: BTreeMap<String, ManifestEntry> = serde_json::from_str(&raw)?;

        manifest
            .into_iter()
            .map(|(id, entry)| {
                if entry.address.trim().is_empty() {
                    return Err(DiscoveryError::Invalid(format!("{id} has an empty address")));
                }
                Ok(BackendDescriptor::new(
                    id,
                    entry.address,
                    entry.access_key,
                    entry.secret_key,
                    entry.listable,
                ))
            })
            .collect()
    }
}

/// Every address a DNS name resolves to, sorted so the order is stable between cycles.
pub struct DnsDiscovery {
    name: String,
    port: u16,
    credentials: SharedCredentials,
}

impl DnsDiscovery {
    pub fn new(name: impl Into<String>, port: u16, credentials: SharedCredentials) -> Self {
        Self {
            name: name.into(),
            port,
            credentials,
        }
    }
}

#[async_trait]
impl BackendDiscovery for DnsDiscovery {
    async fn discover(&self) -> Result<Vec<BackendDescriptor>, DiscoveryError> {
        let mut addrs: Vec<_> = tokio::net::lookup_host((self.name.as_str(), self.port))
            .await
            .map_err(|e| DiscoveryError::Unreachable(format!("resolving {}: {e}", self.name)))?
            .collect();
        addrs.sort();
        addrs.dedup();

        Ok(addrs
            .into_iter()
            .map(|addr| self.credentials.descriptor(addr.to_string()))
            .collect())
    }
}

/// Build the discovery source selected by configuration.
pub fn from_config(config: &DiscoveryConfig) -> Arc<dyn BackendDiscovery> {
    let credentials = SharedCredentials {
        access_key: config.access_key.clone(),
        secret_key: config.secret_key.clone(),
        listable: config.listable,
    };

    match config.source {
        DiscoverySource::Static => Arc::new(StaticDiscovery::new(
            &config.backends,
            config.backend_port,
            &credentials,
        )),
        DiscoverySource::File => Arc::new(FileDiscovery::new(
            config.manifest_path.clone().unwrap_or_default(),
        )),
        DiscoverySource::Dns => Arc::new(DnsDiscovery::new(
            config.dns_name.clone().unwrap_or_default(),
            config.backend_port,
            credentials,
        )),
    }
}

/// Runs discovery cycles against one source and publishes the results to the registry.
pub struct DiscoveryService {
    registry: Arc<Registry>,
    source: Arc<dyn BackendDiscovery>,
    interval: Duration,
}

impl DiscoveryService {
    pub fn new(registry: Arc<Registry>, source: Arc<dyn BackendDiscovery>, interval: Duration) -> Self {
        Self {
            registry,
            source,
            interval,
        }
    }

    /// One discovery cycle. The registry is only replaced when the source answered with
    /// at least one backend; an empty answer counts as a failed cycle.
    pub async fn cycle(&self) -> Result<RegistryUpdate, DiscoveryError> {
        info!("Scanning for storage backends");
        let descriptors = self.source.discover().await?;
        if descriptors.is_empty() {
            return Err(DiscoveryError::Empty);
        }
        info!(discovered = descriptors.len(), "Discovered storage backends");
        Ok(self.registry.initialize(descriptors).await)
    }

    /// First cycle at process start. A source failure here is fatal for the caller.
    pub async fn bootstrap(&self) -> Result<RegistryUpdate, DiscoveryError> {
        let update = self.cycle().await?;
        if update.snapshot.is_empty() {
            warn!("No usable storage backends after initial discovery");
        }
        Ok(update)
    }

    /// A recurring cycle. A source failure keeps the previous registry in place.
    pub async fn refresh(&self) -> Option<RegistryUpdate> {
        match self.cycle().await {
            Ok(update) => Some(update),
            Err(e) => {
                error!(error = %e, "Discovery failed; keeping previous backend registry");
                None
            }
        }
    }

    /// Spawn the periodic refresh loop. The first refresh runs one interval from now.
    pub fn start(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                self.refresh().await;
            }
        })
    }
}
