use std::time::Duration;

use thiserror::Error;

use crate::object_store::S3Options;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub node: NodeConfig,
    pub discovery: DiscoveryConfig,
    pub storage: StorageConfig,
    /// Maximum accepted Content-Length on writes, in bytes
    pub max_upload_size: u64,
}

#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub bind_address: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoverySource {
    /// Fixed `host[:port]` list
    Static,
    /// JSON manifest re-read every cycle
    File,
    /// Every address a DNS name resolves to
    Dns,
}

#[derive(Clone)]
pub struct DiscoveryConfig {
    pub source: DiscoverySource,
    pub backends: Vec<String>,
    pub manifest_path: Option<String>,
    /// DNS name to resolve for backend discovery (e.g., a Kubernetes headless service).
    pub dns_name: Option<String>,
    /// Port for static entries without one and for every DNS record.
    pub backend_port: u16,
    /// How often to re-run discovery (seconds)
    pub poll_interval_seconds: u64,
    /// Credentials shared by static and DNS-discovered backends.
    pub access_key: String,
    pub secret_key: String,
    pub listable: bool,
}

impl std::fmt::Debug for DiscoveryConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscoveryConfig")
            .field("source", &self.source)
            .field("backends", &self.backends)
            .field("manifest_path", &self.manifest_path)
            .field("dns_name", &self.dns_name)
            .field("backend_port", &self.backend_port)
            .field("poll_interval_seconds", &self.poll_interval_seconds)
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .field("listable", &self.listable)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Bucket ensured on, and used in, every backend
    pub bucket: String,
    pub region: String,
    pub secure: bool,
    pub timeout_seconds: u64,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:3000".to_string(),
        }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            source: DiscoverySource::Static,
            backends: Vec::new(),
            manifest_path: None,
            dns_name: None,
            backend_port: 9000,
            poll_interval_seconds: 30,
            access_key: "minioadmin".to_string(),
            secret_key: "minioadmin".to_string(),
            listable: false,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            bucket: "files".to_string(),
            region: "us-east-1".to_string(),
            secure: false,
            timeout_seconds: 30,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            node: NodeConfig::default(),
            discovery: DiscoveryConfig::default(),
            storage: StorageConfig::default(),
            max_upload_size: 50 * 1024 * 1024, // 50MB
        }
    }
}

impl StorageConfig {
    pub fn s3_options(&self) -> S3Options {
        S3Options {
            bucket: self.bucket.clone(),
            region: self.region.clone(),
            secure: self.secure,
            timeout: Duration::from_secs(self.timeout_seconds),
        }
    }
}

impl DiscoveryConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds)
    }
}

fn flag(value: Option<String>) -> Option<bool> {
    value.map(|v| v == "true" || v == "1")
}

impl Config {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration from an arbitrary variable source.
    pub fn from_lookup<F>(var: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();
        let parsed = |name: &str| var(name).and_then(|s| s.trim().parse::<u64>().ok());

        let bind_address = var("BIND_ADDRESS").unwrap_or(defaults.node.bind_address);

        let max_upload_size = parsed("MAX_UPLOAD_SIZE").unwrap_or(defaults.max_upload_size);

        let source = match var("DISCOVERY_SOURCE")
            .unwrap_or_else(|| "static".to_string())
            .to_lowercase()
            .as_str()
        {
            "static" => DiscoverySource::Static,
            "file" => DiscoverySource::File,
            "dns" => DiscoverySource::Dns,
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "unknown DISCOVERY_SOURCE '{other}' (expected static, file or dns)"
                )))
            }
        };

        let backends: Vec<String> = var("BACKENDS")
            .map(|b| {
                b.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let backend_port = var("BACKEND_PORT")
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(defaults.discovery.backend_port);

        let discovery = DiscoveryConfig {
            source,
            backends,
            manifest_path: var("BACKENDS_FILE"),
            dns_name: var("DISCOVERY_DNS_NAME"),
            backend_port,
            poll_interval_seconds: parsed("DISCOVERY_POLL_INTERVAL")
                .unwrap_or(defaults.discovery.poll_interval_seconds),
            access_key: var("MINIO_ACCESS_KEY").unwrap_or(defaults.discovery.access_key),
            secret_key: var("MINIO_SECRET_KEY").unwrap_or(defaults.discovery.secret_key),
            listable: flag(var("BACKENDS_LISTABLE")).unwrap_or(defaults.discovery.listable),
        };

        let storage = StorageConfig {
            bucket: var("BUCKET_NAME").unwrap_or(defaults.storage.bucket),
            region: var("S3_REGION").unwrap_or(defaults.storage.region),
            secure: flag(var("BACKEND_SECURE")).unwrap_or(defaults.storage.secure),
            timeout_seconds: parsed("BACKEND_TIMEOUT_SECS")
                .unwrap_or(defaults.storage.timeout_seconds),
        };

        let config = Config {
            node: NodeConfig { bind_address },
            discovery,
            storage,
            max_upload_size,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        match self.discovery.source {
            DiscoverySource::File if self.discovery.manifest_path.is_none() => {
                return Err(ConfigError::ValidationError(
                    "BACKENDS_FILE is required when DISCOVERY_SOURCE=file".to_string(),
                ));
            }
            DiscoverySource::Dns if self.discovery.dns_name.is_none() => {
                return Err(ConfigError::ValidationError(
                    "DISCOVERY_DNS_NAME is required when DISCOVERY_SOURCE=dns".to_string(),
                ));
            }
            DiscoverySource::Static if self.discovery.backends.is_empty() => {
                tracing::warn!("BACKENDS is empty. The gateway will start without backends.");
            }
            _ => {}
        }

        if self.discovery.poll_interval_seconds == 0 {
            return Err(ConfigError::ValidationError(
                "DISCOVERY_POLL_INTERVAL must be greater than 0".to_string(),
            ));
        }

        if self.storage.timeout_seconds == 0 {
            return Err(ConfigError::ValidationError(
                "BACKEND_TIMEOUT_SECS must be greater than 0".to_string(),
            ));
        }

        if self.storage.bucket.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "BUCKET_NAME cannot be empty".to_string(),
            ));
        }

        Ok(())
    }
}
