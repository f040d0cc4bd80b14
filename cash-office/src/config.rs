//! Configuration for the cash office

use reconciliation_core::AnomalyConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Cash office configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Service name
    pub service_name: String,

    /// Service version
    pub service_version: String,

    /// Record store
    pub store: StoreConfig,

    /// Local identity provider
    pub identity: IdentityConfig,

    /// Anomaly thresholds
    pub anomaly: AnomalyConfig,

    /// Closing writer
    pub writer: WriterConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service_name: "cash-office".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            store: StoreConfig::default(),
            identity: IdentityConfig::default(),
            anomaly: AnomalyConfig::default(),
            writer: WriterConfig::default(),
        }
    }
}

/// Record store backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// In-process maps, lost on exit
    Memory,
    /// RocksDB under `data_dir` (requires the `rocksdb` feature)
    Rocksdb,
}

/// Record store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Backend
    pub backend: StoreBackend,

    /// Data directory for RocksDB
    pub data_dir: PathBuf,

    /// RocksDB tuning
    pub rocksdb: RocksDBConfig,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            data_dir: PathBuf::from("./data/cash-office"),
            rocksdb: RocksDBConfig::default(),
        }
    }
}

/// RocksDB configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RocksDBConfig {
    /// Write buffer size (MB)
    pub write_buffer_size_mb: usize,

    /// Max write buffers
    pub max_write_buffer_number: i32,

    /// Enable statistics
    pub enable_statistics: bool,
}

impl Default for RocksDBConfig {
    fn default() -> Self {
        Self {
            write_buffer_size_mb: 16,
            max_write_buffer_number: 2,
            enable_statistics: false,
        }
    }
}

/// Local identity provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// New identities must confirm their e-mail before signing in
    pub require_email_confirmation: bool,

    /// Session lifetime (minutes)
    pub session_ttl_minutes: i64,

    /// Minimum password length
    pub min_password_length: usize,

    /// Argon2 memory cost (KiB)
    pub hash_memory_kib: u32,

    /// Argon2 iterations
    pub hash_iterations: u32,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            require_email_confirmation: true,
            session_ttl_minutes: 12 * 60, // one shift
            min_password_length: 8,
            hash_memory_kib: 19 * 1024,
            hash_iterations: 2,
        }
    }
}

/// Closing writer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WriterConfig {
    /// Mailbox capacity (pending writes before callers wait)
    pub mailbox_capacity: usize,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            mailbox_capacity: 256,
        }
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Config::default();

        if let Ok(data_dir) = std::env::var("CASH_OFFICE_DATA_DIR") {
            config.store.data_dir = PathBuf::from(data_dir);
        }

        if let Ok(backend) = std::env::var("CASH_OFFICE_STORE") {
            config.store.backend = match backend.to_ascii_lowercase().as_str() {
                "memory" => StoreBackend::Memory,
                "rocksdb" => StoreBackend::Rocksdb,
                other => {
                    return Err(crate::Error::Config(format!(
                        "CASH_OFFICE_STORE must be memory or rocksdb, got {:?}",
                        other
                    )))
                }
            };
        }

        if let Ok(value) = std::env::var("CASH_OFFICE_REQUIRE_EMAIL_CONFIRMATION") {
            config.identity.require_email_confirmation = value.parse().map_err(|_| {
                crate::Error::Config(format!(
                    "CASH_OFFICE_REQUIRE_EMAIL_CONFIRMATION must be true or false, got {:?}",
                    value
                ))
            })?;
        }

        if let Ok(value) = std::env::var("CASH_OFFICE_SESSION_TTL_MINUTES") {
            config.identity.session_ttl_minutes = value.parse().map_err(|_| {
                crate::Error::Config(format!(
                    "CASH_OFFICE_SESSION_TTL_MINUTES must be an integer, got {:?}",
                    value
                ))
            })?;
        }

        Ok(config)
    }
}
