use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

use crate::ip::SubnetId;
use crate::store::{IniFileStore, MemoryStore, RecordStore, StoreError};

/// Default location of the record store file
pub const DEFAULT_STORE_PATH: &str = "/tmp/ipam.ini";

const LOG_LEVELS: [&str; 6] = ["off", "error", "warn", "info", "debug", "trace"];

/// Record store backends
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// INI-style file, durable across runs
    #[default]
    File,
    /// Process memory, lost on exit
    Memory,
}

/// Record store settings
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub path: PathBuf,
}

impl StoreConfig {
    /// Open the configured store
    pub fn open(&self) -> Result<Arc<dyn RecordStore>, StoreError> {
        let store: Arc<dyn RecordStore> = match self.backend {
            StoreBackend::File => Arc::new(IniFileStore::open(&self.path)?),
            StoreBackend::Memory => Arc::new(MemoryStore::new()),
        };
        Ok(store)
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::File,
            path: PathBuf::from(DEFAULT_STORE_PATH),
        }
    }
}

/// Top-level configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct Config {
    pub store: StoreConfig,
    /// Subnet used when allocate/deallocate omit the subnet id
    pub default_subnet: u64,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            default_subnet: SubnetId::FIRST.get(),
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.store.backend == StoreBackend::File && self.store.path.as_os_str().is_empty() {
            return Err(ValidationError::InvalidStore(
                "path cannot be empty for the file backend".to_string(),
            ));
        }

        if self.default_subnet == 0 {
            return Err(ValidationError::InvalidDefaultSubnet(
                "subnet ids start at 1".to_string(),
            ));
        }

        if !LOG_LEVELS.contains(&self.log_level.to_ascii_lowercase().as_str()) {
            return Err(ValidationError::InvalidLogLevel(self.log_level.clone()));
        }

        Ok(())
    }

    pub fn default_subnet(&self) -> SubnetId {
        SubnetId::new(self.default_subnet)
    }
}

/// Configuration validation errors
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Invalid store configuration: {0}")]
    InvalidStore(String),
    #[error("Invalid default subnet: {0}")]
    InvalidDefaultSubnet(String),
    #[error("Invalid log level: {0:?}")]
    InvalidLogLevel(String),
}
