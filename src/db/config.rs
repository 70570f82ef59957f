//! Engine configuration.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::resource::BackendName;
use crate::storage::{GitSignature, InvalidNameError};

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no data source configured")]
    NotConfigured,

    #[error("invalid configuration json: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid data source name: {0}")]
    InvalidName(#[from] InvalidNameError),

    #[error("data source '{name}': {reason}")]
    Invalid { name: BackendName, reason: String },
}

/// How one named data source is backed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DataSourceConfig {
    Memory,
    Git {
        path: PathBuf,
        #[serde(default = "default_true")]
        create_if_missing: bool,
        #[serde(default)]
        signature: GitSignature,
    },
}

fn default_true() -> bool {
    true
}

impl DataSourceConfig {
    pub fn memory() -> Self {
        DataSourceConfig::Memory
    }

    pub fn git(path: impl Into<PathBuf>) -> Self {
        DataSourceConfig::Git {
            path: path.into(),
            create_if_missing: true,
            signature: GitSignature::default(),
        }
    }
}

/// Configuration for [`Database::open`](crate::db::Database::open).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub data_sources: BTreeMap<BackendName, DataSourceConfig>,
    /// Remove `tx/*` branches left in Git data sources when opening.
    #[serde(default = "default_true")]
    pub cleanup_on_open: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_sources: BTreeMap::new(),
            cleanup_on_open: true,
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// One in-memory data source under the default name.
    pub fn in_memory() -> Self {
        Self::new().with_data_source(BackendName::default_name(), DataSourceConfig::memory())
    }

    pub fn with_data_source(mut self, name: BackendName, source: DataSourceConfig) -> Self {
        self.data_sources.insert(name, source);
        self
    }

    pub fn cleanup_on_open(mut self, value: bool) -> Self {
        self.cleanup_on_open = value;
        self
    }

    pub fn from_json(json: &str) -> ConfigResult<Self> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.data_sources.is_empty() {
            return Err(ConfigError::NotConfigured);
        }
        for (name, source) in &self.data_sources {
            if let DataSourceConfig::Git { path, .. } = source {
                if path.as_os_str().is_empty() {
                    return Err(ConfigError::Invalid {
                        name: name.clone(),
                        reason: "git path is empty".to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}
