use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::fs;
use toolshed_core::{Catalog, CoreError, Role};
use tracing::debug;

use events::ChannelConfig;
use host::HomebrewConfig;
use orchestrator::{InstallConfig, ScanConfig};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid catalog: {0}")]
    Catalog(#[from] CoreError),
}

/// A credential accepted by the static token verifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityConfig {
    pub token: String,
    pub owner_id: String,
    pub email: String,
    pub name: String,
    #[serde(default)]
    pub role: Role,
}

/// Service settings, read from the `[service]` table of the project config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub brew_path: PathBuf,
    pub application_dirs: Vec<PathBuf>,
    /// Budget for a single `brew install`
    pub command_timeout_secs: u64,
    /// Budget for each read-only package query
    pub query_timeout_secs: u64,
    /// Overall install budget, also the progress channel lifetime
    pub install_timeout_secs: u64,
    pub heartbeat_interval_secs: u64,
    pub scan_concurrency: usize,
    /// Periodic reconciliation interval; 0 disables it
    pub scan_interval_secs: u64,
    pub default_version: String,
    /// TOML catalog replacing the built-in one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub catalog_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub identities: Vec<IdentityConfig>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        let homebrew = HomebrewConfig::default();

        Self {
            brew_path: homebrew.brew_path,
            application_dirs: homebrew.application_dirs,
            command_timeout_secs: 300,
            query_timeout_secs: 30,
            install_timeout_secs: 300,
            heartbeat_interval_secs: 10,
            scan_concurrency: 4,
            scan_interval_secs: 0,
            default_version: orchestrator::installer::DEFAULT_VERSION.to_string(),
            catalog_path: None,
            identities: Vec::new(),
        }
    }
}

impl ServiceConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;

        debug!(path = %path.display(), "Service config loaded");
        Self::from_toml_str(&content)
    }

    pub fn load_catalog(&self) -> Result<Catalog, ConfigError> {
        let catalog = match &self.catalog_path {
            Some(path) => Catalog::load(path)?,
            None => Catalog::builtin()?,
        };
        Ok(catalog)
    }

    pub fn homebrew_config(&self) -> HomebrewConfig {
        HomebrewConfig {
            brew_path: self.brew_path.clone(),
            application_dirs: self.application_dirs.clone(),
            install_timeout: Duration::from_secs(self.command_timeout_secs),
            query_timeout: Duration::from_secs(self.query_timeout_secs),
        }
    }

    pub fn install_config(&self) -> InstallConfig {
        InstallConfig {
            install_timeout: Duration::from_secs(self.install_timeout_secs),
            default_version: self.default_version.clone(),
        }
    }

    pub fn scan_config(&self) -> ScanConfig {
        ScanConfig {
            concurrency: self.scan_concurrency.max(1),
            query_timeout: Duration::from_secs(self.query_timeout_secs),
            default_version: self.default_version.clone(),
        }
    }

    pub fn channel_config(&self) -> ChannelConfig {
        ChannelConfig {
            heartbeat_interval: Duration::from_secs(self.heartbeat_interval_secs.max(1)),
            timeout: Duration::from_secs(self.install_timeout_secs),
        }
    }

    pub fn scan_interval(&self) -> Option<Duration> {
        (self.scan_interval_secs > 0).then(|| Duration::from_secs(self.scan_interval_secs))
    }
}
