//! The `.toolshed/` project directory and its `config.toml`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use server::{IdentityConfig, ServiceConfig};
use toolshed_core::Role;

pub const TOOLSHED_DIR: &str = ".toolshed";
pub const CONFIG_FILE: &str = "config.toml";
pub const DEFAULT_DB_NAME: &str = "toolshed.db";
pub const DEFAULT_PORT: u16 = 3001;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub service: ServiceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub port: u16,
    /// File name inside `.toolshed/`
    pub database: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            database: DEFAULT_DB_NAME.to_string(),
        }
    }
}

impl ProjectConfig {
    /// Fresh config with one admin identity for the local user.
    pub fn bootstrap(user: &str) -> Self {
        let mut config = Self::default();
        config.service.identities.push(IdentityConfig {
            token: uuid::Uuid::new_v4().simple().to_string(),
            owner_id: user.to_string(),
            email: format!("{}@localhost", user),
            name: user.to_string(),
            role: Role::Admin,
        });
        config
    }

    /// Token of the first configured identity.
    pub fn default_token(&self) -> Option<&str> {
        self.service
            .identities
            .first()
            .map(|identity| identity.token.as_str())
    }

    pub fn base_url(&self, port: Option<u16>) -> String {
        format!("http://localhost:{}", port.unwrap_or(self.server.port))
    }
}

/// A directory that may contain `.toolshed/`.
pub struct Project {
    root: PathBuf,
}

impl Project {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn dir(&self) -> PathBuf {
        self.root.join(TOOLSHED_DIR)
    }

    pub fn config_path(&self) -> PathBuf {
        self.dir().join(CONFIG_FILE)
    }

    pub fn is_initialized(&self) -> bool {
        self.dir().exists()
    }

    pub fn database_path(&self, config: &ProjectConfig) -> PathBuf {
        if self.is_initialized() {
            self.dir().join(&config.server.database)
        } else {
            self.root.join(&config.server.database)
        }
    }

    pub fn database_url(&self, config: &ProjectConfig) -> String {
        format!("sqlite:{}", self.database_path(config).display())
    }

    /// Saved config, or defaults when there is no project file.
    pub async fn load(&self) -> Result<ProjectConfig> {
        let path = self.config_path();
        if !path.exists() {
            return Ok(ProjectConfig::default());
        }

        read_config(&path).await
    }

    pub async fn save(&self, config: &ProjectConfig) -> Result<()> {
        tokio::fs::create_dir_all(self.dir()).await?;
        let content = toml::to_string_pretty(config)?;
        tokio::fs::write(self.config_path(), content)
            .await
            .with_context(|| format!("Failed to write {}", self.config_path().display()))?;
        Ok(())
    }
}

async fn read_config(path: &Path) -> Result<ProjectConfig> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    toml::from_str(&content).with_context(|| format!("Invalid config in {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_missing_project_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let project = Project::new(dir.path());

        let config = project.load().await.unwrap();

        assert!(!project.is_initialized());
        assert_eq!(config.server.port, DEFAULT_PORT);
        assert_eq!(project.database_path(&config), dir.path().join(DEFAULT_DB_NAME));
    }

    #[tokio::test]
    async fn test_bootstrap_round_trip() {
        let dir = TempDir::new().unwrap();
        let project = Project::new(dir.path());
        let config = ProjectConfig::bootstrap("ada");

        project.save(&config).await.unwrap();
        let loaded = project.load().await.unwrap();

        assert!(project.is_initialized());
        assert_eq!(loaded.service.identities.len(), 1);
        assert_eq!(loaded.service.identities[0].role, Role::Admin);
        assert_eq!(loaded.default_token(), config.default_token());
        assert_eq!(
            project.database_path(&loaded),
            dir.path().join(TOOLSHED_DIR).join(DEFAULT_DB_NAME)
        );
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let config: ProjectConfig = toml::from_str(
            r#"
            [server]
            port = 4000

            [service]
            scan_interval_secs = 3600
            "#,
        )
        .unwrap();

        assert_eq!(config.server.port, 4000);
        assert_eq!(config.server.database, DEFAULT_DB_NAME);
        assert_eq!(config.service.scan_interval_secs, 3600);
        assert_eq!(config.service.query_timeout_secs, 30);
        assert_eq!(config.base_url(None), "http://localhost:4000");
        assert_eq!(config.base_url(Some(5000)), "http://localhost:5000");
    }
}
