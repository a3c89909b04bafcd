use std::sync::Arc;

use db::InstalledSoftwareRepository;
use events::ProgressChannels;
use host::{Homebrew, PackageManager};
use orchestrator::{InstallOrchestrator, OwnerLocks, Reconciler, SoftwareService};
use sqlx::SqlitePool;
use toolshed_core::Catalog;

use crate::auth::{StaticTokenVerifier, TokenVerifier};
use crate::config::{ConfigError, ServiceConfig};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServiceConfig>,
    pub catalog: Arc<Catalog>,
    pub repository: InstalledSoftwareRepository,
    pub channels: ProgressChannels,
    pub installer: InstallOrchestrator,
    pub reconciler: Reconciler,
    pub software: SoftwareService,
    pub verifier: Arc<dyn TokenVerifier>,
}

impl AppState {
    pub fn new(
        pool: SqlitePool,
        config: ServiceConfig,
        catalog: Catalog,
        package_manager: Arc<dyn PackageManager>,
        verifier: Arc<dyn TokenVerifier>,
    ) -> Self {
        let catalog = Arc::new(catalog);
        let repository = InstalledSoftwareRepository::new(pool);
        let channels = ProgressChannels::new(config.channel_config());
        let locks = OwnerLocks::new();

        let installer = InstallOrchestrator::new(
            catalog.clone(),
            package_manager.clone(),
            repository.clone(),
            channels.clone(),
            locks.clone(),
            config.install_config(),
        );

        let reconciler = Reconciler::new(
            catalog.clone(),
            package_manager.clone(),
            repository.clone(),
            locks.clone(),
            config.scan_config(),
        );

        let software = SoftwareService::new(
            catalog.clone(),
            package_manager,
            repository.clone(),
            locks,
        );

        Self {
            config: Arc::new(config),
            catalog,
            repository,
            channels,
            installer,
            reconciler,
            software,
            verifier,
        }
    }

    /// State backed by the local `brew` and the config's token table.
    pub fn from_config(pool: SqlitePool, config: ServiceConfig) -> Result<Self, ConfigError> {
        let catalog = config.load_catalog()?;
        let package_manager: Arc<dyn PackageManager> =
            Arc::new(Homebrew::new(config.homebrew_config()));
        let verifier: Arc<dyn TokenVerifier> =
            Arc::new(StaticTokenVerifier::from_config(&config.identities));

        Ok(Self::new(pool, config, catalog, package_manager, verifier))
    }
}
