use std::sync::Arc;
use std::time::Duration;

use db::InstalledSoftwareRepository;
use events::ProgressChannels;
use host::{HostError, PackageManager};
use serde::{Deserialize, Serialize};
use toolshed_core::{Catalog, CatalogEntry, Identity, InstalledRecord, PackageKind};
use tokio::time::Instant;
use tracing::{info, warn};

use crate::error::{OrchestratorError, Result};
use crate::resources::{InFlightInstalls, OwnerLocks, ProgressReporter};
use crate::state_machine::{InstallPhase, InstallRun};

pub const DEFAULT_VERSION: &str = "1.0.0";

#[derive(Debug, Clone)]
pub struct InstallConfig {
    /// Budget from the existence check to the persisted record. An open
    /// progress channel whose deadline falls earlier shortens it.
    pub install_timeout: Duration,
    /// Recorded when the host cannot report a version
    pub default_version: String,
}

impl Default for InstallConfig {
    fn default() -> Self {
        Self {
            install_timeout: Duration::from_secs(300),
            default_version: DEFAULT_VERSION.to_string(),
        }
    }
}

/// What the caller asks to install, and the kind they believe it is.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct InstallRequest {
    pub app_id: String,
    pub kind: PackageKind,
}

impl InstallRequest {
    pub fn new(app_id: impl Into<String>, kind: PackageKind) -> Self {
        Self {
            app_id: app_id.into(),
            kind,
        }
    }
}

/// Drives one install request from validation to a persisted record,
/// reporting milestones on the owner's progress channel.
#[derive(Clone)]
pub struct InstallOrchestrator {
    catalog: Arc<Catalog>,
    package_manager: Arc<dyn PackageManager>,
    repository: InstalledSoftwareRepository,
    channels: ProgressChannels,
    in_flight: InFlightInstalls,
    locks: OwnerLocks,
    config: InstallConfig,
}

impl InstallOrchestrator {
    pub fn new(
        catalog: Arc<Catalog>,
        package_manager: Arc<dyn PackageManager>,
        repository: InstalledSoftwareRepository,
        channels: ProgressChannels,
        locks: OwnerLocks,
        config: InstallConfig,
    ) -> Self {
        Self {
            catalog,
            package_manager,
            repository,
            channels,
            in_flight: InFlightInstalls::new(),
            locks,
            config,
        }
    }

    pub fn is_installing(&self, owner_id: &str) -> bool {
        self.in_flight.is_installing(owner_id)
    }

    pub async fn install(
        &self,
        owner: &Identity,
        request: &InstallRequest,
    ) -> Result<InstalledRecord> {
        let mut run = InstallRun::new(&owner.owner_id, &request.app_id);

        run.advance(InstallPhase::Validating)?;
        let entry = match self.validate(request) {
            Ok(entry) => entry,
            Err(e) => {
                run.fail();
                return Err(e);
            }
        };

        let Some(_slot) = self.in_flight.try_acquire(&owner.owner_id) else {
            run.fail();
            return Err(OrchestratorError::InstallInProgress(owner.owner_id.clone()));
        };

        if self
            .repository
            .exists(&owner.owner_id, &entry.id)
            .await?
        {
            run.fail();
            return Err(OrchestratorError::AlreadyInstalled(entry.display_name.clone()));
        }

        info!(
            owner_id = %owner.owner_id,
            app_id = %entry.id,
            kind = %entry.kind,
            "Starting install"
        );

        let deadline = self.deadline_for(&owner.owner_id);
        let mut reporter = ProgressReporter::new(&owner.owner_id, self.channels.clone());

        let outcome = tokio::time::timeout_at(
            deadline,
            self.run_on_host(&mut run, &mut reporter, &entry),
        )
        .await
        .unwrap_or_else(|_| Err(OrchestratorError::install_timed_out()));

        let result = match outcome {
            Ok(version) => self.persist(&mut run, owner, &entry, version, deadline).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(record) => {
                reporter.complete(format!(
                    "{} {} installed successfully",
                    record.display_name, record.version
                ));
                info!(
                    owner_id = %owner.owner_id,
                    app_id = %entry.id,
                    version = %record.version,
                    "Install complete"
                );
                Ok(record)
            }
            Err(e) => {
                run.fail();
                warn!(
                    owner_id = %owner.owner_id,
                    app_id = %entry.id,
                    error = %e,
                    "Install failed"
                );
                reporter.fail(e.to_string());
                Err(e)
            }
        }
    }

    /// The install budget, cut short by the owner's channel deadline.
    fn deadline_for(&self, owner_id: &str) -> Instant {
        let budget = Instant::now() + self.config.install_timeout;
        match self.channels.deadline(owner_id) {
            Some(channel) => budget.min(channel),
            None => budget,
        }
    }

    fn validate(&self, request: &InstallRequest) -> Result<CatalogEntry> {
        let app_id = request.app_id.trim();
        if app_id.is_empty() {
            return Err(OrchestratorError::Validation("app_id is required".to_string()));
        }

        let entry = self
            .catalog
            .get(app_id)
            .ok_or_else(|| OrchestratorError::UnknownApp(app_id.to_string()))?;

        if entry.kind != request.kind {
            return Err(OrchestratorError::Validation(
                "invalid package type".to_string(),
            ));
        }

        Ok(entry.clone())
    }

    /// Check, install and verify; returns the version to record.
    async fn run_on_host(
        &self,
        run: &mut InstallRun,
        reporter: &mut ProgressReporter,
        entry: &CatalogEntry,
    ) -> Result<String> {
        let pm = &self.package_manager;
        let package = entry.package_name.as_str();

        run.advance(InstallPhase::CheckingExistence)?;
        reporter.progress(
            10,
            "Checking",
            format!("Checking whether {} is installed", entry.display_name),
        );

        let current = pm.query_installed(package, entry.kind).await?;
        if current.present {
            run.advance(InstallPhase::AlreadyInstalled)?;
            info!(app_id = %entry.id, "Already present on host, recording it");
            return Ok(current
                .version
                .unwrap_or_else(|| self.config.default_version.clone()));
        }

        if !pm.package_exists(package, entry.kind).await? {
            run.advance(InstallPhase::NotFoundOnHost)?;
            return Err(OrchestratorError::NotFoundOnHost(entry.display_name.clone()));
        }

        run.advance(InstallPhase::Installing)?;
        reporter.progress(
            30,
            "Downloading",
            format!("Downloading {}", entry.display_name),
        );

        match pm.install(package, entry.kind).await {
            Ok(_) => {}
            Err(HostError::AlreadyInstalled(message)) => {
                info!(app_id = %entry.id, "{}", message);
            }
            Err(e) => return Err(e.into()),
        }

        reporter.progress(
            70,
            "Installing",
            format!("Finishing installation of {}", entry.display_name),
        );

        match entry.kind {
            PackageKind::Cask => {
                run.advance(InstallPhase::VerifyingPresence)?;
                if !pm
                    .verify_presence(&entry.display_name, package, entry.kind)
                    .await?
                {
                    return Err(OrchestratorError::VerificationFailed(
                        entry.display_name.clone(),
                    ));
                }
            }
            PackageKind::Formula => {}
        }

        let version = match pm.query_installed(package, entry.kind).await {
            Ok(outcome) => outcome.version,
            Err(e) => {
                warn!(app_id = %entry.id, error = %e, "Could not read installed version");
                None
            }
        };

        Ok(version.unwrap_or_else(|| self.config.default_version.clone()))
    }

    async fn persist(
        &self,
        run: &mut InstallRun,
        owner: &Identity,
        entry: &CatalogEntry,
        version: String,
        deadline: Instant,
    ) -> Result<InstalledRecord> {
        let _lock = tokio::time::timeout_at(deadline, self.locks.lock(&owner.owner_id))
            .await
            .map_err(|_| OrchestratorError::install_timed_out())?;

        // The client was already told the install timed out.
        if Instant::now() >= deadline {
            return Err(OrchestratorError::install_timed_out());
        }

        run.advance(InstallPhase::Persisting)?;
        let record = self
            .repository
            .upsert(&InstalledRecord::installed(owner, entry, version))
            .await?;

        run.advance(InstallPhase::Complete)?;
        Ok(record)
    }
}
