//! Read-mostly operations over the catalog, the owner's records and the host.

use std::collections::HashMap;
use std::sync::Arc;

use db::InstalledSoftwareRepository;
use host::PackageManager;
use serde::{Deserialize, Serialize};
use toolshed_core::{Catalog, InstallStatus, InstalledRecord, PackageKind};
use tracing::debug;

use crate::error::{OrchestratorError, Result};
use crate::resources::OwnerLocks;

/// A catalog entry together with the owner's install state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct SoftwareListing {
    pub id: String,
    pub display_name: String,
    pub description: String,
    pub kind: PackageKind,
    pub installed: bool,
    pub version: Option<String>,
    pub status: Option<InstallStatus>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct CommandCheck {
    pub exists: bool,
    pub version: Option<String>,
    /// Set when the reference is a catalog id
    pub kind: Option<PackageKind>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct UpdateStatus {
    pub has_update: bool,
    /// Version on record
    pub current_version: String,
    /// Version the host reports
    pub latest_version: String,
}

#[derive(Clone)]
pub struct SoftwareService {
    catalog: Arc<Catalog>,
    package_manager: Arc<dyn PackageManager>,
    repository: InstalledSoftwareRepository,
    locks: OwnerLocks,
}

impl SoftwareService {
    pub fn new(
        catalog: Arc<Catalog>,
        package_manager: Arc<dyn PackageManager>,
        repository: InstalledSoftwareRepository,
        locks: OwnerLocks,
    ) -> Self {
        Self {
            catalog,
            package_manager,
            repository,
            locks,
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// The whole catalog annotated with the owner's records.
    pub async fn list_software(&self, owner_id: &str) -> Result<Vec<SoftwareListing>> {
        let records: HashMap<String, InstalledRecord> = self
            .repository
            .find_by_owner(owner_id)
            .await?
            .into_iter()
            .map(|r| (r.app_id.clone(), r))
            .collect();

        Ok(self
            .catalog
            .entries()
            .iter()
            .map(|entry| {
                let record = records.get(&entry.id);
                SoftwareListing {
                    id: entry.id.clone(),
                    display_name: entry.display_name.clone(),
                    description: entry.description.clone(),
                    kind: entry.kind,
                    installed: record.is_some(),
                    version: record.map(|r| r.version.clone()),
                    status: record.map(|r| r.status),
                }
            })
            .collect())
    }

    pub async fn list_installed(&self, owner_id: &str) -> Result<Vec<InstalledRecord>> {
        Ok(self.repository.find_by_owner(owner_id).await?)
    }

    /// Check whether a catalog package or a plain command exists on the host.
    pub async fn check_command(&self, reference: &str) -> Result<CommandCheck> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Err(OrchestratorError::Validation(
                "command is required".to_string(),
            ));
        }

        if let Some(entry) = self.catalog.get(reference) {
            let outcome = self
                .package_manager
                .query_installed(&entry.package_name, entry.kind)
                .await?;

            return Ok(CommandCheck {
                exists: outcome.present,
                version: outcome.version,
                kind: Some(entry.kind),
            });
        }

        debug!("{} is not a catalog id, looking it up on PATH", reference);
        let located = self.package_manager.locate_command(reference).await?;

        Ok(CommandCheck {
            exists: located.is_some(),
            version: located.and_then(|info| info.version),
            kind: None,
        })
    }

    /// Compare the recorded version with what the host reports now.
    pub async fn check_updates(&self, owner_id: &str, app_id: &str) -> Result<UpdateStatus> {
        let record = self
            .repository
            .find(owner_id, app_id)
            .await?
            .ok_or_else(|| OrchestratorError::RecordNotFound(app_id.to_string()))?;

        let entry = self
            .catalog
            .get(app_id)
            .ok_or_else(|| OrchestratorError::UnknownApp(app_id.to_string()))?;

        let outcome = self
            .package_manager
            .query_installed(&entry.package_name, entry.kind)
            .await?;
        if !outcome.present {
            return Err(OrchestratorError::NotFoundOnHost(entry.display_name.clone()));
        }

        {
            let _lock = self.locks.lock(owner_id).await;
            self.repository.touch_last_checked(owner_id, app_id).await?;
        }

        let latest_version = outcome.version.unwrap_or_else(|| record.version.clone());
        Ok(UpdateStatus {
            has_update: latest_version != record.version,
            current_version: record.version,
            latest_version,
        })
    }

    pub async fn update_version(
        &self,
        owner_id: &str,
        app_id: &str,
        version: &str,
    ) -> Result<InstalledRecord> {
        let version = version.trim();
        if version.is_empty() {
            return Err(OrchestratorError::Validation(
                "version is required".to_string(),
            ));
        }

        let _lock = self.locks.lock(owner_id).await;
        self.repository
            .update_version(owner_id, app_id, version)
            .await?
            .ok_or_else(|| OrchestratorError::RecordNotFound(app_id.to_string()))
    }

    /// Forget the record. The package stays on the host.
    pub async fn uninstall(&self, owner_id: &str, app_id: &str) -> Result<()> {
        let _lock = self.locks.lock(owner_id).await;
        if !self.repository.delete(owner_id, app_id).await? {
            return Err(OrchestratorError::RecordNotFound(app_id.to_string()));
        }
        Ok(())
    }
}
