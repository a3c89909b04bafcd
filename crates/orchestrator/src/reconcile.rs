use std::sync::Arc;
use std::time::Duration;

use db::InstalledSoftwareRepository;
use futures::stream::{self, StreamExt};
use host::{HostError, PackageManager, QueryOutcome};
use serde::{Deserialize, Serialize};
use toolshed_core::{Catalog, CatalogEntry, Identity, InstalledRecord};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::installer::DEFAULT_VERSION;
use crate::resources::OwnerLocks;

#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Catalog queries in flight at once
    pub concurrency: usize,
    /// Budget for each individual query
    pub query_timeout: Duration,
    pub default_version: String,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            query_timeout: Duration::from_secs(30),
            default_version: DEFAULT_VERSION.to_string(),
        }
    }
}

/// Result of reconciling one owner against the host.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct ScanReport {
    /// App ids the host reports present
    pub detected: Vec<String>,
    /// Records deleted because the host no longer reports them
    pub removed: Vec<String>,
    /// App ids whose query failed; their records were left untouched
    pub failed: Vec<String>,
}

impl ScanReport {
    pub fn success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Makes an owner's persisted records match what the host reports.
#[derive(Clone)]
pub struct Reconciler {
    catalog: Arc<Catalog>,
    package_manager: Arc<dyn PackageManager>,
    repository: InstalledSoftwareRepository,
    locks: OwnerLocks,
    config: ScanConfig,
}

impl Reconciler {
    pub fn new(
        catalog: Arc<Catalog>,
        package_manager: Arc<dyn PackageManager>,
        repository: InstalledSoftwareRepository,
        locks: OwnerLocks,
        config: ScanConfig,
    ) -> Self {
        Self {
            catalog,
            package_manager,
            repository,
            locks,
            config,
        }
    }

    /// Query every catalog entry, then rewrite the owner's records to match.
    ///
    /// Query failures are tolerated: the entry is reported in
    /// [`ScanReport::failed`] and its existing record is kept.
    pub async fn scan(&self, owner: &Identity) -> Result<ScanReport> {
        info!(
            owner_id = %owner.owner_id,
            entries = self.catalog.len(),
            "Starting software scan"
        );

        let mut detected = Vec::new();
        let mut report = ScanReport::default();

        let results = self.query_all(self.catalog.entries().to_vec()).await;
        for (entry, result) in results {
            self.record_result(owner, &entry, result, &mut detected, &mut report);
        }

        let outcome = {
            let _lock = self.locks.lock(&owner.owner_id).await;
            self.recheck_missing(owner, &mut detected, &mut report)
                .await?;

            report.detected.sort();
            report.failed.sort();
            detected.sort_by(|a, b| a.app_id.cmp(&b.app_id));

            self.repository
                .reconcile_owner(&owner.owner_id, &detected, &report.failed)
                .await?
        };
        report.removed = outcome.removed;

        info!(
            owner_id = %owner.owner_id,
            detected = report.detected.len(),
            removed = report.removed.len(),
            failed = report.failed.len(),
            "Software scan finished"
        );

        Ok(report)
    }

    /// Scan every owner that currently has records.
    pub async fn scan_known_owners(&self) -> Result<Vec<(String, Result<ScanReport>)>> {
        let owners = self.repository.find_owners().await?;
        let mut reports = Vec::with_capacity(owners.len());

        for owner in owners {
            let report = self.scan(&owner).await;
            reports.push((owner.owner_id, report));
        }

        Ok(reports)
    }

    /// Query the host again for records the snapshot would delete.
    ///
    /// Runs under the owner lock. An install that persisted while the
    /// snapshot was being taken shows up here as present and is kept.
    async fn recheck_missing(
        &self,
        owner: &Identity,
        detected: &mut Vec<InstalledRecord>,
        report: &mut ScanReport,
    ) -> Result<()> {
        let missing: Vec<CatalogEntry> = self
            .repository
            .find_by_owner(&owner.owner_id)
            .await?
            .into_iter()
            .filter(|record| {
                !report.detected.contains(&record.app_id) && !report.failed.contains(&record.app_id)
            })
            .filter_map(|record| self.catalog.get(&record.app_id).cloned())
            .collect();

        if missing.is_empty() {
            return Ok(());
        }

        debug!(
            owner_id = %owner.owner_id,
            candidates = missing.len(),
            "Re-checking records before removal"
        );

        for (entry, result) in self.query_all(missing).await {
            self.record_result(owner, &entry, result, detected, report);
        }

        Ok(())
    }

    async fn query_all(
        &self,
        entries: Vec<CatalogEntry>,
    ) -> Vec<(CatalogEntry, std::result::Result<QueryOutcome, HostError>)> {
        stream::iter(entries)
            .map(|entry| {
                let this = self.clone();
                async move {
                    let result = this.query(&entry).await;
                    (entry, result)
                }
            })
            .buffer_unordered(self.config.concurrency.max(1))
            .collect()
            .await
    }

    fn record_result(
        &self,
        owner: &Identity,
        entry: &CatalogEntry,
        result: std::result::Result<QueryOutcome, HostError>,
        detected: &mut Vec<InstalledRecord>,
        report: &mut ScanReport,
    ) {
        match result {
            Ok(outcome) if outcome.present => {
                let version = outcome
                    .version
                    .unwrap_or_else(|| self.config.default_version.clone());
                debug!(app_id = %entry.id, version = %version, "Detected");
                detected.push(InstalledRecord::installed(owner, entry, version));
                report.detected.push(entry.id.clone());
            }
            Ok(_) => {}
            Err(e) => {
                warn!(
                    owner_id = %owner.owner_id,
                    app_id = %entry.id,
                    error = %e,
                    "Scan query failed"
                );
                report.failed.push(entry.id.clone());
            }
        }
    }

    async fn query(&self, entry: &CatalogEntry) -> std::result::Result<QueryOutcome, HostError> {
        let budget = self.config.query_timeout;

        tokio::time::timeout(
            budget,
            self.package_manager
                .query_installed(&entry.package_name, entry.kind),
        )
        .await
        .unwrap_or_else(|_| {
            Err(HostError::Timeout {
                command: format!("query {}", entry.package_name),
                secs: budget.as_secs(),
            })
        })
    }
}
