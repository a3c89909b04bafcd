use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::{CatalogEntry, Identity, PackageKind};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, ToSchema)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "snake_case")]
pub enum InstallStatus {
    #[default]
    Installed,
    Pending,
    Failed,
}

impl InstallStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Installed => "installed",
            Self::Pending => "pending",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "installed" => Some(Self::Installed),
            "pending" => Some(Self::Pending),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// Persisted fact that an owner has a catalog entry installed.
///
/// At most one record exists per `(owner_id, app_id)`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct InstalledRecord {
    pub id: Uuid,
    pub owner_id: String,
    pub owner_email: String,
    pub owner_name: String,
    pub app_id: String,
    pub display_name: String,
    pub version: String,
    pub package_kind: PackageKind,
    pub status: InstallStatus,
    pub installed_at: DateTime<Utc>,
    pub last_checked: DateTime<Utc>,
}

impl InstalledRecord {
    /// A fresh `Installed` record for `owner` and `entry`.
    pub fn installed(owner: &Identity, entry: &CatalogEntry, version: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            owner_id: owner.owner_id.clone(),
            owner_email: owner.email.clone(),
            owner_name: owner.name.clone(),
            app_id: entry.id.clone(),
            display_name: entry.display_name.clone(),
            version: version.into(),
            package_kind: entry.kind,
            status: InstallStatus::Installed,
            installed_at: now,
            last_checked: now,
        }
    }

    pub fn owner(&self) -> Identity {
        Identity::new(
            self.owner_id.clone(),
            self.owner_email.clone(),
            self.owner_name.clone(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_installed_record_creation() {
        let owner = Identity::new("user-1", "ada@example.com", "Ada");
        let entry = CatalogEntry::new("git", "Git", PackageKind::Formula);

        let record = InstalledRecord::installed(&owner, &entry, "2.45.0");

        assert_eq!(record.owner_id, "user-1");
        assert_eq!(record.app_id, "git");
        assert_eq!(record.display_name, "Git");
        assert_eq!(record.version, "2.45.0");
        assert_eq!(record.status, InstallStatus::Installed);
        assert_eq!(record.installed_at, record.last_checked);
    }

    #[test]
    fn test_install_status_round_trip_names() {
        for status in [
            InstallStatus::Installed,
            InstallStatus::Pending,
            InstallStatus::Failed,
        ] {
            assert_eq!(InstallStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(InstallStatus::parse("removed"), None);
    }

    #[test]
    fn test_record_owner_identity() {
        let owner = Identity::new("user-2", "grace@example.com", "Grace");
        let entry = CatalogEntry::new("figma", "Figma", PackageKind::Cask);
        let record = InstalledRecord::installed(&owner, &entry, "124.1");

        assert_eq!(record.owner(), owner);
    }
}
