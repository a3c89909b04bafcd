use chrono::{DateTime, TimeZone, Utc};
use toolshed_core::{InstallStatus, InstalledRecord, PackageKind};
use uuid::Uuid;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct InstalledRow {
    pub id: String,
    pub owner_id: String,
    pub owner_email: String,
    pub owner_name: String,
    pub app_id: String,
    pub display_name: String,
    pub version: String,
    pub package_kind: String,
    pub status: String,
    pub installed_at: i64,
    pub last_checked: i64,
}

impl InstalledRow {
    pub fn into_domain(self) -> InstalledRecord {
        InstalledRecord {
            id: Uuid::parse_str(&self.id).unwrap_or_default(),
            owner_id: self.owner_id,
            owner_email: self.owner_email,
            owner_name: self.owner_name,
            app_id: self.app_id,
            display_name: self.display_name,
            version: self.version,
            package_kind: PackageKind::parse(&self.package_kind).unwrap_or(PackageKind::Formula),
            status: InstallStatus::parse(&self.status).unwrap_or_default(),
            installed_at: timestamp_to_datetime(self.installed_at),
            last_checked: timestamp_to_datetime(self.last_checked),
        }
    }
}

impl From<&InstalledRecord> for InstalledRow {
    fn from(record: &InstalledRecord) -> Self {
        Self {
            id: record.id.to_string(),
            owner_id: record.owner_id.clone(),
            owner_email: record.owner_email.clone(),
            owner_name: record.owner_name.clone(),
            app_id: record.app_id.clone(),
            display_name: record.display_name.clone(),
            version: record.version.clone(),
            package_kind: record.package_kind.as_str().to_string(),
            status: record.status.as_str().to_string(),
            installed_at: datetime_to_timestamp(record.installed_at),
            last_checked: datetime_to_timestamp(record.last_checked),
        }
    }
}

fn timestamp_to_datetime(ts: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(ts, 0).single().unwrap_or_default()
}

fn datetime_to_timestamp(dt: DateTime<Utc>) -> i64 {
    dt.timestamp()
}
