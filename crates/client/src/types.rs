use serde::{Deserialize, Serialize};
use toolshed_core::{InstallStatus, PackageKind};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SoftwareListing {
    pub id: String,
    pub display_name: String,
    pub description: String,
    pub kind: PackageKind,
    pub installed: bool,
    pub version: Option<String>,
    pub status: Option<InstallStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandCheck {
    pub exists: bool,
    pub version: Option<String>,
    pub kind: Option<PackageKind>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanReport {
    #[serde(default)]
    pub detected: Vec<String>,
    #[serde(default)]
    pub removed: Vec<String>,
    #[serde(default)]
    pub failed: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanResponse {
    pub success: bool,
    pub message: String,
    pub report: ScanReport,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateStatus {
    pub has_update: bool,
    pub current_version: String,
    pub latest_version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub version: String,
    pub catalog_entries: usize,
    pub open_channels: usize,
}

#[derive(Debug, Serialize)]
pub(crate) struct InstallBody<'a> {
    pub app_id: &'a str,
    pub kind: PackageKind,
}

#[derive(Debug, Serialize)]
pub(crate) struct CheckCommandBody<'a> {
    pub command: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct UpdateVersionBody<'a> {
    pub version: &'a str,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub message: String,
}
