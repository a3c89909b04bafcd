use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use toolshed_core::PackageKind;
use utoipa::ToSchema;

use crate::error::Result;

/// What the package manager reports for one package.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct QueryOutcome {
    pub present: bool,
    pub version: Option<String>,
}

impl QueryOutcome {
    pub fn present(version: impl Into<String>) -> Self {
        Self {
            present: true,
            version: Some(version.into()),
        }
    }

    pub fn absent() -> Self {
        Self::default()
    }
}

/// An executable found on `PATH`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct CommandInfo {
    #[schema(value_type = String)]
    #[cfg_attr(feature = "typescript", ts(type = "string"))]
    pub path: PathBuf,
    pub version: Option<String>,
}

/// Adapter over the host package manager.
///
/// Every call is time-bounded and returns a classified [`HostError`] rather
/// than folding failures into "not present".
///
/// [`HostError`]: crate::HostError
#[async_trait]
pub trait PackageManager: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Whether `package` is installed, and at which version.
    async fn query_installed(&self, package: &str, kind: PackageKind) -> Result<QueryOutcome>;

    /// Whether the package manager knows `package` at all.
    async fn package_exists(&self, package: &str, kind: PackageKind) -> Result<bool>;

    /// Install `package`, returning the raw command output.
    async fn install(&self, package: &str, kind: PackageKind) -> Result<String>;

    /// Confirm an installed package is actually on disk.
    ///
    /// Only meaningful for casks; formulae always report `true`.
    async fn verify_presence(
        &self,
        display_name: &str,
        package: &str,
        kind: PackageKind,
    ) -> Result<bool>;

    /// Resolve an executable on `PATH` and read its version.
    async fn locate_command(&self, command: &str) -> Result<Option<CommandInfo>>;
}
