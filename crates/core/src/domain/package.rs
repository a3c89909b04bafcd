use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// How the host package manager ships a package.
///
/// Every adapter call site matches on this exhaustively, so adding a kind
/// forces each consumer to decide how to handle it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, ToSchema)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "snake_case")]
pub enum PackageKind {
    /// Command-line package
    Formula,
    /// GUI application bundle
    Cask,
}

impl PackageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Formula => "formula",
            Self::Cask => "cask",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "formula" => Some(Self::Formula),
            "cask" => Some(Self::Cask),
            _ => None,
        }
    }
}

impl std::fmt::Display for PackageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
