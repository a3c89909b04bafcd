use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::PackageKind;
use crate::error::{CoreError, Result};

const BUILTIN_CATALOG: &str = include_str!("../../catalog/default.toml");

/// A single installable tool definition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct CatalogEntry {
    pub id: String,
    pub display_name: String,
    pub description: String,
    /// Name used when talking to the host package manager
    pub package_name: String,
    pub kind: PackageKind,
}

impl CatalogEntry {
    pub fn new(
        id: impl Into<String>,
        display_name: impl Into<String>,
        kind: PackageKind,
    ) -> Self {
        let id = id.into();
        Self {
            package_name: id.clone(),
            id,
            display_name: display_name.into(),
            description: String::new(),
            kind,
        }
    }

    pub fn with_package_name(mut self, package_name: impl Into<String>) -> Self {
        self.package_name = package_name.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    entries: Vec<CatalogFileEntry>,
}

#[derive(Debug, Deserialize)]
struct CatalogFileEntry {
    id: String,
    display_name: String,
    #[serde(default)]
    description: String,
    package_name: Option<String>,
    kind: PackageKind,
}

impl From<CatalogFileEntry> for CatalogEntry {
    fn from(raw: CatalogFileEntry) -> Self {
        Self {
            package_name: raw.package_name.unwrap_or_else(|| raw.id.clone()),
            id: raw.id,
            display_name: raw.display_name,
            description: raw.description,
            kind: raw.kind,
        }
    }
}

/// Read-only catalog of installable tools, loaded once and shared.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    entries: Vec<CatalogEntry>,
    index: HashMap<String, usize>,
}

impl Catalog {
    pub fn new(entries: Vec<CatalogEntry>) -> Result<Self> {
        let mut index = HashMap::with_capacity(entries.len());

        for (position, entry) in entries.iter().enumerate() {
            if entry.id.trim().is_empty() {
                return Err(CoreError::Validation(
                    "Catalog entry id cannot be empty".to_string(),
                ));
            }
            if entry.package_name.trim().is_empty() {
                return Err(CoreError::Validation(format!(
                    "Catalog entry {} has an empty package name",
                    entry.id
                )));
            }
            if index.insert(entry.id.clone(), position).is_some() {
                return Err(CoreError::DuplicateCatalogEntry(entry.id.clone()));
            }
        }

        Ok(Self { entries, index })
    }

    /// The catalog compiled into the binary.
    pub fn builtin() -> Result<Self> {
        Self::from_toml_str(BUILTIN_CATALOG)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let file: CatalogFile = toml::from_str(content)?;
        Self::new(file.entries.into_iter().map(CatalogEntry::from).collect())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn get(&self, id: &str) -> Option<&CatalogEntry> {
        self.index.get(id).map(|&position| &self.entries[position])
    }

    pub fn package_name(&self, id: &str) -> Option<&str> {
        self.get(id).map(|entry| entry.package_name.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
