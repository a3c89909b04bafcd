//! In-memory package manager for deterministic tests

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use toolshed_core::PackageKind;

use crate::error::{HostError, Result};
use crate::traits::{CommandInfo, PackageManager, QueryOutcome};

#[derive(Debug, Clone)]
enum PackageState {
    Installed(String),
    /// Known to the package manager; installing yields this version
    Available(String),
}

#[derive(Default)]
struct ScriptState {
    packages: HashMap<String, PackageState>,
    install_failures: HashMap<String, HostError>,
    query_failures: HashMap<String, HostError>,
    hidden_apps: HashSet<String>,
    commands: HashMap<String, CommandInfo>,
    install_delay: Option<Duration>,
    query_delay: Option<Duration>,
    package_query_delays: HashMap<String, Duration>,
    install_calls: Vec<String>,
    query_calls: usize,
}

/// Scripted [`PackageManager`]: packages are either installed, available, or
/// unknown, and failures can be injected per package.
#[derive(Default)]
pub struct ScriptedPackageManager {
    state: Mutex<ScriptState>,
}

impl ScriptedPackageManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, ScriptState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn with_installed(self, package: &str, version: &str) -> Self {
        self.set_installed(package, version);
        self
    }

    pub fn with_available(self, package: &str, version: &str) -> Self {
        self.set_available(package, version);
        self
    }

    pub fn set_installed(&self, package: &str, version: &str) {
        self.state().packages.insert(
            package.to_string(),
            PackageState::Installed(version.to_string()),
        );
    }

    pub fn set_available(&self, package: &str, version: &str) {
        self.state().packages.insert(
            package.to_string(),
            PackageState::Available(version.to_string()),
        );
    }

    /// Forget `package` entirely
    pub fn remove(&self, package: &str) {
        self.state().packages.remove(package);
    }

    pub fn fail_install(&self, package: &str, error: HostError) {
        self.state()
            .install_failures
            .insert(package.to_string(), error);
    }

    pub fn fail_query(&self, package: &str, error: HostError) {
        self.state().query_failures.insert(package.to_string(), error);
    }

    /// Make the cask bundle check fail for `package` even when installed
    pub fn hide_app(&self, package: &str) {
        self.state().hidden_apps.insert(package.to_string());
    }

    pub fn add_command(&self, command: &str, version: Option<&str>) {
        self.state().commands.insert(
            command.to_string(),
            CommandInfo {
                path: PathBuf::from(format!("/usr/local/bin/{}", command)),
                version: version.map(str::to_string),
            },
        );
    }

    pub fn set_install_delay(&self, delay: Duration) {
        self.state().install_delay = Some(delay);
    }

    pub fn set_query_delay(&self, delay: Duration) {
        self.state().query_delay = Some(delay);
    }

    /// Slow down queries for one package only; overrides [`Self::set_query_delay`]
    pub fn set_query_delay_for(&self, package: &str, delay: Duration) {
        self.state()
            .package_query_delays
            .insert(package.to_string(), delay);
    }

    pub fn install_calls(&self) -> usize {
        self.state().install_calls.len()
    }

    pub fn installed_packages(&self) -> Vec<String> {
        self.state().install_calls.clone()
    }

    pub fn query_calls(&self) -> usize {
        self.state().query_calls
    }

    pub fn is_installed(&self, package: &str) -> bool {
        matches!(
            self.state().packages.get(package),
            Some(PackageState::Installed(_))
        )
    }
}

#[async_trait]
impl PackageManager for ScriptedPackageManager {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn query_installed(&self, package: &str, _kind: PackageKind) -> Result<QueryOutcome> {
        let delay = {
            let mut state = self.state();
            state.query_calls += 1;
            state
                .package_query_delays
                .get(package)
                .copied()
                .or(state.query_delay)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let state = self.state();
        if let Some(error) = state.query_failures.get(package) {
            return Err(error.clone());
        }

        Ok(match state.packages.get(package) {
            Some(PackageState::Installed(version)) => QueryOutcome::present(version.clone()),
            _ => QueryOutcome::absent(),
        })
    }

    async fn package_exists(&self, package: &str, _kind: PackageKind) -> Result<bool> {
        Ok(self.state().packages.contains_key(package))
    }

    async fn install(&self, package: &str, _kind: PackageKind) -> Result<String> {
        let delay = {
            let mut state = self.state();
            state.install_calls.push(package.to_string());
            state.install_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state();
        if let Some(error) = state.install_failures.get(package) {
            return Err(error.clone());
        }

        match state.packages.get(package).cloned() {
            Some(PackageState::Available(version)) => {
                state
                    .packages
                    .insert(package.to_string(), PackageState::Installed(version.clone()));
                Ok(format!("==> Installing {}\n{} {} installed", package, package, version))
            }
            Some(PackageState::Installed(_)) => Err(HostError::AlreadyInstalled(format!(
                "{} is already installed",
                package
            ))),
            None => Err(HostError::NotFoundInCatalog(package.to_string())),
        }
    }

    async fn verify_presence(
        &self,
        _display_name: &str,
        package: &str,
        kind: PackageKind,
    ) -> Result<bool> {
        match kind {
            PackageKind::Formula => Ok(true),
            PackageKind::Cask => {
                let state = self.state();
                Ok(!state.hidden_apps.contains(package)
                    && matches!(
                        state.packages.get(package),
                        Some(PackageState::Installed(_))
                    ))
            }
        }
    }

    async fn locate_command(&self, command: &str) -> Result<Option<CommandInfo>> {
        Ok(self.state().commands.get(command).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_install_moves_available_to_installed() {
        let pm = ScriptedPackageManager::new().with_available("git", "2.45.0");

        assert!(!pm.query_installed("git", PackageKind::Formula).await.unwrap().present);
        pm.install("git", PackageKind::Formula).await.unwrap();

        assert_eq!(
            pm.query_installed("git", PackageKind::Formula).await.unwrap(),
            QueryOutcome::present("2.45.0")
        );
        assert_eq!(pm.install_calls(), 1);
        assert_eq!(pm.query_calls(), 2);
    }

    #[tokio::test]
    async fn test_unknown_package() {
        let pm = ScriptedPackageManager::new();

        assert!(!pm.package_exists("jenkins", PackageKind::Formula).await.unwrap());
        assert!(matches!(
            pm.install("jenkins", PackageKind::Formula).await,
            Err(HostError::NotFoundInCatalog(_))
        ));
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let pm = ScriptedPackageManager::new().with_available("figma", "124.1");
        pm.fail_install("figma", HostError::PermissionDenied("/Applications".into()));
        pm.fail_query(
            "figma",
            HostError::CommandFailed {
                code: 1,
                stderr: "locked".into(),
            },
        );

        assert!(matches!(
            pm.install("figma", PackageKind::Cask).await,
            Err(HostError::PermissionDenied(_))
        ));
        assert!(pm.query_installed("figma", PackageKind::Cask).await.is_err());
    }

    #[tokio::test]
    async fn test_query_delay_for_one_package() {
        let pm = ScriptedPackageManager::new()
            .with_installed("git", "2.45.0")
            .with_installed("slack", "4.38");
        pm.set_query_delay_for("slack", Duration::from_millis(200));

        let started = tokio::time::Instant::now();
        assert!(pm.query_installed("git", PackageKind::Formula).await.unwrap().present);
        assert!(started.elapsed() < Duration::from_millis(200));

        assert!(pm.query_installed("slack", PackageKind::Cask).await.unwrap().present);
        assert!(started.elapsed() >= Duration::from_millis(200));
    }

    #[tokio::test]
    async fn test_hidden_app_fails_verification() {
        let pm = ScriptedPackageManager::new().with_installed("figma", "124.1");
        assert!(pm
            .verify_presence("Figma", "figma", PackageKind::Cask)
            .await
            .unwrap());

        pm.hide_app("figma");
        assert!(!pm
            .verify_presence("Figma", "figma", PackageKind::Cask)
            .await
            .unwrap());
    }
}
