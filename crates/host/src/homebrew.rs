use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::Duration;
use tokio::process::Command;
use toolshed_core::PackageKind;
use tracing::{debug, info, warn};

use crate::classify::{
    app_name_variants, classify_failure, classify_info, classify_query, extract_semver,
    is_plain_command,
};
use crate::error::{HostError, Result};
use crate::traits::{CommandInfo, PackageManager, QueryOutcome};

#[derive(Debug, Clone)]
pub struct HomebrewConfig {
    /// `brew` executable, resolved through `PATH` when relative
    pub brew_path: PathBuf,
    /// Where cask bundles land
    pub application_dirs: Vec<PathBuf>,
    /// Budget for `brew install`
    pub install_timeout: Duration,
    /// Budget for read-only queries
    pub query_timeout: Duration,
}

impl Default for HomebrewConfig {
    fn default() -> Self {
        let mut application_dirs = vec![PathBuf::from("/Applications")];
        if let Some(home) = dirs::home_dir() {
            application_dirs.push(home.join("Applications"));
        }

        Self {
            brew_path: PathBuf::from("brew"),
            application_dirs,
            install_timeout: Duration::from_secs(300),
            query_timeout: Duration::from_secs(30),
        }
    }
}

/// [`PackageManager`] backed by the local `brew` executable.
pub struct Homebrew {
    config: HomebrewConfig,
}

impl Homebrew {
    pub fn new(config: HomebrewConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &HomebrewConfig {
        &self.config
    }

    /// Check that `brew` starts and answers within the query budget
    pub async fn is_available(&self) -> bool {
        match self.run_brew(&["--version"], self.config.query_timeout).await {
            Ok(output) => output.status.success(),
            Err(e) => {
                debug!("brew is not available: {}", e);
                false
            }
        }
    }

    fn kind_args(kind: PackageKind) -> &'static [&'static str] {
        match kind {
            PackageKind::Formula => &[],
            PackageKind::Cask => &["--cask"],
        }
    }

    async fn run_brew(&self, args: &[&str], budget: Duration) -> Result<Output> {
        run_with_timeout(&self.config.brew_path, args, budget).await
    }

    fn app_bundle_exists(&self, display_name: &str, package: &str) -> Option<PathBuf> {
        app_name_variants(display_name, package)
            .into_iter()
            .flat_map(|variant| {
                self.config
                    .application_dirs
                    .iter()
                    .map(move |dir| dir.join(format!("{}.app", variant)))
            })
            .find(|candidate| candidate.exists())
    }
}

impl Default for Homebrew {
    fn default() -> Self {
        Self::new(HomebrewConfig::default())
    }
}

async fn run_with_timeout(program: &Path, args: &[&str], budget: Duration) -> Result<Output> {
    let command_line = format!("{} {}", program.display(), args.join(" "));
    debug!("Running {}", command_line);

    let child = Command::new(program)
        .args(args)
        .env("HOMEBREW_NO_AUTO_UPDATE", "1")
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output();

    match tokio::time::timeout(budget, child).await {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(e)) => Err(HostError::Spawn {
            program: program.display().to_string(),
            message: e.to_string(),
        }),
        Err(_) => {
            warn!("{} timed out after {:?}", command_line, budget);
            Err(HostError::Timeout {
                command: command_line,
                secs: budget.as_secs(),
            })
        }
    }
}

fn exit_code(output: &Output) -> i32 {
    output.status.code().unwrap_or(-1)
}

#[async_trait]
impl PackageManager for Homebrew {
    fn name(&self) -> &'static str {
        "homebrew"
    }

    async fn query_installed(&self, package: &str, kind: PackageKind) -> Result<QueryOutcome> {
        let mut args = vec!["list", "--versions"];
        args.extend_from_slice(Self::kind_args(kind));
        args.push(package);

        let output = self.run_brew(&args, self.config.query_timeout).await?;
        classify_query(
            exit_code(&output),
            &String::from_utf8_lossy(&output.stdout),
            &String::from_utf8_lossy(&output.stderr),
        )
    }

    async fn package_exists(&self, package: &str, kind: PackageKind) -> Result<bool> {
        let mut args = vec!["info"];
        args.extend_from_slice(Self::kind_args(kind));
        args.push(package);

        let output = self.run_brew(&args, self.config.query_timeout).await?;
        classify_info(exit_code(&output), &String::from_utf8_lossy(&output.stderr))
    }

    async fn install(&self, package: &str, kind: PackageKind) -> Result<String> {
        info!("Installing {} {} via brew", kind, package);

        let mut args = vec!["install"];
        args.extend_from_slice(Self::kind_args(kind));
        args.push(package);

        let output = self.run_brew(&args, self.config.install_timeout).await?;
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(classify_failure(exit_code(&output), &stderr));
        }

        debug!("brew install {} finished", package);
        Ok(stdout)
    }

    async fn verify_presence(
        &self,
        display_name: &str,
        package: &str,
        kind: PackageKind,
    ) -> Result<bool> {
        match kind {
            PackageKind::Formula => Ok(true),
            PackageKind::Cask => {
                if let Some(bundle) = self.app_bundle_exists(display_name, package) {
                    debug!("Found {} at {}", display_name, bundle.display());
                    return Ok(true);
                }

                debug!(
                    "No bundle for {} in {:?}, asking brew",
                    display_name, self.config.application_dirs
                );
                Ok(self.query_installed(package, kind).await?.present)
            }
        }
    }

    async fn locate_command(&self, command: &str) -> Result<Option<CommandInfo>> {
        if !is_plain_command(command) {
            return Ok(None);
        }

        let Ok(path) = which::which(command) else {
            return Ok(None);
        };

        let version = match run_with_timeout(&path, &["--version"], self.config.query_timeout).await
        {
            Ok(output) => {
                let stdout = String::from_utf8_lossy(&output.stdout);
                let stderr = String::from_utf8_lossy(&output.stderr);
                extract_semver(&stdout).or_else(|| extract_semver(&stderr))
            }
            Err(e) => {
                warn!("Could not read version of {}: {}", command, e);
                None
            }
        };

        Ok(Some(CommandInfo { path, version }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn homebrew_with_apps(dir: &TempDir) -> Homebrew {
        Homebrew::new(HomebrewConfig {
            brew_path: PathBuf::from("/nonexistent/brew"),
            application_dirs: vec![dir.path().to_path_buf()],
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn test_formula_presence_is_trusted() {
        let dir = TempDir::new().unwrap();
        let brew = homebrew_with_apps(&dir);

        assert!(brew
            .verify_presence("Git", "git", PackageKind::Formula)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_cask_found_by_stripped_name() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("VisualStudioCode.app")).unwrap();
        let brew = homebrew_with_apps(&dir);

        assert!(brew
            .verify_presence("Visual Studio Code", "visual-studio-code", PackageKind::Cask)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_cask_found_by_first_word() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("Docker.app")).unwrap();
        let brew = homebrew_with_apps(&dir);

        assert!(brew
            .verify_presence("Docker Desktop", "docker", PackageKind::Cask)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_missing_cask_falls_back_to_brew() {
        let dir = TempDir::new().unwrap();
        let brew = homebrew_with_apps(&dir);

        let err = brew
            .verify_presence("Figma", "figma", PackageKind::Cask)
            .await
            .unwrap_err();
        assert!(matches!(err, HostError::Spawn { .. }));
    }

    #[tokio::test]
    async fn test_missing_brew_is_spawn_error() {
        let dir = TempDir::new().unwrap();
        let brew = homebrew_with_apps(&dir);

        assert!(!brew.is_available().await);
        let err = brew
            .query_installed("git", PackageKind::Formula)
            .await
            .unwrap_err();
        assert!(matches!(err, HostError::Spawn { .. }));
    }

    #[tokio::test]
    async fn test_locate_rejects_unsafe_names() {
        let brew = Homebrew::default();
        assert_eq!(brew.locate_command("git; reboot").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_locate_unknown_command() {
        let brew = Homebrew::default();
        assert_eq!(
            brew.locate_command("definitely-not-a-real-command-4821")
                .await
                .unwrap(),
            None
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout_is_classified() {
        let err = run_with_timeout(Path::new("sleep"), &["5"], Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(err.is_timeout());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_unresponsive_brew_is_unavailable() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let script = dir.path().join("brew");
        std::fs::write(&script, "#!/bin/sh\nexec sleep 5\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let brew = Homebrew::new(HomebrewConfig {
            brew_path: script,
            query_timeout: Duration::from_millis(100),
            ..Default::default()
        });

        let started = std::time::Instant::now();
        assert!(!brew.is_available().await);
        assert!(started.elapsed() < Duration::from_secs(2));
    }
}
