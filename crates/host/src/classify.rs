//! Pure interpretation of package manager output

use std::sync::OnceLock;

use regex::Regex;

use crate::error::HostError;
use crate::traits::QueryOutcome;

/// Stderr fragments brew prints when a package is simply not there.
const NOT_PRESENT_MARKERS: &[&str] = &[
    "no such keg",
    "not installed",
    "no available formula",
    "no available cask",
    "no formulae or casks found",
];

const UNKNOWN_PACKAGE_MARKERS: &[&str] = &[
    "no available formula",
    "no available cask",
    "no formulae or casks found",
    "no cask with this name",
];

const PERMISSION_MARKERS: &[&str] = &[
    "permission denied",
    "operation not permitted",
    "not writable",
    "eacces",
];

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    let haystack = haystack.to_lowercase();
    needles.iter().any(|needle| haystack.contains(needle))
}

/// Interpret `brew list --versions [--cask] <name>`.
///
/// Exit 1 with no output and a recognised stderr means "not present"; every
/// other failure is a real error.
pub fn classify_query(code: i32, stdout: &str, stderr: &str) -> Result<QueryOutcome, HostError> {
    let stdout = stdout.trim();
    let stderr = stderr.trim();

    if code == 0 {
        return Ok(match parse_versions_line(stdout) {
            Some(version) => QueryOutcome::present(version),
            None if stdout.is_empty() => QueryOutcome::absent(),
            None => QueryOutcome {
                present: true,
                version: None,
            },
        });
    }

    if code == 1 && stdout.is_empty() && (stderr.is_empty() || contains_any(stderr, NOT_PRESENT_MARKERS))
    {
        return Ok(QueryOutcome::absent());
    }

    Err(classify_failure(code, stderr))
}

/// Interpret `brew info [--cask] <name>`: whether the package is known.
pub fn classify_info(code: i32, stderr: &str) -> Result<bool, HostError> {
    if code == 0 {
        return Ok(true);
    }

    if contains_any(stderr, UNKNOWN_PACKAGE_MARKERS) {
        return Ok(false);
    }

    Err(classify_failure(code, stderr))
}

/// Map a failed install (or any failed brew call) to its error class.
pub fn classify_failure(code: i32, stderr: &str) -> HostError {
    let trimmed = stderr.trim();

    if contains_any(trimmed, UNKNOWN_PACKAGE_MARKERS) {
        return HostError::NotFoundInCatalog(first_line(trimmed));
    }

    if contains_any(trimmed, PERMISSION_MARKERS) {
        return HostError::PermissionDenied(first_line(trimmed));
    }

    if contains_any(trimmed, &["already installed"]) {
        return HostError::AlreadyInstalled(first_line(trimmed));
    }

    HostError::CommandFailed {
        code,
        stderr: trimmed.to_string(),
    }
}

fn first_line(text: &str) -> String {
    text.lines()
        .find(|line| !line.trim().is_empty())
        .unwrap_or(text)
        .trim()
        .trim_start_matches("Error:")
        .trim()
        .to_string()
}

/// `"git 2.45.0 2.44.0"` → `"2.45.0"`.
pub fn parse_versions_line(stdout: &str) -> Option<String> {
    let line = stdout.lines().find(|line| !line.trim().is_empty())?;
    line.split_whitespace().nth(1).map(str::to_string)
}

static SEMVER: OnceLock<Option<Regex>> = OnceLock::new();

fn semver_regex() -> Option<&'static Regex> {
    SEMVER
        .get_or_init(|| Regex::new(r"\d+\.\d+\.\d+").ok())
        .as_ref()
}

/// First `x.y.z` in a `--version` banner.
pub fn extract_semver(text: &str) -> Option<String> {
    semver_regex()?
        .find(text)
        .map(|m| m.as_str().to_string())
}

/// Bundle names a cask may have installed, most specific first.
pub fn app_name_variants(display_name: &str, package: &str) -> Vec<String> {
    let mut variants: Vec<String> = Vec::new();
    let mut push = |candidate: String| {
        if !candidate.is_empty() && !variants.contains(&candidate) {
            variants.push(candidate);
        }
    };

    let display_name = display_name.trim();
    push(display_name.to_string());
    push(display_name.chars().filter(|c| !c.is_whitespace()).collect());
    push(
        display_name
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_string(),
    );
    push(package.trim().to_string());

    variants
}

/// Whether `name` is safe to hand to `which`/exec as a bare command.
pub fn is_plain_command(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 64
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '+' | '@'))
        && !name.starts_with('-')
        && !name.starts_with('.')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_present_with_version() {
        let outcome = classify_query(0, "git 2.45.0\n", "").unwrap();
        assert_eq!(outcome, QueryOutcome::present("2.45.0"));
    }

    #[test]
    fn test_query_multiple_versions_takes_first() {
        let outcome = classify_query(0, "node 22.3.0 21.7.1\n", "").unwrap();
        assert_eq!(outcome.version.as_deref(), Some("22.3.0"));
    }

    #[test]
    fn test_query_empty_success_is_absent() {
        assert_eq!(classify_query(0, "", "").unwrap(), QueryOutcome::absent());
    }

    #[test]
    fn test_query_known_absent_conditions() {
        for stderr in [
            "",
            "Error: No such keg: /opt/homebrew/Cellar/jenkins",
            "Error: Cask 'figma' is not installed.",
            "Error: No available formula with the name \"nope\".",
        ] {
            assert_eq!(
                classify_query(1, "", stderr).unwrap(),
                QueryOutcome::absent(),
                "stderr: {stderr}"
            );
        }
    }

    #[test]
    fn test_query_real_failure_propagates() {
        let err = classify_query(1, "", "Error: Another active Homebrew process is running").unwrap_err();
        assert!(matches!(err, HostError::CommandFailed { code: 1, .. }));

        let err = classify_query(127, "", "").unwrap_err();
        assert!(matches!(err, HostError::CommandFailed { code: 127, .. }));
    }

    #[test]
    fn test_query_exit_one_with_output_is_not_absent() {
        let err = classify_query(1, "git 2.45.0", "Error: not installed").unwrap_err();
        assert!(matches!(err, HostError::CommandFailed { .. }));
    }

    #[test]
    fn test_info_classification() {
        assert!(classify_info(0, "").unwrap());
        assert!(!classify_info(1, "Error: No available formula with the name \"nope\".").unwrap());
        assert!(!classify_info(1, "Error: No formulae or casks found for nope.").unwrap());
        assert!(classify_info(1, "Error: Permission denied @ dir_s_mkdir").is_err());
    }

    #[test]
    fn test_install_failure_classes() {
        assert!(matches!(
            classify_failure(1, "Error: No available cask with the name \"nope\"."),
            HostError::NotFoundInCatalog(_)
        ));
        assert!(matches!(
            classify_failure(1, "Error: /opt/homebrew/Cellar is not writable."),
            HostError::PermissionDenied(_)
        ));
        assert!(matches!(
            classify_failure(1, "Warning: git 2.45.0 is already installed and up-to-date."),
            HostError::AlreadyInstalled(_)
        ));
        assert_eq!(
            classify_failure(2, "  boom  "),
            HostError::CommandFailed {
                code: 2,
                stderr: "boom".to_string()
            }
        );
    }

    #[test]
    fn test_failure_message_uses_first_line() {
        match classify_failure(1, "Error: Permission denied @ rb_sysopen\nmore detail") {
            HostError::PermissionDenied(message) => {
                assert_eq!(message, "Permission denied @ rb_sysopen")
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_extract_semver() {
        assert_eq!(
            extract_semver("git version 2.45.0 (Apple Git-154)").as_deref(),
            Some("2.45.0")
        );
        assert_eq!(extract_semver("v20.11.1").as_deref(), Some("20.11.1"));
        assert_eq!(extract_semver("version 3"), None);
    }

    #[test]
    fn test_semver_regex_is_compiled_once() {
        let first = semver_regex().unwrap();
        let second = semver_regex().unwrap();
        assert!(std::ptr::eq(first, second));
    }

    #[test]
    fn test_app_name_variants() {
        assert_eq!(
            app_name_variants("Visual Studio Code", "visual-studio-code"),
            vec![
                "Visual Studio Code",
                "VisualStudioCode",
                "Visual",
                "visual-studio-code"
            ]
        );
        assert_eq!(app_name_variants("Figma", "figma"), vec!["Figma", "figma"]);
    }

    #[test]
    fn test_plain_command_names() {
        assert!(is_plain_command("git"));
        assert!(is_plain_command("python3.12"));
        assert!(!is_plain_command(""));
        assert!(!is_plain_command("git; rm -rf /"));
        assert!(!is_plain_command("../bin/git"));
        assert!(!is_plain_command("--help"));
    }
}
