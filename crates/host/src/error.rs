use thiserror::Error;

/// Classified outcome of a failed package manager call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HostError {
    #[error("Package is already installed: {0}")]
    AlreadyInstalled(String),

    #[error("No formula or cask available with the name {0}")]
    NotFoundInCatalog(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Command timed out after {secs}s: {command}")]
    Timeout { command: String, secs: u64 },

    /// `code` is -1 when the process was terminated by a signal
    #[error("Command failed with exit code {code}: {stderr}")]
    CommandFailed { code: i32, stderr: String },

    #[error("Failed to start {program}: {message}")]
    Spawn { program: String, message: String },
}

impl HostError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

pub type Result<T> = std::result::Result<T, HostError>;
