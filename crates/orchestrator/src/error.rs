use host::HostError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("{0}")]
    Validation(String),

    #[error("Unknown software: {0}")]
    UnknownApp(String),

    #[error("Software already installed: {0}")]
    AlreadyInstalled(String),

    #[error("An installation is already in progress for {0}")]
    InstallInProgress(String),

    #[error("Software not found on system: {0}")]
    NotFoundOnHost(String),

    #[error("Software not installed: {0}")]
    RecordNotFound(String),

    #[error("Permission denied: {0}. Check that the install location is writable")]
    PermissionDenied(String),

    #[error("{0}")]
    Timeout(String),

    #[error("{0} was installed but could not be found on disk")]
    VerificationFailed(String),

    #[error("Invalid install transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Package manager error: {0}")]
    Adapter(HostError),

    #[error("Database error: {0}")]
    Database(#[from] db::DbError),
}

impl From<HostError> for OrchestratorError {
    fn from(err: HostError) -> Self {
        match err {
            HostError::AlreadyInstalled(message) => Self::AlreadyInstalled(message),
            HostError::NotFoundInCatalog(message) => Self::NotFoundOnHost(message),
            HostError::PermissionDenied(message) => Self::PermissionDenied(message),
            HostError::Timeout { command, secs } => {
                Self::Timeout(format!("{} timed out after {}s", command, secs))
            }
            other => Self::Adapter(other),
        }
    }
}

impl OrchestratorError {
    pub fn install_timed_out() -> Self {
        Self::Timeout("Installation timed out".to_string())
    }

    /// Stable identifier for the failure class, used in API error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::UnknownApp(_) => "unknown_app",
            Self::AlreadyInstalled(_) => "already_installed",
            Self::InstallInProgress(_) => "install_in_progress",
            Self::NotFoundOnHost(_) => "not_found_on_host",
            Self::RecordNotFound(_) => "not_installed",
            Self::PermissionDenied(_) => "permission_denied",
            Self::Timeout(_) => "timeout",
            Self::VerificationFailed(_) => "verification_failed",
            Self::InvalidTransition { .. } => "internal",
            Self::Adapter(_) => "package_manager",
            Self::Database(_) => "database",
        }
    }
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;
