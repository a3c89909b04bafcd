pub mod error;
pub mod installer;
pub mod reconcile;
pub mod resources;
pub mod software;
pub mod state_machine;

pub use error::{OrchestratorError, Result};
pub use installer::{InstallConfig, InstallOrchestrator, InstallRequest};
pub use reconcile::{Reconciler, ScanConfig, ScanReport};
pub use resources::OwnerLocks;
pub use software::{CommandCheck, SoftwareListing, SoftwareService, UpdateStatus};
pub use state_machine::{InstallPhase, InstallRun, InstallStateMachine};
