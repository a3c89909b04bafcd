//! Per-owner resources held for the duration of an install or scan.
//!
//! - [`InFlightInstalls`] - one running install per owner
//! - [`OwnerLocks`] - serialised record writes per owner
//! - [`ProgressReporter`] - guaranteed terminal progress event

mod install_guard;
mod owner_locks;
mod progress_reporter;

pub use install_guard::{InFlightInstalls, InstallGuard};
pub use owner_locks::OwnerLocks;
pub use progress_reporter::ProgressReporter;
