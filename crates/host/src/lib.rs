pub mod classify;
pub mod error;
pub mod homebrew;
pub mod traits;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use error::{HostError, Result};
pub use homebrew::{Homebrew, HomebrewConfig};
pub use traits::{CommandInfo, PackageManager, QueryOutcome};

#[cfg(any(test, feature = "testing"))]
pub use testing::ScriptedPackageManager;
