mod catalog;
mod identity;
mod installed;
mod package;

pub use catalog::*;
pub use identity::*;
pub use installed::*;
pub use package::*;
