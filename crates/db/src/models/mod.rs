mod installed;

pub use installed::*;
