mod health;
pub mod software;
pub mod sse;

pub use health::*;
pub use software::*;
