pub mod client;
pub mod error;
pub mod progress;
pub mod types;

pub use client::ToolshedClient;
pub use error::{ClientError, Result};
pub use progress::{ProgressReceiver, ProgressStream, RetryPolicy};
pub use types::*;
