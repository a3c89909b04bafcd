//! Progress event vocabulary and the per-owner progress channel registry.
//!
//! Every owner has at most one open channel. Installs push typed
//! [`ProgressEvent`]s through [`ProgressChannels`]; the transport drains a
//! [`ProgressSubscription`] as a stream of [`ChannelFrame`]s.

mod channels;
mod types;

pub use channels::{ChannelConfig, ProgressChannels, ProgressSubscription};
pub use types::*;
