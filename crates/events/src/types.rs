//! Event types pushed over an owner's progress channel

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// One message on a progress channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    /// The channel is established
    Connected,

    /// A milestone was reached
    Progress {
        /// Percentage, 0 to 100
        progress: u8,
        status: String,
        details: String,
    },

    /// Installation finished successfully
    Complete { status: String, details: String },

    /// Installation failed
    Error { message: String },
}

impl ProgressEvent {
    pub fn progress(progress: u8, status: impl Into<String>, details: impl Into<String>) -> Self {
        Self::Progress {
            progress: progress.min(100),
            status: status.into(),
            details: details.into(),
        }
    }

    pub fn complete(details: impl Into<String>) -> Self {
        Self::Complete {
            status: "Complete".to_string(),
            details: details.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    pub fn timed_out() -> Self {
        Self::error("Installation timed out")
    }

    /// `complete` and `error` end the channel.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete { .. } | Self::Error { .. })
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::Progress { .. } => "progress",
            Self::Complete { .. } => "complete",
            Self::Error { .. } => "error",
        }
    }

    pub fn progress_value(&self) -> Option<u8> {
        match self {
            Self::Progress { progress, .. } => Some(*progress),
            _ => None,
        }
    }
}

/// What the transport writes: an event, or a keep-alive with no payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelFrame {
    Event(ProgressEvent),
    Heartbeat,
}

impl ChannelFrame {
    pub fn event(&self) -> Option<&ProgressEvent> {
        match self {
            Self::Event(event) => Some(event),
            Self::Heartbeat => None,
        }
    }
}
