//! RAII progress reporting for one install.
//!
//! The reporter guarantees the owner's channel sees non-decreasing progress
//! values and exactly one terminal event, even when the install future is
//! dropped part way through.

use events::{ProgressChannels, ProgressEvent};
use tracing::{debug, warn};

pub struct ProgressReporter {
    owner_id: String,
    channels: ProgressChannels,
    last_progress: u8,
    finished: bool,
}

impl ProgressReporter {
    pub fn new(owner_id: impl Into<String>, channels: ProgressChannels) -> Self {
        Self {
            owner_id: owner_id.into(),
            channels,
            last_progress: 0,
            finished: false,
        }
    }

    /// Report a milestone. Values lower than one already sent are dropped.
    pub fn progress(&mut self, value: u8, status: &str, details: impl Into<String>) {
        if self.finished || value < self.last_progress {
            debug!(
                owner_id = %self.owner_id,
                value,
                last = self.last_progress,
                "Skipping out of order progress"
            );
            return;
        }

        self.last_progress = value;
        self.channels
            .send(&self.owner_id, ProgressEvent::progress(value, status, details));
    }

    pub fn complete(&mut self, details: impl Into<String>) {
        self.finish(ProgressEvent::complete(details));
    }

    pub fn fail(&mut self, message: impl Into<String>) {
        self.finish(ProgressEvent::error(message));
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn last_progress(&self) -> u8 {
        self.last_progress
    }

    fn finish(&mut self, event: ProgressEvent) {
        if self.finished {
            return;
        }
        self.finished = true;

        self.channels.send(&self.owner_id, event);
        self.channels.close(&self.owner_id);
    }
}

impl Drop for ProgressReporter {
    fn drop(&mut self) {
        if !self.finished {
            warn!(
                owner_id = %self.owner_id,
                "Install ended without a terminal event - reporting failure"
            );
            self.fail("Installation terminated unexpectedly");
        }
    }
}
