//! Per-owner progress channel registry

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use futures::stream::{self, Stream};
use tokio::sync::mpsc;
use tokio::time::{Instant, Interval, MissedTickBehavior, Sleep};
use tracing::debug;

use crate::types::{ChannelFrame, ProgressEvent};

pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(10);
pub const DEFAULT_CHANNEL_TIMEOUT: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelConfig {
    /// Interval between keep-alive frames
    pub heartbeat_interval: Duration,
    /// How long a channel may stay open without a terminal event
    pub timeout: Duration,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            timeout: DEFAULT_CHANNEL_TIMEOUT,
        }
    }
}

struct Slot {
    id: u64,
    sender: mpsc::UnboundedSender<ProgressEvent>,
    deadline: Instant,
}

/// Registry of open progress channels, at most one per owner.
///
/// Opening a channel for an owner evicts the previous one: its sender is
/// dropped, so the old subscription drains what it already received and ends.
#[derive(Clone)]
pub struct ProgressChannels {
    slots: Arc<RwLock<HashMap<String, Slot>>>,
    next_id: Arc<AtomicU64>,
    config: ChannelConfig,
}

impl ProgressChannels {
    pub fn new(config: ChannelConfig) -> Self {
        Self {
            slots: Arc::new(RwLock::new(HashMap::new())),
            next_id: Arc::new(AtomicU64::new(1)),
            config,
        }
    }

    pub fn config(&self) -> ChannelConfig {
        self.config
    }

    /// Open the owner's channel, closing any channel already open for them.
    ///
    /// The new channel starts with a `connected` event.
    pub fn open(&self, owner_id: &str) -> ProgressSubscription {
        let (sender, receiver) = mpsc::unbounded_channel();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let deadline = Instant::now() + self.config.timeout;

        let _ = sender.send(ProgressEvent::Connected);

        let previous = self.write().insert(
            owner_id.to_string(),
            Slot {
                id,
                sender,
                deadline,
            },
        );

        if let Some(previous) = previous {
            debug!(
                owner_id = %owner_id,
                evicted = previous.id,
                "Evicted previous progress channel"
            );
        }

        ProgressSubscription {
            owner_id: owner_id.to_string(),
            id,
            deadline,
            receiver,
            channels: self.clone(),
        }
    }

    /// Deliver an event to the owner's channel.
    ///
    /// Returns whether the event was handed to an open channel. Sending to an
    /// owner with no channel, or whose channel already ended, does nothing.
    pub fn send(&self, owner_id: &str, event: ProgressEvent) -> bool {
        let stale = {
            let slots = self.read();
            let Some(slot) = slots.get(owner_id) else {
                return false;
            };

            match slot.sender.send(event) {
                Ok(()) => return true,
                Err(_) => slot.id,
            }
        };

        self.remove_if_current(owner_id, stale);
        false
    }

    /// Close the owner's channel. Events already sent are still delivered.
    pub fn close(&self, owner_id: &str) -> bool {
        let removed = self.write().remove(owner_id).is_some();
        if removed {
            debug!(owner_id = %owner_id, "Closed progress channel");
        }
        removed
    }

    pub fn is_open(&self, owner_id: &str) -> bool {
        self.read()
            .get(owner_id)
            .map(|slot| !slot.sender.is_closed())
            .unwrap_or(false)
    }

    /// When the owner's open channel times out.
    ///
    /// Work reported on the channel has to finish by then; the client is told
    /// it timed out at this instant.
    pub fn deadline(&self, owner_id: &str) -> Option<Instant> {
        self.read()
            .get(owner_id)
            .filter(|slot| !slot.sender.is_closed())
            .map(|slot| slot.deadline)
    }

    pub fn open_count(&self) -> usize {
        self.read().len()
    }

    fn remove_if_current(&self, owner_id: &str, id: u64) {
        let mut slots = self.write();
        if slots.get(owner_id).map(|slot| slot.id) == Some(id) {
            slots.remove(owner_id);
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Slot>> {
        self.slots
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Slot>> {
        self.slots
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for ProgressChannels {
    fn default() -> Self {
        Self::new(ChannelConfig::default())
    }
}

impl std::fmt::Debug for ProgressChannels {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressChannels")
            .field("open_count", &self.open_count())
            .field("config", &self.config)
            .finish()
    }
}

/// The receiving end of one owner's channel.
///
/// Dropping it unregisters the channel, unless a newer channel has already
/// replaced it.
pub struct ProgressSubscription {
    owner_id: String,
    id: u64,
    deadline: Instant,
    receiver: mpsc::UnboundedReceiver<ProgressEvent>,
    channels: ProgressChannels,
}

impl ProgressSubscription {
    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Next event, or `None` once the channel was closed or evicted.
    pub async fn recv(&mut self) -> Option<ProgressEvent> {
        self.receiver.recv().await
    }

    /// Frames for the transport: events interleaved with heartbeats.
    ///
    /// The stream ends after a terminal event, when the channel is closed or
    /// evicted, or at the channel deadline; in the last case a timed-out
    /// `error` event is emitted first. The heartbeat timer and the deadline
    /// live inside the stream and are dropped with it.
    pub fn into_stream(self) -> impl Stream<Item = ChannelFrame> + Send + 'static {
        let interval = self.channels.config.heartbeat_interval;
        let deadline = self.deadline;

        let mut heartbeat = tokio::time::interval_at(Instant::now() + interval, interval);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let state = StreamState {
            subscription: self,
            heartbeat,
            deadline: Box::pin(tokio::time::sleep_until(deadline)),
            finished: false,
        };

        stream::unfold(state, |mut state| async move {
            if state.finished {
                return None;
            }

            let next = tokio::select! {
                biased;
                event = state.subscription.receiver.recv() => Next::Event(event),
                _ = &mut state.deadline => Next::Deadline,
                _ = state.heartbeat.tick() => Next::Heartbeat,
            };

            match next {
                Next::Event(Some(event)) => {
                    state.finished = event.is_terminal();
                    Some((ChannelFrame::Event(event), state))
                }
                Next::Event(None) => None,
                Next::Deadline => {
                    debug!(
                        owner_id = %state.subscription.owner_id,
                        "Progress channel timed out"
                    );
                    state.finished = true;
                    Some((ChannelFrame::Event(ProgressEvent::timed_out()), state))
                }
                Next::Heartbeat => Some((ChannelFrame::Heartbeat, state)),
            }
        })
    }
}

impl Drop for ProgressSubscription {
    fn drop(&mut self) {
        self.channels.remove_if_current(&self.owner_id, self.id);
    }
}

struct StreamState {
    subscription: ProgressSubscription,
    heartbeat: Interval,
    deadline: Pin<Box<Sleep>>,
    finished: bool,
}

enum Next {
    Event(Option<ProgressEvent>),
    Deadline,
    Heartbeat,
}
