//! In-process event hub.
//!
//! The default transport for tests and local development: events published
//! here are routed straight to the matching subscriber with no wire in
//! between. It also records every subscribe/unsubscribe so tests can assert
//! lifecycle ordering, and can simulate an outage via
//! [`MemoryChannels::set_connected`].

use std::collections::HashMap;

use async_trait::async_trait;
use banter_core::events::PushEvent;
use metrics::counter;
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tracing::debug;

use crate::{ChannelError, ChannelName, EventChannels, Subscription};

const DEFAULT_EVENT_BUFFER: usize = 64;

/// One recorded lifecycle operation on the hub.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChannelOp {
    /// `subscribe` was called for this channel.
    Subscribed(ChannelName),
    /// `unsubscribe` was called for this channel.
    Unsubscribed(ChannelName),
}

#[derive(Default)]
struct HubState {
    routes: HashMap<ChannelName, mpsc::Sender<PushEvent>>,
    ops: Vec<ChannelOp>,
}

/// In-process [`EventChannels`] implementation.
///
/// One subscriber per channel name; subscribing again replaces the previous
/// route (the old subscription ends). Per-subscriber buffers are bounded and
/// events to a full buffer are dropped, matching what a real push gateway
/// does to slow consumers.
pub struct MemoryChannels {
    state: Mutex<HubState>,
    connected: watch::Sender<bool>,
    buffer: usize,
}

impl MemoryChannels {
    /// Hub with the default per-subscriber buffer.
    pub fn new() -> Self {
        Self::with_buffer(DEFAULT_EVENT_BUFFER)
    }

    /// Hub with a custom per-subscriber buffer, for drop-behavior tests.
    pub fn with_buffer(buffer: usize) -> Self {
        let (connected, _) = watch::channel(true);
        Self {
            state: Mutex::new(HubState::default()),
            connected,
            buffer,
        }
    }

    /// Deliver an event to the channel's subscriber, if any.
    ///
    /// Returns `true` only if the event was queued. Events published while
    /// disconnected, to an unknown channel, or to a full buffer are dropped.
    pub fn publish(&self, channel: &ChannelName, event: PushEvent) -> bool {
        if !*self.connected.borrow() {
            debug!(channel = %channel, "hub disconnected, dropping publish");
            return false;
        }
        let state = self.state.lock();
        let Some(route) = state.routes.get(channel) else {
            debug!(channel = %channel, "no subscriber, dropping publish");
            return false;
        };
        match route.try_send(event) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                counter!("channel_event_drops_total").increment(1);
                tracing::warn!(channel = %channel, "subscriber buffer full, dropping event");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    /// Simulate transport loss or recovery.
    ///
    /// Going down drops every live route (subscribers see their stream end);
    /// coming back up only flips the flag. Re-subscribing is the
    /// subscription manager's job.
    pub fn set_connected(&self, connected: bool) {
        if !connected {
            self.state.lock().routes.clear();
        }
        let _ = self.connected.send(connected);
    }

    /// Recorded subscribe/unsubscribe sequence, oldest first.
    pub fn ops(&self) -> Vec<ChannelOp> {
        self.state.lock().ops.clone()
    }

    /// Number of live routes.
    pub fn subscriber_count(&self) -> usize {
        self.state.lock().routes.len()
    }
}

impl Default for MemoryChannels {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventChannels for MemoryChannels {
    async fn subscribe(&self, channel: &ChannelName) -> Result<Subscription, ChannelError> {
        if !*self.connected.borrow() {
            return Err(ChannelError::Disconnected);
        }
        let (tx, rx) = mpsc::channel(self.buffer);
        let mut state = self.state.lock();
        let _ = state.routes.insert(channel.clone(), tx);
        state.ops.push(ChannelOp::Subscribed(channel.clone()));
        Ok(Subscription::new(channel.clone(), rx))
    }

    async fn unsubscribe(&self, channel: &ChannelName) -> Result<(), ChannelError> {
        let mut state = self.state.lock();
        let _ = state.routes.remove(channel);
        state.ops.push(ChannelOp::Unsubscribed(channel.clone()));
        Ok(())
    }

    async fn shutdown(&self) {
        self.state.lock().routes.clear();
        let _ = self.connected.send(false);
    }

    fn connectivity(&self) -> watch::Receiver<bool> {
        self.connected.subscribe()
    }
}
