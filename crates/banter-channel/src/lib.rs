//! # banter-channel
//!
//! Named push-event channels and the subscription lifecycle on top of them.
//!
//! The rest of the engine only ever sees two things from this crate:
//!
//! - **Transport seam**: [`EventChannels`], subscribe/unsubscribe by
//!   [`ChannelName`], a shutdown hook, and a connectivity watch. Two
//!   implementations ship here: [`MemoryChannels`] (in-process hub for tests
//!   and local development) and [`WsChannels`] (WebSocket client).
//! - **Policy**: [`SubscriptionManager`] decides *which* channels are open:
//!   the personal inbox stream for the whole session, plus exactly one
//!   per-conversation stream matching the active conversation, swapped with
//!   unsubscribe-before-subscribe ordering.
//!
//! Transports never retry on their own. Loss of the connection is reported
//! through the connectivity watch and the engine decides when to
//! re-establish subscriptions.

#![deny(unsafe_code)]

mod error;
mod manager;
mod memory;
mod name;
mod ws;

use async_trait::async_trait;
use banter_core::events::PushEvent;
use tokio::sync::{mpsc, watch};

pub use error::ChannelError;
pub use manager::SubscriptionManager;
pub use memory::{ChannelOp, MemoryChannels};
pub use name::ChannelName;
pub use ws::{ClientFrame, ServerFrame, WsChannels, WsConfig};

/// A subscribable transport of named event streams.
///
/// Implementations own the wire; this trait owns nothing but names. All
/// methods take `&self` so one transport can be shared behind an `Arc`.
#[async_trait]
pub trait EventChannels: Send + Sync {
    /// Open a subscription to a named channel.
    ///
    /// The returned [`Subscription`] yields events until `unsubscribe` is
    /// called for the same name or the transport drops the route.
    async fn subscribe(&self, channel: &ChannelName) -> Result<Subscription, ChannelError>;

    /// Close the subscription for a channel. Idempotent.
    async fn unsubscribe(&self, channel: &ChannelName) -> Result<(), ChannelError>;

    /// Release the underlying connection; every open subscription ends.
    async fn shutdown(&self);

    /// Observe transport health. `false` means push delivery has stopped;
    /// HTTP traffic elsewhere is unaffected.
    fn connectivity(&self) -> watch::Receiver<bool>;
}

/// Live subscription handle: the channel's name plus its event feed.
///
/// Dropping the handle stops local delivery immediately; transports also
/// expect an explicit [`EventChannels::unsubscribe`] so the wire side is
/// torn down too.
#[derive(Debug)]
pub struct Subscription {
    channel: ChannelName,
    events: mpsc::Receiver<PushEvent>,
}

impl Subscription {
    /// Bind a name to its event feed. Called by transports.
    pub fn new(channel: ChannelName, events: mpsc::Receiver<PushEvent>) -> Self {
        Self { channel, events }
    }

    /// The channel this subscription is bound to.
    pub fn channel(&self) -> &ChannelName {
        &self.channel
    }

    /// Whether the transport has dropped this subscription's route.
    ///
    /// Events already buffered may still be readable via [`next`](Self::next)
    /// after this turns true.
    pub fn is_closed(&self) -> bool {
        self.events.is_closed()
    }

    /// Next event, or `None` once the transport has dropped the route.
    ///
    /// Cancel-safe: an event is either returned or stays queued.
    pub async fn next(&mut self) -> Option<PushEvent> {
        self.events.recv().await
    }
}
