//! Subscription lifecycle policy.
//!
//! Exactly two streams matter to a session: the personal inbox stream,
//! opened once the user is known and kept for the whole session, and the
//! stream of whichever conversation is currently active. The manager owns
//! both handles and enforces the swap ordering; it never retries on its own.

use std::sync::Arc;

use banter_core::events::PushEvent;
use banter_core::ids::{ConversationId, UserId};
use tracing::{debug, warn};

use crate::{ChannelError, ChannelName, EventChannels, Subscription};

/// Owns the session's two push subscriptions.
///
/// Swapping the active conversation always unsubscribes the old stream
/// before subscribing the new one, so a handler bound to the old
/// conversation can never observe events meant for the new one.
pub struct SubscriptionManager {
    channels: Arc<dyn EventChannels>,
    user: Option<UserId>,
    inbox: Option<Subscription>,
    active_id: Option<ConversationId>,
    active: Option<Subscription>,
}

impl SubscriptionManager {
    /// Manager over a transport; no subscriptions are opened yet.
    pub fn new(channels: Arc<dyn EventChannels>) -> Self {
        Self {
            channels,
            user: None,
            inbox: None,
            active_id: None,
            active: None,
        }
    }

    /// Open the personal inbox stream for this user.
    ///
    /// Call once at session start. The stream stays open until
    /// [`teardown`](Self::teardown).
    pub async fn init(&mut self, user: &UserId) -> Result<(), ChannelError> {
        self.user = Some(user.clone());
        if self.inbox.is_none() {
            self.inbox = Some(self.channels.subscribe(&ChannelName::inbox(user)).await?);
        }
        Ok(())
    }

    /// Swap the active-conversation stream from the previous conversation
    /// (if any) to this one. Unsubscribes the old stream first; a no-op if
    /// the conversation is already active and live.
    ///
    /// On failure the intent is remembered: [`reestablish`](Self::reestablish)
    /// will retry the subscription once the transport recovers.
    pub async fn activate(&mut self, conversation: &ConversationId) -> Result<(), ChannelError> {
        if self.active_id.as_ref() == Some(conversation) && self.active.is_some() {
            return Ok(());
        }
        if let Some(previous) = self.active_id.take() {
            self.active = None;
            if let Err(error) = self
                .channels
                .unsubscribe(&ChannelName::conversation(&previous))
                .await
            {
                warn!(%error, conversation = %previous, "unsubscribe failed during swap");
            }
        }
        self.active_id = Some(conversation.clone());
        match self
            .channels
            .subscribe(&ChannelName::conversation(conversation))
            .await
        {
            Ok(subscription) => {
                self.active = Some(subscription);
                Ok(())
            }
            Err(error) => {
                self.active = None;
                Err(error)
            }
        }
    }

    /// Re-open whichever of the two subscriptions is not live.
    ///
    /// A subscription whose transport route has closed counts as dead even
    /// if [`next_event`](Self::next_event) has not observed the closure yet;
    /// events still buffered on such a stream are dropped with it. Live
    /// subscriptions are left alone, so calling this on every connectivity
    /// recovery is safe.
    pub async fn reestablish(&mut self) -> Result<(), ChannelError> {
        if self.inbox.as_ref().is_some_and(Subscription::is_closed) {
            self.inbox = None;
        }
        if self.active.as_ref().is_some_and(Subscription::is_closed) {
            self.active = None;
        }
        if self.inbox.is_none() {
            if let Some(user) = self.user.clone() {
                self.inbox = Some(self.channels.subscribe(&ChannelName::inbox(&user)).await?);
            }
        }
        if self.active.is_none() {
            if let Some(id) = self.active_id.clone() {
                self.active = Some(
                    self.channels
                        .subscribe(&ChannelName::conversation(&id))
                        .await?,
                );
            }
        }
        Ok(())
    }

    /// Unsubscribe both streams and release the transport.
    pub async fn teardown(&mut self) {
        if self.inbox.take().is_some() {
            if let Some(user) = &self.user {
                if let Err(error) = self.channels.unsubscribe(&ChannelName::inbox(user)).await {
                    debug!(%error, "inbox unsubscribe failed during teardown");
                }
            }
        }
        self.active = None;
        if let Some(id) = self.active_id.take() {
            if let Err(error) = self
                .channels
                .unsubscribe(&ChannelName::conversation(&id))
                .await
            {
                debug!(%error, conversation = %id, "conversation unsubscribe failed during teardown");
            }
        }
        self.channels.shutdown().await;
    }

    /// Next event from either live stream.
    ///
    /// Pends forever while no stream is live (callers select over this
    /// together with their other work). A stream whose transport route ended
    /// is marked dead here; reestablishment is explicit.
    ///
    /// Cancel-safe: no event is lost if the surrounding `select!` picks
    /// another branch.
    pub async fn next_event(&mut self) -> PushEvent {
        loop {
            enum Arm {
                Inbox(Option<PushEvent>),
                Active(Option<PushEvent>),
            }

            let arm = {
                let inbox = self.inbox.as_mut();
                let active = self.active.as_mut();
                tokio::select! {
                    event = recv_or_pend(inbox) => Arm::Inbox(event),
                    event = recv_or_pend(active) => Arm::Active(event),
                }
            };

            match arm {
                Arm::Inbox(Some(event)) | Arm::Active(Some(event)) => return event,
                Arm::Inbox(None) => {
                    debug!("inbox stream ended");
                    self.inbox = None;
                }
                Arm::Active(None) => {
                    debug!("active conversation stream ended");
                    self.active = None;
                }
            }
        }
    }

    /// Whether the inbox stream is currently live.
    pub fn inbox_live(&self) -> bool {
        self.inbox.is_some()
    }

    /// The conversation the manager is (or intends to be) subscribed to.
    pub fn active_conversation(&self) -> Option<&ConversationId> {
        self.active_id.as_ref()
    }

    /// Whether the active-conversation stream is currently live.
    pub fn active_live(&self) -> bool {
        self.active.is_some()
    }
}

async fn recv_or_pend(subscription: Option<&mut Subscription>) -> Option<PushEvent> {
    match subscription {
        Some(subscription) => subscription.next().await,
        None => std::future::pending().await,
    }
}
