//! Cloneable front door to a running engine task.

use banter_core::ids::ConversationId;
use banter_core::model::{Conversation, Message};
use tokio::sync::{broadcast, mpsc, oneshot};

use crate::command::EngineCommand;
use crate::update::EngineUpdate;

/// The engine task is gone; no further commands can be delivered.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
#[error("engine stopped")]
pub struct EngineStopped;

/// Cheap-to-clone handle to the engine task.
///
/// Safe to use from any task. Queries round-trip through the engine's
/// command queue, so a reply never observes a half-applied mutation.
#[derive(Clone, Debug)]
pub struct EngineHandle {
    commands: mpsc::Sender<EngineCommand>,
    updates: broadcast::Sender<EngineUpdate>,
}

impl EngineHandle {
    pub(crate) fn new(
        commands: mpsc::Sender<EngineCommand>,
        updates: broadcast::Sender<EngineUpdate>,
    ) -> Self {
        Self { commands, updates }
    }

    /// Subscribe to change notifications.
    pub fn updates(&self) -> broadcast::Receiver<EngineUpdate> {
        self.updates.subscribe()
    }

    /// Send a message in a conversation, optimistically.
    pub async fn submit(
        &self,
        conversation: &ConversationId,
        text: impl Into<String>,
    ) -> Result<(), EngineStopped> {
        self.send(EngineCommand::Submit {
            conversation_id: conversation.clone(),
            text: text.into(),
        })
        .await
    }

    /// Switch the active conversation.
    pub async fn activate(&self, conversation: &ConversationId) -> Result<(), EngineStopped> {
        self.send(EngineCommand::Activate {
            conversation_id: conversation.clone(),
        })
        .await
    }

    /// Ask for a fresh conversation list fetch.
    pub async fn refresh(&self) -> Result<(), EngineStopped> {
        self.send(EngineCommand::Refresh).await
    }

    /// Summaries in display order: pinned first, then newest activity.
    pub async fn conversations(&self) -> Result<Vec<Conversation>, EngineStopped> {
        let (tx, rx) = oneshot::channel();
        self.send(EngineCommand::Conversations { reply: tx }).await?;
        rx.await.map_err(|_| EngineStopped)
    }

    /// Messages of one conversation, in thread order.
    pub async fn thread(
        &self,
        conversation: &ConversationId,
    ) -> Result<Vec<Message>, EngineStopped> {
        let (tx, rx) = oneshot::channel();
        self.send(EngineCommand::Thread {
            conversation_id: conversation.clone(),
            reply: tx,
        })
        .await?;
        rx.await.map_err(|_| EngineStopped)
    }

    /// Unsubscribe both push streams, release the connection, and stop the
    /// engine task. Resolves once teardown has completed.
    pub async fn teardown(&self) -> Result<(), EngineStopped> {
        let (tx, rx) = oneshot::channel();
        self.send(EngineCommand::Teardown { reply: tx }).await?;
        rx.await.map_err(|_| EngineStopped)
    }

    async fn send(&self, command: EngineCommand) -> Result<(), EngineStopped> {
        self.commands.send(command).await.map_err(|_| EngineStopped)
    }
}
