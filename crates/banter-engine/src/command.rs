//! Commands accepted by the engine task.

use banter_core::ids::ConversationId;
use banter_core::model::{Conversation, Message};
use tokio::sync::oneshot;

/// One request from a handle to the engine task.
///
/// Mutating commands are fire-and-forget; queries carry a oneshot the
/// engine answers between events, so replies always reflect a store no
/// mutation is halfway through.
#[derive(Debug)]
pub enum EngineCommand {
    /// Send a message optimistically: append a provisional entry now,
    /// reconcile when the server answers.
    Submit {
        conversation_id: ConversationId,
        text: String,
    },
    /// Make this the active conversation: clear its badge, swap the
    /// per-conversation stream, fetch its thread.
    Activate { conversation_id: ConversationId },
    /// Re-fetch the conversation list from the server.
    Refresh,
    /// Snapshot of all summaries in display order.
    Conversations {
        reply: oneshot::Sender<Vec<Conversation>>,
    },
    /// Snapshot of one conversation's messages in thread order.
    Thread {
        conversation_id: ConversationId,
        reply: oneshot::Sender<Vec<Message>>,
    },
    /// Unsubscribe both streams, release the connection, stop the task.
    Teardown { reply: oneshot::Sender<()> },
}
