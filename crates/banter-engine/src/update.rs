//! Change notifications pushed from the engine to whoever renders it.

use banter_core::ids::ConversationId;

/// Something changed; re-read the relevant snapshot.
///
/// Updates are deliberately coarse. They say which snapshot went stale, not
/// what changed in it, so a reader that lags and drops a few can always
/// catch up by re-reading.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EngineUpdate {
    /// The summary list changed: contents, order, or badges.
    ConversationsChanged,
    /// One conversation's message list changed.
    ThreadChanged { conversation_id: ConversationId },
    /// A send failed and its provisional entry was rolled back.
    /// `text` is the composer content to restore.
    SendFailed {
        conversation_id: ConversationId,
        text: String,
        reason: String,
    },
    /// Push delivery gained or lost its connection. HTTP is unaffected;
    /// sends keep working either way.
    ConnectivityChanged { connected: bool },
}
