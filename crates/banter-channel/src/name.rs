//! Channel naming scheme.

use banter_core::ids::{ConversationId, UserId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Name of a push stream.
///
/// Two families exist: `inbox:{userId}` (personal stream, one per session)
/// and `conv:{conversationId}` (per-conversation stream, at most one open).
#[derive(Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelName(String);

impl ChannelName {
    /// Personal inbox stream for a user.
    pub fn inbox(user: &UserId) -> Self {
        Self(format!("inbox:{user}"))
    }

    /// Message stream for one conversation.
    pub fn conversation(id: &ConversationId) -> Self {
        Self(format!("conv:{id}"))
    }

    /// Borrow the raw name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
