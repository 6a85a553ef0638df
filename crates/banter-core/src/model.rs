//! Conversation summaries and thread messages.
//!
//! These are the records the store holds and the HTTP endpoints exchange.
//! Wire serialization is camelCase JSON; `last_*` fields are nullable on the
//! wire because a freshly created conversation has no messages yet.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{ConversationId, MessageId, UserId};

/// Summary row for the conversation list.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    /// Unique conversation id.
    pub id: ConversationId,
    /// Display title.
    pub title: String,
    /// Number of participants.
    pub members_count: u32,
    /// Display name of the last sender, if any message exists.
    #[serde(default)]
    pub last_sender: Option<String>,
    /// Text of the most recent message.
    #[serde(default)]
    pub last_text: Option<String>,
    /// Timestamp of the most recent message.
    #[serde(default)]
    pub last_message_at: Option<DateTime<Utc>>,
    /// Pinned conversations sort ahead of everything else.
    #[serde(default)]
    pub pinned: bool,
    /// Unread badge count; only ever non-zero for inactive conversations.
    #[serde(default)]
    pub unread_count: u32,
}

/// A single thread entry.
///
/// A message is *provisional* while its send is unconfirmed (the id carries
/// the reserved local prefix) and *confirmed* once it has a server-issued id.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Unique within the conversation.
    pub id: MessageId,
    /// Owning conversation.
    pub conversation_id: ConversationId,
    /// Sender's user id.
    pub sender_id: UserId,
    /// Sender's display name.
    pub sender_name: String,
    /// Message body.
    pub text: String,
    /// Creation time (local clock for provisional entries).
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Build the provisional entry appended on submit, before confirmation.
    pub fn provisional(
        conversation_id: ConversationId,
        sender: &CurrentUser,
        text: impl Into<String>,
    ) -> Self {
        Self {
            id: MessageId::provisional(),
            conversation_id,
            sender_id: sender.id.clone(),
            sender_name: sender.name.clone(),
            text: text.into(),
            created_at: Utc::now(),
        }
    }

    /// True while the send backing this entry is unconfirmed.
    pub fn is_provisional(&self) -> bool {
        self.id.is_provisional()
    }
}

/// Identity of the signed-in user, fixed for the session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CurrentUser {
    /// User id; names the personal inbox stream.
    pub id: UserId,
    /// Display name stamped onto provisional messages.
    pub name: String,
}

/// Sender identity carried by inbox events.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SenderRef {
    /// Sender's user id.
    pub id: UserId,
    /// Sender's display name.
    pub name: String,
}

/// Partial update for a conversation summary.
///
/// `Some` fields are merged into the existing summary; `None` fields are left
/// untouched. Inserting from a patch fills unspecified fields with defaults,
/// so callers inserting new summaries should supply complete patches.
#[derive(Clone, Debug, PartialEq)]
pub struct ConversationPatch {
    /// Conversation the patch applies to.
    pub id: ConversationId,
    /// New title, if changing.
    pub title: Option<String>,
    /// New participant count, if changing.
    pub members_count: Option<u32>,
    /// New last-sender display name.
    pub last_sender: Option<String>,
    /// New last-message text.
    pub last_text: Option<String>,
    /// New last-message timestamp.
    pub last_message_at: Option<DateTime<Utc>>,
    /// New pinned flag.
    pub pinned: Option<bool>,
    /// New unread count.
    pub unread_count: Option<u32>,
}

impl ConversationPatch {
    /// Empty patch for a conversation; set fields before applying.
    pub fn new(id: ConversationId) -> Self {
        Self {
            id,
            title: None,
            members_count: None,
            last_sender: None,
            last_text: None,
            last_message_at: None,
            pinned: None,
            unread_count: None,
        }
    }

    /// Complete patch mirroring a full summary.
    ///
    /// Nullable `last_*` fields map across directly: a summary with no
    /// messages yet produces a patch that leaves those fields alone on merge
    /// and empty on insert.
    pub fn from_full(conversation: &Conversation) -> Self {
        Self {
            id: conversation.id.clone(),
            title: Some(conversation.title.clone()),
            members_count: Some(conversation.members_count),
            last_sender: conversation.last_sender.clone(),
            last_text: conversation.last_text.clone(),
            last_message_at: conversation.last_message_at,
            pinned: Some(conversation.pinned),
            unread_count: Some(conversation.unread_count),
        }
    }
}

impl Conversation {
    /// Merge the `Some` fields of a patch into this summary.
    pub fn apply(&mut self, patch: &ConversationPatch) {
        if let Some(title) = &patch.title {
            self.title = title.clone();
        }
        if let Some(members_count) = patch.members_count {
            self.members_count = members_count;
        }
        if let Some(last_sender) = &patch.last_sender {
            self.last_sender = Some(last_sender.clone());
        }
        if let Some(last_text) = &patch.last_text {
            self.last_text = Some(last_text.clone());
        }
        if let Some(last_message_at) = patch.last_message_at {
            self.last_message_at = Some(last_message_at);
        }
        if let Some(pinned) = patch.pinned {
            self.pinned = pinned;
        }
        if let Some(unread_count) = patch.unread_count {
            self.unread_count = unread_count;
        }
    }

    /// Build a summary from a patch, defaulting unspecified fields.
    pub fn from_patch(patch: ConversationPatch) -> Self {
        Self {
            id: patch.id,
            title: patch.title.unwrap_or_default(),
            members_count: patch.members_count.unwrap_or_default(),
            last_sender: patch.last_sender,
            last_text: patch.last_text,
            last_message_at: patch.last_message_at,
            pinned: patch.pinned.unwrap_or_default(),
            unread_count: patch.unread_count.unwrap_or_default(),
        }
    }
}
