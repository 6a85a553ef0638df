//! Push-channel wire events.
//!
//! The push transport delivers dynamically typed JSON. Everything entering
//! the engine is first funneled through [`PushEvent::parse`], which admits
//! only the closed set of tagged variants below and silently drops anything
//! malformed; a bad payload must never take the engine down.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::ConversationId;
use crate::model::{Message, SenderRef};

/// Tagged events delivered over the push channels.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PushEvent {
    /// Lightweight "something changed" notification on the personal inbox
    /// stream. Carries just enough to refresh a summary row.
    #[serde(rename = "inbox-update")]
    InboxUpdated {
        /// Conversation the update concerns.
        #[serde(rename = "conversationId")]
        conversation_id: ConversationId,
        /// Text of the newest message.
        #[serde(rename = "lastText")]
        last_text: String,
        /// Who sent it.
        sender: SenderRef,
        /// When it was sent.
        #[serde(rename = "lastMessageAt")]
        last_message_at: DateTime<Utc>,
    },

    /// Full message fan-out on a per-conversation stream.
    #[serde(rename = "message-delivered")]
    MessageDelivered {
        /// The confirmed message, exactly as persisted server-side.
        message: Message,
    },
}

impl PushEvent {
    /// Parse a raw payload, dropping anything that is not a known event.
    ///
    /// Returns `None` for unknown tags, missing fields, or non-JSON input;
    /// the drop is logged at debug level only.
    pub fn parse(raw: &str) -> Option<Self> {
        match serde_json::from_str(raw) {
            Ok(event) => Some(event),
            Err(error) => {
                tracing::debug!(%error, "dropping malformed push event");
                None
            }
        }
    }

    /// Parse an already-decoded JSON value, with the same drop semantics.
    pub fn from_value(value: serde_json::Value) -> Option<Self> {
        match serde_json::from_value(value) {
            Ok(event) => Some(event),
            Err(error) => {
                tracing::debug!(%error, "dropping malformed push event");
                None
            }
        }
    }

    /// The conversation the event concerns.
    pub fn conversation_id(&self) -> &ConversationId {
        match self {
            Self::InboxUpdated { conversation_id, .. } => conversation_id,
            Self::MessageDelivered { message } => &message.conversation_id,
        }
    }
}
