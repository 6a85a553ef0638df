//! The conversation store and its ordering rule.

use std::collections::HashMap;

use banter_core::ids::{ConversationId, MessageId};
use banter_core::model::{Conversation, ConversationPatch, Message};
use tracing::debug;

/// What [`ConversationStore::replace_message`] actually did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReplaceOutcome {
    /// The old entry was swapped for the confirmed one in place.
    Swapped,
    /// The confirmed id was already in the list (push delivery won the
    /// race); the old entry was removed instead and no duplicate exists.
    Deduplicated,
    /// The old entry was already gone; the confirmed message was appended.
    Appended,
}

/// In-memory map of conversation summaries and per-conversation threads.
///
/// Mutations are synchronous and never touch the network or timers. The
/// display order is re-derived after every summary change.
#[derive(Debug, Default)]
pub struct ConversationStore {
    summaries: HashMap<ConversationId, Conversation>,
    order: Vec<ConversationId>,
    threads: HashMap<ConversationId, Vec<Message>>,
}

impl ConversationStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    // ────────────────────────────────────────────────────────────────────
    // Summaries
    // ────────────────────────────────────────────────────────────────────

    /// Merge a patch into an existing summary, or insert a new one.
    ///
    /// Never removes entries. The display order is recomputed afterwards.
    pub fn upsert_conversation(&mut self, patch: ConversationPatch) {
        match self.summaries.get_mut(&patch.id) {
            Some(existing) => existing.apply(&patch),
            None => {
                let id = patch.id.clone();
                let _ = self.summaries.insert(id.clone(), Conversation::from_patch(patch));
                self.order.push(id);
            }
        }
        self.reorder();
    }

    /// Summary for one conversation.
    pub fn conversation(&self, id: &ConversationId) -> Option<&Conversation> {
        self.summaries.get(id)
    }

    /// Whether a summary for this conversation exists.
    pub fn contains_conversation(&self, id: &ConversationId) -> bool {
        self.summaries.contains_key(id)
    }

    /// Snapshot of all summaries in display order.
    pub fn ordered_conversations(&self) -> Vec<Conversation> {
        self.order
            .iter()
            .filter_map(|id| self.summaries.get(id))
            .cloned()
            .collect()
    }

    /// Pinned conversations first, keeping their existing relative order,
    /// then the rest by last activity, newest first. Summaries with no
    /// messages yet sort after everything with a timestamp. Stable, so
    /// repeated calls cannot shuffle ties.
    fn reorder(&mut self) {
        let summaries = &self.summaries;
        let (pinned, mut unpinned): (Vec<ConversationId>, Vec<ConversationId>) = self
            .order
            .drain(..)
            .partition(|id| summaries.get(id).is_some_and(|c| c.pinned));
        unpinned.sort_by(|a, b| {
            let at = summaries.get(a).and_then(|c| c.last_message_at);
            let bt = summaries.get(b).and_then(|c| c.last_message_at);
            bt.cmp(&at)
        });
        self.order.extend(pinned);
        self.order.extend(unpinned);
    }

    // ────────────────────────────────────────────────────────────────────
    // Threads
    // ────────────────────────────────────────────────────────────────────

    /// Append to the end of a conversation's list.
    ///
    /// No-op returning `false` if a message with the same id is already
    /// present; that makes double push delivery harmless.
    pub fn append_message(&mut self, conversation_id: &ConversationId, message: Message) -> bool {
        let thread = self.threads.entry(conversation_id.clone()).or_default();
        if thread.iter().any(|m| m.id == message.id) {
            debug!(conversation = %conversation_id, id = %message.id, "duplicate append ignored");
            return false;
        }
        thread.push(message);
        true
    }

    /// Swap a provisional entry for its confirmed counterpart.
    ///
    /// Keeps the entry's position in the list. If the confirmed id is
    /// already present (the push event won the race) the old entry is
    /// removed instead, leaving exactly one copy.
    pub fn replace_message(
        &mut self,
        conversation_id: &ConversationId,
        old_id: &MessageId,
        confirmed: Message,
    ) -> ReplaceOutcome {
        let thread = self.threads.entry(conversation_id.clone()).or_default();
        if thread.iter().any(|m| m.id == confirmed.id) {
            thread.retain(|m| m.id != *old_id);
            debug!(conversation = %conversation_id, id = %confirmed.id, "confirmed id already present, dropped provisional");
            return ReplaceOutcome::Deduplicated;
        }
        match thread.iter_mut().find(|m| m.id == *old_id) {
            Some(slot) => {
                *slot = confirmed;
                ReplaceOutcome::Swapped
            }
            None => {
                thread.push(confirmed);
                ReplaceOutcome::Appended
            }
        }
    }

    /// Remove one message; used to roll back a failed provisional send.
    ///
    /// Returns `false` if no such message existed.
    pub fn remove_message(&mut self, conversation_id: &ConversationId, id: &MessageId) -> bool {
        let Some(thread) = self.threads.get_mut(conversation_id) else {
            return false;
        };
        let before = thread.len();
        thread.retain(|m| m.id != *id);
        before != thread.len()
    }

    /// Install a freshly fetched thread.
    ///
    /// Provisional entries already present are kept after the fetched
    /// messages: their sends are still pending and will reconcile on id
    /// equality like any other.
    pub fn load_thread(&mut self, conversation_id: &ConversationId, confirmed: Vec<Message>) {
        let thread = self.threads.entry(conversation_id.clone()).or_default();
        let pending: Vec<Message> = thread.iter().filter(|m| m.is_provisional()).cloned().collect();
        *thread = confirmed;
        for message in pending {
            if !thread.iter().any(|m| m.id == message.id) {
                thread.push(message);
            }
        }
    }

    /// Whether a message with this id exists in the conversation.
    pub fn contains_message(&self, conversation_id: &ConversationId, id: &MessageId) -> bool {
        self.threads
            .get(conversation_id)
            .is_some_and(|thread| thread.iter().any(|m| m.id == *id))
    }

    /// Snapshot of a conversation's message list; empty if none is loaded.
    pub fn thread_snapshot(&self, conversation_id: &ConversationId) -> Vec<Message> {
        self.threads.get(conversation_id).cloned().unwrap_or_default()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
