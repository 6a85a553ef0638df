//! Scripted in-memory double for deterministic testing without a server.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use banter_core::ids::{ConversationId, MessageId, UserId};
use banter_core::model::{Conversation, CurrentUser, Message};
use chrono::Utc;
use parking_lot::Mutex;

use crate::ConversationApi;
use crate::error::ApiError;

/// Pre-programmed outcome for one `send_message` call.
pub enum SendOutcome {
    /// Return this message as the canonical copy.
    Reply(Message),
    /// Fail the call with this error.
    Error(ApiError),
    /// Wait a duration, then resolve to the inner outcome.
    Delay(Duration, Box<SendOutcome>),
}

impl SendOutcome {
    /// Convenience: wrap any outcome with a delay.
    pub fn delayed(delay: Duration, inner: SendOutcome) -> Self {
        Self::Delay(delay, Box::new(inner))
    }
}

/// Mock API that serves settable data and consumes scripted send outcomes
/// in queue order.
///
/// Sends with nothing queued echo the request back as a confirmed message
/// with a fresh server id, so tests only script the calls they care about.
/// Every request is counted and every send body recorded.
pub struct MockConversationApi {
    conversations: Mutex<Vec<Conversation>>,
    threads: Mutex<HashMap<ConversationId, Vec<Message>>>,
    send_script: Mutex<VecDeque<SendOutcome>>,
    list_failures: Mutex<VecDeque<ApiError>>,
    thread_failures: Mutex<VecDeque<ApiError>>,
    sent: Mutex<Vec<(ConversationId, String)>>,
    echo_sender: Mutex<CurrentUser>,
    list_calls: AtomicUsize,
    thread_calls: AtomicUsize,
    send_calls: AtomicUsize,
}

impl MockConversationApi {
    pub fn new() -> Self {
        Self {
            conversations: Mutex::new(Vec::new()),
            threads: Mutex::new(HashMap::new()),
            send_script: Mutex::new(VecDeque::new()),
            list_failures: Mutex::new(VecDeque::new()),
            thread_failures: Mutex::new(VecDeque::new()),
            sent: Mutex::new(Vec::new()),
            echo_sender: Mutex::new(CurrentUser {
                id: UserId::from_raw("user_mock"),
                name: "Mock User".to_owned(),
            }),
            list_calls: AtomicUsize::new(0),
            thread_calls: AtomicUsize::new(0),
            send_calls: AtomicUsize::new(0),
        }
    }

    /// Replace the conversation list served by `list_conversations`.
    pub fn set_conversations(&self, conversations: Vec<Conversation>) {
        *self.conversations.lock() = conversations;
    }

    /// Replace the thread served by `fetch_thread` for one conversation.
    pub fn set_thread(&self, conversation: &ConversationId, messages: Vec<Message>) {
        self.threads.lock().insert(conversation.clone(), messages);
    }

    /// Queue the outcome of the next unscripted `send_message` call.
    pub fn queue_send(&self, outcome: SendOutcome) {
        self.send_script.lock().push_back(outcome);
    }

    /// Fail the next `list_conversations` call with this error.
    pub fn queue_list_failure(&self, error: ApiError) {
        self.list_failures.lock().push_back(error);
    }

    /// Fail the next `fetch_thread` call with this error.
    pub fn queue_thread_failure(&self, error: ApiError) {
        self.thread_failures.lock().push_back(error);
    }

    /// Identity stamped onto echoed replies when no outcome is queued.
    pub fn set_echo_sender(&self, sender: CurrentUser) {
        *self.echo_sender.lock() = sender;
    }

    /// Every `(conversation, text)` pair passed to `send_message`, in order.
    pub fn sent(&self) -> Vec<(ConversationId, String)> {
        self.sent.lock().clone()
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::Relaxed)
    }

    pub fn thread_calls(&self) -> usize {
        self.thread_calls.load(Ordering::Relaxed)
    }

    pub fn send_calls(&self) -> usize {
        self.send_calls.load(Ordering::Relaxed)
    }

    fn echo(&self, conversation: &ConversationId, text: &str) -> Message {
        let sender = self.echo_sender.lock().clone();
        Message {
            id: MessageId::new(),
            conversation_id: conversation.clone(),
            sender_id: sender.id,
            sender_name: sender.name,
            text: text.to_owned(),
            created_at: Utc::now(),
        }
    }
}

impl Default for MockConversationApi {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConversationApi for MockConversationApi {
    async fn list_conversations(&self) -> Result<Vec<Conversation>, ApiError> {
        self.list_calls.fetch_add(1, Ordering::Relaxed);
        if let Some(error) = self.list_failures.lock().pop_front() {
            return Err(error);
        }
        Ok(self.conversations.lock().clone())
    }

    async fn fetch_thread(
        &self,
        conversation: &ConversationId,
    ) -> Result<Vec<Message>, ApiError> {
        self.thread_calls.fetch_add(1, Ordering::Relaxed);
        if let Some(error) = self.thread_failures.lock().pop_front() {
            return Err(error);
        }
        let thread = self.threads.lock().get(conversation).cloned();
        Ok(thread.unwrap_or_default())
    }

    async fn send_message(
        &self,
        conversation: &ConversationId,
        text: &str,
    ) -> Result<Message, ApiError> {
        self.send_calls.fetch_add(1, Ordering::Relaxed);
        self.sent
            .lock()
            .push((conversation.clone(), text.to_owned()));

        let scripted = self.send_script.lock().pop_front();
        let mut outcome = match scripted {
            Some(outcome) => outcome,
            None => SendOutcome::Reply(self.echo(conversation, text)),
        };
        loop {
            match outcome {
                SendOutcome::Delay(delay, inner) => {
                    tokio::time::sleep(delay).await;
                    outcome = *inner;
                }
                SendOutcome::Reply(message) => return Ok(message),
                SendOutcome::Error(error) => return Err(error),
            }
        }
    }
}
