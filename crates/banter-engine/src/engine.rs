//! The engine task: one loop that owns every piece of mutable state.

use std::collections::HashMap;
use std::sync::Arc;

use banter_api::{ApiError, ConversationApi};
use banter_channel::{EventChannels, SubscriptionManager};
use banter_core::events::PushEvent;
use banter_core::ids::{ConversationId, MessageId};
use banter_core::model::{Conversation, ConversationPatch, CurrentUser, Message};
use banter_store::{ConversationStore, ReplaceOutcome};
use chrono::Utc;
use metrics::counter;
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, warn};

use crate::command::EngineCommand;
use crate::config::EngineConfig;
use crate::handle::EngineHandle;
use crate::update::EngineUpdate;

/// Resolved background work, reported back into the engine loop.
enum TaskResult {
    SendResolved {
        provisional_id: MessageId,
        result: Result<Message, ApiError>,
    },
    ThreadResolved {
        conversation_id: ConversationId,
        result: Result<Vec<Message>, ApiError>,
    },
    ReloadResolved {
        result: Result<Vec<Conversation>, ApiError>,
    },
}

/// What a send still owes us once it resolves.
struct PendingSend {
    conversation_id: ConversationId,
    text: String,
}

/// The synchronization engine for one signed-in session.
///
/// Owns the store, the subscription manager, and the per-send state. All
/// mutation happens on the engine task between `select!` arms; spawned
/// network calls only ever hand results back through the task queue, so no
/// handler can observe another handler halfway through.
pub struct Engine {
    user: CurrentUser,
    api: Arc<dyn ConversationApi>,
    store: ConversationStore,
    manager: SubscriptionManager,
    connectivity: watch::Receiver<bool>,
    connectivity_open: bool,
    commands: mpsc::Receiver<EngineCommand>,
    updates: broadcast::Sender<EngineUpdate>,
    tasks: mpsc::Sender<TaskResult>,
    task_results: mpsc::Receiver<TaskResult>,
    pending: HashMap<MessageId, PendingSend>,
    active: Option<ConversationId>,
    reload_in_flight: bool,
}

impl Engine {
    /// Spawn the engine task for a session and hand back its front door.
    ///
    /// The task subscribes the user's inbox stream and fetches the initial
    /// conversation list before processing anything else. It runs until
    /// [`EngineHandle::teardown`] is called or every handle is dropped.
    pub fn start(
        user: CurrentUser,
        api: Arc<dyn ConversationApi>,
        channels: Arc<dyn EventChannels>,
        config: EngineConfig,
    ) -> EngineHandle {
        let (mut engine, handle) = Self::build(user, api, channels, &config);
        tokio::spawn(async move {
            engine.bootstrap().await;
            engine.run().await;
        });
        handle
    }

    fn build(
        user: CurrentUser,
        api: Arc<dyn ConversationApi>,
        channels: Arc<dyn EventChannels>,
        config: &EngineConfig,
    ) -> (Self, EngineHandle) {
        let (command_tx, command_rx) = mpsc::channel(config.command_buffer);
        let (update_tx, _) = broadcast::channel(config.update_buffer);
        let (task_tx, task_rx) = mpsc::channel(config.task_buffer);
        let connectivity = channels.connectivity();
        let engine = Self {
            user,
            api,
            store: ConversationStore::new(),
            manager: SubscriptionManager::new(channels),
            connectivity,
            connectivity_open: true,
            commands: command_rx,
            updates: update_tx.clone(),
            tasks: task_tx,
            task_results: task_rx,
            pending: HashMap::new(),
            active: None,
            reload_in_flight: false,
        };
        (engine, EngineHandle::new(command_tx, update_tx))
    }

    async fn bootstrap(&mut self) {
        if let Err(error) = self.manager.init(&self.user.id).await {
            // connectivity watch already reflects the outage; no retry here
            warn!(%error, "inbox subscribe failed at session start");
        }
        self.spawn_reload();
    }

    async fn run(&mut self) {
        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(EngineCommand::Teardown { reply }) => {
                        self.manager.teardown().await;
                        let _ = reply.send(());
                        break;
                    }
                    Some(command) => self.handle_command(command).await,
                    None => {
                        // every handle dropped; the session is over
                        self.manager.teardown().await;
                        break;
                    }
                },
                event = self.manager.next_event() => self.handle_push(event),
                Some(result) = self.task_results.recv() => self.handle_task(result),
                changed = self.connectivity.changed(), if self.connectivity_open => {
                    match changed {
                        Ok(()) => self.handle_connectivity().await,
                        Err(_) => self.connectivity_open = false,
                    }
                }
            }
        }
    }

    // ────────────────────────────────────────────────────────────────────
    // Commands
    // ────────────────────────────────────────────────────────────────────

    async fn handle_command(&mut self, command: EngineCommand) {
        match command {
            EngineCommand::Submit {
                conversation_id,
                text,
            } => self.submit(conversation_id, text),
            EngineCommand::Activate { conversation_id } => self.activate(conversation_id).await,
            EngineCommand::Refresh => self.spawn_reload(),
            EngineCommand::Conversations { reply } => {
                let _ = reply.send(self.store.ordered_conversations());
            }
            EngineCommand::Thread {
                conversation_id,
                reply,
            } => {
                let _ = reply.send(self.store.thread_snapshot(&conversation_id));
            }
            EngineCommand::Teardown { .. } => {
                // handled in run() so it can break the loop
            }
        }
    }

    /// Append a provisional entry, patch the summary optimistically, and
    /// fire the send. Each submit is its own pending record, so concurrent
    /// sends reconcile independently.
    fn submit(&mut self, conversation_id: ConversationId, text: String) {
        let provisional = Message::provisional(conversation_id.clone(), &self.user, text.clone());
        let provisional_id = provisional.id.clone();
        let _ = self.store.append_message(&conversation_id, provisional);

        if self.store.contains_conversation(&conversation_id) {
            let mut patch = ConversationPatch::new(conversation_id.clone());
            patch.last_text = Some(text.clone());
            patch.last_sender = Some(self.user.name.clone());
            patch.last_message_at = Some(Utc::now());
            self.store.upsert_conversation(patch);
            self.emit(EngineUpdate::ConversationsChanged);
        }
        self.emit(EngineUpdate::ThreadChanged {
            conversation_id: conversation_id.clone(),
        });

        self.pending.insert(
            provisional_id.clone(),
            PendingSend {
                conversation_id: conversation_id.clone(),
                text: text.clone(),
            },
        );

        let api = Arc::clone(&self.api);
        let tasks = self.tasks.clone();
        tokio::spawn(async move {
            let result = api.send_message(&conversation_id, &text).await;
            let _ = tasks
                .send(TaskResult::SendResolved {
                    provisional_id,
                    result,
                })
                .await;
        });
    }

    /// Switch the active conversation: badge zeroed before anything can
    /// interleave, stream swapped, thread fetched.
    async fn activate(&mut self, conversation_id: ConversationId) {
        self.active = Some(conversation_id.clone());
        if let Some(conversation) = self.store.conversation(&conversation_id) {
            if conversation.unread_count != 0 {
                let mut patch = ConversationPatch::new(conversation_id.clone());
                patch.unread_count = Some(0);
                self.store.upsert_conversation(patch);
            }
        }
        self.emit(EngineUpdate::ConversationsChanged);

        if let Err(error) = self.manager.activate(&conversation_id).await {
            warn!(%error, conversation = %conversation_id, "conversation stream subscribe failed");
        }
        self.spawn_thread_fetch(conversation_id);
    }

    // ────────────────────────────────────────────────────────────────────
    // Push events
    // ────────────────────────────────────────────────────────────────────

    fn handle_push(&mut self, event: PushEvent) {
        match event {
            PushEvent::InboxUpdated {
                conversation_id,
                last_text,
                sender,
                last_message_at,
            } => {
                if !self.store.contains_conversation(&conversation_id) {
                    // summaries come from the server, never from events
                    debug!(conversation = %conversation_id, "inbox event for unknown conversation, reloading list");
                    self.spawn_reload();
                    return;
                }
                let active = self.active.as_ref() == Some(&conversation_id);
                let mut patch = ConversationPatch::new(conversation_id.clone());
                patch.last_text = Some(last_text);
                patch.last_sender = Some(sender.name);
                patch.last_message_at = Some(last_message_at);
                if !active {
                    let unread = self
                        .store
                        .conversation(&conversation_id)
                        .map_or(0, |c| c.unread_count);
                    patch.unread_count = Some(unread + 1);
                }
                self.store.upsert_conversation(patch);
                self.emit(EngineUpdate::ConversationsChanged);
            }
            PushEvent::MessageDelivered { message } => {
                // the stream for the old conversation may still flush events
                // after a switch; compare at delivery time and drop strays
                if self.active.as_ref() != Some(&message.conversation_id) {
                    counter!("engine_stale_deliveries_total").increment(1);
                    debug!(conversation = %message.conversation_id, "dropping delivery for inactive conversation");
                    return;
                }
                let conversation_id = message.conversation_id.clone();
                if self.store.append_message(&conversation_id, message) {
                    self.emit(EngineUpdate::ThreadChanged { conversation_id });
                }
            }
        }
    }

    // ────────────────────────────────────────────────────────────────────
    // Resolved background work
    // ────────────────────────────────────────────────────────────────────

    fn handle_task(&mut self, result: TaskResult) {
        match result {
            TaskResult::SendResolved {
                provisional_id,
                result,
            } => self.finish_send(&provisional_id, result),
            TaskResult::ThreadResolved {
                conversation_id,
                result,
            } => match result {
                Ok(messages) => {
                    self.store.load_thread(&conversation_id, messages);
                    self.emit(EngineUpdate::ThreadChanged { conversation_id });
                }
                Err(error) => {
                    warn!(%error, conversation = %conversation_id, "thread fetch failed");
                }
            },
            TaskResult::ReloadResolved { result } => {
                self.reload_in_flight = false;
                match result {
                    Ok(conversations) => {
                        for conversation in &conversations {
                            self.store
                                .upsert_conversation(ConversationPatch::from_full(conversation));
                        }
                        self.emit(EngineUpdate::ConversationsChanged);
                    }
                    Err(error) => warn!(%error, "conversation list reload failed"),
                }
            }
        }
    }

    /// Settle one send. Outcomes commute with push delivery: whichever copy
    /// of the confirmed message arrived first wins and the other is retired
    /// by id.
    fn finish_send(&mut self, provisional_id: &MessageId, result: Result<Message, ApiError>) {
        let Some(pending) = self.pending.remove(provisional_id) else {
            debug!(provisional = %provisional_id, "send resolved with no pending record");
            return;
        };
        match result {
            Ok(confirmed) => {
                let conversation_id = pending.conversation_id;
                let outcome =
                    self.store
                        .replace_message(&conversation_id, provisional_id, confirmed);
                if outcome == ReplaceOutcome::Deduplicated {
                    debug!(conversation = %conversation_id, "push delivery beat the send confirmation");
                }
                self.emit(EngineUpdate::ThreadChanged { conversation_id });
            }
            Err(error) => {
                counter!("engine_send_failures_total").increment(1);
                warn!(%error, conversation = %pending.conversation_id, "send failed, rolling back provisional entry");
                let _ = self
                    .store
                    .remove_message(&pending.conversation_id, provisional_id);
                self.emit(EngineUpdate::ThreadChanged {
                    conversation_id: pending.conversation_id.clone(),
                });
                self.emit(EngineUpdate::SendFailed {
                    conversation_id: pending.conversation_id,
                    text: pending.text,
                    reason: error.to_string(),
                });
            }
        }
    }

    // ────────────────────────────────────────────────────────────────────
    // Connectivity
    // ────────────────────────────────────────────────────────────────────

    async fn handle_connectivity(&mut self) {
        let connected = *self.connectivity.borrow_and_update();
        self.emit(EngineUpdate::ConnectivityChanged { connected });
        if connected {
            if let Err(error) = self.manager.reestablish().await {
                warn!(%error, "subscription reestablish failed");
            }
            // events missed while dark are gone; refetch the list once
            self.spawn_reload();
        }
    }

    // ────────────────────────────────────────────────────────────────────
    // Spawned work
    // ────────────────────────────────────────────────────────────────────

    fn spawn_reload(&mut self) {
        if self.reload_in_flight {
            return;
        }
        self.reload_in_flight = true;
        let api = Arc::clone(&self.api);
        let tasks = self.tasks.clone();
        tokio::spawn(async move {
            let result = api.list_conversations().await;
            let _ = tasks.send(TaskResult::ReloadResolved { result }).await;
        });
    }

    fn spawn_thread_fetch(&self, conversation_id: ConversationId) {
        let api = Arc::clone(&self.api);
        let tasks = self.tasks.clone();
        tokio::spawn(async move {
            let result = api.fetch_thread(&conversation_id).await;
            let _ = tasks
                .send(TaskResult::ThreadResolved {
                    conversation_id,
                    result,
                })
                .await;
        });
    }

    fn emit(&self, update: EngineUpdate) {
        // no subscribers is fine; updates are advisory
        let _ = self.updates.send(update);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
