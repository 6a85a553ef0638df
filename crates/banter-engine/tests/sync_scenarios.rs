//! End-to-end scenarios: a running engine over the in-process hub and the
//! scripted API, driven only through its public handle.

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use banter_api::{ApiError, ConversationApi, MockConversationApi, SendOutcome};
use banter_channel::{ChannelName, ChannelOp, EventChannels, MemoryChannels};
use banter_core::events::PushEvent;
use banter_core::ids::{ConversationId, MessageId, UserId};
use banter_core::model::{Conversation, CurrentUser, Message, SenderRef};
use banter_engine::{Engine, EngineConfig, EngineHandle, EngineStopped, EngineUpdate};
use chrono::{TimeZone, Utc};
use tokio::sync::broadcast;

const WAIT: Duration = Duration::from_secs(5);

fn cid(id: &str) -> ConversationId {
    ConversationId::from_raw(id)
}

fn user() -> CurrentUser {
    CurrentUser {
        id: UserId::from_raw("u1"),
        name: "Dana".to_owned(),
    }
}

fn conversation(id: &str, title: &str, minute: u32) -> Conversation {
    Conversation {
        id: cid(id),
        title: title.to_owned(),
        members_count: 2,
        last_sender: Some("Priya".to_owned()),
        last_text: Some("earlier".to_owned()),
        last_message_at: Some(Utc.with_ymd_and_hms(2025, 3, 1, 12, minute, 0).unwrap()),
        pinned: false,
        unread_count: 0,
    }
}

fn server_message(conv: &str, id: &str, text: &str) -> Message {
    Message {
        id: MessageId::from_raw(id),
        conversation_id: cid(conv),
        sender_id: UserId::from_raw("u9"),
        sender_name: "Priya".to_owned(),
        text: text.to_owned(),
        created_at: Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap(),
    }
}

fn own_message(conv: &str, id: &str, text: &str) -> Message {
    Message {
        id: MessageId::from_raw(id),
        conversation_id: cid(conv),
        sender_id: user().id,
        sender_name: user().name,
        text: text.to_owned(),
        created_at: Utc.with_ymd_and_hms(2025, 3, 1, 12, 1, 0).unwrap(),
    }
}

fn inbox_update(conv: &str, text: &str, minute: u32) -> PushEvent {
    PushEvent::InboxUpdated {
        conversation_id: cid(conv),
        last_text: text.to_owned(),
        sender: SenderRef {
            id: UserId::from_raw("u9"),
            name: "Priya".to_owned(),
        },
        last_message_at: Utc.with_ymd_and_hms(2025, 3, 1, 12, minute, 0).unwrap(),
    }
}

struct Harness {
    handle: EngineHandle,
    api: Arc<MockConversationApi>,
    channels: Arc<MemoryChannels>,
}

async fn start_with(conversations: Vec<Conversation>) -> Harness {
    let api = Arc::new(MockConversationApi::new());
    api.set_conversations(conversations.clone());
    api.set_echo_sender(user());
    let channels = Arc::new(MemoryChannels::new());
    let handle = Engine::start(
        user(),
        Arc::clone(&api) as Arc<dyn ConversationApi>,
        Arc::clone(&channels) as Arc<dyn EventChannels>,
        EngineConfig::default(),
    );
    // the initial list fetch has landed once every seeded summary shows up
    let seeded = conversations.len();
    let _ = conversations_matching(&handle, move |list| list.len() >= seeded).await;
    Harness {
        handle,
        api,
        channels,
    }
}

/// Poll the conversation snapshot until `pred` holds, then return it.
async fn conversations_matching(
    handle: &EngineHandle,
    pred: impl Fn(&[Conversation]) -> bool,
) -> Vec<Conversation> {
    let deadline = tokio::time::Instant::now() + WAIT;
    loop {
        let list = handle.conversations().await.expect("engine stopped");
        if pred(&list) {
            return list;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for conversation state, last saw: {list:?}"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Poll one thread snapshot until `pred` holds, then return it.
async fn thread_matching(
    handle: &EngineHandle,
    conversation: &ConversationId,
    pred: impl Fn(&[Message]) -> bool,
) -> Vec<Message> {
    let deadline = tokio::time::Instant::now() + WAIT;
    loop {
        let thread = handle.thread(conversation).await.expect("engine stopped");
        if pred(&thread) {
            return thread;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for thread state, last saw: {thread:?}"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Wait for the next update matching `pred`, skipping the rest.
async fn next_matching(
    updates: &mut broadcast::Receiver<EngineUpdate>,
    pred: impl Fn(&EngineUpdate) -> bool,
) -> EngineUpdate {
    tokio::time::timeout(WAIT, async {
        loop {
            match updates.recv().await {
                Ok(update) if pred(&update) => return update,
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => panic!("engine update stream closed"),
            }
        }
    })
    .await
    .expect("timed out waiting for engine update")
}

/// Publish once a subscriber for the channel exists.
async fn publish_when_routed(channels: &MemoryChannels, channel: &ChannelName, event: PushEvent) {
    let deadline = tokio::time::Instant::now() + WAIT;
    while !channels.publish(channel, event.clone()) {
        assert!(
            tokio::time::Instant::now() < deadline,
            "no subscriber appeared for {channel}"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Wait until the hub has recorded this subscribe/unsubscribe op.
async fn ops_eventually(channels: &MemoryChannels, op: ChannelOp) {
    let deadline = tokio::time::Instant::now() + WAIT;
    while !channels.ops().contains(&op) {
        assert!(
            tokio::time::Instant::now() < deadline,
            "hub never recorded {op:?}, saw {:?}",
            channels.ops()
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[tokio::test]
async fn initial_load_orders_by_recency() {
    let h = start_with(vec![
        conversation("c1", "Order #1042", 1),
        conversation("c2", "Support", 9),
    ])
    .await;

    let list = h.handle.conversations().await.unwrap();
    assert_eq!(list.len(), 2);
    assert_eq!(list[0].id, cid("c2"));
    assert_eq!(list[1].id, cid("c1"));
    assert!(h.handle.thread(&cid("c1")).await.unwrap().is_empty());
}

#[tokio::test]
async fn send_replaces_provisional_with_canonical_copy() {
    let h = start_with(vec![conversation("c1", "Order #1042", 1)]).await;
    h.api
        .set_thread(&cid("c1"), vec![server_message("c1", "m0", "earlier")]);
    h.handle.activate(&cid("c1")).await.unwrap();
    let _ = thread_matching(&h.handle, &cid("c1"), |t| t.len() == 1).await;

    h.api
        .queue_send(SendOutcome::Reply(own_message("c1", "m1", "Hello")));
    h.handle.submit(&cid("c1"), "Hello").await.unwrap();

    let thread = thread_matching(&h.handle, &cid("c1"), |t| {
        t.len() == 2 && t.iter().all(|m| !m.is_provisional())
    })
    .await;
    assert_eq!(thread[1].id.as_str(), "m1");
    assert_eq!(thread[1].text, "Hello");

    let list = h.handle.conversations().await.unwrap();
    assert_eq!(list[0].last_text.as_deref(), Some("Hello"));
    assert_eq!(list[0].last_sender.as_deref(), Some("Dana"));
}

#[tokio::test(start_paused = true)]
async fn push_delivery_before_confirmation_converges_to_one_copy() {
    let h = start_with(vec![conversation("c1", "Order #1042", 1)]).await;
    h.api
        .set_thread(&cid("c1"), vec![server_message("c1", "m0", "earlier")]);
    h.handle.activate(&cid("c1")).await.unwrap();
    let _ = thread_matching(&h.handle, &cid("c1"), |t| t.len() == 1).await;

    let confirmed = own_message("c1", "m2", "Hi");
    h.api.queue_send(SendOutcome::delayed(
        Duration::from_millis(300),
        SendOutcome::Reply(confirmed.clone()),
    ));
    h.handle.submit(&cid("c1"), "Hi").await.unwrap();

    // push delivery of the same message wins the race
    publish_when_routed(
        &h.channels,
        &ChannelName::conversation(&cid("c1")),
        PushEvent::MessageDelivered { message: confirmed },
    )
    .await;
    let _ = thread_matching(&h.handle, &cid("c1"), |t| t.len() == 3).await;

    // once the send resolves, exactly one copy of m2 remains
    let thread = thread_matching(&h.handle, &cid("c1"), |t| t.len() == 2).await;
    assert_eq!(thread[1].id.as_str(), "m2");
    assert!(!thread.iter().any(Message::is_provisional));
}

#[tokio::test]
async fn failed_send_rolls_back_and_reports() {
    let h = start_with(vec![conversation("c1", "Order #1042", 1)]).await;
    h.api
        .set_thread(&cid("c1"), vec![server_message("c1", "m0", "earlier")]);
    h.handle.activate(&cid("c1")).await.unwrap();
    let _ = thread_matching(&h.handle, &cid("c1"), |t| t.len() == 1).await;

    let mut updates = h.handle.updates();
    h.api.queue_send(SendOutcome::Error(ApiError::ServerError {
        status: 500,
        body: "boom".to_owned(),
    }));
    h.handle.submit(&cid("c1"), "Test").await.unwrap();

    let failure = next_matching(&mut updates, |u| {
        matches!(u, EngineUpdate::SendFailed { .. })
    })
    .await;
    assert_matches!(failure, EngineUpdate::SendFailed { conversation_id, text, reason } => {
        assert_eq!(conversation_id, cid("c1"));
        assert_eq!(text, "Test");
        assert!(reason.contains("500"), "reason: {reason}");
    });

    let thread = h.handle.thread(&cid("c1")).await.unwrap();
    assert_eq!(thread.len(), 1, "provisional rolled back");
    assert_eq!(thread[0].id.as_str(), "m0");
}

#[tokio::test]
async fn unread_accumulates_then_clears_on_activation() {
    let h = start_with(vec![
        conversation("c1", "Order #1042", 5),
        conversation("c2", "Support", 1),
    ])
    .await;
    h.handle.activate(&cid("c1")).await.unwrap();

    for minute in [10, 11, 12] {
        publish_when_routed(
            &h.channels,
            &ChannelName::inbox(&user().id),
            inbox_update("c2", "three in a row", minute),
        )
        .await;
    }

    let list = conversations_matching(&h.handle, |l| {
        l.iter().any(|c| c.id == cid("c2") && c.unread_count == 3)
    })
    .await;
    assert_eq!(list[0].id, cid("c2"), "new activity floats to the top");

    h.handle.activate(&cid("c2")).await.unwrap();
    let _ = conversations_matching(&h.handle, |l| {
        l.iter().any(|c| c.id == cid("c2") && c.unread_count == 0)
    })
    .await;
}

#[tokio::test]
async fn switching_conversations_stops_events_for_the_old_one() {
    let h = start_with(vec![
        conversation("c1", "Order #1042", 1),
        conversation("c2", "Support", 2),
    ])
    .await;
    h.api
        .set_thread(&cid("c1"), vec![server_message("c1", "m0", "earlier")]);
    h.handle.activate(&cid("c1")).await.unwrap();
    let _ = thread_matching(&h.handle, &cid("c1"), |t| t.len() == 1).await;

    publish_when_routed(
        &h.channels,
        &ChannelName::conversation(&cid("c1")),
        PushEvent::MessageDelivered {
            message: server_message("c1", "m1", "while active"),
        },
    )
    .await;
    let _ = thread_matching(&h.handle, &cid("c1"), |t| t.len() == 2).await;

    h.handle.activate(&cid("c2")).await.unwrap();
    ops_eventually(
        &h.channels,
        ChannelOp::Subscribed(ChannelName::conversation(&cid("c2"))),
    )
    .await;

    // the old route is gone, so a late event has nowhere to go
    assert!(!h.channels.publish(
        &ChannelName::conversation(&cid("c1")),
        PushEvent::MessageDelivered {
            message: server_message("c1", "m9", "late"),
        },
    ));
    assert_eq!(h.handle.thread(&cid("c1")).await.unwrap().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn concurrent_sends_reconcile_independently() {
    let h = start_with(vec![conversation("c1", "Order #1042", 1)]).await;
    h.api
        .set_thread(&cid("c1"), vec![server_message("c1", "m0", "earlier")]);
    h.handle.activate(&cid("c1")).await.unwrap();
    let _ = thread_matching(&h.handle, &cid("c1"), |t| t.len() == 1).await;

    // the second send confirms before the first
    h.api.queue_send(SendOutcome::delayed(
        Duration::from_millis(500),
        SendOutcome::Reply(own_message("c1", "m1", "one")),
    ));
    h.api.queue_send(SendOutcome::delayed(
        Duration::from_millis(100),
        SendOutcome::Reply(own_message("c1", "m2", "two")),
    ));

    h.handle.submit(&cid("c1"), "one").await.unwrap();
    h.handle.submit(&cid("c1"), "two").await.unwrap();

    let thread = thread_matching(&h.handle, &cid("c1"), |t| {
        t.len() == 3 && t.iter().all(|m| !m.is_provisional())
    })
    .await;
    let texts: Vec<&str> = thread.iter().map(|m| m.text.as_str()).collect();
    assert_eq!(
        texts,
        vec!["earlier", "one", "two"],
        "positions preserved despite reversed confirmation order"
    );
    assert_eq!(thread[1].id.as_str(), "m1");
    assert_eq!(thread[2].id.as_str(), "m2");
}

#[tokio::test]
async fn reconnection_reestablishes_both_streams() {
    let h = start_with(vec![conversation("c1", "Order #1042", 1)]).await;
    h.api
        .set_thread(&cid("c1"), vec![server_message("c1", "m0", "earlier")]);
    h.handle.activate(&cid("c1")).await.unwrap();
    let _ = thread_matching(&h.handle, &cid("c1"), |t| t.len() == 1).await;

    let mut updates = h.handle.updates();
    h.channels.set_connected(false);
    let down = next_matching(&mut updates, |u| {
        matches!(u, EngineUpdate::ConnectivityChanged { .. })
    })
    .await;
    assert_eq!(down, EngineUpdate::ConnectivityChanged { connected: false });

    h.channels.set_connected(true);
    let up = next_matching(&mut updates, |u| {
        matches!(u, EngineUpdate::ConnectivityChanged { connected: true })
    })
    .await;
    assert_eq!(up, EngineUpdate::ConnectivityChanged { connected: true });

    // inbox delivery works again; keep publishing until the patch sticks,
    // since the post-reconnect list refresh may land in between
    let deadline = tokio::time::Instant::now() + WAIT;
    loop {
        publish_when_routed(
            &h.channels,
            &ChannelName::inbox(&user().id),
            inbox_update("c1", "back online", 30),
        )
        .await;
        let list = h.handle.conversations().await.unwrap();
        if list[0].last_text.as_deref() == Some("back online") {
            break;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "inbox event never applied after reconnect"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    // and so does per-conversation delivery
    publish_when_routed(
        &h.channels,
        &ChannelName::conversation(&cid("c1")),
        PushEvent::MessageDelivered {
            message: server_message("c1", "m1", "fresh"),
        },
    )
    .await;
    let _ = thread_matching(&h.handle, &cid("c1"), |t| {
        t.iter().any(|m| m.id.as_str() == "m1")
    })
    .await;
}

#[tokio::test]
async fn inbox_event_for_unknown_conversation_refreshes_the_list() {
    let h = start_with(vec![conversation("c1", "Order #1042", 1)]).await;
    // the server now knows a conversation the client has never seen
    h.api.set_conversations(vec![
        conversation("c1", "Order #1042", 1),
        conversation("c9", "Wholesale", 7),
    ]);

    publish_when_routed(
        &h.channels,
        &ChannelName::inbox(&user().id),
        inbox_update("c9", "new thread", 7),
    )
    .await;

    let list = conversations_matching(&h.handle, |l| l.iter().any(|c| c.id == cid("c9"))).await;
    let c9 = list.iter().find(|c| c.id == cid("c9")).unwrap();
    assert_eq!(c9.title, "Wholesale", "summary comes from the server, not the event");
    assert!(h.api.list_calls() >= 2);
}

#[tokio::test]
async fn teardown_unsubscribes_and_stops_the_engine() {
    let h = start_with(vec![conversation("c1", "Order #1042", 1)]).await;
    h.handle.activate(&cid("c1")).await.unwrap();
    ops_eventually(
        &h.channels,
        ChannelOp::Subscribed(ChannelName::conversation(&cid("c1"))),
    )
    .await;

    h.handle.teardown().await.unwrap();

    assert_eq!(h.channels.subscriber_count(), 0);
    let ops = h.channels.ops();
    assert!(ops.contains(&ChannelOp::Unsubscribed(ChannelName::inbox(&user().id))));
    assert!(ops.contains(&ChannelOp::Unsubscribed(ChannelName::conversation(&cid("c1")))));
    assert!(!*h.channels.connectivity().borrow());

    // the engine task winds down; commands start bouncing once it is gone
    let deadline = tokio::time::Instant::now() + WAIT;
    loop {
        if h.handle.submit(&cid("c1"), "too late").await == Err(EngineStopped) {
            break;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "engine kept accepting commands after teardown"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
