use std::{sync::Arc, time::Duration};

use chat_relay::{
    app,
    database::MemoryMessageStore,
    models::{ConnectionId, ServerEvent},
    state::ChatState,
};
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::{net::TcpListener, time::timeout};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};

type Client = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

async fn spawn_server(state: ChatState) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app(state)).await.unwrap();
    });
    format!("ws://{addr}/ws")
}

async fn next_event(client: &mut Client) -> ServerEvent {
    loop {
        let msg = timeout(Duration::from_secs(5), client.next())
            .await
            .expect("timed out waiting for an event")
            .expect("socket closed")
            .expect("socket error");
        if let Message::Text(text) = msg {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

/// Skips events until one matches.
async fn wait_for(client: &mut Client, matches: impl Fn(&ServerEvent) -> bool) -> ServerEvent {
    loop {
        let event = next_event(client).await;
        if matches(&event) {
            return event;
        }
    }
}

async fn connect(url: &str) -> (Client, ConnectionId) {
    let (mut client, _) = connect_async(url).await.unwrap();
    match next_event(&mut client).await {
        ServerEvent::Connected { connection_id } => (client, connection_id),
        other => panic!("expected a connect ack, got {other:?}"),
    }
}

async fn emit(client: &mut Client, event: serde_json::Value) {
    client.send(Message::text(event.to_string())).await.unwrap();
}

#[tokio::test]
async fn private_chat_round_trip() {
    let store = Arc::new(MemoryMessageStore::new());
    let state = ChatState::new(store.clone());
    let url = spawn_server(state.clone()).await;

    let (mut alice, _) = connect(&url).await;
    let (mut bob, bob_id) = connect(&url).await;

    emit(&mut alice, json!({"type": "userOnline", "username": "alice"})).await;
    emit(
        &mut alice,
        json!({"type": "joinRoom", "senderUsername": "alice", "recipientUsername": "bob"}),
    )
    .await;
    // A global echo means alice's earlier events have been handled.
    emit(
        &mut alice,
        json!({"type": "sendMessage", "username": "alice", "message": "ready"}),
    )
    .await;
    wait_for(&mut alice, |e| matches!(e, ServerEvent::ReceiveMessage { .. })).await;

    emit(&mut bob, json!({"type": "userOnline", "username": "bob"})).await;
    emit(
        &mut bob,
        json!({"type": "joinRoom", "senderUsername": "bob", "recipientUsername": "alice"}),
    )
    .await;
    assert_eq!(
        next_event(&mut alice).await,
        ServerEvent::UserJoined {
            message: "bob has joined the room".into()
        }
    );
    assert_eq!(state.relay.lookup("bob").await, Some(bob_id));

    emit(
        &mut alice,
        json!({
            "type": "sendPrivateMessage",
            "senderUsername": "alice",
            "recipientUsername": "bob",
            "message": "hi"
        }),
    )
    .await;

    match wait_for(&mut bob, |e| {
        matches!(e, ServerEvent::ReceivePrivateMessage { .. })
    })
    .await
    {
        ServerEvent::ReceivePrivateMessage {
            sender_username,
            recipient_username,
            message,
            ..
        } => {
            assert_eq!(sender_username, "alice");
            assert_eq!(recipient_username, "bob");
            assert_eq!(message, "hi");
        }
        _ => unreachable!(),
    }
    assert_eq!(
        next_event(&mut bob).await,
        ServerEvent::NewMessageNotification {
            sender_username: "alice".into(),
            message: "You have a new message from alice".into(),
        }
    );

    let stored = store.all().await;
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].sender, "alice");
    assert_eq!(stored[0].recipient, "bob");
    assert_eq!(stored[0].message, "hi");
    assert!(!stored[0].is_read);

    bob.close(None).await.unwrap();
    assert_eq!(
        wait_for(&mut alice, |e| matches!(e, ServerEvent::UserLeft { .. })).await,
        ServerEvent::UserLeft {
            message: "bob has left the room".into()
        }
    );
    assert_eq!(state.relay.lookup("bob").await, None);
}

#[tokio::test]
async fn global_message_reaches_every_client() {
    let state = ChatState::new(Arc::new(MemoryMessageStore::new()));
    let url = spawn_server(state).await;

    let (mut alice, _) = connect(&url).await;
    let (mut bob, _) = connect(&url).await;
    let (mut carol, _) = connect(&url).await;

    emit(
        &mut carol,
        json!({"type": "sendMessage", "username": "carol", "message": "hello all"}),
    )
    .await;

    let expected = ServerEvent::ReceiveMessage {
        username: "carol".into(),
        message: "hello all".into(),
    };
    assert_eq!(next_event(&mut alice).await, expected);
    assert_eq!(next_event(&mut bob).await, expected);
    assert_eq!(next_event(&mut carol).await, expected);
}

#[tokio::test]
async fn malformed_frames_are_ignored() {
    let state = ChatState::new(Arc::new(MemoryMessageStore::new()));
    let url = spawn_server(state).await;

    let (mut alice, _) = connect(&url).await;

    alice.send(Message::text("not json")).await.unwrap();
    emit(&mut alice, json!({"type": "sendMessage", "username": "alice"})).await;
    emit(
        &mut alice,
        json!({"type": "sendMessage", "username": "alice", "message": "still here"}),
    )
    .await;

    assert_eq!(
        next_event(&mut alice).await,
        ServerEvent::ReceiveMessage {
            username: "alice".into(),
            message: "still here".into(),
        }
    );
}
