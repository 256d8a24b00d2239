// src/websocket.rs

use crate::{
    models::{ClientEvent, ConnectionId, ServerEvent},
    relay::Relay,
    state::ChatState,
};
use axum::{
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::IntoResponse,
};
use futures_util::{
    sink::SinkExt,
    stream::{SplitSink, SplitStream, StreamExt},
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// The handler for the WebSocket route.
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<ChatState>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state.relay))
}

/// Manages the lifecycle of one connection. It has no identity until it declares one.
async fn handle_socket(socket: WebSocket, relay: Arc<Relay>) {
    let connection = ConnectionId::new();
    let (sender, receiver) = socket.split();
    let (tx, rx) = mpsc::unbounded_channel();

    relay.connect(connection, tx).await;

    let mut send_task = tokio::spawn(write_to_client(sender, rx, connection));
    let mut receive_task = tokio::spawn(read_from_client(receiver, connection, relay.clone()));

    // Whichever side finishes first ends the connection.
    tokio::select! {
        _ = &mut receive_task => send_task.abort(),
        _ = &mut send_task => receive_task.abort(),
    }

    relay.disconnect(connection).await;
}

/// Reads events from a client and hands them to the relay, one at a time.
async fn read_from_client(
    mut receiver: SplitStream<WebSocket>,
    connection: ConnectionId,
    relay: Arc<Relay>,
) {
    while let Some(Ok(msg)) = receiver.next().await {
        let text = match msg {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };

        match serde_json::from_str::<ClientEvent>(text.as_str()) {
            Ok(event) => relay.handle(connection, event).await,
            Err(e) => warn!("Dropping unreadable event from {}: {}", connection, e),
        }
    }
}

/// Drains the connection's outbound queue into the socket.
async fn write_to_client(
    mut sender: SplitSink<WebSocket, Message>,
    mut rx: mpsc::UnboundedReceiver<ServerEvent>,
    connection: ConnectionId,
) {
    while let Some(event) = rx.recv().await {
        let text = match serde_json::to_string(&event) {
            Ok(text) => text,
            Err(e) => {
                warn!("Failed to serialize event for {}: {}", connection, e);
                continue;
            }
        };

        if sender.send(Message::Text(text.into())).await.is_err() {
            debug!("Failed to send event to client {}", connection);
            break;
        }
    }
}
