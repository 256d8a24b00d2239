// src/relay.rs

use crate::{
    database::MessageStore,
    models::{ClientEvent, ConnectionId, ServerEvent},
    presence::PresenceRegistry,
    rooms::{RoomRouter, room_name_for},
};
use chrono::Utc;
use std::{collections::HashMap, sync::Arc};
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, error, info, warn};

/// Outbound half of a connection. Sending never blocks.
pub type Outbound = mpsc::UnboundedSender<ServerEvent>;

/// Everything the relay knows about who is connected. Rebuilt from nothing on restart.
#[derive(Default)]
struct RelayState {
    connections: HashMap<ConnectionId, Outbound>,
    presence: PresenceRegistry,
    rooms: RoomRouter,
}

impl RelayState {
    fn emit(&self, connection: ConnectionId, event: ServerEvent) {
        if let Some(outbound) = self.connections.get(&connection) {
            if outbound.send(event).is_err() {
                // The writer is gone; disconnect cleanup follows once the reader loop ends.
                debug!("Failed to send event to client {}", connection);
            }
        }
    }

    fn emit_to_room(&self, room: &str, event: &ServerEvent, exclude: Option<ConnectionId>) {
        for member in self.rooms.members(room) {
            if exclude == Some(member) {
                continue;
            }
            self.emit(member, event.clone());
        }
    }
}

/// Presence, room membership and message fan-out for every live connection.
pub struct Relay {
    state: Mutex<RelayState>,
    store: Arc<dyn MessageStore>,
}

impl Relay {
    pub fn new(store: Arc<dyn MessageStore>) -> Self {
        Self {
            state: Mutex::new(RelayState::default()),
            store,
        }
    }

    /// Registers a live connection and acknowledges it.
    pub async fn connect(&self, connection: ConnectionId, outbound: Outbound) {
        let mut state = self.state.lock().await;
        state.connections.insert(connection, outbound);
        state.emit(
            connection,
            ServerEvent::Connected {
                connection_id: connection,
            },
        );
        info!(
            "A user connected: {} ({} connected)",
            connection,
            state.connections.len()
        );
    }

    /// Routes one decoded client event. Malformed events are dropped.
    pub async fn handle(&self, connection: ConnectionId, event: ClientEvent) {
        if !event.is_well_formed() {
            warn!("Dropping malformed event from {}: {:?}", connection, event);
            return;
        }

        match event {
            ClientEvent::UserOnline { username } => self.declare_online(connection, &username).await,
            ClientEvent::JoinRoom {
                sender_username,
                recipient_username,
            } => {
                self.join_room(connection, &sender_username, &recipient_username)
                    .await
            }
            ClientEvent::LeaveRoom {
                username,
                recipient_username,
            } => self.leave_room(connection, &username, &recipient_username).await,
            ClientEvent::SendMessage { username, message } => {
                self.send_global(&username, &message).await
            }
            ClientEvent::SendPrivateMessage {
                sender_username,
                recipient_username,
                message,
            } => {
                self.send_private(&sender_username, &recipient_username, &message)
                    .await
            }
        }
    }

    pub async fn declare_online(&self, connection: ConnectionId, identity: &str) {
        let mut state = self.state.lock().await;
        state.presence.declare_online(identity, connection);
        info!("{} is online on {}", identity, connection);
    }

    /// Joins the room shared by `sender` and `recipient`, telling the other members on a first join.
    pub async fn join_room(&self, connection: ConnectionId, sender: &str, recipient: &str) {
        let room = room_name_for(sender, recipient);
        let mut state = self.state.lock().await;

        if !state.rooms.join(connection, sender, &room) {
            debug!("{} already in room '{}'", sender, room);
            return;
        }

        info!("{} joined room '{}'", sender, room);
        let joined = ServerEvent::UserJoined {
            message: format!("{sender} has joined the room"),
        };
        state.emit_to_room(&room, &joined, Some(connection));
    }

    pub async fn leave_room(&self, connection: ConnectionId, username: &str, recipient: &str) {
        let room = room_name_for(username, recipient);
        let mut state = self.state.lock().await;

        if state.rooms.leave(connection, &room).is_none() {
            debug!("{} was not in room '{}'", username, room);
            return;
        }

        info!("{} left room '{}'", username, room);
        let left = ServerEvent::UserLeft {
            message: format!("{username} has left the room"),
        };
        state.emit_to_room(&room, &left, None);
    }

    /// Broadcasts to every connection, the sender's included. Never persisted.
    pub async fn send_global(&self, username: &str, message: &str) {
        let state = self.state.lock().await;
        debug!("Global message from {}: {}", username, message);

        let event = ServerEvent::ReceiveMessage {
            username: username.to_string(),
            message: message.to_string(),
        };
        for &connection in state.connections.keys() {
            state.emit(connection, event.clone());
        }
    }

    /// Delivers to the pair's room, persists, then pings the recipient if they are online.
    ///
    /// Delivery happens before the store is touched and is never undone; a store
    /// failure is only logged. The lock is not held across the store call, so
    /// presence is read again afterwards.
    pub async fn send_private(&self, sender: &str, recipient: &str, message: &str) {
        let room = room_name_for(sender, recipient);
        {
            let state = self.state.lock().await;
            debug!("Private message in '{}' from {}: {}", room, sender, message);

            let event = ServerEvent::ReceivePrivateMessage {
                sender_username: sender.to_string(),
                recipient_username: recipient.to_string(),
                message: message.to_string(),
                timestamp: Utc::now(),
            };
            state.emit_to_room(&room, &event, None);
        }

        if let Err(e) = self.store.persist(sender, recipient, message).await {
            error!(
                "Failed to save message from {} to {}: {}",
                sender, recipient, e
            );
        }

        let state = self.state.lock().await;
        if let Some(connection) = state.presence.lookup(recipient) {
            state.emit(
                connection,
                ServerEvent::NewMessageNotification {
                    sender_username: sender.to_string(),
                    message: format!("You have a new message from {sender}"),
                },
            );
        }
    }

    /// Forgets the connection and tells the rooms it was in that it left.
    pub async fn disconnect(&self, connection: ConnectionId) {
        let mut state = self.state.lock().await;
        state.connections.remove(&connection);
        let identity = state.presence.remove(connection);

        let left_rooms = state.rooms.remove_connection(connection);
        for (room, member) in left_rooms {
            let left = ServerEvent::UserLeft {
                message: format!("{member} has left the room"),
            };
            state.emit_to_room(&room, &left, None);
        }

        let who = identity.as_deref().unwrap_or("anonymous");
        info!(
            "A user disconnected: {} ({}); {} connected, {} online, {} rooms",
            connection,
            who,
            state.connections.len(),
            state.presence.len(),
            state.rooms.room_count()
        );
    }

    pub async fn lookup(&self, identity: &str) -> Option<ConnectionId> {
        self.state.lock().await.presence.lookup(identity)
    }

    #[cfg(test)]
    async fn connection_count(&self) -> usize {
        self.state.lock().await.connections.len()
    }
}
