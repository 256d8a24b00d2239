// src/models.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifies one live WebSocket. Minted per upgrade and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionId(pub Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// An event sent from a client to the relay.
/// Deserialized from incoming JSON text.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ClientEvent {
    UserOnline {
        username: String,
    },
    JoinRoom {
        sender_username: String,
        recipient_username: String,
    },
    LeaveRoom {
        username: String,
        recipient_username: String,
    },
    SendMessage {
        username: String,
        message: String,
    },
    SendPrivateMessage {
        sender_username: String,
        recipient_username: String,
        message: String,
    },
}

impl ClientEvent {
    /// True when every identity and text field carries something other than whitespace.
    pub fn is_well_formed(&self) -> bool {
        match self {
            ClientEvent::UserOnline { username } => filled(&[username]),
            ClientEvent::JoinRoom { sender_username, recipient_username } => {
                filled(&[sender_username, recipient_username])
            }
            ClientEvent::LeaveRoom { username, recipient_username } => {
                filled(&[username, recipient_username])
            }
            ClientEvent::SendMessage { username, message } => filled(&[username, message]),
            ClientEvent::SendPrivateMessage {
                sender_username,
                recipient_username,
                message,
            } => filled(&[sender_username, recipient_username, message]),
        }
    }
}

fn filled(fields: &[&String]) -> bool {
    fields.iter().all(|f| !f.trim().is_empty())
}

/// An event sent from the relay to a client.
/// Serialized into JSON text for sending.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ServerEvent {
    Connected {
        connection_id: ConnectionId,
    },
    ReceiveMessage {
        username: String,
        message: String,
    },
    ReceivePrivateMessage {
        sender_username: String,
        recipient_username: String,
        message: String,
        timestamp: DateTime<Utc>,
    },
    NewMessageNotification {
        sender_username: String,
        message: String,
    },
    UserJoined {
        message: String,
    },
    UserLeft {
        message: String,
    },
}

/// A private message as kept by the message store.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct StoredMessage {
    pub id: i64,
    pub sender: String,
    pub recipient: String,
    pub message: String,
    pub is_read: bool,
    pub timestamp: DateTime<Utc>,
}
