// src/presence.rs

use crate::models::ConnectionId;
use std::collections::HashMap;

/// Who is currently reachable, keyed both ways so a disconnect can be resolved
/// by the exact connection that went away.
#[derive(Debug, Default)]
pub struct PresenceRegistry {
    by_identity: HashMap<String, ConnectionId>,
    by_connection: HashMap<ConnectionId, String>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `identity` to `connection`, replacing whatever either side was bound to before.
    pub fn declare_online(&mut self, identity: &str, connection: ConnectionId) {
        if let Some(previous) = self.by_connection.get(&connection) {
            if previous == identity {
                return;
            }
            let previous = previous.clone();
            if self.by_identity.get(&previous) == Some(&connection) {
                self.by_identity.remove(&previous);
            }
        }

        if let Some(old_connection) = self.by_identity.insert(identity.to_string(), connection) {
            if old_connection != connection {
                self.by_connection.remove(&old_connection);
            }
        }
        self.by_connection.insert(connection, identity.to_string());
    }

    pub fn lookup(&self, identity: &str) -> Option<ConnectionId> {
        self.by_identity.get(identity).copied()
    }

    /// Drops the binding held by `connection`, if it still holds one.
    /// A newer connection for the same identity is left untouched.
    pub fn remove(&mut self, connection: ConnectionId) -> Option<String> {
        let identity = self.by_connection.remove(&connection)?;
        if self.by_identity.get(&identity) == Some(&connection) {
            self.by_identity.remove(&identity);
        }
        Some(identity)
    }

    pub(crate) fn len(&self) -> usize {
        self.by_identity.len()
    }

    #[cfg(test)]
    fn is_empty(&self) -> bool {
        self.by_identity.is_empty()
    }
}
