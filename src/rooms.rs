// src/rooms.rs

use crate::models::ConnectionId;
use std::collections::{HashMap, HashSet};
use tracing::debug;

pub const ROOM_SEPARATOR: char = '_';
const ESCAPE: char = '\\';

/// Name of the private room shared by two identities. Order of the arguments does not matter.
///
/// Separators and escapes inside either identity are escaped, so no two pairs share a name.
pub fn room_name_for(a: &str, b: &str) -> String {
    let (first, second) = if a <= b { (a, b) } else { (b, a) };
    format!("{}{ROOM_SEPARATOR}{}", escape(first), escape(second))
}

fn escape(identity: &str) -> String {
    let mut escaped = String::with_capacity(identity.len());
    for c in identity.chars() {
        if c == ROOM_SEPARATOR || c == ESCAPE {
            escaped.push(ESCAPE);
        }
        escaped.push(c);
    }
    escaped
}

/// Room membership. Rooms exist only while they have members.
#[derive(Debug, Default)]
pub struct RoomRouter {
    // room name -> member connection -> identity it joined as
    rooms: HashMap<String, HashMap<ConnectionId, String>>,
    joined: HashMap<ConnectionId, HashSet<String>>,
}

impl RoomRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` only when the connection was not already a member.
    pub fn join(&mut self, connection: ConnectionId, identity: &str, room: &str) -> bool {
        let members = self.rooms.entry(room.to_string()).or_default();
        if members.contains_key(&connection) {
            return false;
        }
        members.insert(connection, identity.to_string());
        self.joined
            .entry(connection)
            .or_default()
            .insert(room.to_string());
        true
    }

    /// Removes the membership and returns the identity it was held under.
    pub fn leave(&mut self, connection: ConnectionId, room: &str) -> Option<String> {
        let members = self.rooms.get_mut(room)?;
        let identity = members.remove(&connection)?;

        if members.is_empty() {
            debug!("Room '{}' is empty, removing it.", room);
            self.rooms.remove(room);
        }
        if let Some(rooms) = self.joined.get_mut(&connection) {
            rooms.remove(room);
            if rooms.is_empty() {
                self.joined.remove(&connection);
            }
        }
        Some(identity)
    }

    /// Drops every membership held by `connection`, returning `(room, identity)` pairs.
    pub fn remove_connection(&mut self, connection: ConnectionId) -> Vec<(String, String)> {
        let Some(rooms) = self.joined.remove(&connection) else {
            return Vec::new();
        };

        let mut left = Vec::with_capacity(rooms.len());
        for room in rooms {
            if let Some(members) = self.rooms.get_mut(&room) {
                if let Some(identity) = members.remove(&connection) {
                    if members.is_empty() {
                        debug!("Room '{}' is empty, removing it.", room);
                        self.rooms.remove(&room);
                    }
                    left.push((room, identity));
                }
            }
        }
        left
    }

    pub fn members<'a>(&'a self, room: &str) -> impl Iterator<Item = ConnectionId> + 'a {
        self.rooms
            .get(room)
            .into_iter()
            .flat_map(|members| members.keys().copied())
    }

    #[cfg(test)]
    fn is_member(&self, connection: ConnectionId, room: &str) -> bool {
        self.rooms
            .get(room)
            .is_some_and(|members| members.contains_key(&connection))
    }

    pub(crate) fn room_count(&self) -> usize {
        self.rooms.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn room_name_is_symmetric() {
        assert_eq!(room_name_for("alice", "bob"), "alice_bob");
        assert_eq!(room_name_for("bob", "alice"), "alice_bob");
    }

    #[test]
    fn different_peers_get_different_rooms() {
        assert_ne!(room_name_for("alice", "bob"), room_name_for("alice", "carol"));
    }

    #[test]
    fn separator_inside_names_cannot_collide() {
        let ab = room_name_for("a_b_a", "a_b");
        let ac = room_name_for("a_b_a", "b_a");
        assert_ne!(ab, ac);
        assert_eq!(ab, r"a\_b_a\_b\_a");
        assert_eq!(ac, r"a\_b\_a_b\_a");
    }

    #[test]
    fn escape_characters_are_escaped_too() {
        assert_ne!(room_name_for(r"a\", "b"), room_name_for("a", r"\b"));
        assert_eq!(room_name_for(r"a\", "b"), r"a\\_b");
    }

    #[test]
    fn self_room_is_degenerate_but_stable() {
        assert_eq!(room_name_for("alice", "alice"), "alice_alice");
    }

    #[test]
    fn join_is_idempotent() {
        let mut router = RoomRouter::new();
        let conn = ConnectionId::new();

        assert!(router.join(conn, "alice", "alice_bob"));
        assert!(!router.join(conn, "alice", "alice_bob"));
        assert_eq!(router.members("alice_bob").count(), 1);
    }

    #[test]
    fn leave_prunes_empty_rooms() {
        let mut router = RoomRouter::new();
        let (alice, bob) = (ConnectionId::new(), ConnectionId::new());
        router.join(alice, "alice", "alice_bob");
        router.join(bob, "bob", "alice_bob");

        assert_eq!(router.leave(alice, "alice_bob").as_deref(), Some("alice"));
        assert_eq!(router.members("alice_bob").collect::<Vec<_>>(), vec![bob]);

        assert_eq!(router.leave(bob, "alice_bob").as_deref(), Some("bob"));
        assert_eq!(router.room_count(), 0);
    }

    #[test]
    fn leaving_a_room_never_joined_is_a_no_op() {
        let mut router = RoomRouter::new();
        assert_eq!(router.leave(ConnectionId::new(), "alice_bob"), None);
    }

    #[test]
    fn remove_connection_clears_all_memberships() {
        let mut router = RoomRouter::new();
        let (alice, bob) = (ConnectionId::new(), ConnectionId::new());
        router.join(alice, "alice", "alice_bob");
        router.join(alice, "alice", "alice_carol");
        router.join(bob, "bob", "alice_bob");

        let mut left = router.remove_connection(alice);
        left.sort();

        assert_eq!(
            left,
            vec![
                ("alice_bob".to_string(), "alice".to_string()),
                ("alice_carol".to_string(), "alice".to_string()),
            ]
        );
        assert!(!router.is_member(alice, "alice_bob"));
        assert!(router.is_member(bob, "alice_bob"));
        assert_eq!(router.room_count(), 1);
        assert!(router.remove_connection(alice).is_empty());
    }
}
