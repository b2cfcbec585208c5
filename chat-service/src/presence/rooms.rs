//! Room membership tracking
//!
//! Many-to-many relation between connections and conversation channels. A
//! reverse index (connection → channels) makes disconnect cleanup exhaustive
//! without scanning every room.

use std::collections::{HashMap, HashSet};

use super::ids::{ChannelId, ConnectionId};

/// A conversation channel and its subscribers
#[derive(Debug)]
pub struct Room {
    /// Room identifier
    pub id: ChannelId,
    /// Connections currently subscribed
    pub members: HashSet<ConnectionId>,
}

impl Room {
    /// Create a new empty room
    #[must_use]
    pub fn new(id: ChannelId) -> Self {
        Self {
            id,
            members: HashSet::new(),
        }
    }

    /// Get the number of members in the room
    #[must_use]
    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    /// Check if the room is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Channel subscriptions of every live connection
#[derive(Debug, Default)]
pub struct RoomMembership {
    /// All rooms indexed by ID
    rooms: HashMap<ChannelId, Room>,
    /// Rooms each connection is a member of (for cleanup on disconnect)
    connection_rooms: HashMap<ConnectionId, HashSet<ChannelId>>,
}

impl RoomMembership {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe a connection to a channel
    ///
    /// Returns `false` if it was already a member.
    pub fn join(&mut self, connection_id: ConnectionId, channel_id: ChannelId) -> bool {
        let room = self
            .rooms
            .entry(channel_id.clone())
            .or_insert_with(|| Room::new(channel_id.clone()));

        let added = room.members.insert(connection_id);
        if added {
            self.connection_rooms
                .entry(connection_id)
                .or_default()
                .insert(channel_id);
        }
        added
    }

    /// Unsubscribe a connection from a channel
    ///
    /// Returns `false` if it was not a member.
    pub fn leave(&mut self, connection_id: ConnectionId, channel_id: &ChannelId) -> bool {
        let removed = match self.rooms.get_mut(channel_id) {
            Some(room) => {
                let removed = room.members.remove(&connection_id);
                if room.is_empty() {
                    self.rooms.remove(channel_id);
                    tracing::debug!(chat_id = %channel_id, "Empty room removed");
                }
                removed
            }
            None => false,
        };

        if let Some(channels) = self.connection_rooms.get_mut(&connection_id) {
            channels.remove(channel_id);
            if channels.is_empty() {
                self.connection_rooms.remove(&connection_id);
            }
        }

        removed
    }

    /// Remove a connection from every channel it joined
    ///
    /// Returns the channels it was removed from.
    pub fn leave_all(&mut self, connection_id: ConnectionId) -> Vec<ChannelId> {
        let Some(channels) = self.connection_rooms.remove(&connection_id) else {
            return Vec::new();
        };

        let mut left = Vec::with_capacity(channels.len());
        for channel_id in channels {
            if let Some(room) = self.rooms.get_mut(&channel_id) {
                room.members.remove(&connection_id);
                if room.is_empty() {
                    self.rooms.remove(&channel_id);
                    tracing::debug!(chat_id = %channel_id, "Empty room removed after disconnect");
                }
            }
            left.push(channel_id);
        }
        left
    }

    /// Current subscribers of a channel; empty for an unknown channel
    #[must_use]
    pub fn members_of(&self, channel_id: &ChannelId) -> HashSet<ConnectionId> {
        self.rooms
            .get(channel_id)
            .map(|room| room.members.clone())
            .unwrap_or_default()
    }

    /// Channels a connection is subscribed to
    #[must_use]
    pub fn channels_of(&self, connection_id: ConnectionId) -> HashSet<ChannelId> {
        self.connection_rooms
            .get(&connection_id)
            .cloned()
            .unwrap_or_default()
    }

    #[must_use]
    pub fn is_member(&self, connection_id: ConnectionId, channel_id: &ChannelId) -> bool {
        self.rooms
            .get(channel_id)
            .is_some_and(|room| room.members.contains(&connection_id))
    }

    #[must_use]
    pub fn room(&self, channel_id: &ChannelId) -> Option<&Room> {
        self.rooms.get(channel_id)
    }

    /// Number of non-empty rooms
    #[must_use]
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_is_idempotent() {
        let mut rooms = RoomMembership::new();
        let conn = ConnectionId::new();
        let chat: ChannelId = "10_20".into();

        assert!(rooms.join(conn, chat.clone()));
        assert!(!rooms.join(conn, chat.clone()));

        let members = rooms.members_of(&chat);
        assert_eq!(members.len(), 1);
        assert!(members.contains(&conn));
        assert_eq!(rooms.room(&chat).unwrap().member_count(), 1);
    }

    #[test]
    fn test_leave_non_member_is_noop() {
        let mut rooms = RoomMembership::new();
        let conn = ConnectionId::new();
        let other = ConnectionId::new();
        let chat: ChannelId = "10_20".into();

        assert!(!rooms.leave(conn, &chat));
        rooms.join(other, chat.clone());
        assert!(!rooms.leave(conn, &chat));
        assert_eq!(rooms.members_of(&chat).len(), 1);
    }

    #[test]
    fn test_unknown_channel_has_no_members() {
        let rooms = RoomMembership::new();
        assert!(rooms.members_of(&"nobody_here".into()).is_empty());
    }

    #[test]
    fn test_empty_rooms_are_dropped() {
        let mut rooms = RoomMembership::new();
        let conn = ConnectionId::new();
        let chat: ChannelId = "1_2".into();

        rooms.join(conn, chat.clone());
        assert_eq!(rooms.room_count(), 1);
        assert!(rooms.leave(conn, &chat));
        assert_eq!(rooms.room_count(), 0);
        assert!(rooms.channels_of(conn).is_empty());
    }

    #[test]
    fn test_leave_all_is_exhaustive() {
        let mut rooms = RoomMembership::new();
        let conn = ConnectionId::new();
        let other = ConnectionId::new();
        let channels: Vec<ChannelId> = vec!["1_2".into(), "1_3".into(), "1_4".into()];

        for channel in &channels {
            rooms.join(conn, channel.clone());
        }
        rooms.join(other, "1_3".into());

        let mut left = rooms.leave_all(conn);
        left.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        assert_eq!(left, channels);

        for channel in &channels {
            assert!(!rooms.members_of(channel).contains(&conn));
        }
        assert!(rooms.is_member(other, &"1_3".into()));
        assert_eq!(rooms.room_count(), 1);
        assert!(rooms.leave_all(conn).is_empty());
    }
}
