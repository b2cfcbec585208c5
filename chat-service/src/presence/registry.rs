//! Connection registry
//!
//! Tracks every live transport session and which user identity, if any, each
//! one currently speaks for. A user maps to at most one connection at a time;
//! a later announcement for the same user replaces the earlier binding.

use std::collections::HashMap;

use tokio::sync::mpsc::{self, error::TrySendError};

use super::events::ServerEvent;
use super::ids::{ConnectionId, Role, UserId};

/// A live transport session
#[derive(Debug)]
pub struct Connection {
    /// Unique identifier for this connection
    pub id: ConnectionId,
    /// Outbound channel drained by the connection's writer task
    pub sender: mpsc::Sender<ServerEvent>,
    /// User the connection announced itself as
    pub user_id: Option<UserId>,
}

/// Binding of a user identity to its reachable connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceEntry {
    pub connection_id: ConnectionId,
    pub role: Role,
}

/// Outcome of binding a user to a connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Announcement {
    /// The connection is not registered; nothing changed
    UnknownConnection,
    /// The user is now bound to the connection
    Bound {
        /// Connection that previously held the user's binding, if different
        replaced: Option<ConnectionId>,
        /// Another user this connection was bound to before, now released
        released: Option<UserId>,
    },
}

/// Outcome of removing a connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Removal {
    /// User whose presence binding pointed at the removed connection
    pub went_offline: Option<UserId>,
}

/// Result of handing one event to one connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    /// The connection's buffer is full; the event was dropped for it
    Backlogged,
    /// The connection's writer is gone
    Closed,
    /// No such connection
    Unknown,
}

impl DeliveryOutcome {
    #[must_use]
    pub fn is_delivered(self) -> bool {
        matches!(self, Self::Delivered)
    }
}

/// Registry of live connections and presence bindings
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: HashMap<ConnectionId, Connection>,
    presence: HashMap<UserId, PresenceEntry>,
}

impl ConnectionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a handle for a newly established session
    pub fn register(&mut self, sender: mpsc::Sender<ServerEvent>) -> ConnectionId {
        let id = ConnectionId::new();
        self.connections.insert(
            id,
            Connection {
                id,
                sender,
                user_id: None,
            },
        );
        id
    }

    /// Bind `user_id` to `connection_id`, last writer wins
    pub fn bind(&mut self, connection_id: ConnectionId, user_id: UserId, role: Role) -> Announcement {
        let Some(connection) = self.connections.get_mut(&connection_id) else {
            return Announcement::UnknownConnection;
        };

        let previous_user = connection.user_id.replace(user_id);

        // A connection that switches identity stops speaking for the old user.
        let released = match previous_user {
            Some(old) if old != user_id => {
                let held = self
                    .presence
                    .get(&old)
                    .is_some_and(|entry| entry.connection_id == connection_id);
                if held {
                    self.presence.remove(&old);
                    Some(old)
                } else {
                    None
                }
            }
            _ => None,
        };

        let replaced = self
            .presence
            .insert(
                user_id,
                PresenceEntry {
                    connection_id,
                    role,
                },
            )
            .map(|entry| entry.connection_id)
            .filter(|old| *old != connection_id);

        Announcement::Bound { replaced, released }
    }

    /// Connection currently bound to `user_id`
    #[must_use]
    pub fn lookup_by_user(&self, user_id: UserId) -> Option<ConnectionId> {
        self.presence_of(user_id).map(|entry| entry.connection_id)
    }

    /// Presence binding for `user_id`
    #[must_use]
    pub fn presence_of(&self, user_id: UserId) -> Option<&PresenceEntry> {
        self.presence.get(&user_id)
    }

    /// User a connection announced itself as
    ///
    /// Still resolves for a connection whose binding was taken over by a newer
    /// connection of the same user.
    #[must_use]
    pub fn user_of(&self, connection_id: ConnectionId) -> Option<UserId> {
        self.connections
            .get(&connection_id)
            .and_then(|connection| connection.user_id)
    }

    /// Remove a connection; idempotent
    pub fn remove(&mut self, connection_id: ConnectionId) -> Option<Removal> {
        let connection = self.connections.remove(&connection_id)?;

        let went_offline = connection.user_id.filter(|user_id| {
            let current = self
                .presence
                .get(user_id)
                .is_some_and(|entry| entry.connection_id == connection_id);
            if current {
                self.presence.remove(user_id);
            }
            current
        });

        Some(Removal { went_offline })
    }

    #[must_use]
    pub fn contains(&self, connection_id: ConnectionId) -> bool {
        self.connections.contains_key(&connection_id)
    }

    /// Ids of every live connection
    pub fn connection_ids(&self) -> impl Iterator<Item = ConnectionId> + '_ {
        self.connections.keys().copied()
    }

    /// Number of live connections
    #[must_use]
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Number of users with a presence binding
    #[must_use]
    pub fn online_count(&self) -> usize {
        self.presence.len()
    }

    /// Hand an event to a connection without waiting on its writer
    pub fn deliver(&self, connection_id: ConnectionId, event: ServerEvent) -> DeliveryOutcome {
        let Some(connection) = self.connections.get(&connection_id) else {
            return DeliveryOutcome::Unknown;
        };

        match connection.sender.try_send(event) {
            Ok(()) => DeliveryOutcome::Delivered,
            Err(TrySendError::Full(event)) => {
                tracing::warn!(
                    connection_id = %connection_id,
                    event = event.name(),
                    "Outbound buffer full, event dropped"
                );
                DeliveryOutcome::Backlogged
            }
            Err(TrySendError::Closed(event)) => {
                tracing::debug!(
                    connection_id = %connection_id,
                    event = event.name(),
                    "Connection writer closed, event dropped"
                );
                DeliveryOutcome::Closed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel() -> mpsc::Sender<ServerEvent> {
        mpsc::channel(8).0
    }

    #[test]
    fn test_register_and_remove() {
        let mut registry = ConnectionRegistry::new();
        let id = registry.register(channel());
        assert!(registry.contains(id));
        assert_eq!(registry.len(), 1);

        assert!(registry.remove(id).is_some());
        assert!(!registry.contains(id));
        // second removal is a no-op
        assert!(registry.remove(id).is_none());
        assert!(registry.remove(ConnectionId::new()).is_none());
    }

    #[test]
    fn test_bind_last_writer_wins() {
        let mut registry = ConnectionRegistry::new();
        let c1 = registry.register(channel());
        let c2 = registry.register(channel());

        assert_eq!(
            registry.bind(c1, UserId(10), Role::Caregiver),
            Announcement::Bound { replaced: None, released: None }
        );
        assert_eq!(registry.lookup_by_user(UserId(10)), Some(c1));

        assert_eq!(
            registry.bind(c2, UserId(10), Role::Caregiver),
            Announcement::Bound { replaced: Some(c1), released: None }
        );
        assert_eq!(registry.lookup_by_user(UserId(10)), Some(c2));
        assert_eq!(registry.online_count(), 1);
    }

    #[test]
    fn test_rebinding_same_connection_is_not_a_replacement() {
        let mut registry = ConnectionRegistry::new();
        let c1 = registry.register(channel());
        registry.bind(c1, UserId(10), Role::Caregiver);
        assert_eq!(
            registry.bind(c1, UserId(10), Role::Careseeker),
            Announcement::Bound { replaced: None, released: None }
        );
        assert_eq!(registry.presence_of(UserId(10)).unwrap().role, Role::Careseeker);
    }

    #[test]
    fn test_switching_identity_releases_old_user() {
        let mut registry = ConnectionRegistry::new();
        let c1 = registry.register(channel());
        registry.bind(c1, UserId(10), Role::Caregiver);

        assert_eq!(
            registry.bind(c1, UserId(11), Role::Caregiver),
            Announcement::Bound { replaced: None, released: Some(UserId(10)) }
        );
        assert_eq!(registry.lookup_by_user(UserId(10)), None);
        assert_eq!(registry.lookup_by_user(UserId(11)), Some(c1));
    }

    #[test]
    fn test_bind_unknown_connection() {
        let mut registry = ConnectionRegistry::new();
        assert_eq!(
            registry.bind(ConnectionId::new(), UserId(1), Role::Careseeker),
            Announcement::UnknownConnection
        );
        assert_eq!(registry.lookup_by_user(UserId(1)), None);
    }

    #[test]
    fn test_removing_stale_connection_keeps_newer_binding() {
        let mut registry = ConnectionRegistry::new();
        let old = registry.register(channel());
        let new = registry.register(channel());
        registry.bind(old, UserId(10), Role::Caregiver);
        registry.bind(new, UserId(10), Role::Caregiver);

        let removal = registry.remove(old).unwrap();
        assert_eq!(removal.went_offline, None);
        assert_eq!(registry.lookup_by_user(UserId(10)), Some(new));

        let removal = registry.remove(new).unwrap();
        assert_eq!(removal.went_offline, Some(UserId(10)));
        assert_eq!(registry.lookup_by_user(UserId(10)), None);
    }

    #[test]
    fn test_user_of_resolves_stale_connection() {
        let mut registry = ConnectionRegistry::new();
        let old = registry.register(channel());
        let new = registry.register(channel());
        registry.bind(old, UserId(10), Role::Caregiver);
        registry.bind(new, UserId(10), Role::Caregiver);

        assert_eq!(registry.user_of(old), Some(UserId(10)));
        assert_eq!(registry.user_of(new), Some(UserId(10)));
    }

    #[tokio::test]
    async fn test_deliver_outcomes() {
        let mut registry = ConnectionRegistry::new();
        let (tx, mut rx) = mpsc::channel(1);
        let id = registry.register(tx);
        let event = ServerEvent::UserStatusChange {
            user_id: UserId(1),
            is_online: true,
        };

        assert_eq!(registry.deliver(id, event.clone()), DeliveryOutcome::Delivered);
        assert_eq!(registry.deliver(id, event.clone()), DeliveryOutcome::Backlogged);
        assert_eq!(rx.recv().await, Some(event.clone()));

        drop(rx);
        assert_eq!(registry.deliver(id, event.clone()), DeliveryOutcome::Closed);
        assert_eq!(
            registry.deliver(ConnectionId::new(), event),
            DeliveryOutcome::Unknown
        );
    }
}
