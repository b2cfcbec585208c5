//! Presence broadcasting, message fanout and typing relay
//!
//! [`ChatHub`] owns the connection registry and the room membership tracker
//! behind one lock. Every operation takes the lock once, so registry and
//! membership always change together and concurrent transports cannot
//! interleave half-applied updates. Events are handed to connections with a
//! non-blocking send while the lock is held, which keeps per-connection event
//! order equal to issue order; a slow connection only loses its own events.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};

use super::events::{ChatMessage, ServerEvent};
use super::ids::{ChannelId, ConnectionId, Role, UserId};
use super::registry::{Announcement, ConnectionRegistry};
use super::rooms::RoomMembership;

/// Point-in-time counters of the hub
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct HubStats {
    pub connections: usize,
    pub online_users: usize,
    pub rooms: usize,
}

/// State guarded by the hub lock
#[derive(Debug, Default)]
struct HubState {
    registry: ConnectionRegistry,
    rooms: RoomMembership,
}

impl HubState {
    /// Status change to every connection except `exclude`
    fn broadcast_status(&self, user_id: UserId, is_online: bool, exclude: Option<ConnectionId>) -> usize {
        let event = ServerEvent::UserStatusChange { user_id, is_online };
        let targets: Vec<ConnectionId> = self
            .registry
            .connection_ids()
            .filter(|id| Some(*id) != exclude)
            .collect();

        let total = targets.len();
        let sent = self.deliver_all(targets, &event);

        tracing::debug!(
            user_id = %user_id,
            is_online,
            sent,
            total,
            "Status broadcast completed"
        );
        sent
    }

    /// Remove a connection and everything hanging off it
    fn drop_connection(&mut self, connection_id: ConnectionId) -> Option<UserId> {
        let channels = self.rooms.leave_all(connection_id);
        let removal = self.registry.remove(connection_id)?;

        tracing::info!(
            connection_id = %connection_id,
            rooms_left = channels.len(),
            "Connection unregistered"
        );

        if let Some(user_id) = removal.went_offline {
            tracing::info!(user_id = %user_id, "User went offline");
            self.broadcast_status(user_id, false, Some(connection_id));
        }
        removal.went_offline
    }

    fn deliver_all(&self, targets: impl IntoIterator<Item = ConnectionId>, event: &ServerEvent) -> usize {
        targets
            .into_iter()
            .filter(|id| self.registry.deliver(*id, event.clone()).is_delivered())
            .count()
    }
}

/// Coordinator for presence, rooms and real-time delivery
///
/// Cheap to clone; all clones share the same state.
#[derive(Debug, Clone, Default)]
pub struct ChatHub {
    state: Arc<RwLock<HubState>>,
}

impl ChatHub {
    /// Create an empty hub
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // ------------------------------------------------------------------
    // Connection registry
    // ------------------------------------------------------------------

    /// Register a newly established transport session
    ///
    /// `sender` is the connection's outbound channel.
    pub async fn register(&self, sender: mpsc::Sender<ServerEvent>) -> ConnectionId {
        let mut state = self.state.write().await;
        let id = state.registry.register(sender);
        tracing::info!(connection_id = %id, connections = state.registry.len(), "Connection registered");
        id
    }

    /// Bind a user identity to a connection and announce it online
    ///
    /// A previous binding of the same user is overwritten. Unknown connection
    /// ids are ignored.
    pub async fn announce_presence(&self, connection_id: ConnectionId, user_id: UserId, role: Role) {
        let mut state = self.state.write().await;

        match state.registry.bind(connection_id, user_id, role) {
            Announcement::UnknownConnection => {
                tracing::warn!(
                    connection_id = %connection_id,
                    user_id = %user_id,
                    "Presence announced on unknown connection, ignoring"
                );
            }
            Announcement::Bound { replaced, released } => {
                if let Some(previous) = replaced {
                    tracing::debug!(
                        user_id = %user_id,
                        previous_connection = %previous,
                        connection_id = %connection_id,
                        "Presence moved to a newer connection"
                    );
                }
                if let Some(old_user) = released {
                    state.broadcast_status(old_user, false, Some(connection_id));
                }

                tracing::info!(
                    connection_id = %connection_id,
                    user_id = %user_id,
                    role = %role,
                    "User is now online"
                );
                state.broadcast_status(user_id, true, Some(connection_id));
            }
        }
    }

    /// Connection currently bound to `user_id`
    pub async fn lookup_by_user(&self, user_id: UserId) -> Option<ConnectionId> {
        self.state.read().await.registry.lookup_by_user(user_id)
    }

    /// Whether `user_id` has a live presence binding
    pub async fn is_online(&self, user_id: UserId) -> bool {
        self.lookup_by_user(user_id).await.is_some()
    }

    /// User a connection announced itself as
    pub async fn user_of(&self, connection_id: ConnectionId) -> Option<UserId> {
        self.state.read().await.registry.user_of(connection_id)
    }

    /// Tear down a connection
    ///
    /// Leaves every joined channel, drops the presence binding if this
    /// connection held it and broadcasts the user offline. Idempotent.
    pub async fn unregister(&self, connection_id: ConnectionId) {
        self.state.write().await.drop_connection(connection_id);
    }

    // ------------------------------------------------------------------
    // Room membership
    // ------------------------------------------------------------------

    /// Subscribe a connection to a channel; idempotent
    pub async fn join(&self, connection_id: ConnectionId, channel_id: ChannelId) {
        let mut state = self.state.write().await;
        if !state.registry.contains(connection_id) {
            tracing::debug!(connection_id = %connection_id, chat_id = %channel_id, "Join from unknown connection ignored");
            return;
        }
        if state.rooms.join(connection_id, channel_id.clone()) {
            tracing::info!(
                connection_id = %connection_id,
                chat_id = %channel_id,
                member_count = state.rooms.members_of(&channel_id).len(),
                "Connection joined chat"
            );
        }
    }

    /// Unsubscribe a connection from a channel; no-op if not a member
    pub async fn leave(&self, connection_id: ConnectionId, channel_id: &ChannelId) {
        if self.state.write().await.rooms.leave(connection_id, channel_id) {
            tracing::info!(connection_id = %connection_id, chat_id = %channel_id, "Connection left chat");
        }
    }

    /// Current subscribers of a channel
    pub async fn members_of(&self, channel_id: &ChannelId) -> HashSet<ConnectionId> {
        self.state.read().await.rooms.members_of(channel_id)
    }

    // ------------------------------------------------------------------
    // Presence broadcaster
    // ------------------------------------------------------------------

    /// Tell every other connection that `user_id` is online
    ///
    /// Returns the number of connections the event was handed to.
    pub async fn broadcast_online(&self, user_id: UserId) -> usize {
        let state = self.state.write().await;
        let own = state.registry.lookup_by_user(user_id);
        state.broadcast_status(user_id, true, own)
    }

    /// Tell every other connection that `user_id` is offline
    pub async fn broadcast_offline(&self, user_id: UserId) -> usize {
        let state = self.state.write().await;
        let own = state.registry.lookup_by_user(user_id);
        state.broadcast_status(user_id, false, own)
    }

    // ------------------------------------------------------------------
    // Message fanout
    // ------------------------------------------------------------------

    /// Send a chat message from `sender_id` to `receiver_id`
    ///
    /// Delivered to every member of the pair's channel and to the receiver's
    /// own connection, each connection at most once. The returned message
    /// confirms the send, not its receipt.
    pub async fn send(
        &self,
        sender_id: UserId,
        receiver_id: UserId,
        content: impl Into<String>,
        sender_name: impl Into<String>,
        sender_role: Role,
    ) -> ChatMessage {
        let message = ChatMessage::new(sender_id, receiver_id, content, sender_name, sender_role);
        self.fanout(message.clone()).await;
        message
    }

    /// Deliver an already constructed message; returns the delivery count
    pub async fn fanout(&self, message: ChatMessage) -> usize {
        let channel_id = ChannelId::between(message.sender_id, message.receiver_id);
        let state = self.state.write().await;

        let mut targets = state.rooms.members_of(&channel_id);
        if let Some(direct) = state.registry.lookup_by_user(message.receiver_id) {
            targets.insert(direct);
        }

        let total = targets.len();
        let (sender_id, receiver_id) = (message.sender_id, message.receiver_id);
        let sent = state.deliver_all(targets, &ServerEvent::NewMessage(message));

        tracing::debug!(
            sender_id = %sender_id,
            receiver_id = %receiver_id,
            chat_id = %channel_id,
            sent,
            total,
            "Message fanout completed"
        );
        sent
    }

    // ------------------------------------------------------------------
    // Typing relay
    // ------------------------------------------------------------------

    /// Relay a typing indicator from the user behind `connection_id`
    ///
    /// Dropped silently when the connection has not announced a user. The
    /// receiver's own connection and the other room members are served
    /// independently, so an overlapping connection may see the event twice.
    pub async fn set_typing(
        &self,
        connection_id: ConnectionId,
        receiver_id: UserId,
        channel_id: ChannelId,
        is_typing: bool,
    ) -> usize {
        let state = self.state.write().await;
        let Some(user_id) = state.registry.user_of(connection_id) else {
            tracing::debug!(connection_id = %connection_id, "Typing from anonymous connection dropped");
            return 0;
        };

        let event = ServerEvent::UserTyping {
            user_id,
            is_typing,
            chat_id: channel_id.clone(),
        };

        let direct = state.registry.lookup_by_user(receiver_id);
        let room: Vec<ConnectionId> = state
            .rooms
            .members_of(&channel_id)
            .into_iter()
            .filter(|id| *id != connection_id)
            .collect();

        let sent = state.deliver_all(direct.into_iter().chain(room), &event);
        tracing::trace!(user_id = %user_id, chat_id = %channel_id, is_typing, sent, "Typing relayed");
        sent
    }

    /// Snapshot of hub counters
    pub async fn stats(&self) -> HubStats {
        let state = self.state.read().await;
        HubStats {
            connections: state.registry.len(),
            online_users: state.registry.online_count(),
            rooms: state.rooms.room_count(),
        }
    }
}
