//! Real-time presence and message fanout
//!
//! This is the stateful core of the chat service. It tracks which user is
//! reachable on which live connection, which connections follow which
//! conversation channel, and pushes events to them:
//!
//! - **Connection registry**: connection handles and user presence bindings
//! - **Room membership**: connection ↔ channel subscriptions
//! - **Presence broadcaster**: online/offline status changes
//! - **Message fanout**: room and direct delivery, deduplicated per connection
//! - **Typing relay**: best-effort typing indicators
//!
//! Delivery is best-effort. Nothing here acknowledges, retries or persists
//! events; state lives only as long as the process.
//!
//! ## Example
//!
//! ```rust
//! use chat_service::presence::{ChannelId, ChatHub, Role, UserId};
//! use tokio::sync::mpsc;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let hub = ChatHub::new();
//! let (tx, mut rx) = mpsc::channel(16);
//! let conn = hub.register(tx).await;
//!
//! hub.announce_presence(conn, UserId(20), Role::Careseeker).await;
//! hub.join(conn, ChannelId::between(UserId(10), UserId(20))).await;
//!
//! hub.send(UserId(10), UserId(20), "Hello", "Ada", Role::Caregiver).await;
//! assert!(rx.recv().await.is_some());
//! # }
//! ```

mod events;
mod hub;
mod ids;
mod registry;
mod rooms;

pub use events::{ChatMessage, ClientEvent, ServerEvent};
pub use hub::{ChatHub, HubStats};
pub use ids::{ChannelId, ConnectionId, Role, UserId, CHANNEL_SEPARATOR};
pub use registry::{
    Announcement, Connection, ConnectionRegistry, DeliveryOutcome, PresenceEntry, Removal,
};
pub use rooms::{Room, RoomMembership};
