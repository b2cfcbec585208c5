//! Message history storage
//!
//! The REST surface reads and writes chat history through [`ChatStore`].
//! The websocket fanout never touches it: a message pushed over the socket
//! is only stored when a client also posts it to `POST /chat/send`.
//!
//! Two implementations ship with the service:
//!
//! - [`MemoryChatStore`]: process-local, used when no database is configured
//! - [`PgChatStore`]: PostgreSQL via sqlx (`database` feature)

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::presence::UserId;

mod memory;
#[cfg(feature = "database")]
mod postgres;

pub use memory::MemoryChatStore;
#[cfg(feature = "database")]
pub use postgres::PgChatStore;

/// Default page size for message history
pub const DEFAULT_PAGE_LIMIT: u32 = 50;

/// A message to be stored
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub content: String,
}

/// A stored chat message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredMessage {
    pub id: i64,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl StoredMessage {
    /// The participant of this message that is not `user_id`
    #[must_use]
    pub fn counterpart_of(&self, user_id: UserId) -> UserId {
        if self.sender_id == user_id {
            self.receiver_id
        } else {
            self.sender_id
        }
    }
}

/// Latest state of one conversation from a user's point of view
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationSummary {
    /// The other participant
    pub participant_id: UserId,
    /// Most recent message exchanged with them
    pub last_message: StoredMessage,
}

impl ConversationSummary {
    #[must_use]
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.last_message.timestamp
    }
}

/// Offset pagination for message history
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub limit: u32,
    pub offset: u32,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            limit: DEFAULT_PAGE_LIMIT,
            offset: 0,
        }
    }
}

/// Persistence of chat history
#[async_trait]
pub trait ChatStore: Send + Sync {
    /// Store a message and return it with its assigned id and timestamp
    async fn save_message(&self, message: NewMessage) -> Result<StoredMessage>;

    /// Messages exchanged between two users in either direction, oldest first
    async fn messages_between(
        &self,
        user1: UserId,
        user2: UserId,
        page: Page,
    ) -> Result<Vec<StoredMessage>>;

    /// One summary per conversation partner, most recently active first
    async fn conversations(&self, user_id: UserId) -> Result<Vec<ConversationSummary>>;

    /// Number of messages addressed to a user
    async fn count_received(&self, user_id: UserId) -> Result<u64>;

    /// Number of messages `sender` has sent to `receiver`
    async fn count_from(&self, sender: UserId, receiver: UserId) -> Result<u64>;

    /// Check that the backend is reachable
    async fn ping(&self) -> Result<()>;

    /// Backend name for health reporting
    fn backend(&self) -> &'static str;
}
