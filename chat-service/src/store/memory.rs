//! In-process message store

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::{ChatStore, ConversationSummary, NewMessage, Page, StoredMessage};
use crate::error::Result;
use crate::presence::UserId;

#[derive(Debug, Default)]
struct Inner {
    next_id: i64,
    /// Append order; timestamps never decrease
    messages: Vec<StoredMessage>,
}

/// Message store kept in memory for the lifetime of the process
#[derive(Debug, Default)]
pub struct MemoryChatStore {
    inner: RwLock<Inner>,
}

impl MemoryChatStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored messages
    pub async fn len(&self) -> usize {
        self.inner.read().await.messages.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.messages.is_empty()
    }
}

fn between(message: &StoredMessage, a: UserId, b: UserId) -> bool {
    (message.sender_id == a && message.receiver_id == b)
        || (message.sender_id == b && message.receiver_id == a)
}

#[async_trait]
impl ChatStore for MemoryChatStore {
    async fn save_message(&self, message: NewMessage) -> Result<StoredMessage> {
        let mut inner = self.inner.write().await;
        inner.next_id += 1;

        // keep timestamps monotonic even if the wall clock steps back
        let now = Utc::now();
        let timestamp = inner
            .messages
            .last()
            .map_or(now, |last| last.timestamp.max(now));

        let stored = StoredMessage {
            id: inner.next_id,
            sender_id: message.sender_id,
            receiver_id: message.receiver_id,
            content: message.content,
            timestamp,
        };
        inner.messages.push(stored.clone());
        Ok(stored)
    }

    async fn messages_between(
        &self,
        user1: UserId,
        user2: UserId,
        page: Page,
    ) -> Result<Vec<StoredMessage>> {
        let inner = self.inner.read().await;
        Ok(inner
            .messages
            .iter()
            .filter(|message| between(message, user1, user2))
            .skip(page.offset as usize)
            .take(page.limit as usize)
            .cloned()
            .collect())
    }

    async fn conversations(&self, user_id: UserId) -> Result<Vec<ConversationSummary>> {
        let inner = self.inner.read().await;

        let mut latest: HashMap<UserId, &StoredMessage> = HashMap::new();
        for message in inner
            .messages
            .iter()
            .filter(|m| m.sender_id == user_id || m.receiver_id == user_id)
        {
            // later entries are never older
            latest.insert(message.counterpart_of(user_id), message);
        }

        let mut summaries: Vec<ConversationSummary> = latest
            .into_iter()
            .map(|(participant_id, message)| ConversationSummary {
                participant_id,
                last_message: message.clone(),
            })
            .collect();

        summaries.sort_by(|a, b| {
            b.last_message
                .timestamp
                .cmp(&a.last_message.timestamp)
                .then(b.last_message.id.cmp(&a.last_message.id))
        });
        Ok(summaries)
    }

    async fn count_received(&self, user_id: UserId) -> Result<u64> {
        let inner = self.inner.read().await;
        Ok(inner
            .messages
            .iter()
            .filter(|message| message.receiver_id == user_id)
            .count() as u64)
    }

    async fn count_from(&self, sender: UserId, receiver: UserId) -> Result<u64> {
        let inner = self.inner.read().await;
        Ok(inner
            .messages
            .iter()
            .filter(|message| message.sender_id == sender && message.receiver_id == receiver)
            .count() as u64)
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}
