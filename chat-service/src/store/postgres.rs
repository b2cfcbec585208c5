//! PostgreSQL message store
//!
//! Uses the `chat` table with camelCase column names and a timestamp
//! without time zone holding UTC, so existing chat databases can be reused.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};

use super::{ChatStore, ConversationSummary, NewMessage, Page, StoredMessage};
use crate::error::{Result, StoreError, StoreOperation};
use crate::presence::UserId;

const CREATE_CHAT_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS chat (
    id SERIAL PRIMARY KEY,
    "senderId" INTEGER NOT NULL,
    "receiverId" INTEGER NOT NULL,
    content TEXT NOT NULL,
    "timestamp" TIMESTAMP NOT NULL DEFAULT (now() AT TIME ZONE 'utc')
)
"#;

const CREATE_PARTICIPANT_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS chat_participants_idx ON chat ("senderId", "receiverId")
"#;

/// Columns selected for every message query
const MESSAGE_COLUMNS: &str = r#"
    id::BIGINT AS id,
    "senderId"::BIGINT AS sender_id,
    "receiverId"::BIGINT AS receiver_id,
    content,
    "timestamp" AT TIME ZONE 'utc' AS "timestamp"
"#;

#[derive(Debug, FromRow)]
struct MessageRow {
    id: i64,
    sender_id: i64,
    receiver_id: i64,
    content: String,
    timestamp: DateTime<Utc>,
}

impl From<MessageRow> for StoredMessage {
    fn from(row: MessageRow) -> Self {
        Self {
            id: row.id,
            sender_id: UserId(row.sender_id),
            receiver_id: UserId(row.receiver_id),
            content: row.content,
            timestamp: row.timestamp,
        }
    }
}

/// Message store backed by a PostgreSQL pool
#[derive(Debug, Clone)]
pub struct PgChatStore {
    pool: PgPool,
}

impl PgChatStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the `chat` table and its index if they do not exist
    pub async fn migrate(&self) -> Result<()> {
        for statement in [CREATE_CHAT_TABLE, CREATE_PARTICIPANT_INDEX] {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| StoreError::from_sqlx(StoreOperation::Migrate, e))?;
        }
        tracing::info!("Chat schema ready");
        Ok(())
    }
}

#[async_trait]
impl ChatStore for PgChatStore {
    async fn save_message(&self, message: NewMessage) -> Result<StoredMessage> {
        let sql = format!(
            r#"INSERT INTO chat ("senderId", "receiverId", content)
               VALUES ($1, $2, $3)
               RETURNING {MESSAGE_COLUMNS}"#
        );

        let row: MessageRow = sqlx::query_as(&sql)
            .bind(message.sender_id.get())
            .bind(message.receiver_id.get())
            .bind(&message.content)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StoreError::from_sqlx(StoreOperation::SaveMessage, e))?;

        Ok(row.into())
    }

    async fn messages_between(
        &self,
        user1: UserId,
        user2: UserId,
        page: Page,
    ) -> Result<Vec<StoredMessage>> {
        let sql = format!(
            r#"SELECT {MESSAGE_COLUMNS}
               FROM chat
               WHERE ("senderId" = $1 AND "receiverId" = $2)
                  OR ("senderId" = $2 AND "receiverId" = $1)
               ORDER BY "timestamp" ASC, id ASC
               LIMIT $3 OFFSET $4"#
        );

        let rows: Vec<MessageRow> = sqlx::query_as(&sql)
            .bind(user1.get())
            .bind(user2.get())
            .bind(i64::from(page.limit))
            .bind(i64::from(page.offset))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::from_sqlx(StoreOperation::LoadHistory, e))?;

        Ok(rows.into_iter().map(StoredMessage::from).collect())
    }

    async fn conversations(&self, user_id: UserId) -> Result<Vec<ConversationSummary>> {
        let sql = format!(
            r#"SELECT {MESSAGE_COLUMNS}
               FROM (
                   SELECT DISTINCT ON (participant) *
                   FROM (
                       SELECT chat.*,
                              CASE WHEN "senderId" = $1 THEN "receiverId" ELSE "senderId" END
                                  AS participant
                       FROM chat
                       WHERE "senderId" = $1 OR "receiverId" = $1
                   ) mine
                   ORDER BY participant, "timestamp" DESC, id DESC
               ) latest
               ORDER BY "timestamp" DESC, id DESC"#
        );

        let rows: Vec<MessageRow> = sqlx::query_as(&sql)
            .bind(user_id.get())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::from_sqlx(StoreOperation::ListConversations, e))?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let last_message = StoredMessage::from(row);
                ConversationSummary {
                    participant_id: last_message.counterpart_of(user_id),
                    last_message,
                }
            })
            .collect())
    }

    async fn count_received(&self, user_id: UserId) -> Result<u64> {
        let count: i64 = sqlx::query_scalar(r#"SELECT COUNT(*) FROM chat WHERE "receiverId" = $1"#)
            .bind(user_id.get())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StoreError::from_sqlx(StoreOperation::CountUnread, e))?;

        Ok(u64::try_from(count).unwrap_or_default())
    }

    async fn count_from(&self, sender: UserId, receiver: UserId) -> Result<u64> {
        let count: i64 = sqlx::query_scalar(
            r#"SELECT COUNT(*) FROM chat WHERE "senderId" = $1 AND "receiverId" = $2"#,
        )
        .bind(sender.get())
        .bind(receiver.get())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StoreError::from_sqlx(StoreOperation::CountUnread, e))?;

        Ok(u64::try_from(count).unwrap_or_default())
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::from_sqlx(StoreOperation::Ping, e))?;
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "postgres"
    }
}
