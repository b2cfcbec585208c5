//! Events exchanged with transport clients
//!
//! Every frame is a JSON object `{"event": "<name>", "data": {...}}` with
//! camelCase payload fields.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{ChannelId, Role, UserId};

/// Events a client sends to the server
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "snake_case",
    rename_all_fields = "camelCase"
)]
pub enum ClientEvent {
    /// Bind the connection to a user identity
    UserOnline { user_id: UserId, user_type: Role },
    /// Subscribe the connection to a conversation channel
    JoinChat { chat_id: ChannelId },
    /// Unsubscribe the connection from a conversation channel
    LeaveChat { chat_id: ChannelId },
    /// Send a chat message to another user
    SendMessage {
        sender_id: UserId,
        receiver_id: UserId,
        content: String,
        sender_name: String,
        sender_type: Role,
    },
    /// Typing indicator for a conversation
    Typing {
        receiver_id: UserId,
        is_typing: bool,
        chat_id: ChannelId,
    },
}

impl ClientEvent {
    /// Name of the event as it appears on the wire
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::UserOnline { .. } => "user_online",
            Self::JoinChat { .. } => "join_chat",
            Self::LeaveChat { .. } => "leave_chat",
            Self::SendMessage { .. } => "send_message",
            Self::Typing { .. } => "typing",
        }
    }
}

/// A chat message as handed to receiving connections
///
/// Not retained after delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    /// `<emission millis>_<sender id>`; may collide for rapid sends from one sender
    pub id: String,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub sender_name: String,
    pub sender_type: Role,
}

impl ChatMessage {
    /// Build a message stamped with the current time
    #[must_use]
    pub fn new(
        sender_id: UserId,
        receiver_id: UserId,
        content: impl Into<String>,
        sender_name: impl Into<String>,
        sender_type: Role,
    ) -> Self {
        Self::at(Utc::now(), sender_id, receiver_id, content, sender_name, sender_type)
    }

    /// Build a message with an explicit emission time
    #[must_use]
    pub fn at(
        timestamp: DateTime<Utc>,
        sender_id: UserId,
        receiver_id: UserId,
        content: impl Into<String>,
        sender_name: impl Into<String>,
        sender_type: Role,
    ) -> Self {
        Self {
            id: format!("{}_{}", timestamp.timestamp_millis(), sender_id),
            sender_id,
            receiver_id,
            content: content.into(),
            timestamp,
            sender_name: sender_name.into(),
            sender_type,
        }
    }
}

/// Events the server pushes to clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "snake_case",
    rename_all_fields = "camelCase"
)]
pub enum ServerEvent {
    /// A user came online or went offline
    UserStatusChange { user_id: UserId, is_online: bool },
    /// A chat message addressed to this connection's user or room
    NewMessage(ChatMessage),
    /// Someone is (or stopped) typing in a conversation
    UserTyping {
        user_id: UserId,
        is_typing: bool,
        chat_id: ChannelId,
    },
}

impl ServerEvent {
    /// Name of the event as it appears on the wire
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::UserStatusChange { .. } => "user_status_change",
            Self::NewMessage(_) => "new_message",
            Self::UserTyping { .. } => "user_typing",
        }
    }

    /// Serialize into a text frame payload
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_parse_user_online() {
        let event: ClientEvent = serde_json::from_value(json!({
            "event": "user_online",
            "data": { "userId": 10, "userType": "caregiver" }
        }))
        .unwrap();
        assert_eq!(
            event,
            ClientEvent::UserOnline {
                user_id: UserId(10),
                user_type: Role::Caregiver
            }
        );
    }

    #[test]
    fn test_parse_send_message() {
        let event: ClientEvent = serde_json::from_value(json!({
            "event": "send_message",
            "data": {
                "senderId": 10,
                "receiverId": 20,
                "content": "Hello",
                "senderName": "Ada",
                "senderType": "caregiver"
            }
        }))
        .unwrap();
        assert_eq!(event.name(), "send_message");
        assert!(matches!(
            event,
            ClientEvent::SendMessage { receiver_id: UserId(20), .. }
        ));
    }

    #[test]
    fn test_parse_typing() {
        let event: ClientEvent = serde_json::from_value(json!({
            "event": "typing",
            "data": { "receiverId": 20, "isTyping": true, "chatId": "10_20" }
        }))
        .unwrap();
        assert_eq!(
            event,
            ClientEvent::Typing {
                receiver_id: UserId(20),
                is_typing: true,
                chat_id: ChannelId::new("10_20")
            }
        );
    }

    #[test]
    fn test_missing_fields_rejected() {
        let result = serde_json::from_value::<ClientEvent>(json!({
            "event": "send_message",
            "data": { "senderId": 10, "content": "Hello" }
        }));
        assert!(result.is_err());

        let result = serde_json::from_value::<ClientEvent>(json!({
            "event": "user_online",
            "data": { "userId": 10, "userType": "admin" }
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_message_id_from_timestamp_and_sender() {
        let at = Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();
        let msg = ChatMessage::at(at, UserId(10), UserId(20), "hi", "Ada", Role::Caregiver);
        assert_eq!(msg.id, "1700000000123_10");
    }

    #[test]
    fn test_server_event_wire_format() {
        let event = ServerEvent::UserStatusChange {
            user_id: UserId(10),
            is_online: false,
        };
        let value: serde_json::Value = serde_json::from_str(&event.to_json().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({ "event": "user_status_change", "data": { "userId": 10, "isOnline": false } })
        );

        let at = Utc.timestamp_millis_opt(1_700_000_000_000).unwrap();
        let msg = ChatMessage::at(at, UserId(10), UserId(20), "Hello", "Ada", Role::Caregiver);
        let value = serde_json::to_value(ServerEvent::NewMessage(msg)).unwrap();
        assert_eq!(value["event"], "new_message");
        assert_eq!(value["data"]["senderId"], 10);
        assert_eq!(value["data"]["receiverId"], 20);
        assert_eq!(value["data"]["senderName"], "Ada");
        assert_eq!(value["data"]["senderType"], "caregiver");
        assert_eq!(value["data"]["id"], "1700000000000_10");
    }
}
