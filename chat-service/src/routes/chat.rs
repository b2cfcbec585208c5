//! `/chat` REST handlers
//!
//! Validation failures answer 400 with a `message` naming the problem.

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    presence::{ChannelId, UserId},
    state::AppState,
    store::{NewMessage, Page, StoredMessage, DEFAULT_PAGE_LIMIT},
};

/// Routes mounted under `/chat`
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/send", post(send_message))
        .route("/messages", get(get_messages))
        .route("/list/{user_id}", get(get_chat_list))
        .route("/create", post(create_chat))
        .route("/mark-read", post(mark_read))
        .route("/unread-count/{user_id}", get(unread_count))
        .route("/online/{user_id}", get(online_status))
}

/// Unwrap a JSON body, reporting malformed input as a bad request
fn json_body<T>(body: std::result::Result<Json<T>, JsonRejection>) -> Result<T> {
    body.map(|Json(value)| value)
        .map_err(|rejection| Error::Validation(rejection.body_text()))
}

fn parse_user_id(raw: &str) -> Result<UserId> {
    raw.trim()
        .parse::<i64>()
        .map(UserId)
        .map_err(|_| Error::Validation("User ID must be a number".to_string()))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    pub sender_id: Option<UserId>,
    pub receiver_id: Option<UserId>,
    pub content: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse<T> {
    pub message: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

/// `POST /chat/send`
pub async fn send_message(
    State(state): State<AppState>,
    body: std::result::Result<Json<SendMessageRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<MessageResponse<StoredMessage>>)> {
    let request = json_body(body)?;

    let (Some(sender_id), Some(receiver_id), Some(content)) =
        (request.sender_id, request.receiver_id, request.content)
    else {
        return Err(Error::Validation("All fields are required".to_string()));
    };
    if content.is_empty() {
        return Err(Error::Validation("All fields are required".to_string()));
    }

    let stored = state
        .store
        .save_message(NewMessage {
            sender_id,
            receiver_id,
            content,
        })
        .await?;

    tracing::debug!(
        message_id = stored.id,
        sender_id = %sender_id,
        receiver_id = %receiver_id,
        "Message stored"
    );

    Ok((
        StatusCode::CREATED,
        Json(MessageResponse {
            message: "Message sent",
            data: Some(stored),
        }),
    ))
}

/// Query of `GET /chat/messages`; kept as text so bad numbers get our own message
#[derive(Debug, Deserialize)]
pub struct MessagesQuery {
    pub user1: Option<String>,
    pub user2: Option<String>,
    pub limit: Option<String>,
    pub offset: Option<String>,
}

impl MessagesQuery {
    fn participants(&self) -> Result<(UserId, UserId)> {
        let (Some(user1), Some(user2)) = (non_empty(&self.user1), non_empty(&self.user2)) else {
            return Err(Error::Validation("Both user IDs are required".to_string()));
        };

        match (user1.trim().parse::<i64>(), user2.trim().parse::<i64>()) {
            (Ok(a), Ok(b)) => Ok((UserId(a), UserId(b))),
            _ => Err(Error::Validation("User IDs must be numbers".to_string())),
        }
    }

    fn page(&self) -> Result<Page> {
        let parse = |raw: &Option<String>, default: u32| match non_empty(raw) {
            None => Ok(default),
            Some(value) => value.trim().parse::<u32>().map_err(|_| {
                Error::Validation("Limit and offset must be non-negative numbers".to_string())
            }),
        };

        Ok(Page {
            limit: parse(&self.limit, DEFAULT_PAGE_LIMIT)?,
            offset: parse(&self.offset, 0)?,
        })
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

/// `GET /chat/messages?user1=&user2=&limit=&offset=`
pub async fn get_messages(
    State(state): State<AppState>,
    Query(query): Query<MessagesQuery>,
) -> Result<Json<Vec<StoredMessage>>> {
    let (user1, user2) = query.participants()?;
    let page = query.page()?;

    let messages = state.store.messages_between(user1, user2, page).await?;
    Ok(Json(messages))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub id: UserId,
    pub is_online: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatListEntry {
    /// Conversation channel id
    pub id: ChannelId,
    pub participant: Participant,
    pub last_message: StoredMessage,
    /// Messages the participant has sent to the user
    pub unread_count: u64,
    pub updated_at: DateTime<Utc>,
}

/// `GET /chat/list/{userId}`
pub async fn get_chat_list(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<Vec<ChatListEntry>>> {
    let user_id = parse_user_id(&user_id)?;
    let conversations = state.store.conversations(user_id).await?;

    let mut entries = Vec::with_capacity(conversations.len());
    for conversation in conversations {
        let participant_id = conversation.participant_id;
        let unread_count = state.store.count_from(participant_id, user_id).await?;
        entries.push(ChatListEntry {
            id: ChannelId::between(user_id, participant_id),
            participant: Participant {
                id: participant_id,
                is_online: state.hub.is_online(participant_id).await,
            },
            updated_at: conversation.updated_at(),
            last_message: conversation.last_message,
            unread_count,
        });
    }

    Ok(Json(entries))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateChatRequest {
    pub user1_id: Option<UserId>,
    pub user2_id: Option<UserId>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateChatResponse {
    pub chat_id: ChannelId,
}

/// `POST /chat/create`: resolve the channel id of a pair
pub async fn create_chat(
    body: std::result::Result<Json<CreateChatRequest>, JsonRejection>,
) -> Result<Json<CreateChatResponse>> {
    let request = json_body(body)?;

    let (Some(user1), Some(user2)) = (request.user1_id, request.user2_id) else {
        return Err(Error::Validation("Both user IDs are required".to_string()));
    };
    if user1 == user2 {
        return Err(Error::Validation(
            "Cannot create chat with yourself".to_string(),
        ));
    }

    Ok(Json(CreateChatResponse {
        chat_id: ChannelId::between(user1, user2),
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkReadRequest {
    pub chat_id: Option<ChannelId>,
    pub user_id: Option<UserId>,
}

/// `POST /chat/mark-read`
///
/// Read state is not tracked, so this only validates and acknowledges.
pub async fn mark_read(
    body: std::result::Result<Json<MarkReadRequest>, JsonRejection>,
) -> Result<Json<MessageResponse<()>>> {
    let request = json_body(body)?;

    match (request.chat_id, request.user_id) {
        (Some(chat_id), Some(user_id)) if !chat_id.as_str().is_empty() => {
            tracing::debug!(chat_id = %chat_id, user_id = %user_id, "Mark read acknowledged");
            Ok(Json(MessageResponse {
                message: "Messages marked as read",
                data: None,
            }))
        }
        _ => Err(Error::Validation(
            "Chat ID and user ID are required".to_string(),
        )),
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CountResponse {
    pub count: u64,
}

/// `GET /chat/unread-count/{userId}`: messages addressed to the user
pub async fn unread_count(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<CountResponse>> {
    let user_id = parse_user_id(&user_id)?;
    let count = state.store.count_received(user_id).await?;
    Ok(Json(CountResponse { count }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OnlineStatus {
    pub user_id: UserId,
    pub is_online: bool,
}

/// `GET /chat/online/{userId}`
pub async fn online_status(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<OnlineStatus>> {
    let user_id = parse_user_id(&user_id)?;
    Ok(Json(OnlineStatus {
        user_id,
        is_online: state.hub.is_online(user_id).await,
    }))
}
