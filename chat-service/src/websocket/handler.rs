//! Per-connection websocket session
//!
//! Each upgraded socket is split in two. A writer task drains the
//! connection's outbound queue into text frames; the reader loop parses
//! client frames and hands them to the hub. Whatever ends the session, the
//! connection is unregistered from the hub before the writer is stopped.

use axum::{
    body::Bytes,
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use tokio::{sync::mpsc, time::MissedTickBehavior};

use super::WebSocketConfig;
use crate::presence::{ChatHub, ClientEvent, ConnectionId, ServerEvent};
use crate::state::AppState;

/// Capacity of the control frame queue (pongs)
const CONTROL_BUFFER: usize = 8;

/// `GET /ws`
pub async fn chat_ws(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    let config = state.config.websocket.clone();
    let hub = state.hub.clone();

    ws.max_message_size(config.max_message_size_bytes)
        .max_frame_size(config.max_frame_size_bytes)
        .on_upgrade(move |socket| handle_socket(socket, hub, config))
}

/// Drive one connection until the peer goes away
pub async fn handle_socket(socket: WebSocket, hub: ChatHub, config: WebSocketConfig) {
    let (mut sink, mut stream) = socket.split();

    let (event_tx, mut events) = mpsc::channel::<ServerEvent>(config.outbound_capacity());
    let (control_tx, mut control) = mpsc::channel::<Message>(CONTROL_BUFFER);

    let connection_id = hub.register(event_tx).await;
    tracing::info!(connection_id = %connection_id, "WebSocket connection opened");

    let ping_interval = config.ping_interval();
    let writer = tokio::spawn(async move {
        let mut keepalive = tokio::time::interval(ping_interval);
        keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // the first tick completes immediately
        keepalive.tick().await;

        loop {
            let frame = tokio::select! {
                Some(frame) = control.recv() => frame,
                event = events.recv() => {
                    let Some(event) = event else { break };
                    match event.to_json() {
                        Ok(text) => Message::Text(text.into()),
                        Err(e) => {
                            tracing::warn!(
                                connection_id = %connection_id,
                                event = event.name(),
                                error = %e,
                                "Failed to serialize event"
                            );
                            continue;
                        }
                    }
                }
                _ = keepalive.tick() => Message::Ping(Bytes::new()),
            };

            if sink.send(frame).await.is_err() {
                tracing::debug!(connection_id = %connection_id, "WebSocket sink closed");
                break;
            }
        }
    });

    while let Some(result) = stream.next().await {
        match result {
            Ok(Message::Text(text)) => dispatch_frame(&hub, connection_id, text.as_str()).await,
            Ok(Message::Ping(payload)) => {
                let _ = control_tx.try_send(Message::Pong(payload));
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(connection_id = %connection_id, error = %e, "WebSocket error");
                break;
            }
        }
    }

    hub.unregister(connection_id).await;
    writer.abort();

    tracing::info!(connection_id = %connection_id, "WebSocket connection closed");
}

/// Parse a text frame and dispatch it
///
/// Frames that are not valid client events are logged and ignored; the
/// connection stays open.
pub async fn dispatch_frame(hub: &ChatHub, connection_id: ConnectionId, text: &str) {
    match serde_json::from_str::<ClientEvent>(text) {
        Ok(event) => dispatch(hub, connection_id, event).await,
        Err(e) => {
            tracing::debug!(connection_id = %connection_id, error = %e, "Ignoring malformed frame");
        }
    }
}

/// Apply one client event to the hub
pub async fn dispatch(hub: &ChatHub, connection_id: ConnectionId, event: ClientEvent) {
    tracing::trace!(connection_id = %connection_id, event = event.name(), "Client event");

    match event {
        ClientEvent::UserOnline { user_id, user_type } => {
            hub.announce_presence(connection_id, user_id, user_type).await;
        }
        ClientEvent::JoinChat { chat_id } => {
            hub.join(connection_id, chat_id).await;
        }
        ClientEvent::LeaveChat { chat_id } => {
            hub.leave(connection_id, &chat_id).await;
        }
        ClientEvent::SendMessage {
            sender_id,
            receiver_id,
            content,
            sender_name,
            sender_type,
        } => {
            hub.send(sender_id, receiver_id, content, sender_name, sender_type)
                .await;
        }
        ClientEvent::Typing {
            receiver_id,
            is_typing,
            chat_id,
        } => {
            hub.set_typing(connection_id, receiver_id, chat_id, is_typing)
                .await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::presence::{ChannelId, UserId};
    use serde_json::json;

    async fn connect(hub: &ChatHub) -> (ConnectionId, mpsc::Receiver<ServerEvent>) {
        let (tx, rx) = mpsc::channel(16);
        (hub.register(tx).await, rx)
    }

    #[tokio::test]
    async fn test_dispatch_user_online_binds_presence() {
        let hub = ChatHub::new();
        let (conn, _rx) = connect(&hub).await;

        let frame = json!({
            "event": "user_online",
            "data": { "userId": 10, "userType": "caregiver" }
        });
        dispatch_frame(&hub, conn, &frame.to_string()).await;

        assert_eq!(hub.lookup_by_user(UserId(10)).await, Some(conn));
    }

    #[tokio::test]
    async fn test_dispatch_join_and_leave() {
        let hub = ChatHub::new();
        let (conn, _rx) = connect(&hub).await;
        let chat = ChannelId::new("10_20");

        dispatch_frame(
            &hub,
            conn,
            r#"{"event":"join_chat","data":{"chatId":"10_20"}}"#,
        )
        .await;
        assert!(hub.members_of(&chat).await.contains(&conn));

        dispatch_frame(
            &hub,
            conn,
            r#"{"event":"leave_chat","data":{"chatId":"10_20"}}"#,
        )
        .await;
        assert!(hub.members_of(&chat).await.is_empty());
    }

    #[tokio::test]
    async fn test_dispatch_send_message_reaches_receiver() {
        let hub = ChatHub::new();
        let (sender, _sender_rx) = connect(&hub).await;
        let (receiver, mut receiver_rx) = connect(&hub).await;
        hub.announce_presence(receiver, UserId(20), crate::presence::Role::Careseeker)
            .await;

        let frame = json!({
            "event": "send_message",
            "data": {
                "senderId": 10,
                "receiverId": 20,
                "content": "Hello",
                "senderName": "Ada",
                "senderType": "caregiver"
            }
        });
        dispatch_frame(&hub, sender, &frame.to_string()).await;

        match receiver_rx.recv().await {
            Some(ServerEvent::NewMessage(message)) => {
                assert_eq!(message.content, "Hello");
                assert_eq!(message.sender_id, UserId(10));
            }
            other => panic!("expected new_message, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_malformed_frames_are_ignored() {
        let hub = ChatHub::new();
        let (conn, mut rx) = connect(&hub).await;

        dispatch_frame(&hub, conn, "not json").await;
        dispatch_frame(&hub, conn, r#"{"event":"teleport","data":{}}"#).await;
        dispatch_frame(
            &hub,
            conn,
            r#"{"event":"user_online","data":{"userId":"ten"}}"#,
        )
        .await;

        assert!(rx.try_recv().is_err());
        assert_eq!(hub.user_of(conn).await, None);
        assert_eq!(hub.stats().await.connections, 1);
    }
}
