//! WebSocket transport for the presence hub
//!
//! Clients connect to `GET /ws` and exchange JSON text frames of the form
//! `{"event": "<name>", "data": {...}}`. See [`crate::presence::ClientEvent`]
//! and [`crate::presence::ServerEvent`] for the event catalogue.

mod config;
mod handler;

pub use config::WebSocketConfig;
pub use handler::{chat_ws, dispatch, dispatch_frame, handle_socket};

// Re-export axum WebSocket types for convenience
pub use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
