//! # chat-service
//!
//! Real-time chat backend for the evercare caregiving marketplace.
//!
//! ## Features
//!
//! - **Presence**: which user is reachable on which websocket connection
//! - **Conversation rooms**: connections subscribe to `<id>_<id>` channels
//! - **Message fanout**: room and direct delivery, at most once per connection
//! - **Typing indicators**: best-effort relay to the conversation partner
//! - **History**: REST endpoints over PostgreSQL or an in-memory store
//! - **Operations**: health and readiness probes, request ids, graceful shutdown
//!
//! ## Example
//!
//! ```rust,no_run
//! use chat_service::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = Config::load()?;
//!     init_tracing(&config)?;
//!
//!     let state = AppState::from_config(config.clone()).await?;
//!     let app = router(state);
//!
//!     Server::new(config).serve(app).await
//! }
//! ```

pub mod config;
pub mod error;
pub mod health;
pub mod ids;
pub mod middleware;
pub mod observability;
pub mod presence;
pub mod routes;
pub mod server;
pub mod state;
pub mod store;
pub mod websocket;

#[cfg(feature = "database")]
pub mod database;

/// Commonly used items
pub mod prelude {
    pub use crate::config::{Config, DatabaseConfig, MiddlewareConfig, ServiceConfig};
    pub use crate::error::{Error, Result, StoreError, StoreErrorKind, StoreOperation};
    pub use crate::health::{health, info, readiness};
    pub use crate::ids::{MakeTypedRequestId, RequestId, RequestIdError};
    pub use crate::observability::init_tracing;
    pub use crate::presence::{
        ChannelId, ChatHub, ChatMessage, ClientEvent, ConnectionId, HubStats, Role, ServerEvent,
        UserId,
    };
    pub use crate::routes::router;
    pub use crate::server::Server;
    pub use crate::state::AppState;
    pub use crate::store::{ChatStore, MemoryChatStore, NewMessage, Page, StoredMessage};
    pub use crate::websocket::WebSocketConfig;

    #[cfg(feature = "database")]
    pub use crate::store::PgChatStore;

    pub use axum::{
        extract::{Path, Query, State},
        response::IntoResponse,
        routing::{get, post},
        Json, Router,
    };
}
