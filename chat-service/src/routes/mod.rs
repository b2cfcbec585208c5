//! HTTP routes

use axum::{routing::get, Router};

use crate::{health, state::AppState, websocket::chat_ws};

pub mod chat;

/// Build the service router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(health::info))
        .route("/health", get(health::health))
        .route("/ready", get(health::readiness))
        .route("/ws", get(chat_ws))
        .nest("/chat", chat::routes())
        .with_state(state)
}
