//! Health, readiness and service info handlers

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::{presence::HubStats, state::AppState};

/// Liveness response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Always "OK" while the process serves requests
    pub status: String,
    pub service: String,
    pub timestamp: DateTime<Utc>,
    pub port: u16,
}

/// Readiness check response with dependency status
#[derive(Debug, Serialize, Deserialize)]
pub struct ReadinessResponse {
    /// Overall readiness status
    pub ready: bool,

    /// Service name
    pub service: String,

    /// Dependency statuses
    pub dependencies: HashMap<String, DependencyStatus>,

    /// Live presence counters
    pub presence: HubStats,
}

/// Individual dependency status
#[derive(Debug, Serialize, Deserialize)]
pub struct DependencyStatus {
    /// Dependency is healthy
    pub healthy: bool,

    /// Optional message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Service description served at `/`
#[derive(Debug, Serialize, Deserialize)]
pub struct ServiceInfo {
    pub service: String,
    pub version: String,
    pub description: String,
    pub endpoints: Vec<String>,
}

/// `GET /`
pub async fn info(State(state): State<AppState>) -> Json<ServiceInfo> {
    Json(ServiceInfo {
        service: state.config().service.name.clone(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        description: env!("CARGO_PKG_DESCRIPTION").to_string(),
        endpoints: [
            "GET /health",
            "GET /ready",
            "GET /ws",
            "POST /chat/send",
            "GET /chat/messages",
            "GET /chat/list/{userId}",
            "POST /chat/create",
            "POST /chat/mark-read",
            "GET /chat/unread-count/{userId}",
            "GET /chat/online/{userId}",
        ]
        .into_iter()
        .map(String::from)
        .collect(),
    })
}

/// `GET /health`: liveness probe, 200 while the process is up
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let config = state.config();
    let response = HealthResponse {
        status: "OK".to_string(),
        service: config.service.name.clone(),
        timestamp: Utc::now(),
        port: config.service.port,
    };

    (StatusCode::OK, Json(response))
}

/// `GET /ready`: 503 when the message store is unreachable
pub async fn readiness(State(state): State<AppState>) -> impl IntoResponse {
    let mut dependencies = HashMap::new();

    let store_status = match state.store.ping().await {
        Ok(()) => DependencyStatus {
            healthy: true,
            message: Some(format!("{} store reachable", state.store.backend())),
        },
        Err(e) => {
            tracing::error!(backend = state.store.backend(), "Store health check failed: {}", e);
            DependencyStatus {
                healthy: false,
                message: Some(format!("Store unavailable: {}", e)),
            }
        }
    };
    let ready = store_status.healthy;
    dependencies.insert("store".to_string(), store_status);

    let response = ReadinessResponse {
        ready,
        service: state.config().service.name.clone(),
        dependencies,
        presence: state.hub.stats().await,
    };

    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status, Json(response))
}
