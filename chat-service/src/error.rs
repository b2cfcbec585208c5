//! Error types and HTTP response conversion

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result type alias using the service error
pub type Result<T> = std::result::Result<T, Error>;

/// Message store operation that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOperation {
    Connect,
    Migrate,
    SaveMessage,
    LoadHistory,
    ListConversations,
    CountUnread,
    Ping,
}

impl fmt::Display for StoreOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Connect => "connect",
            Self::Migrate => "migrate",
            Self::SaveMessage => "save_message",
            Self::LoadHistory => "load_history",
            Self::ListConversations => "list_conversations",
            Self::CountUnread => "count_unread",
            Self::Ping => "ping",
        };
        f.write_str(name)
    }
}

/// Why a store operation failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreErrorKind {
    /// Backend unreachable or shutting down
    Unavailable,
    /// No pooled connection became free in time
    Busy,
    /// The backend gave up on a statement or socket read
    Timeout,
    /// A row violated a table constraint
    Rejected,
    /// A column could not be read into its Rust type
    Decode,
    /// Bad connection settings
    Misconfigured,
    /// Any other statement failure
    Query,
}

impl fmt::Display for StoreErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unavailable => "unavailable",
            Self::Busy => "busy",
            Self::Timeout => "timeout",
            Self::Rejected => "rejected",
            Self::Decode => "decode",
            Self::Misconfigured => "misconfigured",
            Self::Query => "query",
        };
        f.write_str(name)
    }
}

/// Failure of the message store, tagged with the operation in progress
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("chat store {kind} error during {operation}: {message}")]
pub struct StoreError {
    pub operation: StoreOperation,
    pub kind: StoreErrorKind,
    pub message: String,
}

impl StoreError {
    pub fn new(operation: StoreOperation, kind: StoreErrorKind, message: impl Into<String>) -> Self {
        Self {
            operation,
            kind,
            message: message.into(),
        }
    }

    /// Transient failures that a later attempt may get past
    #[must_use]
    pub fn is_retriable(&self) -> bool {
        matches!(
            self.kind,
            StoreErrorKind::Unavailable | StoreErrorKind::Busy | StoreErrorKind::Timeout
        )
    }

    fn status(&self) -> StatusCode {
        match self.kind {
            StoreErrorKind::Unavailable | StoreErrorKind::Busy => StatusCode::SERVICE_UNAVAILABLE,
            StoreErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
            StoreErrorKind::Rejected => StatusCode::CONFLICT,
            StoreErrorKind::Decode | StoreErrorKind::Misconfigured | StoreErrorKind::Query => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn code(&self) -> &'static str {
        match self.kind {
            StoreErrorKind::Unavailable => "STORE_UNAVAILABLE",
            StoreErrorKind::Busy => "STORE_BUSY",
            StoreErrorKind::Timeout => "STORE_TIMEOUT",
            StoreErrorKind::Rejected => "STORE_REJECTED",
            StoreErrorKind::Decode | StoreErrorKind::Misconfigured | StoreErrorKind::Query => {
                "STORE_ERROR"
            }
        }
    }

    /// Text shown to clients; backend details stay in the logs
    fn client_message(&self) -> &'static str {
        match self.kind {
            StoreErrorKind::Unavailable | StoreErrorKind::Busy => {
                "Chat history is temporarily unavailable"
            }
            StoreErrorKind::Timeout => "Chat history request timed out",
            StoreErrorKind::Rejected => "Message rejected by storage",
            StoreErrorKind::Decode | StoreErrorKind::Misconfigured | StoreErrorKind::Query => {
                "Internal server error"
            }
        }
    }
}

#[cfg(feature = "database")]
impl StoreError {
    /// Classify a sqlx failure raised while performing `operation`
    pub fn from_sqlx(operation: StoreOperation, err: sqlx::Error) -> Self {
        use sqlx::Error as E;
        use std::io::ErrorKind;

        let kind = match &err {
            E::PoolTimedOut => StoreErrorKind::Busy,
            E::PoolClosed | E::WorkerCrashed | E::Tls(_) => StoreErrorKind::Unavailable,
            E::Io(io) if io.kind() == ErrorKind::TimedOut => StoreErrorKind::Timeout,
            E::Io(_) => StoreErrorKind::Unavailable,
            E::Configuration(_) => StoreErrorKind::Misconfigured,
            E::ColumnDecode { .. } | E::Decode(_) | E::ColumnNotFound(_) => StoreErrorKind::Decode,
            E::Database(db_err) => {
                let sqlstate = db_err.code().unwrap_or_default();
                if db_err.is_unique_violation()
                    || db_err.is_foreign_key_violation()
                    || db_err.is_check_violation()
                {
                    StoreErrorKind::Rejected
                } else if sqlstate == "57014" {
                    // query_canceled, raised by statement_timeout
                    StoreErrorKind::Timeout
                } else if sqlstate.starts_with("08") || sqlstate == "57P03" {
                    StoreErrorKind::Unavailable
                } else {
                    StoreErrorKind::Query
                }
            }
            _ => StoreErrorKind::Query,
        };

        Self::new(operation, kind, err.to_string())
    }
}

/// Main error type for the service
#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(Box<figment::Error>),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Request input failed validation; the message is shown to the client
    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl Error {
    /// HTTP status reported for this error
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Error::Store(e) => e.status(),
            Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::Config(_) | Error::Io(_) | Error::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Machine readable error code
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Error::Config(_) => "CONFIG_ERROR",
            Error::Store(e) => e.code(),
            Error::Io(_) => "IO_ERROR",
            Error::Validation(_) => "VALIDATION_ERROR",
            Error::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Error::Config(Box::new(err))
    }
}

/// Error response body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Text clients display
    pub message: String,
    pub code: String,
    pub status: u16,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            Error::Validation(msg) => msg.clone(),
            Error::Store(e) => {
                tracing::error!(
                    operation = %e.operation,
                    kind = %e.kind,
                    retriable = e.is_retriable(),
                    "Chat store error: {}", e.message
                );
                e.client_message().to_string()
            }
            other => {
                tracing::error!("{}", other);
                "Internal server error".to_string()
            }
        };

        let body = ErrorResponse {
            message,
            code: self.code().to_string(),
            status: status.as_u16(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_of(err: Error) -> (StatusCode, ErrorResponse) {
        let response = err.into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_validation_message_reaches_client() {
        let (status, body) = body_of(Error::Validation("All fields are required".into())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.message, "All fields are required");
        assert_eq!(body.code, "VALIDATION_ERROR");
        assert_eq!(body.status, 400);
    }

    #[tokio::test]
    async fn test_store_errors_hide_backend_details() {
        let err = StoreError::new(
            StoreOperation::LoadHistory,
            StoreErrorKind::Timeout,
            "canceling statement due to statement timeout",
        );
        let (status, body) = body_of(err.into()).await;
        assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(body.code, "STORE_TIMEOUT");
        assert_eq!(body.message, "Chat history request timed out");

        let err = StoreError::new(StoreOperation::SaveMessage, StoreErrorKind::Busy, "pool");
        let (status, body) = body_of(err.into()).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body.code, "STORE_BUSY");

        let (status, body) = body_of(Error::Internal("subscriber".into())).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.message, "Internal server error");
    }

    #[test]
    fn test_is_retriable() {
        let err = |kind| StoreError::new(StoreOperation::Connect, kind, "x");
        assert!(err(StoreErrorKind::Unavailable).is_retriable());
        assert!(err(StoreErrorKind::Busy).is_retriable());
        assert!(err(StoreErrorKind::Timeout).is_retriable());
        assert!(!err(StoreErrorKind::Misconfigured).is_retriable());
        assert!(!err(StoreErrorKind::Rejected).is_retriable());
    }

    #[test]
    fn test_display_names_operation() {
        let err = StoreError::new(
            StoreOperation::CountUnread,
            StoreErrorKind::Unavailable,
            "connection refused",
        );
        assert_eq!(
            err.to_string(),
            "chat store unavailable error during count_unread: connection refused"
        );
    }

    #[cfg(feature = "database")]
    #[test]
    fn test_sqlx_classification() {
        use std::io;

        let timed_out = sqlx::Error::Io(io::Error::new(io::ErrorKind::TimedOut, "read timed out"));
        let err = StoreError::from_sqlx(StoreOperation::LoadHistory, timed_out);
        assert_eq!(err.kind, StoreErrorKind::Timeout);
        assert_eq!(err.operation, StoreOperation::LoadHistory);

        let refused = sqlx::Error::Io(io::Error::new(io::ErrorKind::ConnectionRefused, "refused"));
        assert_eq!(
            StoreError::from_sqlx(StoreOperation::Connect, refused).kind,
            StoreErrorKind::Unavailable
        );

        assert_eq!(
            StoreError::from_sqlx(StoreOperation::SaveMessage, sqlx::Error::PoolTimedOut).kind,
            StoreErrorKind::Busy
        );
        assert_eq!(
            StoreError::from_sqlx(StoreOperation::SaveMessage, sqlx::Error::RowNotFound).kind,
            StoreErrorKind::Query
        );
    }
}
