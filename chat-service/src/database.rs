//! Database connection pool management

use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;

use crate::{
    config::DatabaseConfig,
    error::{Result, StoreError, StoreOperation},
};

/// Create a PostgreSQL connection pool, retrying with exponential backoff
pub async fn create_pool(config: &DatabaseConfig) -> Result<PgPool> {
    let mut attempt = 0;
    let base_delay = Duration::from_secs(config.retry_delay_secs);
    let url = sanitize_connection_url(&config.url);

    loop {
        match try_create_pool(config).await {
            Ok(pool) => {
                tracing::info!(
                    url = %url,
                    attempts = attempt + 1,
                    max_connections = config.max_connections,
                    min_connections = config.min_connections,
                    "Database connection pool created"
                );
                return Ok(pool);
            }
            Err(e) => {
                attempt += 1;

                if attempt > config.max_retries || !e.is_retriable() {
                    tracing::error!(
                        url = %url,
                        attempts = attempt,
                        "Failed to connect to database: {}",
                        e
                    );
                    return Err(e.into());
                }

                let delay = backoff_delay(base_delay, attempt);
                tracing::warn!(
                    url = %url,
                    attempt,
                    "Database connection attempt failed: {}. Retrying in {:?}...",
                    e,
                    delay
                );

                tokio::time::sleep(delay).await;
            }
        }
    }
}

/// Delay before retry number `attempt` (1-based): base, 2×base, 4×base, ...
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let multiplier = 2_u32.saturating_pow(attempt.saturating_sub(1));
    base.saturating_mul(multiplier)
}

async fn try_create_pool(config: &DatabaseConfig) -> std::result::Result<PgPool, StoreError> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(config.connection_timeout())
        .connect(&config.url)
        .await
        .map_err(|e| StoreError::from_sqlx(StoreOperation::Connect, e))
}

/// Sanitize connection URL for safe logging (remove password)
fn sanitize_connection_url(url: &str) -> String {
    let (Some(scheme_end), Some(at_pos)) = (url.find("://"), url.rfind('@')) else {
        return url.to_string();
    };
    let credentials_start = scheme_end + 3;
    if at_pos < credentials_start {
        return url.to_string();
    }

    let credentials = &url[credentials_start..at_pos];
    match credentials.find(':') {
        Some(colon) => format!(
            "{}{}:***{}",
            &url[..credentials_start],
            &credentials[..colon],
            &url[at_pos..]
        ),
        None => url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_connection_url() {
        assert_eq!(
            sanitize_connection_url("postgres://chat:secret@db:5432/chat"),
            "postgres://chat:***@db:5432/chat"
        );
        assert_eq!(
            sanitize_connection_url("postgres://db:5432/chat"),
            "postgres://db:5432/chat"
        );
        assert_eq!(
            sanitize_connection_url("postgres://chat@db/chat"),
            "postgres://chat@db/chat"
        );
    }

    #[test]
    fn test_backoff_doubles() {
        let base = Duration::from_secs(2);
        assert_eq!(backoff_delay(base, 1), Duration::from_secs(2));
        assert_eq!(backoff_delay(base, 2), Duration::from_secs(4));
        assert_eq!(backoff_delay(base, 3), Duration::from_secs(8));
    }

    #[tokio::test]
    async fn test_invalid_url_is_not_retried() {
        let config = DatabaseConfig {
            url: "not-a-database-url".to_string(),
            max_connections: 1,
            min_connections: 0,
            connection_timeout_secs: 1,
            max_retries: 3,
            retry_delay_secs: 60,
            optional: false,
        };

        let started = std::time::Instant::now();
        assert!(create_pool(&config).await.is_err());
        assert!(started.elapsed() < Duration::from_secs(30));
    }
}
