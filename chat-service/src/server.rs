//! HTTP server with graceful shutdown

use axum::Router;
use http::{HeaderValue, Method};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::{
    catch_panic::CatchPanicLayer,
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    timeout::TimeoutLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};

use crate::{
    config::Config,
    error::Result,
    middleware::{request_id_layer, request_id_propagation_layer, sensitive_headers_layer},
};

/// Server instance
pub struct Server {
    config: Config,
}

impl Server {
    /// Create a new server instance
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Wrap a router in the service middleware stack
    ///
    /// Each layer wraps the ones added before it: CORS sits closest to the
    /// handlers, panic recovery is outermost. Header masking and request id
    /// assignment must wrap the trace layer for spans to record them.
    pub fn apply_middleware(&self, app: Router) -> Router {
        let middleware = &self.config.middleware;
        let tracking = &middleware.request_tracking;

        let mut app = match self.build_cors_layer() {
            Some(cors) => app.layer(cors),
            None => app,
        };

        if middleware.compression {
            app = app.layer(CompressionLayer::new());
        }

        app = app
            .layer(TimeoutLayer::with_status_code(
                http::StatusCode::REQUEST_TIMEOUT,
                self.config.service.timeout(),
            ))
            .layer(RequestBodyLimitLayer::new(self.config.body_limit_bytes()))
            .layer(
                TraceLayer::new_for_http()
                    .make_span_with(DefaultMakeSpan::new().include_headers(true))
                    .on_response(DefaultOnResponse::new().include_headers(true)),
            );

        if tracking.mask_sensitive_headers {
            app = app.layer(sensitive_headers_layer());
        }
        if tracking.propagate_headers {
            app = app.layer(request_id_propagation_layer());
        }
        if tracking.request_id_enabled {
            app = app.layer(request_id_layer());
        }
        if middleware.catch_panic {
            app = app.layer(CatchPanicLayer::new());
        }

        app
    }

    /// Run the server with the given router
    pub async fn serve(self, app: Router) -> Result<()> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.config.service.port));

        tracing::info!("Starting {} on {}", self.config.service.name, addr);
        self.log_middleware_config();

        let app = self.apply_middleware(app);

        let listener = TcpListener::bind(&addr).await?;
        tracing::info!("Server listening on {}", addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tracing::info!("Server shutdown complete");

        Ok(())
    }

    fn log_middleware_config(&self) {
        let middleware = &self.config.middleware;
        tracing::info!(
            catch_panic = middleware.catch_panic,
            request_id = middleware.request_tracking.request_id_enabled,
            mask_sensitive_headers = middleware.request_tracking.mask_sensitive_headers,
            body_limit_mb = middleware.body_limit_mb,
            compression = middleware.compression,
            cors_mode = %middleware.cors_mode,
            timeout_secs = self.config.service.timeout_secs,
            "Middleware configuration"
        );
    }

    /// Build CORS layer based on configuration; `None` when disabled
    fn build_cors_layer(&self) -> Option<CorsLayer> {
        let middleware = &self.config.middleware;
        match middleware.cors_mode.as_str() {
            "permissive" => {
                tracing::debug!("Enabling permissive CORS");
                Some(CorsLayer::permissive())
            }
            "restrictive" => {
                tracing::debug!("Enabling restrictive CORS (default deny)");
                Some(CorsLayer::new())
            }
            "origins" => {
                let origins: Vec<HeaderValue> = middleware
                    .allowed_origins
                    .iter()
                    .filter_map(|origin| match HeaderValue::from_str(origin) {
                        Ok(value) => Some(value),
                        Err(_) => {
                            tracing::warn!("Ignoring invalid CORS origin: {}", origin);
                            None
                        }
                    })
                    .collect();
                tracing::debug!("Enabling CORS for {} origin(s)", origins.len());
                Some(
                    CorsLayer::new()
                        .allow_origin(origins)
                        .allow_methods([Method::GET, Method::POST])
                        .allow_headers(Any),
                )
            }
            "disabled" => {
                tracing::debug!("CORS disabled");
                None
            }
            other => {
                tracing::warn!("Unknown CORS mode: {}, defaulting to permissive", other);
                Some(CorsLayer::permissive())
            }
        }
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl+C), starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{routes::router, state::AppState};
    use axum::body::Body;
    use http::{header, Request, StatusCode};
    use std::io::Write;
    use std::sync::{Arc, Mutex};
    use tower::ServiceExt;

    fn server(config: Config) -> (Server, Router) {
        let app = router(AppState::in_memory(config.clone()));
        (Server::new(config), app)
    }

    #[tokio::test]
    async fn test_middleware_adds_request_id() {
        let (server, app) = server(Config::default());
        let app = server.apply_middleware(app);

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let id = response.headers()["x-request-id"].to_str().unwrap();
        assert!(id.starts_with("req_"));
    }

    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl CapturedLogs {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    #[tokio::test]
    async fn test_trace_spans_mask_credentials_and_carry_request_id() {
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::TRACE)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let (server, app) = server(Config::default());
        let app = server.apply_middleware(app);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .header(header::AUTHORIZATION, "Bearer chat-token-1234")
                    .header(header::COOKIE, "session=cookie-secret-987")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let output = logs.contents();
        assert!(output.contains("started processing request"), "{output}");
        assert!(output.contains("x-request-id"), "{output}");
        assert!(!output.contains("chat-token-1234"), "{output}");
        assert!(!output.contains("cookie-secret-987"), "{output}");
    }

    #[tokio::test]
    async fn test_origins_cors_mode() {
        let mut config = Config::default();
        config.middleware.cors_mode = "origins".to_string();
        config.middleware.allowed_origins = vec!["http://localhost:3000".to_string()];
        let (server, app) = server(config);
        let app = server.apply_middleware(app);

        let allowed = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .header(header::ORIGIN, "http://localhost:3000")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(
            allowed.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "http://localhost:3000"
        );

        let denied = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .header(header::ORIGIN, "http://evil.test")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert!(denied
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .is_none());
    }

    #[tokio::test]
    async fn test_body_limit() {
        let mut config = Config::default();
        config.middleware.body_limit_mb = 0;
        let (server, app) = server(config);
        let app = server.apply_middleware(app);
        let body = r#"{"senderId":1,"receiverId":2,"content":"hi"}"#;

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/chat/send")
                    .header(header::CONTENT_TYPE, "application/json")
                    .header(header::CONTENT_LENGTH, body.len())
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }
}
