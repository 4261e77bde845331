//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the batch and health handlers
//! - Wire up middleware (tracing, limits, timeouts, request ID)
//! - Serve on a caller-provided listener until shutdown

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::DefaultBodyLimit,
    http::Request,
    routing::{any, get},
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::batch::{BatchService, Dispatcher};
use crate::config::BatchConfig;
use crate::http::handler::{batch_handler, health, not_found};
use crate::http::X_REQUEST_ID;
use crate::observability::DiagnosticSink;
use crate::transport::HttpTransport;

/// Application state injected into handlers.
#[derive(Clone, Debug)]
pub struct AppState {
    pub batch: BatchService,
}

/// HTTP server for the batch endpoint.
pub struct HttpServer {
    router: Router,
    config: BatchConfig,
}

impl HttpServer {
    /// Create a new HTTP server dispatching through `transport`.
    pub fn new(config: BatchConfig, transport: Arc<dyn HttpTransport>, sink: Arc<dyn DiagnosticSink>) -> Self {
        let dispatcher = Dispatcher::from_config(transport, &config.dispatch);
        let state = AppState {
            batch: BatchService::new(dispatcher).with_sink(sink),
        };

        let router = Self::build_router(&config, state);
        Self { router, config }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &BatchConfig, state: AppState) -> Router {
        Router::new()
            .route(&config.listener.batch_path, any(batch_handler))
            .route("/health", get(health))
            .fallback(not_found)
            .with_state(state)
            .layer(DefaultBodyLimit::disable())
            .layer(RequestBodyLimitLayer::new(config.limits.max_body_bytes))
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                let request_id = request
                    .headers()
                    .get(X_REQUEST_ID)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("unknown");
                tracing::info_span!(
                    "request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = %request_id,
                )
            }))
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    /// Router with every layer applied, for driving the server without a socket.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server, accepting connections on the given listener until
    /// `shutdown` fires.
    pub async fn run(self, listener: TcpListener, mut shutdown: broadcast::Receiver<()>) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            batch_path = %self.config.listener.batch_path,
            "HTTP server starting"
        );

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}
