//! Axum handlers for the batch endpoint.

use std::time::Instant;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::batch::{BatchError, Cancellation};
use crate::http::server::AppState;
use crate::http::X_REQUEST_ID;
use crate::observability::metrics;

/// Accepts a `multipart/batch` POST and answers with the composed batch.
///
/// The `Cancellation` lives as long as this future; if the client goes away
/// or the request times out, dropping it cancels every in-flight sub-request.
pub async fn batch_handler(
    State(state): State<AppState>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let started = Instant::now();
    let request_id = headers
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string();

    if method != Method::POST {
        tracing::debug!(request_id = %request_id, method = %method, "Rejected non-POST batch request");
        return reject(BatchError::RouteNotFound);
    }

    tracing::debug!(request_id = %request_id, bytes = body.len(), "Batch received");

    let cancellation = Cancellation::new();
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .map(|value| value.to_str().unwrap_or(""));

    match state.batch.process(content_type, &body, cancellation.token()).await {
        Ok(response) => {
            tracing::info!(
                request_id = %request_id,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Batch completed"
            );
            metrics::record_batch(StatusCode::OK.as_u16());
            response.into_response()
        }
        Err(e) => {
            match &e {
                BatchError::Compose(cause) => {
                    tracing::error!(request_id = %request_id, error = %cause, "Batch response composition failed")
                }
                other => tracing::warn!(request_id = %request_id, error = %other, "Batch rejected"),
            }
            reject(e)
        }
    }
}

/// Liveness probe.
pub async fn health() -> &'static str {
    "ok"
}

/// Any path other than the batch route or `/health`.
pub async fn not_found() -> Response {
    reject(BatchError::RouteNotFound)
}

fn reject(error: BatchError) -> Response {
    metrics::record_batch(error.status().as_u16());
    error.into_response()
}
