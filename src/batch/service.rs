//! End-to-end batch processing, independent of the HTTP listener.

use std::io::Write;
use std::sync::Arc;

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::batch::cancel::CancelToken;
use crate::batch::composer::compose_response;
use crate::batch::dispatcher::Dispatcher;
use crate::batch::envelope::{validate_content_type, Boundary};
use crate::batch::error::BatchError;
use crate::batch::parser::parse_batch;
use crate::batch::types::OutcomeRecord;
use crate::observability::{DiagnosticSink, NoopSink};

/// Validates, parses, dispatches and composes one batch.
#[derive(Clone)]
pub struct BatchService {
    dispatcher: Dispatcher,
    sink: Arc<dyn DiagnosticSink>,
}

impl std::fmt::Debug for BatchService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchService")
            .field("dispatcher", &self.dispatcher)
            .finish_non_exhaustive()
    }
}

impl BatchService {
    /// A service without a diagnostic sink.
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self {
            dispatcher,
            sink: Arc::new(NoopSink),
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Process one batch request body.
    ///
    /// Envelope and parse errors return before anything is dispatched.
    /// Individual sub-request failures are folded into the response body.
    pub async fn process(
        &self,
        content_type: Option<&str>,
        body: &[u8],
        cancel: CancelToken,
    ) -> Result<BatchResponse, BatchError> {
        let boundary = validate_content_type(content_type)?;
        let requests = parse_batch(&boundary, body)?;

        let submitted = requests.len();
        let outcomes = self.dispatcher.dispatch(requests, cancel).await;
        let failed = outcomes.iter().filter(|o| o.is_failure()).count();
        tracing::debug!(submitted, failed, "Batch dispatched");

        let body = self.finish(Vec::new(), &boundary, &outcomes)?;
        Ok(BatchResponse { boundary, body })
    }

    /// Compose `outcomes` into `writer`, reporting write failures to the sink.
    fn finish<W: Write>(&self, writer: W, boundary: &Boundary, outcomes: &[OutcomeRecord]) -> Result<W, BatchError> {
        compose_response(writer, boundary, outcomes).map_err(|e| {
            self.sink
                .record(&format!("encountered an error while processing batch request: {e}"));
            BatchError::Compose(e)
        })
    }
}

/// A composed `multipart/batch` response.
#[derive(Debug)]
pub struct BatchResponse {
    boundary: Boundary,
    body: Vec<u8>,
}

impl BatchResponse {
    pub fn boundary(&self) -> &Boundary {
        &self.boundary
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn content_type(&self) -> String {
        self.boundary.response_content_type()
    }
}

impl IntoResponse for BatchResponse {
    fn into_response(self) -> Response {
        let content_type = HeaderValue::from_str(&self.content_type())
            .unwrap_or_else(|_| HeaderValue::from_static("multipart/batch"));
        (StatusCode::OK, [(header::CONTENT_TYPE, content_type)], self.body).into_response()
    }
}
