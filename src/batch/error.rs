//! Error taxonomy for the batch pipeline and its mapping onto HTTP responses.
//!
//! Envelope and parse errors are client input problems (400). Composition
//! errors are server-side defects (500) whose cause never reaches the client.
//! Dispatch failures are not request errors at all: they become data inside
//! the composed response.

use std::time::Duration;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::batch::multipart::MultipartError;
use crate::batch::{APPLICATION_HTTP, MULTIPART_BATCH};
use crate::transport::TransportError;

/// Generic message returned to the client when the response body cannot be written.
pub const COMPOSE_FAILURE_MESSAGE: &str = "something went wrong while processing the batch request";

/// Problems with the inbound request's Content-Type header.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EnvelopeError {
    #[error("could not parse Content-Type header: no media type")]
    MissingContentType,

    #[error("could not parse Content-Type header: {0}")]
    Unparseable(String),

    #[error("expected Content-Type to be {expected} but was {0}", expected = MULTIPART_BATCH)]
    UnexpectedMediaType(String),

    #[error("expected Content-Type param 'type' to be {expected} but was {0}", expected = APPLICATION_HTTP)]
    UnexpectedPartType(String),

    #[error("expected boundary field to be present in Content-Type")]
    MissingBoundary,
}

/// Problems decoding the multipart body into sub-requests.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("encountered error while parsing multipart message: {0}")]
    Multipart(#[from] MultipartError),

    #[error("expected multipart message Content-Type header to be {expected} but was {0}", expected = APPLICATION_HTTP)]
    UnexpectedPartContentType(String),

    #[error("encountered error while parsing multipart request: {0}")]
    InvalidRequest(String),

    #[error("multipart request has no Host header or absolute target")]
    MissingHost,

    #[error("expected each request to have a present and unique value in the {header} header", header = "Content-ID")]
    MissingContentId,

    #[error("no batch requests present")]
    Empty,
}

/// Why a single sub-request produced no response.
#[derive(Debug, Error)]
pub enum DispatchFailure {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("sub-request timed out after {0:?}")]
    TimedOut(Duration),

    #[error("sub-request cancelled before completion")]
    Cancelled,

    #[error("sub-request task aborted: {0}")]
    Aborted(String),
}

/// Whole-request failure of a batch.
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("404 route not found")]
    RouteNotFound,

    #[error(transparent)]
    Envelope(#[from] EnvelopeError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("failed to write batch response: {0}")]
    Compose(#[source] std::io::Error),
}

impl BatchError {
    pub fn status(&self) -> StatusCode {
        match self {
            BatchError::RouteNotFound => StatusCode::NOT_FOUND,
            BatchError::Envelope(_) | BatchError::Parse(_) => StatusCode::BAD_REQUEST,
            BatchError::Compose(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Text sent to the client. Composition causes stay server-side.
    pub fn client_message(&self) -> String {
        match self {
            BatchError::Compose(_) => COMPOSE_FAILURE_MESSAGE.to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for BatchError {
    fn into_response(self) -> Response {
        (self.status(), self.client_message()).into_response()
    }
}
