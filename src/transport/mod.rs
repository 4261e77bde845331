//! Outbound HTTP transport.
//!
//! The dispatcher only sees [`HttpTransport`]: one operation that executes a
//! single request and yields a fully buffered response or an error. The
//! production implementation wraps a configured `reqwest::Client`; tests plug
//! in stubs.

pub mod client;

#[cfg(test)]
pub(crate) mod testing;

use axum::body::Bytes;
use axum::http::{Request, Response};
use futures_util::future::BoxFuture;
use thiserror::Error;

pub use client::ReqwestTransport;

/// Failure to obtain any response for a sub-request.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error("{0}")]
    Other(String),
}

impl TransportError {
    pub fn other(message: impl Into<String>) -> Self {
        TransportError::Other(message.into())
    }
}

/// Capability to execute one outbound HTTP request.
///
/// Shared read-only across all concurrent sub-requests of a batch.
pub trait HttpTransport: Send + Sync + 'static {
    fn execute(&self, request: Request<Bytes>) -> BoxFuture<'static, Result<Response<Bytes>, TransportError>>;
}
