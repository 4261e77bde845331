//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, body limit, timeout, tracing)
//!     → handler.rs (method check, cancellation scope)
//!     → batch::BatchService (validate, parse, dispatch, compose)
//!     → multipart/batch response or error status
//! ```

pub mod handler;
pub mod server;

pub use server::{AppState, HttpServer};

/// Header carrying the per-request correlation id.
pub const X_REQUEST_ID: &str = "x-request-id";
