//! HTTP batch intermediary.
//!
//! Accepts one `multipart/batch` request whose parts are `application/http`
//! messages, issues every embedded request concurrently, and answers with a
//! `multipart/batch` response correlating each sub-response to its request.

pub mod batch;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod transport;

pub use config::BatchConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
