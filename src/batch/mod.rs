//! Batch protocol pipeline (draft-snell-http-batch-00).
//!
//! # Data Flow
//! ```text
//! inbound POST (multipart/batch; type="application/http"; boundary=...)
//!     → envelope.rs (validate Content-Type, extract boundary)
//!     → parser.rs + multipart.rs (split parts, decode application/http requests)
//!     → dispatcher.rs (fan out to the transport, join on every outcome)
//!     → composer.rs (multipart/batch body, one part per outcome)
//!     → 200 with the client's boundary
//!
//! Failures:
//!     envelope / parse errors   → whole batch rejected with 400, nothing dispatched
//!     transport error per part  → synthesized 400 sub-response, batch continues
//!     body write error          → 500, cause sent to the diagnostic sink only
//! ```
//!
//! # Design Decisions
//! - Correlation is by `Content-ID` / `In-Reply-To`, never by part position
//! - Only a *missing* part Content-Type is forgiven; a wrong one fails the batch
//! - The transport is always passed in explicitly; there is no global client

pub mod cancel;
pub mod composer;
pub mod dispatcher;
pub mod envelope;
pub mod error;
pub mod multipart;
pub mod parser;
pub mod service;
pub mod types;

pub use cancel::{CancelToken, Cancellation};
pub use composer::compose_response;
pub use dispatcher::Dispatcher;
pub use envelope::{validate_content_type, Boundary};
pub use error::{BatchError, DispatchFailure, EnvelopeError, ParseError};
pub use parser::parse_batch;
pub use service::{BatchResponse, BatchService};
pub use types::{OutboundRequest, OutcomeRecord};

/// Top-level media type of batch requests and responses.
pub const MULTIPART_BATCH: &str = "multipart/batch";

/// Media type of every part inside the envelope.
pub const APPLICATION_HTTP: &str = "application/http";

/// Part header carrying the client-assigned correlation identifier.
pub const HEADER_CONTENT_ID: &str = "content-id";

/// Response part header echoing the correlation identifier.
pub const HEADER_IN_REPLY_TO: &str = "In-Reply-To";

/// Response part header; every part is written as raw bytes.
pub const HEADER_CONTENT_TRANSFER_ENCODING: &str = "Content-Transfer-Encoding";

/// Part header selecting `https` for the sub-request when it has any non-empty value.
pub const HEADER_USE_HTTPS: &str = "x-use-https";

/// Returns true when `value` denotes `application/http`, ignoring any
/// trailing parameters such as `;version=1.1`.
pub fn is_application_http(value: &str) -> bool {
    value
        .split(';')
        .next()
        .map(str::trim)
        .is_some_and(|essence| essence.eq_ignore_ascii_case(APPLICATION_HTTP))
}
