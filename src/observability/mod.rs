//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Batch pipeline produces:
//!     → logging.rs (structured tracing events, request ID on every span)
//!     → metrics.rs (batch / sub-request counters, dispatch latency)
//!     → sink.rs (operator-facing diagnostics for server-side failures)
//!
//! Consumers:
//!     → stdout via tracing-subscriber
//!     → Prometheus scrape endpoint
//! ```
//!
//! # Design Decisions
//! - The diagnostic sink is a capability, not a global: "not configured" is `NoopSink`
//! - Metrics are no-ops until a recorder is installed

pub mod logging;
pub mod metrics;
pub mod sink;

pub use sink::{DiagnosticSink, NoopSink, TracingSink};
