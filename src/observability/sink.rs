//! Operator-facing diagnostic sink.

/// Receives free-form diagnostics about failures the client never sees in detail.
pub trait DiagnosticSink: Send + Sync {
    fn record(&self, message: &str);
}

/// Sink used when none is configured. Drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl DiagnosticSink for NoopSink {
    fn record(&self, _message: &str) {}
}

/// Forwards diagnostics to the tracing subscriber at error level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn record(&self, message: &str) {
        tracing::error!(target: "batch_proxy::diagnostics", "{}", message);
    }
}
