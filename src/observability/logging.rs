//! Structured logging.
//!
//! `RUST_LOG` wins when set; otherwise the configured level applies to this
//! crate and to `tower_http`.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Build the filter used when `RUST_LOG` is absent.
pub fn default_filter(log_level: &str) -> String {
    format!("batch_proxy={log_level},tower_http={log_level}")
}

/// Install the global tracing subscriber.
pub fn init_logging(log_level: &str) {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(log_level).into()))
        .with(tracing_subscriber::fmt::layer())
        .init();
}
