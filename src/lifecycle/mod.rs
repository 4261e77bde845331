//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Shutdown (shutdown.rs):
//!     trigger() → every subscriber wakes → server stops accepting, drains in-flight batches
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Shutdown::trigger
//! ```
//!
//! # Design Decisions
//! - Dropping an in-flight batch cancels its outstanding sub-requests

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
pub use signals::{spawn_signal_handler, wait_for_signal};
