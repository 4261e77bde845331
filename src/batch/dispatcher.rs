//! Concurrent dispatch of sub-requests.
//!
//! # Responsibilities
//! - Spawn one task per sub-request against the shared transport
//! - Collect exactly one outcome per sub-request before returning
//! - Turn transport errors, timeouts and cancellation into failure outcomes
//!
//! # Design Decisions
//! - Completion queue is an mpsc channel sized to the batch, so producers never wait
//! - Optional semaphore caps how many sub-requests of one batch run at once
//! - Outcomes come back in completion order; callers correlate by id

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Bytes;
use axum::http::Response;
use tokio::sync::{mpsc, Semaphore};

use crate::batch::cancel::CancelToken;
use crate::batch::error::DispatchFailure;
use crate::batch::types::{OutboundRequest, OutcomeRecord};
use crate::config::DispatchConfig;
use crate::observability::metrics;
use crate::transport::HttpTransport;

/// Fans a batch out to the transport and joins on every outcome.
#[derive(Clone)]
pub struct Dispatcher {
    transport: Arc<dyn HttpTransport>,
    max_concurrency: Option<usize>,
    request_timeout: Option<Duration>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("max_concurrency", &self.max_concurrency)
            .field("request_timeout", &self.request_timeout)
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    /// Unbounded dispatcher relying on the transport's own timeouts.
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            transport,
            max_concurrency: None,
            request_timeout: None,
        }
    }

    pub fn from_config(transport: Arc<dyn HttpTransport>, config: &DispatchConfig) -> Self {
        Self::new(transport)
            .with_max_concurrency(config.max_concurrency)
            .with_request_timeout(match config.request_timeout_secs {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            })
    }

    /// Limit concurrently executing sub-requests per batch. `0` means unbounded.
    pub fn with_max_concurrency(mut self, limit: usize) -> Self {
        self.max_concurrency = (limit > 0).then_some(limit);
        self
    }

    pub fn with_request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Execute every request and return one outcome per request.
    ///
    /// Blocks until the slowest sub-request completes, times out, or `cancel` fires.
    pub async fn dispatch(&self, requests: Vec<OutboundRequest>, cancel: CancelToken) -> Vec<OutcomeRecord> {
        let total = requests.len();
        if total == 0 {
            return Vec::new();
        }

        let started = Instant::now();
        let (tx, mut rx) = mpsc::channel(total);
        let limit = self.max_concurrency.map(|n| Arc::new(Semaphore::new(n)));
        let mut handles = Vec::with_capacity(total);

        for request in requests {
            let correlation_id = request.correlation_id().to_string();
            let tx = tx.clone();
            let transport = Arc::clone(&self.transport);
            let limit = limit.clone();
            let timeout = self.request_timeout;
            let cancel = cancel.clone();

            let handle = tokio::spawn(async move {
                let (correlation_id, request) = request.into_parts();
                let result = execute(transport, request, limit, timeout, cancel).await;
                if let Err(failure) = &result {
                    tracing::debug!(correlation_id = %correlation_id, error = %failure, "Sub-request failed");
                }
                // Capacity equals the batch size, so this never waits.
                let _ = tx.send(OutcomeRecord { correlation_id, result }).await;
            });
            handles.push((correlation_id, handle));
        }
        drop(tx);

        let mut outcomes = Vec::with_capacity(total);
        while outcomes.len() < total {
            match rx.recv().await {
                Some(outcome) => outcomes.push(outcome),
                None => break,
            }
        }

        // A task that panicked dropped its sender without reporting.
        if outcomes.len() < total {
            for (correlation_id, handle) in handles {
                if let Err(e) = handle.await {
                    tracing::error!(correlation_id = %correlation_id, error = %e, "Sub-request task aborted");
                    outcomes.push(OutcomeRecord::failure(
                        correlation_id,
                        DispatchFailure::Aborted(e.to_string()),
                    ));
                }
            }
        }

        for outcome in &outcomes {
            metrics::record_sub_request(outcome.is_failure());
        }
        metrics::record_dispatch(total, started);

        outcomes
    }
}

async fn execute(
    transport: Arc<dyn HttpTransport>,
    request: axum::http::Request<Bytes>,
    limit: Option<Arc<Semaphore>>,
    timeout: Option<Duration>,
    mut cancel: CancelToken,
) -> Result<Response<Bytes>, DispatchFailure> {
    let call = async move {
        let _permit = match limit {
            Some(semaphore) => Some(
                semaphore
                    .acquire_owned()
                    .await
                    .map_err(|_| DispatchFailure::Cancelled)?,
            ),
            None => None,
        };

        let response = transport.execute(request);
        match timeout {
            Some(limit) => tokio::time::timeout(limit, response)
                .await
                .map_err(|_| DispatchFailure::TimedOut(limit))?
                .map_err(DispatchFailure::from),
            None => response.await.map_err(DispatchFailure::from),
        }
    };

    tokio::select! {
        result = call => result,
        () = cancel.cancelled() => Err(DispatchFailure::Cancelled),
    }
}
