//! Stub transports for unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::http::{header, Request, Response, StatusCode};
use futures_util::future::BoxFuture;
use futures_util::FutureExt;

use crate::transport::{HttpTransport, TransportError};

/// Answers every request with 200 and a fixed body.
#[derive(Debug, Clone)]
pub struct StaticTransport {
    body: &'static str,
}

impl StaticTransport {
    pub fn new(body: &'static str) -> Self {
        Self { body }
    }
}

impl HttpTransport for StaticTransport {
    fn execute(&self, _request: Request<Bytes>) -> BoxFuture<'static, Result<Response<Bytes>, TransportError>> {
        let body = self.body;
        async move { Ok(ok_response(body)) }.boxed()
    }
}

/// Routes by request path: fails, delays, or echoes the path.
#[derive(Debug, Clone, Default)]
pub struct ScriptedTransport {
    failing: Vec<&'static str>,
    delays: HashMap<&'static str, Duration>,
    in_flight: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail(mut self, path: &'static str) -> Self {
        self.failing.push(path);
        self
    }

    pub fn delay(mut self, path: &'static str, delay: Duration) -> Self {
        self.delays.insert(path, delay);
        self
    }

    /// Highest number of requests observed executing at once.
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

impl HttpTransport for ScriptedTransport {
    fn execute(&self, request: Request<Bytes>) -> BoxFuture<'static, Result<Response<Bytes>, TransportError>> {
        let path = request.uri().path().to_string();
        let fails = self.failing.iter().any(|p| *p == path);
        let delay = self.delays.get(path.as_str()).copied();
        let in_flight = self.in_flight.clone();
        let peak = self.peak.clone();

        async move {
            let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            in_flight.fetch_sub(1, Ordering::SeqCst);

            if fails {
                return Err(TransportError::other(format!("dial tcp {path}: connection refused")));
            }
            Ok(ok_response(&format!("echo {path}")))
        }
        .boxed()
    }
}

pub fn ok_response(body: &str) -> Response<Bytes> {
    let mut response = Response::new(Bytes::copy_from_slice(body.as_bytes()));
    *response.status_mut() = StatusCode::OK;
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, header::HeaderValue::from_static("text/plain"));
    response
}
