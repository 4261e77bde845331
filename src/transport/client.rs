//! `reqwest`-backed transport.

use std::time::Duration;

use axum::body::Bytes;
use axum::http::{Request, Response};
use futures_util::future::BoxFuture;
use futures_util::FutureExt;

use crate::config::TimeoutConfig;
use crate::transport::{HttpTransport, TransportError};

/// Executes sub-requests with a single pooled `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Build a client honouring the configured outbound connect timeout.
    pub fn from_config(timeouts: &TimeoutConfig) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(timeouts.connect_secs))
            .pool_idle_timeout(Duration::from_secs(timeouts.idle_secs))
            .build()?;
        Ok(Self { client })
    }
}

impl HttpTransport for ReqwestTransport {
    fn execute(&self, request: Request<Bytes>) -> BoxFuture<'static, Result<Response<Bytes>, TransportError>> {
        let client = self.client.clone();
        async move {
            let request = reqwest::Request::try_from(request)?;
            let response = client.execute(request).await?;

            let status = response.status();
            let version = response.version();
            let headers = response.headers().clone();
            let body = response.bytes().await?;

            let mut out = Response::new(body);
            *out.status_mut() = status;
            *out.version_mut() = version;
            *out.headers_mut() = headers;
            Ok(out)
        }
        .boxed()
    }
}
