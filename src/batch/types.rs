//! Sub-request and sub-response records exchanged between pipeline stages.

use axum::body::Bytes;
use axum::http::{HeaderMap, Method, Request, Response, Uri};

use crate::batch::error::DispatchFailure;

/// One decoded sub-request, ready to be re-issued against its target.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    correlation_id: String,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
}

impl OutboundRequest {
    /// Create a sub-request. `uri` must be absolute.
    pub fn new(
        correlation_id: impl Into<String>,
        method: Method,
        uri: Uri,
        headers: HeaderMap,
        body: Bytes,
    ) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            method,
            uri,
            headers,
            body,
        }
    }

    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Split into the correlation identifier and the request handed to the transport.
    pub fn into_parts(self) -> (String, Request<Bytes>) {
        let mut request = Request::new(self.body);
        *request.method_mut() = self.method;
        *request.uri_mut() = self.uri;
        *request.headers_mut() = self.headers;
        (self.correlation_id, request)
    }
}

/// The result of attempting one [`OutboundRequest`].
#[derive(Debug)]
pub struct OutcomeRecord {
    /// Copied from the originating request.
    pub correlation_id: String,
    /// The target's response (any status), or the reason no response was obtained.
    pub result: Result<Response<Bytes>, DispatchFailure>,
}

impl OutcomeRecord {
    pub fn response(correlation_id: impl Into<String>, response: Response<Bytes>) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            result: Ok(response),
        }
    }

    pub fn failure(correlation_id: impl Into<String>, failure: DispatchFailure) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            result: Err(failure),
        }
    }

    pub fn is_failure(&self) -> bool {
        self.result.is_err()
    }
}
