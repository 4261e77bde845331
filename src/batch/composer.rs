//! Batch response composition.
//!
//! # Responsibilities
//! - Write one `application/http` part per outcome, tagged with `In-Reply-To`
//! - Serialize each sub-response as an HTTP/1.1 message
//! - Substitute a 400 response carrying the failure text for failed sub-requests
//!
//! # Design Decisions
//! - Bodies are already buffered, so `Content-Length` is always recomputed and
//!   any `Transfer-Encoding` from the target is dropped
//! - Only writer errors abort composition

use std::io::{self, Write};

use axum::body::Bytes;
use axum::http::{header, HeaderValue, Response, StatusCode};

use crate::batch::envelope::Boundary;
use crate::batch::error::DispatchFailure;
use crate::batch::multipart::MultipartWriter;
use crate::batch::types::OutcomeRecord;
use crate::batch::{APPLICATION_HTTP, HEADER_CONTENT_TRANSFER_ENCODING, HEADER_IN_REPLY_TO};

const BINARY: &str = "binary";
const CONTENT_TYPE: &str = "Content-Type";

/// Write the `multipart/batch` body for `outcomes` into `writer`.
pub fn compose_response<W: Write>(writer: W, boundary: &Boundary, outcomes: &[OutcomeRecord]) -> io::Result<W> {
    let mut multipart = MultipartWriter::new(writer, boundary.as_str());

    for outcome in outcomes {
        let part = multipart.next_part(&[
            (CONTENT_TYPE, APPLICATION_HTTP),
            (HEADER_CONTENT_TRANSFER_ENCODING, BINARY),
            (HEADER_IN_REPLY_TO, outcome.correlation_id.as_str()),
        ])?;

        match &outcome.result {
            Ok(response) => write_response(part, response)?,
            Err(failure) => write_response(part, &failure_response(failure))?,
        }
    }

    multipart.finish()
}

/// Stand-in response for a sub-request that never got one.
pub fn failure_response(failure: &DispatchFailure) -> Response<Bytes> {
    let message = failure.to_string();
    let mut response = Response::new(Bytes::from(message));
    *response.status_mut() = StatusCode::BAD_REQUEST;
    response
}

/// Serialize `response` as an HTTP/1.1 message.
pub fn write_response<W: Write + ?Sized>(w: &mut W, response: &Response<Bytes>) -> io::Result<()> {
    let status = response.status();
    write!(
        w,
        "HTTP/1.1 {} {}\r\n",
        status.as_str(),
        status.canonical_reason().unwrap_or("")
    )?;

    for (name, value) in response.headers() {
        if *name == header::CONTENT_LENGTH || *name == header::TRANSFER_ENCODING {
            continue;
        }
        write_header(w, name.as_str(), value)?;
    }
    write!(w, "Content-Length: {}\r\n\r\n", response.body().len())?;
    w.write_all(response.body())
}

fn write_header<W: Write + ?Sized>(w: &mut W, name: &str, value: &HeaderValue) -> io::Result<()> {
    w.write_all(name.as_bytes())?;
    w.write_all(b": ")?;
    w.write_all(value.as_bytes())?;
    w.write_all(b"\r\n")
}
