//! Batch request parsing.
//!
//! # Responsibilities
//! - Walk the multipart parts of a validated envelope
//! - Skip parts without a Content-Type, reject parts with a foreign one
//! - Decode each `application/http` part into an [`OutboundRequest`]
//! - Complete the request target into an absolute URI for re-issue
//!
//! # Design Decisions
//! - One bad part fails the whole batch; nothing is dispatched
//! - Scheme is `https` only when the part carries a non-empty `x-use-https`
//! - Hop-by-hop and framing headers are dropped; the transport re-derives them

use axum::body::Bytes;
use axum::http::header::{self, HeaderName, HeaderValue};
use axum::http::uri::{Authority, PathAndQuery, Scheme};
use axum::http::{HeaderMap, Method, Uri};

use crate::batch::envelope::Boundary;
use crate::batch::error::ParseError;
use crate::batch::multipart::{MultipartReader, Part};
use crate::batch::types::OutboundRequest;
use crate::batch::{is_application_http, HEADER_CONTENT_ID, HEADER_USE_HTTPS};

const MAX_REQUEST_HEADERS: usize = 100;

/// Headers describing the embedded message framing rather than its content.
const STRIPPED_HEADERS: [HeaderName; 4] = [
    header::HOST,
    header::CONTENT_LENGTH,
    header::TRANSFER_ENCODING,
    header::CONNECTION,
];

/// Decode a multipart batch body into sub-requests, in part order.
pub fn parse_batch(boundary: &Boundary, body: &[u8]) -> Result<Vec<OutboundRequest>, ParseError> {
    let mut requests = Vec::new();

    for part in MultipartReader::new(body, boundary.as_str()) {
        let part = part?;

        // Parts that do not declare a type are ignored; parts declaring any
        // type other than application/http invalidate the batch.
        let content_type = match part.headers.get(header::CONTENT_TYPE) {
            Some(value) => String::from_utf8_lossy(value.as_bytes()).into_owned(),
            None => continue,
        };
        if content_type.trim().is_empty() {
            continue;
        }
        if !is_application_http(&content_type) {
            return Err(ParseError::UnexpectedPartContentType(content_type));
        }

        requests.push(decode_part(&part)?);
    }

    if requests.is_empty() {
        return Err(ParseError::Empty);
    }

    tracing::debug!(parts = requests.len(), "Parsed batch request");
    Ok(requests)
}

fn decode_part(part: &Part<'_>) -> Result<OutboundRequest, ParseError> {
    let message = decode_request(part.body)?;

    let correlation_id = part
        .headers
        .get(HEADER_CONTENT_ID)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or(ParseError::MissingContentId)?
        .to_string();

    let scheme = if use_https(&part.headers) {
        Scheme::HTTPS
    } else {
        Scheme::HTTP
    };

    message.into_outbound(correlation_id, scheme)
}

fn use_https(headers: &HeaderMap) -> bool {
    headers
        .get(HEADER_USE_HTTPS)
        .is_some_and(|value| !value.as_bytes().trim_ascii().is_empty())
}

/// An `application/http` request as read off the wire, before target completion.
#[derive(Debug)]
struct DecodedRequest {
    method: Method,
    target: String,
    headers: HeaderMap,
    body: Bytes,
}

impl DecodedRequest {
    fn into_outbound(self, correlation_id: String, scheme: Scheme) -> Result<OutboundRequest, ParseError> {
        let (authority, path_and_query) = resolve_target(&self.target, &self.headers)?;

        let uri = Uri::builder()
            .scheme(scheme)
            .authority(authority)
            .path_and_query(path_and_query)
            .build()
            .map_err(|e| ParseError::InvalidRequest(e.to_string()))?;

        let mut headers = self.headers;
        for name in &STRIPPED_HEADERS {
            headers.remove(name);
        }

        Ok(OutboundRequest::new(correlation_id, self.method, uri, headers, self.body))
    }
}

/// Split a request target into the authority to contact and the path to request.
///
/// The authority of an absolute-form target wins over the Host header. The
/// query string is kept alongside the path, so the outbound URI is scheme,
/// host, path and query rather than scheme, host and path alone.
fn resolve_target(target: &str, headers: &HeaderMap) -> Result<(Authority, PathAndQuery), ParseError> {
    let uri: Uri = target
        .parse()
        .map_err(|e: axum::http::uri::InvalidUri| ParseError::InvalidRequest(e.to_string()))?;

    let authority = match uri.authority() {
        Some(authority) => authority.clone(),
        None => {
            let host = headers
                .get(header::HOST)
                .and_then(|value| value.to_str().ok())
                .map(str::trim)
                .filter(|host| !host.is_empty())
                .ok_or(ParseError::MissingHost)?;
            host.parse::<Authority>()
                .map_err(|e| ParseError::InvalidRequest(format!("invalid Host header: {e}")))?
        }
    };

    let path_and_query = match uri.path_and_query() {
        Some(pq) if pq.as_str().starts_with('/') => pq.clone(),
        // asterisk-form and authority-form targets
        _ => PathAndQuery::from_static("/"),
    };

    Ok((authority, path_and_query))
}

fn decode_request(raw: &[u8]) -> Result<DecodedRequest, ParseError> {
    let mut header_buf = [httparse::EMPTY_HEADER; MAX_REQUEST_HEADERS];
    let mut request = httparse::Request::new(&mut header_buf);

    let head_len = match request.parse(raw) {
        Ok(httparse::Status::Complete(len)) => len,
        Ok(httparse::Status::Partial) => {
            return Err(ParseError::InvalidRequest("incomplete request head".into()))
        }
        Err(e) => return Err(ParseError::InvalidRequest(e.to_string())),
    };

    let method = request
        .method
        .ok_or_else(|| ParseError::InvalidRequest("missing method".into()))
        .and_then(|m| {
            Method::from_bytes(m.as_bytes()).map_err(|e| ParseError::InvalidRequest(e.to_string()))
        })?;
    let target = request
        .path
        .ok_or_else(|| ParseError::InvalidRequest("missing request target".into()))?
        .to_string();

    let mut headers = HeaderMap::with_capacity(request.headers.len());
    for h in request.headers.iter() {
        let name = HeaderName::from_bytes(h.name.as_bytes())
            .map_err(|e| ParseError::InvalidRequest(e.to_string()))?;
        let value = HeaderValue::from_bytes(h.value)
            .map_err(|e| ParseError::InvalidRequest(e.to_string()))?;
        headers.append(name, value);
    }

    let body = decode_body(&headers, &raw[head_len..])?;

    Ok(DecodedRequest {
        method,
        target,
        headers,
        body,
    })
}

/// Extract the message body according to its framing headers.
///
/// Without Content-Length or chunked Transfer-Encoding a request has no body.
fn decode_body(headers: &HeaderMap, rest: &[u8]) -> Result<Bytes, ParseError> {
    let chunked = headers
        .get_all(header::TRANSFER_ENCODING)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .last()
        .is_some_and(|coding| coding.trim().eq_ignore_ascii_case("chunked"));
    if chunked {
        return decode_chunked(rest);
    }

    let Some(length) = headers.get(header::CONTENT_LENGTH) else {
        return Ok(Bytes::new());
    };
    let length: usize = length
        .to_str()
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .ok_or_else(|| ParseError::InvalidRequest("invalid Content-Length".into()))?;
    if rest.len() < length {
        return Err(ParseError::InvalidRequest(format!(
            "body has {} bytes but Content-Length is {length}",
            rest.len()
        )));
    }
    Ok(Bytes::copy_from_slice(&rest[..length]))
}

fn decode_chunked(mut rest: &[u8]) -> Result<Bytes, ParseError> {
    let malformed = || ParseError::InvalidRequest("malformed chunked body".into());
    let mut body = Vec::with_capacity(rest.len());

    loop {
        let line_end = rest.iter().position(|&b| b == b'\n').ok_or_else(malformed)?;
        let line = std::str::from_utf8(&rest[..line_end]).map_err(|_| malformed())?;
        let size_field = line.trim_end_matches('\r').split(';').next().unwrap_or("").trim();
        let size = usize::from_str_radix(size_field, 16).map_err(|_| malformed())?;
        rest = &rest[line_end + 1..];

        if size == 0 {
            // Trailers are not forwarded.
            return Ok(Bytes::from(body));
        }
        if rest.len() < size {
            return Err(malformed());
        }
        body.extend_from_slice(&rest[..size]);
        rest = &rest[size..];

        rest = match rest {
            [b'\r', b'\n', tail @ ..] | [b'\n', tail @ ..] => tail,
            _ => return Err(malformed()),
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn boundary() -> Boundary {
        Boundary::new("batch").unwrap()
    }

    fn part(headers: &str, message: &str) -> String {
        format!("--batch\r\n{headers}\r\n{message}\r\n")
    }

    fn envelope(parts: &[String]) -> String {
        let mut body = String::from("\r\n");
        for p in parts {
            body.push_str(p);
        }
        body.push_str("--batch--\r\n");
        body
    }

    #[test]
    fn decodes_single_request() {
        let body = envelope(&[part(
            "Content-Type: application/http;version=1.1\r\nContent-ID: abc-123\r\nx-use-https: true\r\n",
            "GET / HTTP/1.1\nHost: example.com\n\n",
        )]);

        let requests = parse_batch(&boundary(), body.as_bytes()).unwrap();
        assert_eq!(requests.len(), 1);
        let req = &requests[0];
        assert_eq!(req.correlation_id(), "abc-123");
        assert_eq!(req.method(), Method::GET);
        assert_eq!(req.uri().to_string(), "https://example.com/");
        assert!(req.headers().get(header::HOST).is_none());
        assert!(req.body().is_empty());
    }

    #[test]
    fn http_scheme_without_marker() {
        let body = envelope(&[part(
            "Content-Type: application/http\r\nContent-ID: 1\r\nx-use-https: \r\n",
            "DELETE /items/7?force=yes HTTP/1.1\r\nHost: api.local:8080\r\n\r\n",
        )]);

        let requests = parse_batch(&boundary(), body.as_bytes()).unwrap();
        assert_eq!(requests[0].method(), Method::DELETE);
        assert_eq!(requests[0].uri().to_string(), "http://api.local:8080/items/7?force=yes");
    }

    #[test]
    fn keeps_headers_and_sized_body() {
        let body = envelope(&[part(
            "Content-Type: application/http\r\nContent-ID: 1\r\n",
            "POST /orders HTTP/1.1\r\nHost: shop\r\nContent-Type: application/json\r\nContent-Length: 11\r\nConnection: keep-alive\r\n\r\n{\"qty\": 42}",
        )]);

        let requests = parse_batch(&boundary(), body.as_bytes()).unwrap();
        let req = &requests[0];
        assert_eq!(req.headers()[header::CONTENT_TYPE], "application/json");
        assert!(req.headers().get(header::CONTENT_LENGTH).is_none());
        assert!(req.headers().get(header::CONNECTION).is_none());
        assert_eq!(req.body().as_ref(), b"{\"qty\": 42}");
    }

    #[test]
    fn decodes_chunked_body() {
        let body = envelope(&[part(
            "Content-Type: application/http\r\nContent-ID: 1\r\n",
            "PUT /blob HTTP/1.1\r\nHost: store\r\nTransfer-Encoding: chunked\r\n\r\n5\r\nhello\r\n6;ext=1\r\n world\r\n0\r\n\r\n",
        )]);

        let requests = parse_batch(&boundary(), body.as_bytes()).unwrap();
        assert_eq!(requests[0].body().as_ref(), b"hello world");
        assert!(requests[0].headers().get(header::TRANSFER_ENCODING).is_none());
    }

    #[test]
    fn absolute_form_target_supplies_host() {
        let body = envelope(&[part(
            "Content-Type: application/http\r\nContent-ID: 1\r\n",
            "GET http://origin.example/a/b HTTP/1.1\r\n\r\n",
        )]);

        let requests = parse_batch(&boundary(), body.as_bytes()).unwrap();
        assert_eq!(requests[0].uri().to_string(), "http://origin.example/a/b");
    }

    #[test]
    fn preserves_part_order() {
        let parts: Vec<String> = ["c", "a", "b"]
            .iter()
            .map(|id| {
                part(
                    &format!("Content-Type: application/http\r\nContent-ID: {id}\r\n"),
                    &format!("GET /{id} HTTP/1.1\r\nHost: h\r\n\r\n"),
                )
            })
            .collect();
        let body = envelope(&parts);

        let ids: Vec<_> = parse_batch(&boundary(), body.as_bytes())
            .unwrap()
            .iter()
            .map(|r| r.correlation_id().to_string())
            .collect();
        assert_eq!(ids, ["c", "a", "b"]);
    }

    #[test]
    fn parts_without_content_type_are_skipped() {
        let body = envelope(&[
            part("Content-ID: skipped\r\n", "GET / HTTP/1.1\r\nHost: h\r\n\r\n"),
            part(
                "Content-Type: application/http\r\nContent-ID: kept\r\n",
                "GET / HTTP/1.1\r\nHost: h\r\n\r\n",
            ),
        ]);

        let requests = parse_batch(&boundary(), body.as_bytes()).unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].correlation_id(), "kept");
    }

    #[test]
    fn only_untyped_parts_is_empty_batch() {
        let body = envelope(&[part("Content-ID: 1\r\n", "GET / HTTP/1.1\r\nHost: h\r\n\r\n")]);
        let err = parse_batch(&boundary(), body.as_bytes()).unwrap_err();
        assert!(matches!(err, ParseError::Empty));
        assert_eq!(err.to_string(), "no batch requests present");
    }

    #[test]
    fn foreign_content_type_fails_whole_batch() {
        let body = envelope(&[
            part(
                "Content-Type: application/http\r\nContent-ID: good\r\n",
                "GET / HTTP/1.1\r\nHost: h\r\n\r\n",
            ),
            part(
                "Content-Type: application/json\r\nContent-ID: bad\r\n",
                "GET / HTTP/1.1\r\nHost: h\r\n\r\n",
            ),
        ]);

        let err = parse_batch(&boundary(), body.as_bytes()).unwrap_err();
        assert!(matches!(err, ParseError::UnexpectedPartContentType(ct) if ct == "application/json"));
    }

    #[test]
    fn missing_content_id_fails_whole_batch() {
        let body = envelope(&[
            part(
                "Content-Type: application/http\r\nContent-ID: good\r\n",
                "GET / HTTP/1.1\r\nHost: h\r\n\r\n",
            ),
            part("Content-Type: application/http\r\n", "GET / HTTP/1.1\r\nHost: h\r\n\r\n"),
        ]);

        let err = parse_batch(&boundary(), body.as_bytes()).unwrap_err();
        assert!(matches!(err, ParseError::MissingContentId));

        let body = envelope(&[part(
            "Content-Type: application/http\r\nContent-ID:   \r\n",
            "GET / HTTP/1.1\r\nHost: h\r\n\r\n",
        )]);
        assert!(matches!(
            parse_batch(&boundary(), body.as_bytes()).unwrap_err(),
            ParseError::MissingContentId
        ));
    }

    #[test]
    fn malformed_messages_fail() {
        let no_host = envelope(&[part(
            "Content-Type: application/http\r\nContent-ID: 1\r\n",
            "GET /x HTTP/1.1\r\nAccept: */*\r\n\r\n",
        )]);
        assert!(matches!(
            parse_batch(&boundary(), no_host.as_bytes()).unwrap_err(),
            ParseError::MissingHost
        ));

        let garbage = envelope(&[part(
            "Content-Type: application/http\r\nContent-ID: 1\r\n",
            "this is not http",
        )]);
        assert!(matches!(
            parse_batch(&boundary(), garbage.as_bytes()).unwrap_err(),
            ParseError::InvalidRequest(_)
        ));

        let short_body = envelope(&[part(
            "Content-Type: application/http\r\nContent-ID: 1\r\n",
            "POST / HTTP/1.1\r\nHost: h\r\nContent-Length: 50\r\n\r\nshort",
        )]);
        assert!(matches!(
            parse_batch(&boundary(), short_body.as_bytes()).unwrap_err(),
            ParseError::InvalidRequest(_)
        ));
    }

    #[test]
    fn broken_framing_fails() {
        let err = parse_batch(&boundary(), b"no multipart here").unwrap_err();
        assert!(matches!(err, ParseError::Multipart(_)));
    }
}
