//! Envelope validation.
//!
//! # Responsibilities
//! - Parse the inbound Content-Type header
//! - Require `multipart/batch` with `type=application/http`
//! - Extract the boundary token used for both request and response framing

use std::fmt;

use mime::Mime;

use crate::batch::error::EnvelopeError;
use crate::batch::{is_application_http, MULTIPART_BATCH};

/// A validated, non-empty multipart boundary token.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Boundary(String);

impl Boundary {
    /// Wrap a boundary token, rejecting the empty string.
    pub fn new(token: impl Into<String>) -> Result<Self, EnvelopeError> {
        let token = token.into();
        if token.is_empty() {
            return Err(EnvelopeError::MissingBoundary);
        }
        Ok(Self(token))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Content-Type value for a response framed with this boundary.
    pub fn response_content_type(&self) -> String {
        format!("{MULTIPART_BATCH}; type=\"application/http\"; boundary={}", self.quoted())
    }

    fn quoted(&self) -> String {
        let plain = self
            .0
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b"'+_-.".contains(&b));
        if plain {
            self.0.clone()
        } else {
            format!("\"{}\"", self.0.replace('\\', "\\\\").replace('"', "\\\""))
        }
    }
}

impl fmt::Display for Boundary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Validate the inbound Content-Type and return the boundary it declares.
///
/// Parameter order is irrelevant; the `type` parameter only has its leading
/// token compared, so `application/http;version=1.1` is accepted.
pub fn validate_content_type(content_type: Option<&str>) -> Result<Boundary, EnvelopeError> {
    let raw = match content_type.map(str::trim) {
        Some(raw) if !raw.is_empty() => raw,
        _ => return Err(EnvelopeError::MissingContentType),
    };

    let media: Mime = raw
        .parse()
        .map_err(|e: mime::FromStrError| EnvelopeError::Unparseable(e.to_string()))?;

    if media.essence_str() != MULTIPART_BATCH {
        return Err(EnvelopeError::UnexpectedMediaType(
            media.essence_str().to_string(),
        ));
    }

    let part_type = media
        .get_param("type")
        .map(|value| unquote(value.as_str()))
        .unwrap_or_default();
    if !is_application_http(&part_type) {
        return Err(EnvelopeError::UnexpectedPartType(part_type));
    }

    let boundary = media
        .get_param(mime::BOUNDARY)
        .map(|value| unquote(value.as_str()))
        .unwrap_or_default();
    Boundary::new(boundary)
}

fn unquote(value: &str) -> String {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
        .to_string()
}
