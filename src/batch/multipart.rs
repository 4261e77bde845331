//! Multipart framing for batch bodies.
//!
//! The reader splits a buffered body into parts; it tolerates bare LF line
//! endings and linear whitespace after a delimiter, ignores the preamble and
//! epilogue, and requires the closing `--boundary--` delimiter. The writer
//! produces CRLF framing.

use std::io::{self, Write};

use axum::http::header::{HeaderName, HeaderValue};
use axum::http::HeaderMap;
use thiserror::Error;

const MAX_PART_HEADERS: usize = 64;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MultipartError {
    #[error("no opening boundary delimiter found")]
    MissingDelimiter,

    #[error("part {0} is not terminated by a boundary delimiter")]
    Unterminated(usize),

    #[error("part {0} has malformed headers: {1}")]
    InvalidHeaders(usize, String),
}

/// One raw part: its MIME headers and the undecoded body bytes.
#[derive(Debug)]
pub struct Part<'a> {
    pub headers: HeaderMap,
    pub body: &'a [u8],
}

/// Iterator over the parts of a buffered multipart body.
#[derive(Debug)]
pub struct MultipartReader<'a> {
    buf: &'a [u8],
    dash_boundary: Vec<u8>,
    pos: usize,
    index: usize,
    state: ReaderState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReaderState {
    Preamble,
    InParts,
    Done,
}

/// Kind of delimiter line found at a given position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Delimiter {
    /// `--boundary` followed by a line ending; value is the offset of the next line.
    Part(usize),
    /// `--boundary--`.
    Close,
}

impl<'a> MultipartReader<'a> {
    pub fn new(buf: &'a [u8], boundary: &str) -> Self {
        let mut dash_boundary = Vec::with_capacity(boundary.len() + 2);
        dash_boundary.extend_from_slice(b"--");
        dash_boundary.extend_from_slice(boundary.as_bytes());
        Self {
            buf,
            dash_boundary,
            pos: 0,
            index: 0,
            state: ReaderState::Preamble,
        }
    }

    /// Classify the line starting at `at` as a delimiter, if it is one.
    fn delimiter_at(&self, at: usize) -> Option<Delimiter> {
        let rest = self.buf.get(at..)?;
        let after = rest.strip_prefix(self.dash_boundary.as_slice())?;
        if after.starts_with(b"--") {
            return Some(Delimiter::Close);
        }
        let mut i = 0;
        while i < after.len() && (after[i] == b' ' || after[i] == b'\t') {
            i += 1;
        }
        match &after[i..] {
            [b'\n', ..] => Some(Delimiter::Part(at + self.dash_boundary.len() + i + 1)),
            [b'\r', b'\n', ..] => Some(Delimiter::Part(at + self.dash_boundary.len() + i + 2)),
            _ => None,
        }
    }

    /// Skip the preamble up to the first delimiter line.
    fn skip_preamble(&mut self) -> Result<Option<usize>, MultipartError> {
        let mut line_start = 0;
        while line_start < self.buf.len() {
            match self.delimiter_at(line_start) {
                Some(Delimiter::Part(next)) => return Ok(Some(next)),
                Some(Delimiter::Close) => return Ok(None),
                None => {}
            }
            line_start = match self.buf[line_start..].iter().position(|&b| b == b'\n') {
                Some(nl) => line_start + nl + 1,
                None => break,
            };
        }
        Err(MultipartError::MissingDelimiter)
    }

    /// Find the delimiter terminating a body that starts at `body_start`.
    ///
    /// Returns the body end and the delimiter found.
    fn find_body_end(&self, body_start: usize) -> Option<(usize, Delimiter)> {
        // The line ending that precedes a delimiter belongs to the delimiter,
        // so an empty body shares its newline with the blank header line.
        let mut search = body_start.saturating_sub(1);
        while let Some(offset) = self.buf[search..].iter().position(|&b| b == b'\n') {
            let newline = search + offset;
            if let Some(delimiter) = self.delimiter_at(newline + 1) {
                let end = if newline < body_start {
                    body_start
                } else if newline > body_start && self.buf[newline - 1] == b'\r' {
                    newline - 1
                } else {
                    newline
                };
                return Some((end, delimiter));
            }
            search = newline + 1;
        }
        None
    }

    fn read_part(&mut self, start: usize) -> Result<Part<'a>, MultipartError> {
        let index = self.index;
        self.index += 1;

        let (headers, header_len) = parse_part_headers(&self.buf[start..], index)?;
        let body_start = start + header_len;

        let (body_end, delimiter) = self
            .find_body_end(body_start)
            .ok_or(MultipartError::Unterminated(index))?;

        match delimiter {
            Delimiter::Part(next) => self.pos = next,
            Delimiter::Close => self.state = ReaderState::Done,
        }

        let buf: &'a [u8] = self.buf;
        Ok(Part {
            headers,
            body: &buf[body_start..body_end],
        })
    }
}

impl<'a> Iterator for MultipartReader<'a> {
    type Item = Result<Part<'a>, MultipartError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.state {
            ReaderState::Done => None,
            ReaderState::Preamble => match self.skip_preamble() {
                Ok(Some(first)) => {
                    self.state = ReaderState::InParts;
                    let part = self.read_part(first);
                    if part.is_err() {
                        self.state = ReaderState::Done;
                    }
                    Some(part)
                }
                Ok(None) => {
                    self.state = ReaderState::Done;
                    None
                }
                Err(e) => {
                    self.state = ReaderState::Done;
                    Some(Err(e))
                }
            },
            ReaderState::InParts => {
                let part = self.read_part(self.pos);
                if part.is_err() {
                    self.state = ReaderState::Done;
                }
                Some(part)
            }
        }
    }
}

fn parse_part_headers(buf: &[u8], index: usize) -> Result<(HeaderMap, usize), MultipartError> {
    let mut raw = [httparse::EMPTY_HEADER; MAX_PART_HEADERS];
    let (consumed, parsed) = match httparse::parse_headers(buf, &mut raw) {
        Ok(httparse::Status::Complete(done)) => done,
        Ok(httparse::Status::Partial) => {
            return Err(MultipartError::InvalidHeaders(index, "unterminated header block".into()))
        }
        Err(e) => return Err(MultipartError::InvalidHeaders(index, e.to_string())),
    };

    let mut headers = HeaderMap::with_capacity(parsed.len());
    for header in parsed {
        let name = HeaderName::from_bytes(header.name.as_bytes())
            .map_err(|e| MultipartError::InvalidHeaders(index, e.to_string()))?;
        let value = HeaderValue::from_bytes(header.value)
            .map_err(|e| MultipartError::InvalidHeaders(index, e.to_string()))?;
        headers.append(name, value);
    }
    Ok((headers, consumed))
}

/// Streaming writer for a multipart body with a fixed boundary.
#[derive(Debug)]
pub struct MultipartWriter<W> {
    inner: W,
    boundary: String,
    wrote_part: bool,
}

impl<W: Write> MultipartWriter<W> {
    pub fn new(inner: W, boundary: impl Into<String>) -> Self {
        Self {
            inner,
            boundary: boundary.into(),
            wrote_part: false,
        }
    }

    /// Start a new part with the given headers and return the writer for its body.
    pub fn next_part(&mut self, headers: &[(&str, &str)]) -> io::Result<&mut W> {
        if self.wrote_part {
            write!(self.inner, "\r\n--{}\r\n", self.boundary)?;
        } else {
            write!(self.inner, "--{}\r\n", self.boundary)?;
        }
        for (name, value) in headers {
            write!(self.inner, "{name}: {value}\r\n")?;
        }
        self.inner.write_all(b"\r\n")?;
        self.wrote_part = true;
        Ok(&mut self.inner)
    }

    /// Write the closing delimiter and return the underlying writer.
    pub fn finish(mut self) -> io::Result<W> {
        if self.wrote_part {
            self.inner.write_all(b"\r\n")?;
        }
        write!(self.inner, "--{}--\r\n", self.boundary)?;
        self.inner.flush()?;
        Ok(self.inner)
    }
}
