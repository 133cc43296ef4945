//! Streaming decoder for `multipart/form-data` request bodies.
//!
//! # Body Format
//!
//! ```text
//! --<boundary>\r\n
//! Content-Disposition: form-data; name="file"; filename="report.txt"\r\n
//! Content-Type: application/octet-stream\r\n
//! \r\n
//! <payload bytes>\r\n
//! --<boundary>\r\n
//! ...
//! --<boundary>--\r\n
//! ```
//!
//! # Streaming
//!
//! The decoder is push-based: callers [`feed`](MultipartDecoder::feed) body
//! chunks as they arrive and pull [`MultipartEvent`]s until the decoder asks
//! for more input. Delimiters are tracked across chunk boundaries, and only
//! the tail bytes that could still begin a delimiter are held back, so memory
//! use stays bounded regardless of payload size. Payloads are handled as raw
//! bytes throughout and never pass through a text decoding step.

use bytes::{Buf, Bytes, BytesMut};
use memchr::memmem;
use percent_encoding::percent_decode_str;

use crate::error::{ProtocolError, Result};

/// Maximum accepted boundary length.
pub const MAX_BOUNDARY_LEN: usize = 200;

/// Maximum size of a single part's header block (8KB).
pub const MAX_HEADER_SIZE: usize = 8 * 1024;

/// Maximum whitespace tolerated between a delimiter and its line break.
const MAX_TRANSPORT_PADDING: usize = 64;

/// Blank line ending a part header block.
const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";

/// Extract the boundary from a `Content-Type` header value.
///
/// Accepts both bare and quoted boundary parameters, e.g.
/// `multipart/form-data; boundary="----abc"`.
pub fn parse_boundary(content_type: &str) -> Result<String> {
    let (mime, params) = parse_header_value(content_type);

    if !mime.to_ascii_lowercase().starts_with("multipart/") {
        return Err(ProtocolError::NotMultipart(mime.to_string()));
    }

    let boundary = params
        .into_iter()
        .find(|(key, _)| key == "boundary")
        .map(|(_, value)| value)
        .filter(|value| !value.is_empty())
        .ok_or(ProtocolError::MissingBoundary)?;

    if boundary.len() > MAX_BOUNDARY_LEN {
        return Err(ProtocolError::BoundaryTooLong {
            len: boundary.len(),
            max: MAX_BOUNDARY_LEN,
        });
    }

    Ok(boundary)
}

/// Headers of a single part that the gateway cares about.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartHeaders {
    /// Form field name.
    pub name: Option<String>,
    /// Declared file name. `None` for plain form fields.
    pub file_name: Option<String>,
    /// Declared content type of the part.
    pub content_type: Option<String>,
}

impl PartHeaders {
    /// Parse a raw header block (without the terminating empty line).
    fn parse(block: &[u8]) -> Self {
        let text = String::from_utf8_lossy(block);
        let mut headers = PartHeaders::default();

        for line in text.split("\r\n") {
            let Some((name, value)) = line.split_once(':') else {
                continue;
            };
            let name = name.trim();

            if name.eq_ignore_ascii_case("content-disposition") {
                let (_, params) = parse_header_value(value);
                let mut plain_name = None;
                let mut extended_name = None;

                for (key, value) in params {
                    match key.as_str() {
                        "name" => headers.name = Some(value),
                        "filename" => plain_name = Some(value),
                        "filename*" => extended_name = decode_ext_value(&value),
                        _ => {}
                    }
                }

                headers.file_name = extended_name
                    .or(plain_name)
                    .filter(|file_name| !file_name.is_empty());
            } else if name.eq_ignore_ascii_case("content-type") {
                headers.content_type = Some(value.trim().to_string());
            }
        }

        headers
    }
}

/// An event produced by the decoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MultipartEvent {
    /// A new part begins.
    PartStart(PartHeaders),
    /// A slice of the current part's payload.
    Data(Bytes),
    /// The current part is complete.
    PartEnd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Skipping bytes before the first delimiter.
    Preamble,
    /// Just consumed a delimiter; deciding between next part and close.
    Delimiter,
    /// Reading a part's header block.
    Headers,
    /// Streaming a part's payload.
    Body,
    /// Closing delimiter seen; everything else is epilogue.
    Finished,
}

/// Incremental multipart decoder.
#[derive(Debug)]
pub struct MultipartDecoder {
    /// `\r\n--<boundary>`, the sequence that terminates every part.
    delimiter: Vec<u8>,
    /// Bytes received but not yet emitted.
    buffer: BytesMut,
    /// Current position in the body grammar.
    state: State,
    /// Header block size limit.
    max_header_size: usize,
}

impl MultipartDecoder {
    /// Create a decoder for the given boundary.
    pub fn new(boundary: &str) -> Self {
        let mut delimiter = Vec::with_capacity(boundary.len() + 4);
        delimiter.extend_from_slice(b"\r\n--");
        delimiter.extend_from_slice(boundary.as_bytes());

        // The opening delimiter has no preceding line break; seed one so every
        // delimiter in the body matches the same byte sequence.
        let mut buffer = BytesMut::with_capacity(8 * 1024);
        buffer.extend_from_slice(b"\r\n");

        Self {
            delimiter,
            buffer,
            state: State::Preamble,
            max_header_size: MAX_HEADER_SIZE,
        }
    }

    /// Override the header block size limit.
    pub fn with_max_header_size(mut self, max_header_size: usize) -> Self {
        self.max_header_size = max_header_size;
        self
    }

    /// Append a chunk of body bytes. Input after the closing delimiter is ignored.
    pub fn feed(&mut self, chunk: &[u8]) {
        if self.state != State::Finished {
            self.buffer.extend_from_slice(chunk);
        }
    }

    /// Whether the closing delimiter has been consumed.
    pub fn is_finished(&self) -> bool {
        self.state == State::Finished
    }

    /// Signal end of input. Fails unless the body was properly closed.
    pub fn finish(&self) -> Result<()> {
        match self.state {
            State::Finished => Ok(()),
            State::Preamble => Err(ProtocolError::Malformed(
                "no multipart delimiter found".to_string(),
            )),
            _ => Err(ProtocolError::UnexpectedEof),
        }
    }

    /// Pull the next event.
    ///
    /// Returns `Ok(None)` when more input is needed or the body is finished.
    pub fn next_event(&mut self) -> Result<Option<MultipartEvent>> {
        loop {
            match self.state {
                State::Preamble => match find(&self.buffer, &self.delimiter) {
                    Some(pos) => {
                        self.buffer.advance(pos + self.delimiter.len());
                        self.state = State::Delimiter;
                    }
                    None => {
                        let keep = self.delimiter.len() - 1;
                        if self.buffer.len() > keep {
                            let discard = self.buffer.len() - keep;
                            self.buffer.advance(discard);
                        }
                        return Ok(None);
                    }
                },

                State::Delimiter => {
                    if self.buffer.len() < 2 {
                        return Ok(None);
                    }
                    if self.buffer.starts_with(b"--") {
                        self.state = State::Finished;
                        self.buffer.clear();
                        return Ok(None);
                    }
                    match find(&self.buffer, b"\r\n") {
                        Some(pos) => {
                            if !self.buffer[..pos].iter().all(|b| *b == b' ' || *b == b'\t') {
                                return Err(ProtocolError::Malformed(
                                    "unexpected data after delimiter".to_string(),
                                ));
                            }
                            self.buffer.advance(pos + 2);
                            self.state = State::Headers;
                        }
                        None => {
                            if self.buffer.len() > MAX_TRANSPORT_PADDING {
                                return Err(ProtocolError::Malformed(
                                    "delimiter line is not terminated".to_string(),
                                ));
                            }
                            return Ok(None);
                        }
                    }
                }

                State::Headers => {
                    if self.buffer.starts_with(b"\r\n") {
                        self.buffer.advance(2);
                        self.state = State::Body;
                        return Ok(Some(MultipartEvent::PartStart(PartHeaders::default())));
                    }
                    match find(&self.buffer, HEADER_TERMINATOR) {
                        Some(pos) if pos > self.max_header_size => {
                            return Err(ProtocolError::HeaderTooLarge {
                                size: pos,
                                max: self.max_header_size,
                            });
                        }
                        Some(pos) => {
                            let block = self.buffer.split_to(pos);
                            self.buffer.advance(4);
                            self.state = State::Body;
                            return Ok(Some(MultipartEvent::PartStart(PartHeaders::parse(
                                &block,
                            ))));
                        }
                        None => {
                            // The tail may hold a partial terminator.
                            let limit = self.max_header_size + HEADER_TERMINATOR.len() - 1;
                            if self.buffer.len() > limit {
                                return Err(ProtocolError::HeaderTooLarge {
                                    size: self.buffer.len(),
                                    max: self.max_header_size,
                                });
                            }
                            return Ok(None);
                        }
                    }
                }

                State::Body => {
                    return match find(&self.buffer, &self.delimiter) {
                        Some(0) => {
                            self.buffer.advance(self.delimiter.len());
                            self.state = State::Delimiter;
                            Ok(Some(MultipartEvent::PartEnd))
                        }
                        Some(pos) => Ok(Some(MultipartEvent::Data(
                            self.buffer.split_to(pos).freeze(),
                        ))),
                        None => {
                            // Hold back anything that could be the start of a delimiter.
                            let safe = self
                                .buffer
                                .len()
                                .saturating_sub(self.delimiter.len() - 1);
                            if safe == 0 {
                                Ok(None)
                            } else {
                                Ok(Some(MultipartEvent::Data(
                                    self.buffer.split_to(safe).freeze(),
                                )))
                            }
                        }
                    };
                }

                State::Finished => return Ok(None),
            }
        }
    }
}

/// Find the first occurrence of `needle` in `haystack`.
fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() {
        return None;
    }
    memmem::find(haystack, needle)
}

/// Split a header value into its primary token and lowercase-keyed parameters.
///
/// Quoted parameter values are unescaped (`\"` becomes `"`).
fn parse_header_value(value: &str) -> (&str, Vec<(String, String)>) {
    let (primary, mut rest) = match value.find(';') {
        Some(idx) => (&value[..idx], &value[idx + 1..]),
        None => (value, ""),
    };

    let mut params = Vec::new();
    loop {
        rest = rest.trim_start_matches([' ', '\t', ';']);
        if rest.is_empty() {
            break;
        }

        let key_end = rest.find(['=', ';']).unwrap_or(rest.len());
        let key = rest[..key_end].trim().to_ascii_lowercase();
        rest = &rest[key_end..];

        let Some(after_eq) = rest.strip_prefix('=') else {
            if !key.is_empty() {
                params.push((key, String::new()));
            }
            continue;
        };
        rest = after_eq.trim_start_matches([' ', '\t']);

        let value = if let Some(quoted) = rest.strip_prefix('"') {
            let (value, consumed) = unquote(quoted);
            rest = &quoted[consumed..];
            value
        } else {
            let end = rest.find(';').unwrap_or(rest.len());
            let value = rest[..end].trim().to_string();
            rest = &rest[end..];
            value
        };

        params.push((key, value));
    }

    (primary.trim(), params)
}

/// Read a quoted-string body that follows an opening quote.
///
/// Returns the unescaped value and the bytes consumed, closing quote included.
fn unquote(input: &str) -> (String, usize) {
    let mut value = String::new();
    let mut escaped = false;

    for (idx, c) in input.char_indices() {
        if escaped {
            value.push(c);
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == '"' {
            return (value, idx + 1);
        } else {
            value.push(c);
        }
    }

    (value, input.len())
}

/// Decode an RFC 5987 extended value such as `UTF-8''na%C3%AFve.txt`.
fn decode_ext_value(value: &str) -> Option<String> {
    let mut pieces = value.splitn(3, '\'');
    let charset = pieces.next()?;
    let _language = pieces.next()?;
    let encoded = pieces.next()?;

    if !charset.eq_ignore_ascii_case("utf-8") {
        return None;
    }

    percent_decode_str(encoded)
        .decode_utf8()
        .ok()
        .map(|decoded| decoded.into_owned())
}
