//! HTTP response head parsing
//!
//! This module provides an incremental parser for response status lines and
//! headers. Body framing is left to the caller, which knows the request
//! method and reads the body straight from the session.

use super::{Error, Headers, ResponseHead, Result, Status, Version, MAX_HEAD_SIZE};

/// Find the next CRLF in a buffer
fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}

/// Parse HTTP response status line
///
/// Format: VERSION STATUS [REASON]
/// Example: HTTP/1.1 200 OK
///
/// Surrounding whitespace is tolerated and an empty reason becomes `None`.
pub fn parse_status_line(line: &str) -> Result<(Version, Status, Option<String>)> {
    let line = line.trim();
    let mut parts = line.splitn(2, char::is_whitespace);
    let version = Version::from_str(parts.next().unwrap_or(""))?;

    let rest = parts.next().unwrap_or("").trim_start();
    let (code, reason) = match rest.find(char::is_whitespace) {
        Some(pos) => (&rest[..pos], rest[pos..].trim()),
        None => (rest, ""),
    };

    if code.len() != 3 {
        return Err(Error::Parse(format!("Invalid status line: {}", line)));
    }
    let code = code
        .parse::<u16>()
        .map_err(|_| Error::Parse(format!("Invalid status code: {}", code)))?;
    let status = Status::new(code)?;
    let reason = if reason.is_empty() {
        None
    } else {
        Some(reason.to_string())
    };

    Ok((version, status, reason))
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum ParserState {
    StatusLine,
    Headers,
    Complete,
}

/// Incremental response head parser
///
/// Feed it bytes as they arrive; once the blank line ending the header
/// section is seen it yields the head, and `take_remaining` hands back any
/// body bytes that were read along with it.
pub struct ResponseHeadParser {
    state: ParserState,
    buffer: Vec<u8>,
    head_size: usize,
    version: Version,
    status: Option<Status>,
    reason: Option<String>,
    headers: Headers,
}

impl ResponseHeadParser {
    /// Create a new response head parser
    pub fn new() -> Self {
        ResponseHeadParser {
            state: ParserState::StatusLine,
            buffer: Vec::new(),
            head_size: 0,
            version: Version::default(),
            status: None,
            reason: None,
            headers: Headers::new(),
        }
    }

    /// Feed data to the parser
    ///
    /// Returns Ok(Some(head)) when the head is complete, Ok(None) if more
    /// data is needed, or Err on parse error.
    pub fn parse(&mut self, data: &[u8]) -> Result<Option<ResponseHead>> {
        self.buffer.extend_from_slice(data);

        while self.state != ParserState::Complete {
            let Some(crlf_pos) = find_crlf(&self.buffer) else {
                if self.head_size + self.buffer.len() > MAX_HEAD_SIZE {
                    return Err(Error::Protocol("Response head too large".to_string()));
                }
                return Ok(None);
            };

            let line = String::from_utf8_lossy(&self.buffer[..crlf_pos]).into_owned();
            self.buffer.drain(..crlf_pos + 2);
            self.head_size += crlf_pos + 2;

            match self.state {
                ParserState::StatusLine => {
                    let (version, status, reason) = parse_status_line(&line)?;
                    self.version = version;
                    self.status = Some(status);
                    self.reason = reason;
                    self.state = ParserState::Headers;
                }
                ParserState::Headers => {
                    if line.is_empty() {
                        self.state = ParserState::Complete;
                    } else {
                        let (name, value) = Headers::parse_header_line(&line)?;
                        self.headers.add(name, value);
                    }
                }
                ParserState::Complete => {}
            }
        }

        let status = self.status.ok_or(Error::Incomplete)?;
        Ok(Some(ResponseHead {
            version: self.version,
            status,
            reason: self.reason.take(),
            headers: std::mem::take(&mut self.headers),
        }))
    }

    /// Bytes received past the end of the head
    pub fn take_remaining(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.buffer)
    }

    /// Reset the parser for the next head (e.g. after a 100 Continue)
    pub fn reset(&mut self) {
        self.state = ParserState::StatusLine;
        self.head_size = 0;
        self.status = None;
        self.reason = None;
        self.headers.clear();
    }
}

impl Default for ResponseHeadParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse a complete head at the start of `data`
///
/// Returns the head and the offset where the body starts.
pub fn parse_head(data: &[u8]) -> Result<(ResponseHead, usize)> {
    let mut parser = ResponseHeadParser::new();
    match parser.parse(data)? {
        Some(head) => {
            let body_start = data.len() - parser.take_remaining().len();
            Ok((head, body_start))
        }
        None => Err(Error::Incomplete),
    }
}
