//! HTTP message types
//!
//! This module defines what goes over the wire: the request the native
//! engine writes and the response head it reads back.

use super::{Error, Headers, Result, CRLF};
use bytes::Bytes;
use std::fmt;

/// HTTP version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Version {
    Http10,
    #[default]
    Http11,
    Http2,
    Http3,
}

impl Version {
    /// Parse version from string
    ///
    /// Accepts the short forms curl prints (`HTTP/2`) as well as `HTTP/2.0`.
    pub fn from_str(s: &str) -> Result<Self> {
        match s {
            "HTTP/1.0" => Ok(Version::Http10),
            "HTTP/1.1" => Ok(Version::Http11),
            "HTTP/2" | "HTTP/2.0" => Ok(Version::Http2),
            "HTTP/3" | "HTTP/3.0" => Ok(Version::Http3),
            _ => Err(Error::InvalidVersion(s.to_string())),
        }
    }

    /// Convert version to string
    pub fn as_str(&self) -> &'static str {
        match self {
            Version::Http10 => "HTTP/1.0",
            Version::Http11 => "HTTP/1.1",
            Version::Http2 => "HTTP/2",
            Version::Http3 => "HTTP/3",
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// HTTP status code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Status {
    code: u16,
}

impl Status {
    /// Create a new status code
    pub fn new(code: u16) -> Result<Self> {
        if (100..1000).contains(&code) {
            Ok(Status { code })
        } else {
            Err(Error::InvalidStatus(format!("Invalid status code: {}", code)))
        }
    }

    /// Get the status code
    pub fn code(&self) -> u16 {
        self.code
    }

    /// Check if this is an informational status (1xx)
    pub fn is_informational(&self) -> bool {
        (100..200).contains(&self.code)
    }

    /// Check if this is a success status (2xx)
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.code)
    }

    /// Statuses that never carry a body, whatever the headers say
    pub fn forbids_body(&self) -> bool {
        self.is_informational() || self.code == 204 || self.code == 304
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code)
    }
}

/// A request as written to the socket
#[derive(Debug, Clone)]
pub struct WireRequest {
    pub method: String,
    /// Origin-form path, absolute-form URL (plain proxy) or authority (CONNECT)
    pub target: String,
    pub headers: Headers,
    pub body: Option<Bytes>,
}

impl WireRequest {
    pub fn new(method: impl Into<String>, target: impl Into<String>) -> Self {
        WireRequest {
            method: method.into(),
            target: target.into(),
            headers: Headers::new(),
            body: None,
        }
    }

    /// Convert the request to wire format
    pub fn to_wire(&self) -> Vec<u8> {
        let body_len = self.body.as_ref().map_or(0, |b| b.len());
        let mut buf = Vec::with_capacity(256 + body_len);

        // Request line
        buf.extend_from_slice(self.method.as_bytes());
        buf.push(b' ');
        buf.extend_from_slice(self.target.as_bytes());
        buf.push(b' ');
        buf.extend_from_slice(Version::Http11.as_str().as_bytes());
        buf.extend_from_slice(CRLF.as_bytes());

        for (name, value) in self.headers.iter() {
            buf.extend_from_slice(name.as_bytes());
            buf.extend_from_slice(b": ");
            buf.extend_from_slice(value.as_bytes());
            buf.extend_from_slice(CRLF.as_bytes());
        }

        buf.extend_from_slice(CRLF.as_bytes());

        if let Some(body) = &self.body {
            buf.extend_from_slice(body);
        }

        buf
    }
}

/// Status line and headers of a response
#[derive(Debug, Clone)]
pub struct ResponseHead {
    pub version: Version,
    pub status: Status,
    pub reason: Option<String>,
    pub headers: Headers,
}

impl ResponseHead {
    /// Whether a body follows this head for a request with `method`
    pub fn has_body(&self, method: &str) -> bool {
        !(method.eq_ignore_ascii_case("HEAD") || self.status.forbids_body())
    }

    /// Whether the body uses chunked transfer encoding
    pub fn is_chunked(&self) -> bool {
        self.headers
            .get_all("Transfer-Encoding")
            .iter()
            .any(|v| v.to_ascii_lowercase().contains("chunked"))
    }

    /// Declared Content-Length, if any
    pub fn content_length(&self) -> Result<Option<usize>> {
        match self.headers.get_first("Content-Length") {
            Some(value) => value
                .trim()
                .parse::<usize>()
                .map(Some)
                .map_err(|_| Error::Parse(format!("Invalid Content-Length: {}", value))),
            None => Ok(None),
        }
    }
}
