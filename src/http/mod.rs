//! HTTP/1.1 wire layer
//!
//! This module holds the header container shared by the whole crate and the
//! small HTTP/1.1 transport the native engine runs on.
//!
//! # Architecture
//!
//! The transport uses a session operations abstraction that allows
//! seamless switching between plain TCP and TLS connections:
//!
//! - `SessionOps` trait defines operations (poll, read, write, close)
//! - `HttpSession` applies the per-call timeout on top of any `SessionOps`
//! - `HttpConnection` writes one request and reads one response through it
//!
//! A connection carries exactly one exchange (`Connection: close`); the
//! response body is framed by chunked encoding, Content-Length or EOF.
//!
//! # Examples
//!
//! ```no_run
//! use hublot::http::{session, HttpConnection, WireRequest};
//! use std::time::Duration;
//!
//! let addr = "127.0.0.1:8080".parse().unwrap();
//! let ops = session::connect(&addr, Some(Duration::from_secs(5))).unwrap();
//! let mut conn = HttpConnection::new(ops, Some(Duration::from_secs(5)));
//!
//! let mut request = WireRequest::new("GET", "/");
//! request.headers.add("Host", "127.0.0.1:8080");
//! conn.send_request(&request).unwrap();
//!
//! let (head, body) = conn.receive_response("GET").unwrap();
//! assert_eq!(head.status.code(), 200);
//! println!("{} bytes", body.len());
//! ```

pub mod chunked;
pub mod client;
pub mod headers;
pub mod message;
pub mod parser;
pub mod session;
pub mod tls;

pub use client::HttpConnection;
pub use headers::Headers;
pub use message::{ResponseHead, Status, Version, WireRequest};
pub use parser::ResponseHeadParser;
pub use session::{HttpSession, SessionOps};

/// Result type for wire operations
pub type Result<T> = std::result::Result<T, Error>;

/// Wire-level errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid HTTP version: {0}")]
    InvalidVersion(String),

    #[error("Invalid HTTP status: {0}")]
    InvalidStatus(String),

    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    #[error("Invalid chunk size: {0}")]
    InvalidChunkSize(String),

    #[error("Incomplete message")]
    Incomplete,

    #[error("Timeout")]
    Timeout,

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("TLS error: {0}")]
    Tls(String),
}

/// Default HTTP port
pub const DEFAULT_HTTP_PORT: u16 = 80;

/// Default HTTPS port
pub const DEFAULT_HTTPS_PORT: u16 = 443;

/// CRLF line ending
pub const CRLF: &str = "\r\n";

/// Upper bound on a response head, to stop runaway header sections
pub const MAX_HEAD_SIZE: usize = 64 * 1024;
