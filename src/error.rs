//! Error types
//!
//! Every fallible operation in the crate returns [`Result`]. The variants
//! follow the failure classes callers need to tell apart: transport failures
//! (which rotate engines), HTTP status failures (which carry the response),
//! cache consistency failures (which are never retried) and a generic
//! scraper error that application code raises from its own parsing.

use crate::response::Response;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;

/// Result type for hublot operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the client, the cache and the engines
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("{0}")]
    Http(Box<HttpError>),

    #[error("Exceeded {0} redirects")]
    TooManyRedirects(usize),

    #[error("Content-Length is {declared} but body is {actual} bytes")]
    CacheConsistency { declared: String, actual: usize },

    #[error("Engine error: {0}")]
    Engine(String),

    #[error("Unable to detect response charset")]
    CharsetDetection,

    #[error("Key not found: {0}")]
    Lookup(String),

    #[error("{0}")]
    Scraper(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

impl Error {
    /// Shorthand for an application-level scraper error
    pub fn scraper(msg: impl Into<String>) -> Self {
        Error::Scraper(msg.into())
    }

    /// True for transport-level failures (DNS, refused, TLS, timeout)
    pub fn is_connection(&self) -> bool {
        matches!(self, Error::Connection(_))
    }

    /// The response carried by an HTTP status error
    pub fn response(&self) -> Option<&Response> {
        match self {
            Error::Http(err) => Some(&err.response),
            _ => None,
        }
    }
}

impl From<crate::http::Error> for Error {
    fn from(err: crate::http::Error) -> Self {
        use crate::http::Error as Wire;
        match err {
            Wire::Io(e) => Error::Connection(e.to_string()),
            Wire::Timeout => Error::Connection("timed out".to_string()),
            Wire::ConnectionClosed => {
                Error::Connection("connection closed before response completed".to_string())
            }
            Wire::Tls(msg) => Error::Connection(format!("TLS: {}", msg)),
            other => Error::Engine(other.to_string()),
        }
    }
}

/// Non-2xx response raised by [`Response::raise_for_status`]
#[derive(Debug)]
pub struct HttpError {
    pub response: Response,
}

impl HttpError {
    pub fn status_code(&self) -> u16 {
        self.response.status_code
    }
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = self.response.status_code;
        let kind = if code < 500 { "Client" } else { "Server" };
        write!(
            f,
            "{} {} Error: {} for url: {}",
            code,
            kind,
            self.response.reason.as_deref().unwrap_or(""),
            self.response.url()
        )
    }
}

/// Classifies errors the retry decorator catches by default
pub trait ScraperError {
    fn is_scraper_error(&self) -> bool;
}

impl ScraperError for Error {
    fn is_scraper_error(&self) -> bool {
        !matches!(
            self,
            Error::CacheConsistency { .. } | Error::InvalidRequest(_)
        )
    }
}

/// Index into a map, failing with a retryable [`Error::Lookup`]
pub fn lookup<'a, K, V>(map: &'a HashMap<K, V>, key: &K) -> Result<&'a V>
where
    K: Eq + Hash + fmt::Debug,
{
    map.get(key).ok_or_else(|| Error::Lookup(format!("{:?}", key)))
}
