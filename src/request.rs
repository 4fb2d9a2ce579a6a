//! Request types
//!
//! [`Request`] is what callers describe; [`CompiledRequest`] is the fully
//! resolved form produced by [`crate::compile`], identical for every engine
//! that handles the same attempt.

use crate::http::Headers;
use bytes::Bytes;
use std::path::PathBuf;

/// Request body as chosen by the caller
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    /// Raw bytes, sent as-is
    Bytes(Bytes),
    /// Text, sent as UTF-8
    Text(String),
    /// Form fields, sent `application/x-www-form-urlencoded`
    Form(Vec<(String, String)>),
    /// Contents of a file, read when the request is compiled
    File(PathBuf),
}

impl From<&str> for Body {
    fn from(s: &str) -> Self {
        Body::Text(s.to_string())
    }
}

impl From<String> for Body {
    fn from(s: String) -> Self {
        Body::Text(s)
    }
}

impl From<Vec<u8>> for Body {
    fn from(b: Vec<u8>) -> Self {
        Body::Bytes(Bytes::from(b))
    }
}

impl From<&[u8]> for Body {
    fn from(b: &[u8]) -> Self {
        Body::Bytes(Bytes::copy_from_slice(b))
    }
}

impl From<Bytes> for Body {
    fn from(b: Bytes) -> Self {
        Body::Bytes(b)
    }
}

impl<K: Into<String>, V: Into<String>> From<Vec<(K, V)>> for Body {
    fn from(fields: Vec<(K, V)>) -> Self {
        Body::Form(fields.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// A user-level HTTP request
///
/// Setters consume and return the request so calls chain; clone first to
/// keep the original.
///
/// ```
/// use hublot::Request;
///
/// let req = Request::new("http://example.com/search")
///     .param("q", "rust")
///     .header("X-Trace", "1");
/// let post = req.clone().method("POST").data(vec![("a", "b")]);
/// assert!(req.data.is_none());
/// assert!(post.data.is_some());
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Request {
    pub url: String,
    pub method: Option<String>,
    pub headers: Headers,
    pub params: Vec<(String, String)>,
    pub data: Option<Body>,
    pub json: Option<serde_json::Value>,
    pub auth: Option<(String, String)>,
    pub cookies: Vec<(String, String)>,
}

impl Request {
    pub fn new(url: impl Into<String>) -> Self {
        Request {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.add(name, value);
        self
    }

    pub fn headers(mut self, headers: Headers) -> Self {
        self.headers = headers;
        self
    }

    pub fn param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((name.into(), value.into()));
        self
    }

    pub fn data(mut self, data: impl Into<Body>) -> Self {
        self.data = Some(data.into());
        self
    }

    pub fn json(mut self, json: serde_json::Value) -> Self {
        self.json = Some(json);
        self
    }

    pub fn basic_auth(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.auth = Some((user.into(), password.into()));
        self
    }

    pub fn cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.cookies.push((name.into(), value.into()));
        self
    }

    /// The request to issue after a redirect to `location`
    ///
    /// 307 and 308 keep the method and body; every other status becomes a
    /// bodiless GET. Params are dropped since `location` is a full URL.
    /// Credentials and explicit cookies only follow a redirect to the same
    /// host.
    pub fn redirected(&self, location: String, status_code: u16) -> Request {
        let mut next = self.clone();
        if host_of(&self.url) != host_of(&location) {
            next.auth = None;
            next.cookies.clear();
            next.headers.remove("Authorization");
            next.headers.remove("Cookie");
        }
        next.url = location;
        next.params.clear();
        if status_code != 307 && status_code != 308 {
            next.method = Some("GET".to_string());
            next.data = None;
            next.json = None;
            next.headers.remove("Content-Type");
            next.headers.remove("Content-Length");
        }
        next
    }
}

fn host_of(url: &str) -> Option<String> {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_ascii_lowercase()))
}

/// First argument to `fetch`: a bare URL or a full request
#[derive(Debug, Clone, PartialEq)]
pub enum Requestable {
    Url(String),
    Request(Request),
}

impl Requestable {
    pub fn into_request(self) -> Request {
        match self {
            Requestable::Url(url) => Request::new(url),
            Requestable::Request(req) => req,
        }
    }
}

impl From<&str> for Requestable {
    fn from(url: &str) -> Self {
        Requestable::Url(url.to_string())
    }
}

impl From<String> for Requestable {
    fn from(url: String) -> Self {
        Requestable::Url(url)
    }
}

impl From<&String> for Requestable {
    fn from(url: &String) -> Self {
        Requestable::Url(url.clone())
    }
}

impl From<Request> for Requestable {
    fn from(req: Request) -> Self {
        Requestable::Request(req)
    }
}

impl From<&Request> for Requestable {
    fn from(req: &Request) -> Self {
        Requestable::Request(req.clone())
    }
}

/// A request ready for transmission
///
/// Never mutated once compiled; engines and the cache only read it.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledRequest {
    pub url: String,
    pub method: String,
    pub headers: Headers,
    pub data: Option<Bytes>,
    /// Zero on the first attempt, then one more per retry
    pub num_retries: u32,
    /// Identifies the retry scope this attempt belongs to
    pub attempt_token: u64,
}

impl CompiledRequest {
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        CompiledRequest {
            url: url.into(),
            method: method.into(),
            headers: Headers::new(),
            data: None,
            num_retries: 0,
            attempt_token: 0,
        }
    }

    /// Hostname of the target URL, lower-cased
    pub fn hostname(&self) -> Option<String> {
        url::Url::parse(&self.url)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.to_ascii_lowercase()))
    }

    pub fn body_len(&self) -> usize {
        self.data.as_ref().map_or(0, |d| d.len())
    }
}
