//! HTTP responses
//!
//! A [`Response`] is what an engine returns and what the cache stores. The
//! convenience views (`text`, `json`, `ok`, `is_redirect`, `cookies`) are
//! computed on demand from the stored status, headers and content.

use crate::cookies::CookieJar;
use crate::error::{Error, HttpError, Result};
use crate::http::Headers;
use crate::request::CompiledRequest;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use std::sync::Arc;

const REDIRECT_STATUSES: [u16; 5] = [301, 302, 303, 307, 308];

#[derive(Debug, Clone)]
pub struct Response {
    pub request: Arc<CompiledRequest>,
    pub from_cache: bool,
    /// Earlier redirect hops, oldest first
    pub history: Vec<Response>,
    pub status_code: u16,
    pub reason: Option<String>,
    pub headers: Headers,
    pub content: Bytes,
}

impl Response {
    pub fn new(
        request: Arc<CompiledRequest>,
        status_code: u16,
        reason: Option<String>,
        headers: Headers,
        content: impl Into<Bytes>,
    ) -> Self {
        Response {
            request,
            from_cache: false,
            history: Vec::new(),
            status_code,
            reason,
            headers,
            content: content.into(),
        }
    }

    /// URL of the request that produced this response
    pub fn url(&self) -> &str {
        &self.request.url
    }

    /// Status below 400
    pub fn ok(&self) -> bool {
        self.status_code < 400
    }

    pub fn is_redirect(&self) -> bool {
        self.headers.contains("Location") && REDIRECT_STATUSES.contains(&self.status_code)
    }

    /// Charset declared in Content-Type, if any
    pub fn encoding(&self) -> Option<String> {
        let content_type = self.headers.get_first("Content-Type")?;
        content_type.split(';').skip(1).find_map(|param| {
            let (key, value) = param.split_once('=')?;
            if key.trim().eq_ignore_ascii_case("charset") {
                Some(value.trim().trim_matches(|c| c == '"' || c == '\'').to_string())
            } else {
                None
            }
        })
    }

    /// Content decoded as text
    ///
    /// Uses the declared charset when there is one; otherwise the content
    /// must be valid UTF-8.
    pub fn text(&self) -> Result<String> {
        if let Some(label) = self.encoding() {
            if let Some(encoding) = encoding_rs::Encoding::for_label(label.as_bytes()) {
                let (text, _, _) = encoding.decode(&self.content);
                return Ok(text.into_owned());
            }
        }
        match std::str::from_utf8(&self.content) {
            Ok(text) => Ok(text.strip_prefix('\u{feff}').unwrap_or(text).to_string()),
            Err(_) => Err(Error::CharsetDetection),
        }
    }

    /// Content parsed as JSON
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_str(&self.text()?)?)
    }

    /// Fail with [`Error::Http`] for 4xx and 5xx statuses
    pub fn raise_for_status(&self) -> Result<()> {
        if (400..600).contains(&self.status_code) {
            return Err(Error::Http(Box::new(HttpError {
                response: self.clone(),
            })));
        }
        Ok(())
    }

    /// Cookies set by this response alone
    pub fn cookies(&self) -> CookieJar {
        let mut jar = CookieJar::new();
        if let Ok(url) = url::Url::parse(self.url()) {
            jar.store_response_cookies(&url, &self.headers);
        }
        jar
    }
}

/// Equal status, reason, headers and content; provenance is ignored
impl PartialEq for Response {
    fn eq(&self, other: &Self) -> bool {
        self.status_code == other.status_code
            && self.reason == other.reason
            && self.headers == other.headers
            && self.content == other.content
    }
}
