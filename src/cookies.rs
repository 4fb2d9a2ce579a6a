//! In-memory cookie jar
//!
//! Parses `Set-Cookie` response headers and picks the cookies to send with
//! a request, following the RFC 6265 domain, path and `Secure` rules.
//!
//! ## Notes & limitations
//! - `Max-Age` is honoured (zero or negative deletes the cookie); `Expires`
//!   dates are not parsed, so such cookies live for the jar's lifetime.
//! - There is no public-suffix check on `Domain`.
//! - The jar is not internally synchronized; the client keeps it behind a
//!   `Mutex`.

use crate::clock::{system_clock, SharedClock};
use crate::http::Headers;
use std::fmt;
use std::time::{Duration, SystemTime};
use url::Url;

/// A single stored cookie
#[derive(Debug, Clone, PartialEq)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    /// Lower-cased, without a leading dot
    pub domain: String,
    /// Set when the cookie had no `Domain` attribute
    pub host_only: bool,
    pub path: String,
    pub secure: bool,
    pub http_only: bool,
    pub expires: Option<SystemTime>,
}

impl Cookie {
    fn is_expired(&self, now: SystemTime) -> bool {
        self.expires.is_some_and(|t| t <= now)
    }

    fn matches_domain(&self, host: &str) -> bool {
        if self.host_only {
            host == self.domain
        } else {
            host == self.domain || host.ends_with(&format!(".{}", self.domain))
        }
    }

    fn matches_path(&self, path: &str) -> bool {
        if path == self.path {
            return true;
        }
        path.starts_with(&self.path)
            && (self.path.ends_with('/') || path[self.path.len()..].starts_with('/'))
    }
}

/// The directory part of a request path, used when `Path` is absent
fn default_path(url: &Url) -> String {
    let path = url.path();
    match path.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(pos) => path[..pos].to_string(),
    }
}

/// Parse one `Set-Cookie` value received from `url` at `now`
///
/// Returns the cookie, and whether it asked to be deleted (`Max-Age<=0`).
pub fn parse_set_cookie(header: &str, url: &Url, now: SystemTime) -> Option<(Cookie, bool)> {
    let host = url.host_str()?.to_ascii_lowercase();
    let mut parts = header.split(';');

    let (name, value) = parts.next()?.split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }

    let mut cookie = Cookie {
        name: name.to_string(),
        value: value.trim().trim_matches('"').to_string(),
        domain: host.clone(),
        host_only: true,
        path: default_path(url),
        secure: false,
        http_only: false,
        expires: None,
    };
    let mut delete = false;

    for attr in parts {
        let (key, val) = match attr.split_once('=') {
            Some((k, v)) => (k.trim(), v.trim()),
            None => (attr.trim(), ""),
        };
        match key.to_ascii_lowercase().as_str() {
            "domain" if !val.is_empty() => {
                let domain = val.trim_start_matches('.').to_ascii_lowercase();
                // Reject cookies for domains the host does not belong to
                if host != domain && !host.ends_with(&format!(".{}", domain)) {
                    return None;
                }
                cookie.domain = domain;
                cookie.host_only = false;
            }
            "path" if val.starts_with('/') => cookie.path = val.to_string(),
            "secure" => cookie.secure = true,
            "httponly" => cookie.http_only = true,
            "max-age" => match val.parse::<i64>() {
                Ok(secs) if secs <= 0 => delete = true,
                Ok(secs) => cookie.expires = Some(now + Duration::from_secs(secs as u64)),
                Err(_) => {}
            },
            _ => {}
        }
    }

    Some((cookie, delete))
}

/// Cookie storage for one client
///
/// `Max-Age` expiry is measured on the jar's clock.
#[derive(Clone)]
pub struct CookieJar {
    cookies: Vec<Cookie>,
    clock: SharedClock,
}

impl Default for CookieJar {
    fn default() -> Self {
        CookieJar::with_clock(system_clock())
    }
}

impl fmt::Debug for CookieJar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CookieJar")
            .field("cookies", &self.cookies)
            .finish()
    }
}

impl CookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_clock(clock: SharedClock) -> Self {
        CookieJar {
            cookies: Vec::new(),
            clock,
        }
    }

    pub fn len(&self) -> usize {
        self.cookies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Cookie> {
        self.cookies.iter()
    }

    /// Value of the first cookie called `name`, whatever its domain
    pub fn get(&self, name: &str) -> Option<&str> {
        self.cookies
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.value.as_str())
    }

    /// Insert or replace a cookie with the same name, domain and path
    pub fn insert(&mut self, cookie: Cookie) {
        self.remove_matching(&cookie);
        self.cookies.push(cookie);
    }

    fn remove_matching(&mut self, cookie: &Cookie) {
        self.cookies.retain(|c| {
            !(c.name == cookie.name && c.domain == cookie.domain && c.path == cookie.path)
        });
    }

    /// Store every `Set-Cookie` header of a response received from `url`
    pub fn store_response_cookies(&mut self, url: &Url, headers: &Headers) {
        let now = self.clock.now();
        for header in headers.get_all("Set-Cookie") {
            match parse_set_cookie(header, url, now) {
                Some((cookie, true)) => self.remove_matching(&cookie),
                Some((cookie, false)) => self.insert(cookie),
                None => log::debug!("ignoring Set-Cookie {:?} from {}", header, url),
            }
        }
    }

    /// Name/value pairs to send to `url`, in storage order
    pub fn cookies_for(&self, url: &Url) -> Vec<(String, String)> {
        let Some(host) = url.host_str().map(|h| h.to_ascii_lowercase()) else {
            return Vec::new();
        };
        let now = self.clock.now();
        let https = url.scheme() == "https";

        self.cookies
            .iter()
            .filter(|c| !c.is_expired(now))
            .filter(|c| c.matches_domain(&host) && c.matches_path(url.path()))
            .filter(|c| https || !c.secure)
            .map(|c| (c.name.clone(), c.value.clone()))
            .collect()
    }

    /// Value for a `Cookie` request header, `None` when nothing matches
    pub fn request_header(&self, url: &Url) -> Option<String> {
        let pairs = self.cookies_for(url);
        if pairs.is_empty() {
            None
        } else {
            Some(format_cookie_header(&pairs))
        }
    }

    pub fn clear(&mut self) {
        self.cookies.clear();
    }
}

/// `a=1; b=2`
pub fn format_cookie_header(pairs: &[(String, String)]) -> String {
    pairs
        .iter()
        .map(|(n, v)| format!("{}={}", n, v))
        .collect::<Vec<_>>()
        .join("; ")
}
