//! Client configuration
//!
//! A [`Config`] is shared by every fetch a client makes. Per-call changes
//! go through [`FetchOptions`] and [`Config::derive`], which always returns
//! a new value and leaves the shared one alone.
//!
//! Header precedence, strongest first: headers on the [`crate::Request`],
//! a per-call `user_agent`, client-level `headers`, then the client-level
//! `user_agent` and the built-in `Accept: */*`.

use crate::cache::CacheKey;
use crate::http::headers::title_case;
use crate::http::Headers;
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

pub const DEFAULT_USER_AGENT: &str = concat!("hublot/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub allow_redirects: bool,
    pub cookies_enabled: bool,
    pub courtesy_sleep: Duration,
    pub force_cache_stale: bool,
    /// Title-cased names left out of cache keys
    pub headers_ignored_by_cache: BTreeSet<String>,
    pub max_cache_age: Option<Duration>,
    pub max_redirects: usize,
    /// Proxy URL per scheme (`http`, `https`)
    pub proxies: BTreeMap<String, String>,
    pub raise_for_status: bool,
    pub timeout: Option<Duration>,
    pub user_agent: Option<String>,
    pub verify: bool,
    pub headers: Headers,
    /// Store 4xx/5xx responses in the cache too
    pub cache_http_errors: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            allow_redirects: true,
            cookies_enabled: true,
            courtesy_sleep: Duration::from_secs(5),
            force_cache_stale: false,
            headers_ignored_by_cache: BTreeSet::from(["User-Agent".to_string()]),
            max_cache_age: None,
            max_redirects: 10,
            proxies: BTreeMap::new(),
            raise_for_status: true,
            timeout: Some(Duration::from_secs(60)),
            user_agent: Some(DEFAULT_USER_AGENT.to_string()),
            verify: true,
            headers: Headers::new(),
            cache_http_errors: true,
        }
    }
}

impl Config {
    /// A copy of this config with `options` applied
    pub fn derive(&self, options: &FetchOptions) -> Config {
        let mut config = self.clone();

        if let Some(v) = options.allow_redirects {
            config.allow_redirects = v;
        }
        if let Some(v) = options.cookies_enabled {
            config.cookies_enabled = v;
        }
        if let Some(v) = options.courtesy_sleep {
            config.courtesy_sleep = v;
        }
        if let Some(v) = options.force_cache_stale {
            config.force_cache_stale = v;
        }
        if let Some(v) = &options.headers_ignored_by_cache {
            config.headers_ignored_by_cache = v.iter().map(|h| title_case(h)).collect();
        }
        if let Some(v) = options.max_cache_age {
            config.max_cache_age = Some(v);
        }
        if let Some(v) = options.max_redirects {
            config.max_redirects = v;
        }
        if let Some(v) = &options.proxies {
            config.proxies = v.clone();
        }
        if let Some(v) = options.raise_for_status {
            config.raise_for_status = v;
        }
        if let Some(v) = options.timeout {
            config.timeout = v;
        }
        if let Some(v) = &options.user_agent {
            config.user_agent = Some(v.clone());
            config.headers.remove("User-Agent");
        }
        if let Some(v) = options.verify {
            config.verify = v;
        }
        if let Some(v) = options.cache_http_errors {
            config.cache_http_errors = v;
        }
        for name in options.headers.keys() {
            config.headers.remove(name);
        }
        config.headers.add_all(options.headers.iter());

        config
    }
}

/// Per-call overrides for one fetch
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    pub allow_redirects: Option<bool>,
    pub cookies_enabled: Option<bool>,
    pub courtesy_sleep: Option<Duration>,
    pub force_cache_stale: Option<bool>,
    pub headers_ignored_by_cache: Option<Vec<String>>,
    pub max_cache_age: Option<Duration>,
    pub max_redirects: Option<usize>,
    pub proxies: Option<BTreeMap<String, String>>,
    pub raise_for_status: Option<bool>,
    /// `Some(None)` disables the timeout
    pub timeout: Option<Option<Duration>>,
    pub user_agent: Option<String>,
    pub verify: Option<bool>,
    pub cache_http_errors: Option<bool>,
    /// Merged over the client-level headers, replacing same-named ones
    pub headers: Headers,
    /// Pin the cache identity instead of fingerprinting the request
    pub cache_key: Option<CacheKey>,
}

impl FetchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allow_redirects(mut self, v: bool) -> Self {
        self.allow_redirects = Some(v);
        self
    }

    pub fn cookies_enabled(mut self, v: bool) -> Self {
        self.cookies_enabled = Some(v);
        self
    }

    pub fn courtesy_sleep(mut self, v: Duration) -> Self {
        self.courtesy_sleep = Some(v);
        self
    }

    pub fn force_cache_stale(mut self, v: bool) -> Self {
        self.force_cache_stale = Some(v);
        self
    }

    pub fn headers_ignored_by_cache<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.headers_ignored_by_cache = Some(names.into_iter().map(Into::into).collect());
        self
    }

    pub fn max_cache_age(mut self, v: Duration) -> Self {
        self.max_cache_age = Some(v);
        self
    }

    pub fn max_redirects(mut self, v: usize) -> Self {
        self.max_redirects = Some(v);
        self
    }

    pub fn proxy(mut self, scheme: impl Into<String>, url: impl Into<String>) -> Self {
        self.proxies
            .get_or_insert_with(BTreeMap::new)
            .insert(scheme.into(), url.into());
        self
    }

    pub fn raise_for_status(mut self, v: bool) -> Self {
        self.raise_for_status = Some(v);
        self
    }

    pub fn timeout(mut self, v: Option<Duration>) -> Self {
        self.timeout = Some(v);
        self
    }

    pub fn user_agent(mut self, v: impl Into<String>) -> Self {
        self.user_agent = Some(v.into());
        self
    }

    pub fn verify(mut self, v: bool) -> Self {
        self.verify = Some(v);
        self
    }

    pub fn cache_http_errors(mut self, v: bool) -> Self {
        self.cache_http_errors = Some(v);
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.add(name, value);
        self
    }

    pub fn cache_key(mut self, key: impl Into<CacheKey>) -> Self {
        self.cache_key = Some(key.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert!(config.allow_redirects);
        assert_eq!(config.courtesy_sleep, Duration::from_secs(5));
        assert_eq!(config.max_redirects, 10);
        assert!(config.headers_ignored_by_cache.contains("User-Agent"));
        assert!(config.user_agent.as_deref().unwrap().starts_with("hublot/"));
        assert!(config.cache_http_errors);
    }

    #[test]
    fn test_derive_leaves_base_untouched() {
        let mut base = Config::default();
        base.headers.add("X-Client", "base");
        let base_copy = base.clone();

        let derived = base.derive(
            &FetchOptions::new()
                .allow_redirects(false)
                .timeout(None)
                .header("x-client", "call")
                .header("X-Extra", "1"),
        );

        assert_eq!(base, base_copy);
        assert!(!derived.allow_redirects);
        assert_eq!(derived.timeout, None);
        assert_eq!(derived.headers.get_all("X-Client"), vec!["call"]);
        assert_eq!(derived.headers.get("X-Extra").as_deref(), Some("1"));
    }

    #[test]
    fn test_per_call_user_agent_beats_client_header() {
        let mut base = Config::default();
        base.headers.add("User-Agent", "client-level");

        let derived = base.derive(&FetchOptions::new().user_agent("per-call"));
        assert!(!derived.headers.contains("User-Agent"));
        assert_eq!(derived.user_agent.as_deref(), Some("per-call"));
    }

    #[test]
    fn test_ignored_headers_are_title_cased() {
        let derived = Config::default()
            .derive(&FetchOptions::new().headers_ignored_by_cache(["x-request-id"]));
        assert!(derived.headers_ignored_by_cache.contains("X-Request-Id"));
        assert!(!derived.headers_ignored_by_cache.contains("User-Agent"));
    }
}
