//! HTTP client
//!
//! [`HttpClient::fetch`] drives one logical request through its redirect
//! hops. Each hop is compiled, looked up in the cache, sent through the
//! engine pool if the cache had nothing (spaced by the courtesy sleep),
//! stored, and logged.
//!
//! # Architecture
//!
//! ```text
//! fetch ─> compile ─> cache.get ──hit──────────────────┐
//!                        │miss                          │
//!                        └─> courtesy ─> engine pool ─> cache.put
//!                                                       │
//!             cookie jar <─ Set-Cookie <────────────────┘
//!                                                       │
//!             redirect? ── yes: next hop, next cache key ┘
//!                       └─ no: raise_for_status, return
//! ```
//!
//! When the fetch runs inside a [`crate::retry::RetryPolicy`] retry, the
//! first hop skips the cache and every hop skips the courtesy sleep.
//!
//! # Examples
//!
//! ```no_run
//! use hublot::{FetchOptions, HttpClient};
//! use std::time::Duration;
//!
//! let client = HttpClient::builder()
//!     .cache("/tmp/hublot-cache")
//!     .courtesy_sleep(Duration::from_secs(2))
//!     .build()?;
//!
//! let res = client.fetch("http://example.com/")?;
//! println!("{}", res.text()?);
//!
//! let pinned = client.fetch_with(
//!     "http://example.com/random",
//!     &FetchOptions::new().cache_key("random/first"),
//! )?;
//! assert!(pinned.ok());
//! # Ok::<(), hublot::Error>(())
//! ```

use crate::cache::{Cache, CacheKey, CacheSpec};
use crate::clock::{system_clock, SharedClock};
use crate::compile::compile_request;
use crate::config::{Config, FetchOptions};
use crate::cookies::CookieJar;
use crate::courtesy::CourtesySleep;
use crate::engines::{Engine, EnginePool, EngineRegistry, EngineSpec};
use crate::error::{Error, Result};
use crate::logs::LogEntry;
use crate::request::{Body, CompiledRequest, Request, Requestable};
use crate::response::Response;
use crate::retry::{self, AttemptId};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use url::Url;

pub struct HttpClient {
    config: Config,
    cache: Option<Cache>,
    engines: EnginePool,
    courtesy: CourtesySleep,
    cookies: Mutex<CookieJar>,
}

impl HttpClient {
    pub fn builder() -> HttpClientBuilder {
        HttpClientBuilder::default()
    }

    /// A client with the default config, no cache and the native engine
    pub fn new() -> Result<Self> {
        Self::builder().build()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn cache(&self) -> Option<&Cache> {
        self.cache.as_ref()
    }

    pub fn engines(&self) -> &EnginePool {
        &self.engines
    }

    /// Snapshot of the cookies collected so far
    pub fn cookies(&self) -> CookieJar {
        self.jar().clone()
    }

    fn jar(&self) -> MutexGuard<'_, CookieJar> {
        self.cookies.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn fetch(&self, target: impl Into<Requestable>) -> Result<Response> {
        self.fetch_with(target, &FetchOptions::default())
    }

    /// Fetch with per-call overrides
    pub fn fetch_with(
        &self,
        target: impl Into<Requestable>,
        options: &FetchOptions,
    ) -> Result<Response> {
        let config = self.config.derive(options);
        let attempt = retry::current_attempt();
        let mut request = target.into().into_request();
        let mut cache_key = options.cache_key.clone();
        let mut history: Vec<Response> = Vec::new();

        loop {
            let res = self.fetch_hop(&request, &config, attempt, history.len(), cache_key.as_ref())?;

            if !(config.allow_redirects && res.is_redirect()) {
                let mut res = res;
                res.history = history;
                if config.raise_for_status {
                    res.raise_for_status()?;
                }
                return Ok(res);
            }

            if history.len() >= config.max_redirects {
                return Err(Error::TooManyRedirects(config.max_redirects));
            }
            let location = res.headers.get_first("Location").unwrap_or_default();
            let next = Url::parse(res.url())?.join(location)?;
            request = request.redirected(next.into(), res.status_code);
            cache_key = cache_key.map(|key| key.next_in_sequence());
            history.push(res);
        }
    }

    fn fetch_hop(
        &self,
        request: &Request,
        config: &Config,
        attempt: AttemptId,
        hop: usize,
        key: Option<&CacheKey>,
    ) -> Result<Response> {
        let creq = {
            let jar = self.jar();
            Arc::new(compile_request(request, config, Some(&jar), attempt)?)
        };
        let mut log = LogEntry::new(Arc::clone(&creq), hop > 0);
        let retrying = attempt.attempt > 0;
        let force_stale = config.force_cache_stale || (retrying && hop == 0);

        let cached = match &self.cache {
            Some(cache) if !force_stale => cache.get(&creq, &mut log, config, key),
            _ => None,
        };

        let res = match cached {
            Some(res) => res,
            None => {
                let skip_courtesy = retrying || hop > 0;
                let res = self.live_request(&creq, &mut log, config, skip_courtesy)?;
                if let Some(cache) = &self.cache {
                    if config.cache_http_errors || res.ok() {
                        store(cache, &creq, &mut log, &res, config, key)?;
                    }
                }
                res
            }
        };

        if config.cookies_enabled {
            let url = Url::parse(&creq.url)?;
            self.jar().store_response_cookies(&url, &res.headers);
        }

        log.emit();
        Ok(res)
    }

    fn live_request(
        &self,
        creq: &Arc<CompiledRequest>,
        log: &mut LogEntry,
        config: &Config,
        skip_courtesy: bool,
    ) -> Result<Response> {
        let engine = self.engines.select(creq);
        log.engine_short_code = Some(engine.short_code());
        let sleep = if skip_courtesy {
            Duration::ZERO
        } else {
            config.courtesy_sleep
        };
        self.courtesy.run(creq, log, Some(sleep), || {
            engine.request(Arc::clone(creq), config)
        })
    }

    pub fn get(&self, url: &str) -> Result<Response> {
        self.fetch(Request::new(url).method("GET"))
    }

    pub fn post(&self, url: &str, data: impl Into<Body>) -> Result<Response> {
        self.fetch(Request::new(url).method("POST").data(data))
    }

    pub fn request(&self, method: &str, url: &str) -> Result<Response> {
        self.fetch(Request::new(url).method(method))
    }
}

/// Write to the cache; a failed disk write only costs the cache entry
fn store(
    cache: &Cache,
    creq: &CompiledRequest,
    log: &mut LogEntry,
    res: &Response,
    config: &Config,
    key: Option<&CacheKey>,
) -> Result<()> {
    match cache.put(creq, log, res, config, key) {
        Err(Error::Io(err)) => {
            log::error!("cannot write cache entry for {}: {}", creq.url, err);
            Ok(())
        }
        other => other,
    }
}

/// Client-level settings
pub struct HttpClientBuilder {
    config: Config,
    cache: Option<CacheSpec>,
    max_cache_age: Option<Duration>,
    engines: Vec<EngineSpec>,
    registry: Option<EngineRegistry>,
    clock: SharedClock,
}

impl Default for HttpClientBuilder {
    fn default() -> Self {
        HttpClientBuilder {
            config: Config::default(),
            cache: None,
            max_cache_age: None,
            engines: Vec::new(),
            registry: None,
            clock: system_clock(),
        }
    }
}

impl HttpClientBuilder {
    /// Replace the whole base config
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Cache directory, `file://` URL or ready-made [`Cache`]
    pub fn cache(mut self, spec: impl Into<CacheSpec>) -> Self {
        self.cache = Some(spec.into());
        self
    }

    /// Oldest entry the cache will ever serve; older ones get pruned
    pub fn max_cache_age(mut self, max_age: Duration) -> Self {
        self.max_cache_age = Some(max_age);
        self
    }

    pub fn courtesy_sleep(mut self, sleep: Duration) -> Self {
        self.config.courtesy_sleep = sleep;
        self
    }

    /// Append an engine to the pool, by registry id or as an instance
    pub fn engine(mut self, engine: impl Into<EngineSpec>) -> Self {
        self.engines.push(engine.into());
        self
    }

    pub fn registry(mut self, registry: EngineRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.headers.add(name, value);
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = Some(user_agent.into());
        self
    }

    pub fn cookies_enabled(mut self, enabled: bool) -> Self {
        self.config.cookies_enabled = enabled;
        self
    }

    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.timeout = timeout;
        self
    }

    pub fn proxy(mut self, scheme: impl Into<String>, url: impl Into<String>) -> Self {
        self.config.proxies.insert(scheme.into(), url.into());
        self
    }

    pub fn build(self) -> Result<HttpClient> {
        let registry = self.registry.unwrap_or_else(EngineRegistry::with_defaults);
        let specs = if self.engines.is_empty() {
            vec![EngineSpec::from(crate::engines::native::ENGINE_ID)]
        } else {
            self.engines
        };
        let engines = registry.build(&specs)?;
        let cache = Cache::load(self.cache, self.max_cache_age, Arc::clone(&self.clock))?;
        let cookies = CookieJar::with_clock(Arc::clone(&self.clock));
        let courtesy = CourtesySleep::new(self.config.courtesy_sleep, self.clock);

        Ok(HttpClient {
            config: self.config,
            cache,
            engines,
            courtesy,
            cookies: Mutex::new(cookies),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::Clock;
    use crate::http::Headers;
    use std::collections::VecDeque;
    use std::time::SystemTime;

    /// Replays canned responses and records what it was asked
    struct Script {
        replies: Mutex<VecDeque<(u16, Vec<(&'static str, &'static str)>, &'static str)>>,
        seen: Mutex<Vec<CompiledRequest>>,
    }

    impl Script {
        fn new(replies: Vec<(u16, Vec<(&'static str, &'static str)>, &'static str)>) -> Arc<Self> {
            Arc::new(Script {
                replies: Mutex::new(replies.into()),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn seen(&self) -> Vec<CompiledRequest> {
            self.seen.lock().unwrap().clone()
        }
    }

    impl Engine for Script {
        fn id(&self) -> &str {
            "script"
        }

        fn short_code(&self) -> String {
            "sc".to_string()
        }

        fn request(&self, creq: Arc<CompiledRequest>, _config: &Config) -> Result<Response> {
            self.seen.lock().unwrap().push((*creq).clone());
            let (status, headers, body) = self
                .replies
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| Error::Connection("script exhausted".into()))?;
            let headers: Headers = headers.into_iter().collect();
            Ok(Response::new(creq, status, None, headers, body.as_bytes()))
        }
    }

    struct NoSleep;

    impl Clock for NoSleep {
        fn now(&self) -> SystemTime {
            SystemTime::now()
        }

        fn sleep(&self, _duration: Duration) {}
    }

    fn client(script: &Arc<Script>) -> HttpClient {
        HttpClient::builder()
            .engine(Arc::clone(script))
            .clock(Arc::new(NoSleep))
            .build()
            .unwrap()
    }

    #[test]
    fn test_follows_redirects_with_get_downgrade() {
        let script = Script::new(vec![
            (303, vec![("Location", "/next")], ""),
            (200, vec![], "done"),
        ]);
        let client = client(&script);

        let res = client
            .fetch(Request::new("http://a.example/start").data(vec![("k", "v")]))
            .unwrap();
        assert_eq!(&res.content[..], b"done");
        assert_eq!(res.url(), "http://a.example/next");
        assert_eq!(res.history.len(), 1);
        assert_eq!(res.history[0].status_code, 303);

        let seen = script.seen();
        assert_eq!(seen[0].method, "POST");
        assert_eq!(seen[1].method, "GET");
        assert_eq!(seen[1].data, None);
        assert!(!seen[1].headers.contains("Content-Type"));
    }

    #[test]
    fn test_307_keeps_method_and_body() {
        let script = Script::new(vec![
            (307, vec![("Location", "http://b.example/again")], ""),
            (200, vec![], "ok"),
        ]);
        let client = client(&script);
        client.post("http://a.example/", "payload").unwrap();

        let seen = script.seen();
        assert_eq!(seen[1].url, "http://b.example/again");
        assert_eq!(seen[1].method, "POST");
        assert_eq!(seen[1].data.as_deref(), Some(&b"payload"[..]));
    }

    #[test]
    fn test_cross_host_redirect_sheds_credentials() {
        let script = Script::new(vec![
            (302, vec![("Location", "/same-host")], ""),
            (302, vec![("Location", "http://evil.example/")], ""),
            (200, vec![], "landed"),
        ]);
        let client = client(&script);
        client
            .fetch(
                Request::new("http://good.example/")
                    .basic_auth("u", "p")
                    .cookie("tok", "secret"),
            )
            .unwrap();

        let seen = script.seen();
        assert_eq!(seen.len(), 3);
        assert_eq!(seen[1].headers.get("Authorization").as_deref(), Some("Basic dTpw"));
        assert_eq!(seen[1].headers.get("Cookie").as_deref(), Some("tok=secret"));
        assert_eq!(seen[2].url, "http://evil.example/");
        assert_eq!(seen[2].headers.get("Authorization"), None);
        assert_eq!(seen[2].headers.get("Cookie"), None);
    }

    #[test]
    fn test_too_many_redirects() {
        let script = Script::new(vec![(302, vec![("Location", "/loop")], ""); 5]);
        let client = client(&script);
        let err = client
            .fetch_with("http://a.example/loop", &FetchOptions::new().max_redirects(3))
            .unwrap_err();
        assert!(matches!(err, Error::TooManyRedirects(3)));
        assert_eq!(script.seen().len(), 4);
    }

    #[test]
    fn test_redirects_can_be_disabled() {
        let script = Script::new(vec![(301, vec![("Location", "/moved")], "")]);
        let client = client(&script);
        let res = client
            .fetch_with("http://a.example/", &FetchOptions::new().allow_redirects(false))
            .unwrap();
        assert_eq!(res.status_code, 301);
        assert!(res.history.is_empty());
    }

    #[test]
    fn test_raise_for_status() {
        let script = Script::new(vec![(404, vec![], "missing"), (500, vec![], "boom")]);
        let client = client(&script);

        let err = client.get("http://a.example/missing").unwrap_err();
        assert_eq!(err.response().unwrap().status_code, 404);
        assert_eq!(
            err.to_string(),
            "404 Client Error:  for url: http://a.example/missing"
        );

        let res = client
            .fetch_with("http://a.example/boom", &FetchOptions::new().raise_for_status(false))
            .unwrap();
        assert_eq!(res.status_code, 500);
    }

    #[test]
    fn test_cookies_flow_into_later_requests() {
        let script = Script::new(vec![
            (200, vec![("Set-Cookie", "session=abc; Path=/")], ""),
            (200, vec![], ""),
            (200, vec![], ""),
        ]);
        let client = client(&script);
        client.get("http://a.example/login").unwrap();
        client.get("http://a.example/account").unwrap();
        client.get("http://b.example/").unwrap();

        let seen = script.seen();
        assert_eq!(seen[1].headers.get("Cookie").as_deref(), Some("session=abc"));
        assert!(!seen[2].headers.contains("Cookie"));
        assert_eq!(client.cookies().get("session"), Some("abc"));
    }

    #[test]
    fn test_cookies_disabled() {
        let script = Script::new(vec![(200, vec![("Set-Cookie", "a=1")], "")]);
        let client = HttpClient::builder()
            .engine(Arc::clone(&script))
            .cookies_enabled(false)
            .clock(Arc::new(NoSleep))
            .build()
            .unwrap();
        client.get("http://a.example/").unwrap();
        assert!(client.cookies().is_empty());
    }

    #[test]
    fn test_unknown_engine_fails_build() {
        assert!(HttpClient::builder().engine("requests").build().is_err());
    }
}
