//! hublot - HTTP client with a disk cache, courtesy sleep and engine failover
//!
//! This crate wraps HTTP requests with the concerns a scraper needs:
//!
//! - a persistent on-disk response cache keyed by request fingerprint
//! - a per-host courtesy delay between live requests
//! - a pool of interchangeable transport engines that rotates on retries
//! - a retry decorator that ties the three together
//!
//! ```no_run
//! use hublot::{retry_on_scraper_error, Error, HttpClient};
//!
//! let client = HttpClient::builder().cache("/tmp/hublot-cache").build()?;
//! let body = retry_on_scraper_error(|| client.fetch("http://example.com/")?.text())?;
//! println!("{}", body);
//! # Ok::<(), Error>(())
//! ```

pub mod cache;
pub mod client;
pub mod clock;
pub mod compile;
pub mod config;
pub mod cookies;
pub mod courtesy;
pub mod engines;
pub mod error;
pub mod http;
pub mod logs;
pub mod request;
pub mod response;
pub mod retry;

pub use cache::{Cache, CacheKey, CacheSpec, DiskStorage, Storage};
pub use client::{HttpClient, HttpClientBuilder};
pub use clock::{Clock, SharedClock, SystemClock};
pub use config::{Config, FetchOptions};
pub use cookies::{Cookie, CookieJar};
pub use engines::{CurlEngine, Engine, EnginePool, EngineRegistry, EngineSpec, NativeEngine};
pub use error::{lookup, Error, HttpError, Result, ScraperError};
pub use http::Headers;
pub use logs::{init_logging, LogEntry};
pub use request::{Body, CompiledRequest, Request, Requestable};
pub use response::Response;
pub use retry::{is_retrying, retry_on_scraper_error, RetryPolicy};
