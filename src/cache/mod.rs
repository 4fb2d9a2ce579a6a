//! Response cache
//!
//! [`Cache`] sits between the client and a [`Storage`] backend. It resolves
//! the key for each request (computed, or pinned by the caller), applies the
//! age window, and records what it did on the hop's [`LogEntry`].
//!
//! # Age window
//!
//! A cache built with an overall `max_age` prunes everything older than
//! that on its first lookup. A per-call `max_age` can narrow the window for
//! one lookup but never widen it past the overall bound.

pub mod blob;
pub mod key;
pub mod storage;

pub use key::CacheKey;
pub use storage::{DiskStorage, Storage};

use crate::clock::SharedClock;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::logs::LogEntry;
use crate::request::CompiledRequest;
use crate::response::Response;
use std::path::PathBuf;
use std::sync::{Arc, Once};
use std::time::Duration;

/// How a client's cache is specified
pub enum CacheSpec {
    /// A directory for [`DiskStorage`]
    Dir(PathBuf),
    /// `file://` path or a remote store URL
    Url(String),
    /// A ready-made cache
    Instance(Cache),
}

impl From<PathBuf> for CacheSpec {
    fn from(path: PathBuf) -> Self {
        CacheSpec::Dir(path)
    }
}

impl From<&std::path::Path> for CacheSpec {
    fn from(path: &std::path::Path) -> Self {
        CacheSpec::Dir(path.to_path_buf())
    }
}

/// `scheme://...` is a URL, anything else a directory
impl From<&str> for CacheSpec {
    fn from(location: &str) -> Self {
        if location.contains("://") {
            CacheSpec::Url(location.to_string())
        } else {
            CacheSpec::Dir(PathBuf::from(location))
        }
    }
}

impl From<String> for CacheSpec {
    fn from(location: String) -> Self {
        CacheSpec::from(location.as_str())
    }
}

impl From<Cache> for CacheSpec {
    fn from(cache: Cache) -> Self {
        CacheSpec::Instance(cache)
    }
}

pub struct Cache {
    storage: Box<dyn Storage>,
    max_age: Option<Duration>,
    prune_once: Once,
}

impl Cache {
    pub fn new(storage: Box<dyn Storage>, max_age: Option<Duration>) -> Self {
        Cache {
            storage,
            max_age,
            prune_once: Once::new(),
        }
    }

    /// Build the cache described by `spec`
    pub fn load(
        spec: Option<CacheSpec>,
        max_age: Option<Duration>,
        clock: SharedClock,
    ) -> Result<Option<Cache>> {
        match spec {
            None if max_age.is_some() => Err(Error::InvalidRequest(
                "max_cache_age given without a cache".to_string(),
            )),
            None => Ok(None),
            Some(CacheSpec::Instance(_)) if max_age.is_some() => Err(Error::InvalidRequest(
                "max_cache_age cannot be applied to an existing cache".to_string(),
            )),
            Some(CacheSpec::Instance(cache)) => Ok(Some(cache)),
            Some(CacheSpec::Dir(root)) => Ok(Some(Cache::new(
                Box::new(DiskStorage::new(root, clock)),
                max_age,
            ))),
            Some(CacheSpec::Url(url)) => {
                if let Some(path) = url.strip_prefix("file://") {
                    Cache::load(Some(CacheSpec::Dir(PathBuf::from(path))), max_age, clock)
                } else if url.starts_with("s3://") {
                    Err(Error::InvalidRequest(format!(
                        "remote cache stores are not implemented: {}",
                        url
                    )))
                } else {
                    Err(Error::InvalidRequest(format!("unsupported cache location: {}", url)))
                }
            }
        }
    }

    pub fn storage(&self) -> &dyn Storage {
        self.storage.as_ref()
    }

    pub fn max_age(&self) -> Option<Duration> {
        self.max_age
    }

    fn resolve_key(creq: &CompiledRequest, config: &Config, key: Option<&CacheKey>) -> CacheKey {
        match key {
            Some(key) => key.clone(),
            None => CacheKey::compute(creq, &config.headers_ignored_by_cache),
        }
    }

    /// Per-call age bound, clamped to the overall one
    fn effective_max_age(&self, requested: Option<Duration>) -> Option<Duration> {
        match (requested, self.max_age) {
            (None, overall) => overall,
            (Some(requested), Some(overall)) if requested > overall => Some(overall),
            (Some(requested), _) => Some(requested),
        }
    }

    fn prune_if_needed(&self) {
        let Some(max_age) = self.max_age else {
            return;
        };
        self.prune_once.call_once(|| {
            if let Err(err) = self.storage.prune(max_age) {
                log::warn!("cache prune failed: {}", err);
            }
        });
    }

    /// Look up the response stored for `creq`
    pub fn get(
        &self,
        creq: &Arc<CompiledRequest>,
        log: &mut LogEntry,
        config: &Config,
        key: Option<&CacheKey>,
    ) -> Option<Response> {
        let key = Self::resolve_key(creq, config, key);
        self.prune_if_needed();

        let max_age = self.effective_max_age(config.max_cache_age);
        let hit = self.storage.read(&key, max_age).map(|mut res| {
            // Storage round-trips the request too; the live one is authoritative
            res.request = Arc::clone(creq);
            res.from_cache = true;
            res
        });

        log.cached = hit.is_some();
        log.cache_key_str = Some(key.unique_str());
        hit
    }

    /// Store `response` as the answer to `creq`
    pub fn put(
        &self,
        creq: &CompiledRequest,
        log: &mut LogEntry,
        response: &Response,
        config: &Config,
        key: Option<&CacheKey>,
    ) -> Result<()> {
        let key = Self::resolve_key(creq, config, key);
        log.cache_key_str = Some(key.unique_str());
        self.storage.write(&key, response)
    }
}
