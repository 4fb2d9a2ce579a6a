//! Transport engines
//!
//! An [`Engine`] performs exactly one HTTP exchange for a
//! [`CompiledRequest`]. Engines never follow redirects and never manage
//! cookies: a 30x comes back as-is and cookies arrive already baked into
//! the `Cookie` header. Transport headers (Host, Connection,
//! Accept-Encoding) are each engine's own business.
//!
//! # Architecture
//!
//! ```text
//! HttpClient ──> EnginePool ──> NativeEngine (src/http session layer)
//!                     │
//!                     └──────> CurlEngine   (curl subprocess)
//! ```
//!
//! Engines are looked up by id in an [`EngineRegistry`] owned by whoever
//! builds the client; nothing registers itself globally.

pub mod curl;
pub mod native;
pub mod pool;

pub use curl::CurlEngine;
pub use native::NativeEngine;
pub use pool::EnginePool;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::request::CompiledRequest;
use crate::response::Response;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// One way of performing an HTTP exchange
pub trait Engine: Send + Sync {
    /// Registry id, e.g. `"native"`
    fn id(&self) -> &str;

    /// Tag shown in log lines
    fn short_code(&self) -> String;

    /// Perform the exchange
    ///
    /// Transport failures must come back as [`Error::Connection`] so the
    /// pool and retry logic can tell them apart from failed exchanges.
    fn request(&self, creq: Arc<CompiledRequest>, config: &Config) -> Result<Response>;
}

/// An engine named by registry id, or one built by the caller
#[derive(Clone)]
pub enum EngineSpec {
    Named(String),
    Instance(Arc<dyn Engine>),
}

impl fmt::Debug for EngineSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineSpec::Named(id) => f.debug_tuple("Named").field(id).finish(),
            EngineSpec::Instance(engine) => f.debug_tuple("Instance").field(&engine.id()).finish(),
        }
    }
}

impl From<&str> for EngineSpec {
    fn from(id: &str) -> Self {
        EngineSpec::Named(id.to_string())
    }
}

impl From<String> for EngineSpec {
    fn from(id: String) -> Self {
        EngineSpec::Named(id)
    }
}

impl<E: Engine + 'static> From<Arc<E>> for EngineSpec {
    fn from(engine: Arc<E>) -> Self {
        EngineSpec::Instance(engine)
    }
}

type EngineFactory = Box<dyn Fn() -> Result<Arc<dyn Engine>> + Send + Sync>;

/// Engine constructors by id
#[derive(Default)]
pub struct EngineRegistry {
    factories: BTreeMap<String, EngineFactory>,
}

impl EngineRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry knowing `native` and `curl`
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(native::ENGINE_ID, || Ok(Arc::new(NativeEngine::new()) as Arc<dyn Engine>));
        registry.register(curl::ENGINE_ID, || Ok(Arc::new(CurlEngine::new()) as Arc<dyn Engine>));
        registry
    }

    /// Add or replace the constructor for `id`
    pub fn register<F>(&mut self, id: impl Into<String>, factory: F)
    where
        F: Fn() -> Result<Arc<dyn Engine>> + Send + Sync + 'static,
    {
        self.factories.insert(id.into(), Box::new(factory));
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    pub fn create(&self, id: &str) -> Result<Arc<dyn Engine>> {
        let factory = self
            .factories
            .get(id)
            .ok_or_else(|| Error::InvalidRequest(format!("unknown engine: {}", id)))?;
        factory()
    }

    /// Build a pool from `specs`, in order
    pub fn build(&self, specs: &[EngineSpec]) -> Result<EnginePool> {
        let engines = specs
            .iter()
            .map(|spec| match spec {
                EngineSpec::Named(id) => self.create(id),
                EngineSpec::Instance(engine) => Ok(Arc::clone(engine)),
            })
            .collect::<Result<Vec<_>>>()?;
        EnginePool::new(engines)
    }
}
