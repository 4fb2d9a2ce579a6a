//! Failover engine pool
//!
//! The pool is itself an [`Engine`]. A first attempt always goes to the
//! engine at the front of the ring. When a retry comes through, the ring
//! advances by one before the request goes out, but only the first time
//! that particular attempt is seen: the same attempt may ask for the short
//! code and then send the request, and that must not rotate twice.

use super::Engine;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::request::CompiledRequest;
use crate::response::Response;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct Rotation {
    front: usize,
    /// `(attempt_token, num_retries)` of the last attempt that rotated
    last_attempt: Option<(u64, u32)>,
}

pub struct EnginePool {
    engines: Vec<Arc<dyn Engine>>,
    rotation: Mutex<Rotation>,
}

impl EnginePool {
    pub fn new(engines: Vec<Arc<dyn Engine>>) -> Result<Self> {
        if engines.is_empty() {
            return Err(Error::InvalidRequest(
                "an engine pool needs at least one engine".to_string(),
            ));
        }
        Ok(EnginePool {
            engines,
            rotation: Mutex::new(Rotation::default()),
        })
    }

    pub fn len(&self) -> usize {
        self.engines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.engines.is_empty()
    }

    fn rotation(&self) -> MutexGuard<'_, Rotation> {
        self.rotation.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The engine that handles `creq`, rotating first if it is a new retry
    pub fn select(&self, creq: &CompiledRequest) -> Arc<dyn Engine> {
        let mut rotation = self.rotation();
        let attempt = (creq.attempt_token, creq.num_retries);
        if creq.num_retries > 0 && rotation.last_attempt != Some(attempt) {
            rotation.front = (rotation.front + 1) % self.engines.len();
            rotation.last_attempt = Some(attempt);
            log::debug!(
                "retry {} rotates to engine {}",
                creq.num_retries,
                self.engines[rotation.front].id()
            );
        }
        Arc::clone(&self.engines[rotation.front])
    }

    /// The engine currently at the front of the ring
    pub fn front(&self) -> Arc<dyn Engine> {
        Arc::clone(&self.engines[self.rotation().front])
    }
}

impl Engine for EnginePool {
    fn id(&self) -> &str {
        "pool"
    }

    fn short_code(&self) -> String {
        self.front().short_code()
    }

    fn request(&self, creq: Arc<CompiledRequest>, config: &Config) -> Result<Response> {
        let engine = self.select(&creq);
        engine.request(creq, config)
    }
}
