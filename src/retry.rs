//! Retry decorator
//!
//! [`RetryPolicy`] runs a closure until it succeeds, its error is not
//! retryable, or the attempts run out. While it runs, the current attempt
//! is visible on a per-thread stack so the client underneath can tell a
//! retry from a first try:
//!
//! - a retried fetch bypasses the cache on its first hop and skips the
//!   courtesy sleep;
//! - an [`crate::engines::EnginePool`] moves to its next engine once per
//!   distinct retry.
//!
//! Every call through a policy pushes its own frame, so nested and sibling
//! decorated calls never see each other's attempts, and threads never share
//! frames.
//!
//! ```no_run
//! use hublot::{retry_on_scraper_error, Error, HttpClient};
//!
//! let client = HttpClient::builder().build()?;
//! let title = retry_on_scraper_error(|| {
//!     let res = client.fetch("http://example.com/")?;
//!     let text = res.text()?;
//!     text.split("<title>")
//!         .nth(1)
//!         .map(|rest| rest.split("</title>").next().unwrap_or("").to_string())
//!         .ok_or_else(|| Error::scraper("no title"))
//! })?;
//! # Ok::<(), Error>(())
//! ```

use crate::clock::{system_clock, SharedClock};
use crate::error::{Error, Result, ScraperError};
use std::cell::RefCell;
use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

pub const DEFAULT_NUM_ATTEMPTS: u32 = 5;

/// Identity of one attempt of one decorated call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct AttemptId {
    /// Distinct for every decorated call; zero outside any
    pub token: u64,
    /// Zero on the first try
    pub attempt: u32,
}

static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static FRAMES: RefCell<Vec<AttemptId>> = RefCell::new(vec![AttemptId::default()]);
}

/// The innermost attempt running on this thread
pub fn current_attempt() -> AttemptId {
    FRAMES.with(|frames| frames.borrow().last().copied().unwrap_or_default())
}

/// True while the innermost decorated call is on a retry
pub fn is_retrying() -> bool {
    current_attempt().attempt > 0
}

/// Pushes a frame on creation and pops it on drop, panics and errors included
struct FrameGuard {
    depth: usize,
    // Frames belong to the thread that pushed them
    _not_send: PhantomData<*const ()>,
}

impl FrameGuard {
    fn push() -> Self {
        let token = NEXT_TOKEN.fetch_add(1, Ordering::Relaxed);
        let depth = FRAMES.with(|frames| {
            let mut frames = frames.borrow_mut();
            frames.push(AttemptId { token, attempt: 0 });
            frames.len()
        });
        FrameGuard {
            depth,
            _not_send: PhantomData,
        }
    }

    fn set_attempt(&self, attempt: u32) {
        FRAMES.with(|frames| {
            if let Some(frame) = frames.borrow_mut().get_mut(self.depth - 1) {
                frame.attempt = attempt;
            }
        });
    }
}

impl Drop for FrameGuard {
    fn drop(&mut self) {
        FRAMES.with(|frames| frames.borrow_mut().truncate(self.depth - 1));
    }
}

type Predicate<E> = Box<dyn Fn(&E) -> bool + Send + Sync>;

/// How often to retry, and on which errors
pub struct RetryPolicy<E = Error> {
    num_attempts: u32,
    extra: Vec<Predicate<E>>,
    clock: SharedClock,
}

impl<E> Default for RetryPolicy<E> {
    fn default() -> Self {
        RetryPolicy {
            num_attempts: DEFAULT_NUM_ATTEMPTS,
            extra: Vec::new(),
            clock: system_clock(),
        }
    }
}

impl<E> fmt::Debug for RetryPolicy<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("num_attempts", &self.num_attempts)
            .field("extra_predicates", &self.extra.len())
            .finish()
    }
}

impl<E: ScraperError + fmt::Display> RetryPolicy<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total tries, the first one included; at least one
    pub fn num_attempts(mut self, num_attempts: u32) -> Self {
        self.num_attempts = num_attempts.max(1);
        self
    }

    /// Also retry errors matching `pred`, on top of scraper errors
    pub fn also_retry_on(mut self, pred: impl Fn(&E) -> bool + Send + Sync + 'static) -> Self {
        self.extra.push(Box::new(pred));
        self
    }

    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    fn should_retry(&self, err: &E) -> bool {
        err.is_scraper_error() || self.extra.iter().any(|pred| pred(err))
    }

    /// Backoff before retry number `attempt + 1`
    fn delay(attempt: u32) -> Duration {
        Duration::from_secs(5u64.saturating_pow(attempt))
    }

    /// Run `f` under this policy
    pub fn call<T, F>(&self, mut f: F) -> std::result::Result<T, E>
    where
        F: FnMut() -> std::result::Result<T, E>,
    {
        let frame = FrameGuard::push();
        let mut attempt = 0;
        loop {
            frame.set_attempt(attempt);
            match f() {
                Ok(value) => return Ok(value),
                Err(err) if attempt + 1 < self.num_attempts && self.should_retry(&err) => {
                    let delay = Self::delay(attempt);
                    log::warn!(
                        "attempt {}/{} failed, retrying in {}s: {}",
                        attempt + 1,
                        self.num_attempts,
                        delay.as_secs(),
                        err
                    );
                    self.clock.sleep(delay);
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Run `f` and drain the sequence it returns inside the retry boundary
    ///
    /// An error part-way through the sequence retries the whole call.
    pub fn call_collect<X, I, F>(&self, mut f: F) -> std::result::Result<Vec<X>, E>
    where
        F: FnMut() -> I,
        I: IntoIterator<Item = std::result::Result<X, E>>,
    {
        self.call(|| f().into_iter().collect())
    }

    /// Turn `f` into a closure that retries under this policy on every call
    pub fn wrap<A, T, F>(self, mut f: F) -> impl FnMut(A) -> std::result::Result<T, E>
    where
        A: Clone,
        F: FnMut(A) -> std::result::Result<T, E>,
    {
        move |arg: A| self.call(|| f(arg.clone()))
    }
}

/// Run `f` with the default policy: five attempts, scraper errors only
pub fn retry_on_scraper_error<T, F>(f: F) -> Result<T>
where
    F: FnMut() -> Result<T>,
{
    RetryPolicy::<Error>::new().call(f)
}
