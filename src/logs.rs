//! Fetch log lines
//!
//! Each hop of a fetch is reported as one `info` record on the `hublot`
//! target:
//!
//! ```text
//! [3f2/9a81c0d4e7b65] [nt+5s]  http://example.com/page
//! [fixed.1] [cached] -> http://example.com/next [POST 12 bytes]
//! ```

use crate::request::CompiledRequest;
use std::fmt;
use std::sync::Arc;

pub const LOG_TARGET: &str = "hublot";

/// What happened during one hop, filled in as the fetch progresses
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub creq: Arc<CompiledRequest>,
    pub is_redirect: bool,
    pub cache_key_str: Option<String>,
    pub cached: bool,
    pub courtesy_seconds: Option<f64>,
    pub engine_short_code: Option<String>,
}

impl LogEntry {
    pub fn new(creq: Arc<CompiledRequest>, is_redirect: bool) -> Self {
        LogEntry {
            creq,
            is_redirect,
            cache_key_str: None,
            cached: false,
            courtesy_seconds: None,
            engine_short_code: None,
        }
    }

    fn engine_and_sleep(&self) -> Option<String> {
        let mut parts = Vec::new();
        if let Some(code) = self.engine_short_code.as_deref().filter(|c| !c.is_empty()) {
            parts.push(code.to_string());
        }
        if let Some(secs) = self.courtesy_seconds.filter(|s| *s > 0.5) {
            parts.push(format!("{}s", secs.round()));
        }
        if parts.is_empty() {
            None
        } else {
            Some(format!("[{}]", parts.join("+")))
        }
    }

    /// Emit this entry through the `log` facade
    pub fn emit(&self) {
        log::info!(target: LOG_TARGET, "{}", self);
    }
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(key) = self.cache_key_str.as_deref().filter(|k| !k.is_empty()) {
            write!(f, "[{}] ", key)?;
        }
        if self.cached {
            f.write_str("[cached] ")?;
        } else {
            match self.engine_and_sleep() {
                Some(tag) => write!(f, "{:<8} ", tag)?,
                None => f.write_str("         ")?,
            }
        }
        if self.is_redirect {
            f.write_str("-> ")?;
        }
        f.write_str(&self.creq.url)?;
        if let Some(data) = &self.creq.data {
            write!(f, " [{} {} bytes]", self.creq.method, data.len())?;
        }
        Ok(())
    }
}

/// Log to stderr with bare `{message}` lines, filtered at `level`
///
/// `RUST_LOG` still overrides the level. Safe to call more than once.
pub fn init_logging(level: log::LevelFilter) {
    use std::io::Write;

    let _ = env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .format(|buf, record| writeln!(buf, "{}", record.args()))
        .try_init();
}
