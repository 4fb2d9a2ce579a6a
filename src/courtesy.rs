//! Per-host request spacing
//!
//! [`CourtesySleep`] keeps consecutive live requests to one host at least
//! `sleep` apart, measured from when the previous request finished. Each
//! host has its own lock held across sleep, call and record, so two
//! threads hitting the same host queue up instead of both reading a stale
//! timestamp.

use crate::clock::SharedClock;
use crate::logs::LogEntry;
use crate::request::CompiledRequest;
use std::collections::HashMap;
use std::sync::{Arc, LockResult, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime};

type HostSlot = Arc<Mutex<Option<SystemTime>>>;

pub struct CourtesySleep {
    default: Duration,
    hosts: Mutex<HashMap<String, HostSlot>>,
    clock: SharedClock,
}

fn relock<'a, T>(result: LockResult<MutexGuard<'a, T>>) -> MutexGuard<'a, T> {
    result.unwrap_or_else(PoisonError::into_inner)
}

impl CourtesySleep {
    pub fn new(default: Duration, clock: SharedClock) -> Self {
        CourtesySleep {
            default,
            hosts: Mutex::new(HashMap::new()),
            clock,
        }
    }

    pub fn default_sleep(&self) -> Duration {
        self.default
    }

    fn slot(&self, host: &str) -> HostSlot {
        let mut hosts = relock(self.hosts.lock());
        Arc::clone(hosts.entry(host.to_string()).or_default())
    }

    /// When the last live request to `host` finished
    pub fn last_request(&self, host: &str) -> Option<SystemTime> {
        let slot = relock(self.hosts.lock()).get(host).cloned()?;
        let last = *relock(slot.lock());
        last
    }

    /// Run `call` against `creq`'s host, sleeping first if it was hit recently
    ///
    /// `sleep` overrides the default spacing for this call. The finish time
    /// is recorded whether or not `call` succeeded. A slept duration is noted
    /// on `log`.
    pub fn run<T>(
        &self,
        creq: &CompiledRequest,
        log: &mut LogEntry,
        sleep: Option<Duration>,
        call: impl FnOnce() -> T,
    ) -> T {
        let host = creq.hostname().unwrap_or_default();
        let sleep = sleep.unwrap_or(self.default);
        let slot = self.slot(&host);

        if sleep.is_zero() {
            let result = call();
            *relock(slot.lock()) = Some(self.clock.now());
            return result;
        }

        let mut last = relock(slot.lock());
        if let Some(previous) = *last {
            let elapsed = self
                .clock
                .now()
                .duration_since(previous)
                .unwrap_or(Duration::ZERO);
            if let Some(delay) = sleep.checked_sub(elapsed).filter(|d| !d.is_zero()) {
                log.courtesy_seconds = Some(delay.as_secs_f64());
                log::debug!("courtesy sleep of {:.1}s before {}", delay.as_secs_f64(), host);
                self.clock.sleep(delay);
            }
        }

        let result = call();
        *last = Some(self.clock.now());
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::Clock;

    struct ManualClock(Mutex<SystemTime>);

    impl ManualClock {
        fn advance(&self, by: Duration) {
            *self.0.lock().unwrap() += by;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> SystemTime {
            *self.0.lock().unwrap()
        }

        fn sleep(&self, duration: Duration) {
            self.advance(duration);
        }
    }

    fn setup() -> (Arc<ManualClock>, CourtesySleep) {
        let clock = Arc::new(ManualClock(Mutex::new(SystemTime::UNIX_EPOCH)));
        let courtesy = CourtesySleep::new(Duration::from_secs(5), clock.clone());
        (clock, courtesy)
    }

    fn entry(url: &str) -> (Arc<CompiledRequest>, LogEntry) {
        let creq = Arc::new(CompiledRequest::new("GET", url));
        let log = LogEntry::new(creq.clone(), false);
        (creq, log)
    }

    #[test]
    fn test_first_request_does_not_sleep() {
        let (clock, courtesy) = setup();
        let (creq, mut log) = entry("http://a.example/1");
        courtesy.run(&creq, &mut log, None, || ());
        assert_eq!(log.courtesy_seconds, None);
        assert_eq!(courtesy.last_request("a.example"), Some(clock.now()));
    }

    #[test]
    fn test_second_request_waits_remaining_time() {
        let (clock, courtesy) = setup();
        let (creq, mut log) = entry("http://a.example/1");
        courtesy.run(&creq, &mut log, None, || ());

        clock.advance(Duration::from_secs(2));
        let start = clock.now();
        let (creq, mut log) = entry("http://a.example/2");
        courtesy.run(&creq, &mut log, None, || ());

        assert_eq!(log.courtesy_seconds, Some(3.0));
        assert_eq!(clock.now().duration_since(start).unwrap(), Duration::from_secs(3));
    }

    #[test]
    fn test_hosts_are_independent() {
        let (_clock, courtesy) = setup();
        let (creq, mut log) = entry("http://a.example/");
        courtesy.run(&creq, &mut log, None, || ());

        let (creq, mut log) = entry("http://b.example/");
        courtesy.run(&creq, &mut log, None, || ());
        assert_eq!(log.courtesy_seconds, None);
    }

    #[test]
    fn test_records_time_even_when_call_fails() {
        let (clock, courtesy) = setup();
        let (creq, mut log) = entry("http://a.example/");
        let result: Result<(), &str> = courtesy.run(&creq, &mut log, None, || {
            clock.advance(Duration::from_secs(1));
            Err("refused")
        });
        assert!(result.is_err());
        assert_eq!(courtesy.last_request("a.example"), Some(clock.now()));
    }

    #[test]
    fn test_zero_sleep_override() {
        let (_clock, courtesy) = setup();
        let (creq, mut log) = entry("http://a.example/");
        courtesy.run(&creq, &mut log, None, || ());

        let (creq, mut log) = entry("http://a.example/");
        courtesy.run(&creq, &mut log, Some(Duration::ZERO), || ());
        assert_eq!(log.courtesy_seconds, None);
    }
}
