//! Engine pool failover driven through the retry decorator
//!
//! Three scripted engines each break on one path in a different way: a
//! transport failure, an HTTP error status, and a page the caller cannot
//! parse. Every failure must move the pool on by exactly one engine.

mod common;

use common::ManualClock;
use hublot::{
    CompiledRequest, Config, Engine, Error, Headers, HttpClient, Response, Result, RetryPolicy,
};
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone, Copy)]
enum Breakage {
    Connection,
    NotFound,
    Unparseable,
}

struct Scripted {
    name: &'static str,
    breaks_on: &'static str,
    breakage: Breakage,
}

impl Engine for Scripted {
    fn id(&self) -> &str {
        self.name
    }

    fn short_code(&self) -> String {
        self.name.to_string()
    }

    fn request(&self, creq: Arc<CompiledRequest>, _config: &Config) -> Result<Response> {
        let path = url::Url::parse(&creq.url)?.path().to_string();
        if path == self.breaks_on {
            return match self.breakage {
                Breakage::Connection => Err(Error::Connection(format!("{} is down", self.name))),
                Breakage::NotFound => Ok(Response::new(
                    creq,
                    404,
                    Some("Not Found".to_string()),
                    Headers::new(),
                    &b"gone"[..],
                )),
                Breakage::Unparseable => Ok(Response::new(
                    creq,
                    200,
                    Some("OK".to_string()),
                    Headers::new(),
                    &b"garbled"[..],
                )),
            };
        }
        let body = format!("{} from {}", path, self.name);
        Ok(Response::new(creq, 200, Some("OK".to_string()), Headers::new(), body))
    }
}

fn client(clock: &Arc<ManualClock>) -> HttpClient {
    let engines = [
        ("engine1", "/3", Breakage::Connection),
        ("engine2", "/6", Breakage::NotFound),
        ("engine3", "/9", Breakage::Unparseable),
    ];
    engines
        .into_iter()
        .fold(HttpClient::builder(), |builder, (name, breaks_on, breakage)| {
            builder.engine(Arc::new(Scripted {
                name,
                breaks_on,
                breakage,
            }))
        })
        .courtesy_sleep(Duration::ZERO)
        .clock(clock.clone())
        .build()
        .unwrap()
}

#[test]
fn test_engines_rotate_once_per_failed_attempt() {
    let clock = ManualClock::new();
    let client = client(&clock);
    let policy = RetryPolicy::<Error>::new().with_clock(clock.clone());

    let served: Vec<String> = (0..12)
        .map(|i| {
            policy
                .call(|| {
                    let res = client.fetch(format!("http://pool.test/{}", i))?;
                    let text = res.text()?;
                    let (_, engine) = text
                        .split_once(" from ")
                        .ok_or_else(|| Error::scraper(format!("cannot parse {:?}", text)))?;
                    Ok(engine.to_string())
                })
                .unwrap()
        })
        .collect();

    let expected: Vec<&str> = ["engine1", "engine2", "engine3", "engine1"]
        .iter()
        .flat_map(|name| [*name; 3])
        .collect();
    assert_eq!(served, expected);

    // One backoff per failure, each the first of its call
    assert_eq!(clock.sleeps(), vec![Duration::from_secs(1); 3]);
}

#[test]
fn test_without_retries_the_pool_stays_put() {
    let clock = ManualClock::new();
    let client = client(&clock);

    let err = client.fetch("http://pool.test/3").unwrap_err();
    assert!(err.is_connection());

    let res = client.fetch("http://pool.test/4").unwrap();
    assert_eq!(res.text().unwrap(), "/4 from engine1");
    assert_eq!(client.engines().short_code(), "engine1");
}
