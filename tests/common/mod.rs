//! Shared helpers for the integration tests
//!
//! `TestServer` is a tiny threaded HTTP/1.1 server on 127.0.0.1 with a few
//! fixed routes. `ManualClock` only moves when told to, or when something
//! sleeps on it.

#![allow(dead_code)]

use hublot::Clock;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, SystemTime};

pub struct TestServer {
    base: String,
    hits: Arc<AtomicUsize>,
}

impl TestServer {
    /// Start serving in a background thread
    pub fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let hits = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&hits);
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { continue };
                let n = counter.fetch_add(1, Ordering::SeqCst);
                // A broken exchange only fails the test that caused it
                let _ = handle(stream, n);
            }
        });

        TestServer { base, hits }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    /// Requests served so far
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

struct Incoming {
    method: String,
    target: String,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

impl Incoming {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

fn read_request(stream: &TcpStream) -> std::io::Result<Incoming> {
    let mut reader = BufReader::new(stream.try_clone()?);
    let mut line = String::new();
    reader.read_line(&mut line)?;
    let mut parts = line.split_whitespace();
    let method = parts.next().unwrap_or("").to_string();
    let target = parts.next().unwrap_or("").to_string();

    let mut headers = Vec::new();
    loop {
        let mut line = String::new();
        reader.read_line(&mut line)?;
        let line = line.trim_end();
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            headers.push((name.trim().to_string(), value.trim().to_string()));
        }
    }

    let mut incoming = Incoming {
        method,
        target,
        headers,
        body: Vec::new(),
    };
    let length = incoming
        .header("Content-Length")
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(0);
    let mut body = vec![0u8; length];
    reader.read_exact(&mut body)?;
    incoming.body = body;
    Ok(incoming)
}

fn respond(
    stream: &mut TcpStream,
    status: &str,
    headers: &[(&str, String)],
    body: &[u8],
) -> std::io::Result<()> {
    let mut out = format!("HTTP/1.1 {}\r\n", status);
    for (name, value) in headers {
        out.push_str(&format!("{}: {}\r\n", name, value));
    }
    out.push_str(&format!("Content-Length: {}\r\nConnection: close\r\n\r\n", body.len()));
    stream.write_all(out.as_bytes())?;
    stream.write_all(body)?;
    stream.flush()
}

fn handle(mut stream: TcpStream, n: usize) -> std::io::Result<()> {
    let req = read_request(&stream)?;
    let (path, query) = req.target.split_once('?').unwrap_or((req.target.as_str(), ""));

    match path {
        "/hello" => respond(&mut stream, "200 OK", &[("Content-Type", "text/plain".into())], b"hello"),
        "/unique" => {
            let body = format!("unique-{}", n);
            respond(&mut stream, "200 OK", &[], body.as_bytes())
        }
        "/echo" => {
            let mut body = format!("{} {}\n", req.method, req.target);
            for (name, value) in &req.headers {
                body.push_str(&format!("{}: {}\n", name, value));
            }
            body.push('\n');
            let mut body = body.into_bytes();
            body.extend_from_slice(&req.body);
            respond(&mut stream, "200 OK", &[], &body)
        }
        "/cookies/set" => {
            let cookies: Vec<(&str, String)> = query
                .split('&')
                .filter(|kv| !kv.is_empty())
                .map(|kv| ("Set-Cookie", format!("{}; Path=/", kv)))
                .collect();
            respond(&mut stream, "200 OK", &cookies, b"cookies set")
        }
        "/cookies/get" => {
            let cookie = req.header("Cookie").unwrap_or("").to_string();
            respond(&mut stream, "200 OK", &[], cookie.as_bytes())
        }
        "/chunked" => {
            stream.write_all(
                b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\nConnection: close\r\n\r\n\
                  5\r\nhello\r\n6\r\n world\r\n0\r\n\r\n",
            )?;
            stream.flush()
        }
        _ => {
            if let Some(rest) = path.strip_prefix("/redirect/") {
                let hops: u32 = rest.parse().unwrap_or(0);
                if hops == 0 {
                    respond(&mut stream, "200 OK", &[], b"arrived")
                } else {
                    let location = format!("/redirect/{}", hops - 1);
                    respond(&mut stream, "302 Found", &[("Location", location)], b"")
                }
            } else if let Some(code) = path.strip_prefix("/status/") {
                respond(&mut stream, &format!("{} Whatever", code), &[], code.as_bytes())
            } else {
                respond(&mut stream, "404 Not Found", &[], b"no such route")
            }
        }
    }
}

/// A clock that only moves when told to
pub struct ManualClock {
    now: Mutex<SystemTime>,
    sleeps: Mutex<Vec<Duration>>,
}

impl ManualClock {
    pub fn new() -> Arc<Self> {
        Arc::new(ManualClock {
            now: Mutex::new(SystemTime::now()),
            sleeps: Mutex::new(Vec::new()),
        })
    }

    pub fn advance(&self, by: Duration) {
        *self.now.lock().unwrap() += by;
    }

    /// Every duration slept so far
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }

    pub fn total_slept(&self) -> Duration {
        self.sleeps().iter().sum()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> SystemTime {
        *self.now.lock().unwrap()
    }

    fn sleep(&self, duration: Duration) {
        self.sleeps.lock().unwrap().push(duration);
        self.advance(duration);
    }
}
