//! Built-in HTTP/1.1 engine
//!
//! Runs every exchange on a fresh connection from the [`crate::http`]
//! session layer: plain TCP through [`FdSessionOps`], HTTPS through openssl
//! [`TlsSessionOps`]. Responses are read to completion and gzip or deflate
//! bodies are decoded before they are handed back.
//!
//! Proxies come from [`Config::proxies`], keyed by the target's scheme.
//! Plain HTTP goes to the proxy in absolute form; HTTPS opens a `CONNECT`
//! tunnel and runs TLS inside it.

use super::Engine;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::http::session::{self, FdSessionOps, PollEvents, SessionOps};
use crate::http::tls::{TlsConfig, TlsSessionOps};
use crate::http::{self, Headers, HttpConnection, WireRequest};
use crate::request::CompiledRequest;
use crate::response::Response;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use flate2::read::{DeflateDecoder, GzDecoder, ZlibDecoder};
use std::io::Read;
use std::sync::Arc;
use std::time::Duration;
use url::{Position, Url};

pub const ENGINE_ID: &str = "native";

/// Plain or TLS transport for one exchange
enum Transport {
    Plain(FdSessionOps),
    Tls(Box<TlsSessionOps>),
}

impl SessionOps for Transport {
    fn poll(&self, events: PollEvents, timeout: Option<Duration>) -> http::Result<bool> {
        match self {
            Transport::Plain(ops) => ops.poll(events, timeout),
            Transport::Tls(ops) => ops.poll(events, timeout),
        }
    }

    fn read(&mut self, buf: &mut [u8]) -> http::Result<usize> {
        match self {
            Transport::Plain(ops) => ops.read(buf),
            Transport::Tls(ops) => ops.read(buf),
        }
    }

    fn write(&mut self, buf: &[u8]) -> http::Result<usize> {
        match self {
            Transport::Plain(ops) => ops.write(buf),
            Transport::Tls(ops) => ops.write(buf),
        }
    }

    fn close(&mut self) -> http::Result<()> {
        match self {
            Transport::Plain(ops) => ops.close(),
            Transport::Tls(ops) => ops.close(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct NativeEngine;

impl NativeEngine {
    pub fn new() -> Self {
        NativeEngine
    }

    /// Open TCP to the first address of `url` that accepts
    fn connect_tcp(url: &Url, timeout: Option<Duration>) -> Result<FdSessionOps> {
        let addrs = url
            .socket_addrs(|| None)
            .map_err(|e| Error::Connection(format!("cannot resolve {}: {}", url, e)))?;

        let mut last_err = None;
        for addr in &addrs {
            match session::connect(addr, timeout) {
                Ok(ops) => return Ok(ops),
                Err(err) => {
                    log::debug!("connect to {} failed: {}", addr, err);
                    last_err = Some(err);
                }
            }
        }
        Err(match last_err {
            Some(err) => err.into(),
            None => Error::Connection(format!("no address for {}", url)),
        })
    }

    /// Ask the proxy on `tcp` for a tunnel to `authority`
    fn open_tunnel(
        tcp: FdSessionOps,
        authority: &str,
        proxy: &Url,
        timeout: Option<Duration>,
    ) -> Result<FdSessionOps> {
        let mut connect = WireRequest::new("CONNECT", authority);
        connect.headers.add("Host", authority);
        if let Some(auth) = proxy_authorization(proxy) {
            connect.headers.add("Proxy-Authorization", auth);
        }

        let mut conn = HttpConnection::new(tcp, timeout);
        conn.send_request(&connect)?;
        let head = conn.receive_head()?;
        if !head.status.is_success() {
            return Err(Error::Connection(format!(
                "proxy refused CONNECT to {}: {} {}",
                authority,
                head.status,
                head.reason.unwrap_or_default()
            )));
        }
        Ok(conn.into_session())
    }

    fn start_tls(tcp: FdSessionOps, url: &Url, config: &Config) -> Result<TlsSessionOps> {
        let stream = tcp.into_stream();
        stream.set_read_timeout(config.timeout)?;
        stream.set_write_timeout(config.timeout)?;

        let mut builder = TlsConfig::client()
            .map_err(http::Error::from)?
            .verify_peer(config.verify);
        if let Some(domain) = url.domain() {
            builder = builder.servername(domain);
        }
        let tls = builder.build();
        Ok(tls.connect(stream).map_err(http::Error::from)?)
    }

    fn open(&self, url: &Url, config: &Config) -> Result<(Transport, String)> {
        let proxy = match config.proxies.get(url.scheme()) {
            Some(proxy) => Some(Url::parse(proxy)?),
            None => None,
        };
        let origin_form = url[Position::BeforePath..Position::AfterQuery].to_string();

        match (url.scheme(), proxy) {
            ("http", None) => {
                let tcp = Self::connect_tcp(url, config.timeout)?;
                Ok((Transport::Plain(tcp), origin_form))
            }
            ("http", Some(proxy)) => {
                let tcp = Self::connect_tcp(&proxy, config.timeout)?;
                let absolute_form = url[..Position::AfterQuery].to_string();
                Ok((Transport::Plain(tcp), absolute_form))
            }
            ("https", None) => {
                let tcp = Self::connect_tcp(url, config.timeout)?;
                let tls = Self::start_tls(tcp, url, config)?;
                Ok((Transport::Tls(Box::new(tls)), origin_form))
            }
            ("https", Some(proxy)) => {
                let tcp = Self::connect_tcp(&proxy, config.timeout)?;
                let authority = format!(
                    "{}:{}",
                    url.host_str().unwrap_or_default(),
                    url.port_or_known_default().unwrap_or(http::DEFAULT_HTTPS_PORT)
                );
                let tunnel = Self::open_tunnel(tcp, &authority, &proxy, config.timeout)?;
                let tls = Self::start_tls(tunnel, url, config)?;
                Ok((Transport::Tls(Box::new(tls)), origin_form))
            }
            (scheme, _) => Err(Error::InvalidRequest(format!(
                "unsupported URL scheme: {}",
                scheme
            ))),
        }
    }
}

fn proxy_authorization(proxy: &Url) -> Option<String> {
    if proxy.username().is_empty() {
        return None;
    }
    let credentials = format!("{}:{}", proxy.username(), proxy.password().unwrap_or(""));
    Some(format!("Basic {}", BASE64.encode(credentials)))
}

fn host_header(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    }
}

/// The request as written on the wire: Host first, then the compiled headers
fn wire_request(creq: &CompiledRequest, url: &Url, target: String, config: &Config) -> WireRequest {
    let mut wire = WireRequest::new(creq.method.clone(), target);
    wire.headers.add("Host", host_header(url));
    for (name, value) in creq.headers.iter() {
        if !name.eq_ignore_ascii_case("Host") {
            wire.headers.add(name, value);
        }
    }
    wire.headers.setdefault("Connection", "close");
    wire.headers.setdefault("Accept-Encoding", "gzip, deflate");
    if url.scheme() == "http" {
        if let Some(auth) = config
            .proxies
            .get("http")
            .and_then(|p| Url::parse(p).ok())
            .and_then(|p| proxy_authorization(&p))
        {
            wire.headers.setdefault("Proxy-Authorization", auth);
        }
    }
    wire.body = creq.data.clone();
    wire
}

/// Undo the Content-Encoding of `body`; unknown codings are left alone
fn decode_content(headers: &Headers, body: Vec<u8>) -> Result<Vec<u8>> {
    let coding = headers
        .get_first("Content-Encoding")
        .map(|c| c.trim().to_ascii_lowercase())
        .unwrap_or_default();
    if body.is_empty() {
        return Ok(body);
    }

    let mut decoded = Vec::new();
    match coding.as_str() {
        "gzip" | "x-gzip" => {
            GzDecoder::new(&body[..])
                .read_to_end(&mut decoded)
                .map_err(|e| Error::Engine(format!("bad gzip body: {}", e)))?;
        }
        "deflate" => {
            // Servers disagree on whether deflate means zlib-wrapped or raw
            if ZlibDecoder::new(&body[..]).read_to_end(&mut decoded).is_err() {
                decoded.clear();
                DeflateDecoder::new(&body[..])
                    .read_to_end(&mut decoded)
                    .map_err(|e| Error::Engine(format!("bad deflate body: {}", e)))?;
            }
        }
        _ => return Ok(body),
    }
    Ok(decoded)
}

impl Engine for NativeEngine {
    fn id(&self) -> &str {
        ENGINE_ID
    }

    fn short_code(&self) -> String {
        "nt".to_string()
    }

    fn request(&self, creq: Arc<CompiledRequest>, config: &Config) -> Result<Response> {
        let url = Url::parse(&creq.url)?;
        let (transport, target) = self.open(&url, config)?;
        let wire = wire_request(&creq, &url, target, config);

        let mut conn = HttpConnection::new(transport, config.timeout);
        conn.send_request(&wire)?;
        let (head, body) = conn.receive_response(&creq.method)?;
        if let Err(err) = conn.close() {
            log::debug!("closing connection to {}: {}", url, err);
        }

        let content = decode_content(&head.headers, body)?;
        Ok(Response::new(
            creq,
            head.status.code(),
            head.reason,
            head.headers,
            content,
        ))
    }
}
