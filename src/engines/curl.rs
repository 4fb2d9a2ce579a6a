//! `curl` command engine
//!
//! Shells out to the `curl` binary for each exchange. The request body is
//! fed on stdin and the response, head included, is read back from stdout.

use super::Engine;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::http::parser::parse_head;
use crate::request::CompiledRequest;
use crate::response::Response;
use std::io::Write;
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::thread;

pub const ENGINE_ID: &str = "curl";

/// curl exit codes meaning the exchange never got going: couldn't resolve
/// proxy, couldn't resolve host, couldn't connect, timed out, TLS failure
const CONNECTION_EXIT_CODES: &[i32] = &[5, 6, 7, 28, 35];

#[derive(Debug, Clone)]
pub struct CurlEngine {
    program: String,
}

impl Default for CurlEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl CurlEngine {
    pub fn new() -> Self {
        Self::with_program("curl")
    }

    /// Use the curl binary at `program`
    pub fn with_program(program: impl Into<String>) -> Self {
        CurlEngine {
            program: program.into(),
        }
    }

    /// Arguments for one exchange, program name excluded
    pub fn command_args(&self, creq: &CompiledRequest, config: &Config) -> Vec<String> {
        let mut args = vec![
            creq.url.clone(),
            "--request".to_string(),
            creq.method.clone(),
            "--include".to_string(),
            "--silent".to_string(),
            "--show-error".to_string(),
            "--compressed".to_string(),
        ];
        if let Some(timeout) = config.timeout {
            let secs = format!("{:.3}", timeout.as_secs_f64());
            args.extend(["--connect-timeout".to_string(), secs.clone()]);
            args.extend(["--max-time".to_string(), secs]);
        }
        for (name, value) in creq.headers.iter() {
            args.push("-H".to_string());
            args.push(format!("{}: {}", name, value));
        }
        if creq.data.is_some() {
            args.extend(["--data-binary".to_string(), "@-".to_string()]);
        }
        if let Some(proxy) = url::Url::parse(&creq.url)
            .ok()
            .and_then(|u| config.proxies.get(u.scheme()).cloned())
        {
            args.extend(["--proxy".to_string(), proxy]);
        }
        if !config.verify {
            args.push("--insecure".to_string());
        }
        args
    }
}

/// Drop interim heads curl prints before the final one
///
/// That covers `100 Continue` and similar 1xx responses, and the
/// `Connection established` answer of a proxy tunnel.
fn strip_interim_heads(mut output: &[u8]) -> &[u8] {
    loop {
        let Some(end) = find_head_end(output) else {
            return output;
        };
        let first_line = output
            .split(|&b| b == b'\n')
            .next()
            .map(|l| String::from_utf8_lossy(l).into_owned())
            .unwrap_or_default();
        let mut words = first_line.split_whitespace();
        let _version = words.next();
        let code = words.next().unwrap_or("");
        let interim = code.starts_with('1') && code.len() == 3;
        let tunnel = first_line.to_ascii_lowercase().contains("connection established");
        if !(interim || tunnel) {
            return output;
        }
        output = &output[end..];
    }
}

/// Offset just past the blank line ending the first head
fn find_head_end(data: &[u8]) -> Option<usize> {
    let crlf = data.windows(4).position(|w| w == b"\r\n\r\n").map(|p| p + 4);
    let lf = data.windows(2).position(|w| w == b"\n\n").map(|p| p + 2);
    match (crlf, lf) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

impl Engine for CurlEngine {
    fn id(&self) -> &str {
        ENGINE_ID
    }

    fn short_code(&self) -> String {
        "cc".to_string()
    }

    fn request(&self, creq: Arc<CompiledRequest>, config: &Config) -> Result<Response> {
        let mut child = Command::new(&self.program)
            .args(self.command_args(&creq, config))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::Engine(format!("cannot run {}: {}", self.program, e)))?;

        // Feed stdin from a thread so a large body cannot deadlock against stdout
        let writer = child.stdin.take().map(|mut stdin| {
            let body = creq.data.clone().unwrap_or_default();
            thread::spawn(move || stdin.write_all(&body))
        });
        let output = child
            .wait_with_output()
            .map_err(|e| Error::Engine(format!("{} failed: {}", self.program, e)))?;
        if let Some(writer) = writer {
            if let Ok(Err(err)) = writer.join() {
                log::debug!("writing request body to {}: {}", self.program, err);
            }
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(match output.status.code() {
                Some(code) if CONNECTION_EXIT_CODES.contains(&code) => Error::Connection(stderr),
                Some(code) => Error::Engine(format!("curl exited with {}: {}", code, stderr)),
                None => Error::Engine(format!("curl was killed: {}", stderr)),
            });
        }

        let stdout = strip_interim_heads(&output.stdout);
        let (head, body_start) = parse_head(stdout)
            .map_err(|e| Error::Engine(format!("cannot parse curl output: {}", e)))?;
        Ok(Response::new(
            creq,
            head.status.code(),
            head.reason,
            head.headers,
            stdout[body_start..].to_vec(),
        ))
    }
}
