//! Cache blob format
//!
//! A stored exchange is written out close to how it looked on the wire so
//! that a decompressed cache file can be read by eye:
//!
//! ```text
//! GET http://example.com/\r\n
//! Accept: */*\r\n
//! \r\n
//! \r\n
//! HTTP 200 OK\r\n
//! Content-Type: text/plain\r\n
//! \r\n
//! hello
//! ```
//!
//! Headers are sorted by name; values under one name keep the order they
//! arrived in. The request body is only present when the request
//! carried a Content-Length, and it must match that length exactly.

use crate::error::{Error, Result};
use crate::http::Headers;
use crate::request::CompiledRequest;
use crate::response::Response;
use bytes::Bytes;
use std::sync::Arc;

const EOL: &[u8] = b"\r\n";

fn write_headers(buf: &mut Vec<u8>, headers: &Headers) {
    let mut items = headers.items(false);
    // Stable by name: repeated headers keep their order
    items.sort_by(|a, b| a.0.cmp(&b.0));
    for (name, value) in items {
        buf.extend_from_slice(name.as_bytes());
        buf.extend_from_slice(b": ");
        buf.extend_from_slice(value.as_bytes());
        buf.extend_from_slice(EOL);
    }
}

/// Serialize a response and the request that produced it
pub fn compose(response: &Response) -> Result<Vec<u8>> {
    let creq = &response.request;
    let mut buf = Vec::with_capacity(512 + creq.body_len() + response.content.len());

    buf.extend_from_slice(creq.method.as_bytes());
    buf.push(b' ');
    buf.extend_from_slice(creq.url.as_bytes());
    buf.extend_from_slice(EOL);
    write_headers(&mut buf, &creq.headers);
    buf.extend_from_slice(EOL);

    if let Some(declared) = creq.headers.get("Content-Length") {
        let body: &[u8] = creq.data.as_deref().unwrap_or(b"");
        if declared.trim().parse::<usize>().ok() != Some(body.len()) {
            return Err(Error::CacheConsistency {
                declared,
                actual: body.len(),
            });
        }
        buf.extend_from_slice(body);
        buf.extend_from_slice(EOL);
    }
    buf.extend_from_slice(EOL);

    buf.extend_from_slice(format!("HTTP {} ", response.status_code).as_bytes());
    buf.extend_from_slice(response.reason.as_deref().unwrap_or("").as_bytes());
    buf.extend_from_slice(EOL);
    write_headers(&mut buf, &response.headers);
    buf.extend_from_slice(EOL);
    buf.extend_from_slice(&response.content);

    Ok(buf)
}

fn malformed(what: &str) -> Error {
    Error::Engine(format!("malformed cache blob: {}", what))
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn line(&mut self) -> Result<&'a str> {
        let rest = &self.data[self.pos..];
        let end = rest
            .windows(2)
            .position(|w| w == EOL)
            .ok_or_else(|| malformed("unterminated line"))?;
        self.pos += end + 2;
        std::str::from_utf8(&rest[..end]).map_err(|_| malformed("non UTF-8 line"))
    }

    fn headers(&mut self) -> Result<Headers> {
        let mut headers = Headers::new();
        loop {
            let line = self.line()?;
            if line.is_empty() {
                return Ok(headers);
            }
            let (name, value) = line
                .split_once(": ")
                .ok_or_else(|| malformed("header line without separator"))?;
            headers.add(name, value);
        }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self.pos + len;
        if end > self.data.len() {
            return Err(malformed("truncated body"));
        }
        let taken = &self.data[self.pos..end];
        self.pos = end;
        Ok(taken)
    }

    fn expect_eol(&mut self) -> Result<()> {
        if self.take(2)? != EOL {
            return Err(malformed("missing line break"));
        }
        Ok(())
    }
}

/// Rebuild a response from a blob made by [`compose`]
///
/// The response's request is reconstructed from the blob too; it has no
/// retry information.
pub fn parse(data: &[u8]) -> Result<Response> {
    let mut reader = Reader { data, pos: 0 };

    let (method, url) = reader
        .line()?
        .split_once(' ')
        .ok_or_else(|| malformed("request line"))?;
    if method.is_empty() || !method.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_') {
        return Err(malformed("request method"));
    }
    let mut creq = CompiledRequest::new(method, url);
    creq.headers = reader.headers()?;

    if let Some(declared) = creq.headers.get("Content-Length") {
        let len = declared
            .trim()
            .parse::<usize>()
            .map_err(|_| malformed("request Content-Length"))?;
        creq.data = Some(Bytes::copy_from_slice(reader.take(len)?));
        reader.expect_eol()?;
    }
    reader.expect_eol()?;

    let status_line = reader.line()?;
    let rest = status_line
        .strip_prefix("HTTP ")
        .ok_or_else(|| malformed("status line"))?;
    let (code, reason) = rest.split_once(' ').unwrap_or((rest, ""));
    let status_code = code.parse::<u16>().map_err(|_| malformed("status code"))?;
    let reason = if reason.is_empty() {
        None
    } else {
        Some(reason.to_string())
    };

    let headers = reader.headers()?;
    let content = Bytes::copy_from_slice(&data[reader.pos..]);

    Ok(Response::new(Arc::new(creq), status_code, reason, headers, content))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exchange(data: Option<&'static [u8]>, request_headers: Headers) -> Response {
        let mut creq = CompiledRequest::new("POST", "http://example.com/form?x=1");
        creq.headers = request_headers;
        creq.data = data.map(Bytes::from_static);
        Response::new(
            Arc::new(creq),
            201,
            Some("Created".to_string()),
            Headers::from([
                ("Set-Cookie", "a=1"),
                ("Content-Type", "text/plain"),
                ("Set-Cookie", "b=2"),
            ]),
            &b"\r\nbinary\x00\xff\r\n"[..],
        )
    }

    #[test]
    fn test_compose_layout() {
        let res = exchange(
            Some(b"k=v"),
            Headers::from([("Content-Length", "3"), ("Accept", "*/*")]),
        );
        let blob = compose(&res).unwrap();
        let expected: &[u8] = b"POST http://example.com/form?x=1\r\n\
            Accept: */*\r\n\
            Content-Length: 3\r\n\
            \r\n\
            k=v\r\n\
            \r\n\
            HTTP 201 Created\r\n\
            Content-Type: text/plain\r\n\
            Set-Cookie: a=1\r\n\
            Set-Cookie: b=2\r\n\
            \r\n\
            \r\nbinary\x00\xff\r\n";
        assert_eq!(blob, expected);
    }

    #[test]
    fn test_parse_inverts_compose() {
        let res = exchange(Some(b"k=v"), Headers::from([("Content-Length", "3")]));
        let parsed = parse(&compose(&res).unwrap()).unwrap();

        assert_eq!(parsed, res);
        assert_eq!(parsed.headers.get_all("Set-Cookie"), vec!["a=1", "b=2"]);
        assert_eq!(parsed.request.data.as_deref(), Some(&b"k=v"[..]));
        assert_eq!(parsed.request.url, res.request.url);
    }

    #[test]
    fn test_repeated_header_order_survives() {
        let mut res = exchange(None, Headers::new());
        res.headers = Headers::from([
            ("Set-Cookie", "sid=zzz"),
            ("Content-Type", "text/plain"),
            ("Set-Cookie", "sid=aaa"),
        ]);
        let parsed = parse(&compose(&res).unwrap()).unwrap();

        assert_eq!(parsed, res);
        assert_eq!(parsed.headers.get_all("Set-Cookie"), vec!["sid=zzz", "sid=aaa"]);
        assert_eq!(parsed.cookies().get("sid"), res.cookies().get("sid"));
        assert_eq!(res.cookies().get("sid"), Some("aaa"));
    }

    #[test]
    fn test_body_without_content_length_is_dropped() {
        let res = exchange(None, Headers::from([("Accept", "*/*")]));
        let blob = compose(&res).unwrap();
        assert!(blob.starts_with(b"POST http://example.com/form?x=1\r\nAccept: */*\r\n\r\n\r\nHTTP 201"));

        let parsed = parse(&blob).unwrap();
        assert_eq!(parsed.request.data, None);
        assert_eq!(parsed.content, res.content);
    }

    #[test]
    fn test_zero_content_length() {
        let res = exchange(None, Headers::from([("Content-Length", "0")]));
        let parsed = parse(&compose(&res).unwrap()).unwrap();
        assert_eq!(parsed.request.data.as_deref(), Some(&b""[..]));
        assert_eq!(parsed, res);
    }

    #[test]
    fn test_length_mismatch_is_fatal() {
        let res = exchange(Some(b"four"), Headers::from([("Content-Length", "3")]));
        assert!(matches!(
            compose(&res),
            Err(Error::CacheConsistency { actual: 4, .. })
        ));
    }

    #[test]
    fn test_missing_reason_and_garbage() {
        let mut res = exchange(None, Headers::new());
        res.reason = None;
        assert_eq!(parse(&compose(&res).unwrap()).unwrap().reason, None);

        assert!(parse(b"not a blob").is_err());
        assert!(parse(b"GET http://x/\r\n\r\n\r\nHTTP abc\r\n\r\n").is_err());
    }
}
