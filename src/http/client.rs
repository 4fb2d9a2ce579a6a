//! HTTP/1.1 client connection
//!
//! Sends one request and reads one response over any [`SessionOps`]
//! transport. Interim 1xx responses are skipped; the final body is framed
//! by chunked encoding, Content-Length, or the peer closing the connection.

use super::{
    chunked::ChunkedDecoder, Error, HttpSession, ResponseHead, ResponseHeadParser, Result,
    SessionOps, WireRequest,
};
use std::time::Duration;

const READ_CHUNK: usize = 16 * 1024;

/// One-shot HTTP/1.1 client connection
pub struct HttpConnection<S: SessionOps> {
    session: HttpSession<S>,
    /// Bytes read past the current parse position
    pending: Vec<u8>,
}

impl<S: SessionOps> HttpConnection<S> {
    /// Create a new connection over a session
    pub fn new(session: S, timeout: Option<Duration>) -> Self {
        HttpConnection {
            session: HttpSession::new(session, timeout),
            pending: Vec::new(),
        }
    }

    /// Send an HTTP request
    pub fn send_request(&mut self, request: &WireRequest) -> Result<()> {
        self.session.write_all(&request.to_wire())
    }

    fn fill(&mut self) -> Result<usize> {
        let mut temp = vec![0u8; READ_CHUNK];
        let n = self.session.read(&mut temp)?;
        self.pending.extend_from_slice(&temp[..n]);
        Ok(n)
    }

    /// Read the next response head, skipping interim 1xx responses
    pub fn receive_head(&mut self) -> Result<ResponseHead> {
        let mut parser = ResponseHeadParser::new();
        loop {
            let input = std::mem::take(&mut self.pending);
            let parsed = parser.parse(&input)?;
            match parsed {
                Some(head) if head.status.is_informational() => {
                    self.pending = parser.take_remaining();
                    parser.reset();
                }
                Some(head) => {
                    self.pending = parser.take_remaining();
                    return Ok(head);
                }
                None => {
                    if self.fill()? == 0 {
                        return Err(Error::ConnectionClosed);
                    }
                    // `fill` appended to `pending`; hand it to the parser next round
                }
            }
        }
    }

    /// Read the body that follows `head`
    pub fn receive_body(&mut self, head: &ResponseHead, method: &str) -> Result<Vec<u8>> {
        if !head.has_body(method) {
            return Ok(Vec::new());
        }

        if head.is_chunked() {
            return self.receive_chunked_body();
        }

        if let Some(content_length) = head.content_length()? {
            while self.pending.len() < content_length {
                if self.fill()? == 0 {
                    return Err(Error::ConnectionClosed);
                }
            }
            self.pending.truncate(content_length);
            return Ok(std::mem::take(&mut self.pending));
        }

        // No explicit length - read until EOF
        while self.fill()? > 0 {}
        Ok(std::mem::take(&mut self.pending))
    }

    fn receive_chunked_body(&mut self) -> Result<Vec<u8>> {
        let mut decoder = ChunkedDecoder::new();
        let mut output = Vec::new();

        let mut input = std::mem::take(&mut self.pending);
        loop {
            if decoder.decode(&input, &mut output)? {
                return Ok(output);
            }
            if self.fill()? == 0 {
                return Err(Error::ConnectionClosed);
            }
            input = std::mem::take(&mut self.pending);
        }
    }

    /// Read a complete response: head plus body
    pub fn receive_response(&mut self, method: &str) -> Result<(ResponseHead, Vec<u8>)> {
        let head = self.receive_head()?;
        let body = self.receive_body(&head, method)?;
        Ok((head, body))
    }

    /// Close the connection
    pub fn close(&mut self) -> Result<()> {
        self.session.close()
    }

    /// Give back the transport, e.g. after a proxy CONNECT
    pub fn into_session(self) -> S {
        self.session.into_inner()
    }
}
