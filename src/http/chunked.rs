//! Chunked transfer decoding
//!
//! Incremental decoder for `Transfer-Encoding: chunked` response bodies.
//! Input is appended as it is read off the session; decoded bytes are
//! appended to the caller's output buffer.

use super::{Error, Result};
use bytes::{Buf, BytesMut};

#[derive(Debug, Clone, Copy, PartialEq)]
enum DecoderState {
    /// Reading chunk size line
    ChunkSize,
    /// Reading chunk data
    ChunkData { remaining: usize },
    /// Expecting CRLF after chunk data
    ChunkEnd,
    /// Reading trailer headers
    Trailer,
    Complete,
}

/// Chunked transfer encoding decoder
pub struct ChunkedDecoder {
    state: DecoderState,
    input: BytesMut,
}

fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}

/// Parse the hex size at the start of a chunk size line, ignoring extensions
fn parse_chunk_size(line: &[u8]) -> Result<usize> {
    let line = std::str::from_utf8(line)
        .map_err(|_| Error::InvalidChunkSize("non-ASCII size line".to_string()))?;
    let size = line.split(';').next().unwrap_or("").trim();
    usize::from_str_radix(size, 16).map_err(|_| Error::InvalidChunkSize(size.to_string()))
}

impl ChunkedDecoder {
    /// Create a new chunked decoder
    pub fn new() -> Self {
        ChunkedDecoder {
            state: DecoderState::ChunkSize,
            input: BytesMut::new(),
        }
    }

    /// Feed raw bytes and decode as much as possible into `output`
    ///
    /// Returns true once the terminating chunk and trailers were consumed.
    pub fn decode(&mut self, data: &[u8], output: &mut Vec<u8>) -> Result<bool> {
        self.input.extend_from_slice(data);

        loop {
            match self.state {
                DecoderState::ChunkSize => {
                    let Some(pos) = find_crlf(&self.input) else {
                        return Ok(false);
                    };
                    let size = parse_chunk_size(&self.input[..pos])?;
                    self.input.advance(pos + 2);
                    self.state = if size == 0 {
                        DecoderState::Trailer
                    } else {
                        DecoderState::ChunkData { remaining: size }
                    };
                }

                DecoderState::ChunkData { remaining } => {
                    if self.input.is_empty() {
                        return Ok(false);
                    }
                    let take = remaining.min(self.input.len());
                    output.extend_from_slice(&self.input.split_to(take));
                    self.state = if take == remaining {
                        DecoderState::ChunkEnd
                    } else {
                        DecoderState::ChunkData {
                            remaining: remaining - take,
                        }
                    };
                }

                DecoderState::ChunkEnd => {
                    if self.input.len() < 2 {
                        return Ok(false);
                    }
                    if &self.input[..2] != b"\r\n" {
                        return Err(Error::Protocol("Expected CRLF after chunk".to_string()));
                    }
                    self.input.advance(2);
                    self.state = DecoderState::ChunkSize;
                }

                DecoderState::Trailer => {
                    let Some(pos) = find_crlf(&self.input) else {
                        return Ok(false);
                    };
                    self.input.advance(pos + 2);
                    // An empty line ends the trailer section
                    if pos == 0 {
                        self.state = DecoderState::Complete;
                    }
                }

                DecoderState::Complete => return Ok(true),
            }
        }
    }

    /// Check if decoding is complete
    pub fn is_complete(&self) -> bool {
        self.state == DecoderState::Complete
    }
}

impl Default for ChunkedDecoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Decode complete chunked body from bytes
pub fn decode_chunked_body(input: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = ChunkedDecoder::new();
    let mut output = Vec::new();
    if !decoder.decode(input, &mut output)? {
        return Err(Error::Incomplete);
    }
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_multiple_chunks() {
        let input = b"5\r\nHello\r\n6\r\n World\r\n0\r\n\r\n";
        let output = decode_chunked_body(input).unwrap();
        assert_eq!(output, b"Hello World");
    }

    #[test]
    fn test_decode_with_extension_and_trailer() {
        let input = b"5;name=value\r\nHello\r\n0\r\nX-Trailer: yes\r\n\r\n";
        let output = decode_chunked_body(input).unwrap();
        assert_eq!(output, b"Hello");
    }

    #[test]
    fn test_decoder_incremental() {
        let input = b"a\r\n0123456789\r\n3\r\nabc\r\n0\r\n\r\n";
        let mut decoder = ChunkedDecoder::new();
        let mut output = Vec::new();

        let mut complete = false;
        for piece in input.chunks(4) {
            complete = decoder.decode(piece, &mut output).unwrap();
        }

        assert!(complete);
        assert!(decoder.is_complete());
        assert_eq!(output, b"0123456789abc");
    }

    #[test]
    fn test_truncated_body() {
        assert!(matches!(
            decode_chunked_body(b"5\r\nHel"),
            Err(Error::Incomplete)
        ));
        assert!(matches!(
            decode_chunked_body(b"zz\r\n"),
            Err(Error::InvalidChunkSize(_))
        ));
    }
}
