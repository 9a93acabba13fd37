//! Newline framing over a chunked HTTP body.
//!
//! Chunk boundaries never line up with records, so bytes are buffered until a
//! `\n` shows up. Empty lines are keep-alives and come back as empty records.

use crate::error::StreamError;
use bytes::Bytes;
use futures::stream::{BoxStream, StreamExt};
use std::time::Duration;

pub type ByteStream = BoxStream<'static, Result<Bytes, StreamError>>;

#[derive(Debug)]
pub struct LineFramer {
    buf: Vec<u8>,
    // bytes of `buf` already known to contain no newline
    scanned: usize,
    max_line_bytes: usize,
}

impl LineFramer {
    /// `chunk_size` only pre-sizes the buffer. The upstream body decides how
    /// many bytes each read delivers.
    pub fn new(chunk_size: usize, max_line_bytes: usize) -> Self {
        Self {
            buf: Vec::with_capacity(chunk_size),
            scanned: 0,
            max_line_bytes,
        }
    }

    pub fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Pops the next complete line, without its terminator.
    pub fn next_line(&mut self) -> Result<Option<Vec<u8>>, StreamError> {
        match self.buf[self.scanned..].iter().position(|b| *b == b'\n') {
            Some(offset) => {
                let end = self.scanned + offset;
                let mut line: Vec<u8> = self.buf.drain(..=end).collect();
                line.pop();
                if line.last() == Some(&b'\r') {
                    line.pop();
                }
                self.scanned = 0;
                Ok(Some(line))
            }
            None => {
                self.scanned = self.buf.len();
                if self.buf.len() > self.max_line_bytes {
                    return Err(StreamError::LineTooLong {
                        limit: self.max_line_bytes,
                    });
                }
                Ok(None)
            }
        }
    }

    /// Whatever is left once the body has ended.
    pub fn finish(&mut self) -> Option<Vec<u8>> {
        if self.buf.is_empty() {
            return None;
        }
        self.scanned = 0;
        let mut rest = std::mem::take(&mut self.buf);
        if rest.last() == Some(&b'\r') {
            rest.pop();
        }
        Some(rest)
    }
}

pub struct StreamReader {
    inner: ByteStream,
    framer: LineFramer,
    stall_timeout: Option<Duration>,
    ended: bool,
}

impl StreamReader {
    pub fn new(
        inner: ByteStream,
        chunk_size: usize,
        max_line_bytes: usize,
        stall_timeout: Option<Duration>,
    ) -> Self {
        Self {
            inner,
            framer: LineFramer::new(chunk_size, max_line_bytes),
            stall_timeout,
            ended: false,
        }
    }

    /// `Ok(None)` once the upstream body has closed and every buffered line was returned.
    pub async fn next_line(&mut self) -> Result<Option<Vec<u8>>, StreamError> {
        loop {
            if let Some(line) = self.framer.next_line()? {
                return Ok(Some(line));
            }
            if self.ended {
                return Ok(self.framer.finish());
            }

            let next = match self.stall_timeout {
                Some(limit) => tokio::time::timeout(limit, self.inner.next())
                    .await
                    .map_err(|_| StreamError::Stalled(limit))?,
                None => self.inner.next().await,
            };

            match next {
                Some(Ok(chunk)) => self.framer.push(&chunk),
                Some(Err(e)) => return Err(e),
                None => self.ended = true,
            }
        }
    }
}
