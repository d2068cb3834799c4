//! Carves a byte stream into fixed-size chunks.
//!
//! Every chunk is exactly `max_chunk_bytes` long except the last one, which may
//! be shorter. A chunk is never empty, so an empty source yields no chunks at all.

use bytes::{Bytes, BytesMut};
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Largest single read issued against the source.
const READ_SIZE: usize = 64 * 1024;

pub struct ChunkSplitter<R> {
    // dropped as soon as the source reports end of data
    reader: Option<R>,
    buffer: BytesMut,
    max_chunk_bytes: usize,
    closed: bool,
}

impl<R: AsyncRead + Unpin> ChunkSplitter<R> {
    /// A `max_chunk_bytes` of zero is treated as one.
    pub fn new(reader: R, max_chunk_bytes: usize) -> Self {
        let max_chunk_bytes = max_chunk_bytes.max(1);
        Self {
            reader: Some(reader),
            buffer: BytesMut::with_capacity(max_chunk_bytes.min(READ_SIZE)),
            max_chunk_bytes,
            closed: false,
        }
    }

    pub fn max_chunk_bytes(&self) -> usize {
        self.max_chunk_bytes
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Pulls the next chunk, or `None` once the source is drained.
    ///
    /// The source is only read from inside this call. Reads never ask for more
    /// than what is missing to complete the current chunk, so leftover bytes
    /// stay below `max_chunk_bytes` between calls.
    pub async fn next_chunk(&mut self) -> io::Result<Option<Bytes>> {
        if self.closed {
            return Ok(None);
        }

        while self.buffer.len() < self.max_chunk_bytes {
            let Some(reader) = self.reader.as_mut() else {
                break;
            };
            let wanted = (self.max_chunk_bytes - self.buffer.len()).min(READ_SIZE);
            self.buffer.reserve(wanted);
            let read = reader.take(wanted as u64).read_buf(&mut self.buffer).await?;
            if read == 0 {
                self.reader = None;
            }
        }

        if self.buffer.len() >= self.max_chunk_bytes {
            return Ok(Some(self.buffer.split_to(self.max_chunk_bytes).freeze()));
        }

        self.closed = true;
        if self.buffer.is_empty() {
            Ok(None)
        } else {
            Ok(Some(self.buffer.split().freeze()))
        }
    }
}
