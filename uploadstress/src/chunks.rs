//! Reading a source in fixed-size chunks with an artificial delay between chunks.

use std::io;
use std::time::Duration;

use bytes::Bytes;
use futures::Stream;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Default size of a single chunk read from the source.
pub const DEFAULT_CHUNK_SIZE: usize = 1024;

/// Default delay between two chunks, simulating a slow upstream.
pub const DEFAULT_THROTTLE: Duration = Duration::from_millis(100);

/// Reads an [`AsyncRead`] in chunks of a fixed size.
///
/// Every chunk is exactly `chunk_size` bytes long, except for the last one, which holds the
/// remainder. A source whose length is a multiple of the chunk size produces no trailing empty
/// chunk. The scratch buffer is owned by the reader and reused for every chunk.
#[derive(Debug)]
pub struct ChunkReader<R> {
    reader: R,
    buffer: Box<[u8]>,
    throttle: Duration,
    exhausted: bool,
}

impl<R> ChunkReader<R>
where
    R: AsyncRead + Unpin,
{
    /// Creates a chunk reader without any throttling.
    ///
    /// # Panics
    ///
    /// Panics if `chunk_size` is zero.
    pub fn new(reader: R, chunk_size: usize) -> Self {
        assert!(chunk_size > 0, "chunk size must be positive");
        Self {
            reader,
            buffer: vec![0; chunk_size].into_boxed_slice(),
            throttle: Duration::ZERO,
            exhausted: false,
        }
    }

    /// Sets the delay to wait after reading each chunk, before it is emitted.
    pub fn throttle(mut self, delay: Duration) -> Self {
        self.throttle = delay;
        self
    }

    /// Reads the next chunk, returning `None` once the source is exhausted.
    pub async fn next_chunk(&mut self) -> io::Result<Option<Bytes>> {
        if self.exhausted {
            return Ok(None);
        }

        let mut filled = 0;
        while filled < self.buffer.len() {
            match self.reader.read(&mut self.buffer[filled..]).await {
                Ok(0) => {
                    self.exhausted = true;
                    break;
                }
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }

        if filled == 0 {
            return Ok(None);
        }
        Ok(Some(Bytes::copy_from_slice(&self.buffer[..filled])))
    }

    /// Turns this reader into a stream of throttled chunks.
    ///
    /// The stream ends after the last chunk, or right after yielding the first read error.
    pub fn into_stream(self) -> impl Stream<Item = io::Result<Bytes>> {
        let mut reader = self;
        async_stream::try_stream! {
            while let Some(chunk) = reader.next_chunk().await? {
                if !reader.throttle.is_zero() {
                    tokio::time::sleep(reader.throttle).await;
                }
                yield chunk;
            }
        }
    }
}
