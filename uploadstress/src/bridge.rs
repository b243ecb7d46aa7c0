//! An in-process channel that connects a body producer with an HTTP request body.
//!
//! The [`BodyWriter`] is driven by a producer task, while the [`BodyReader`] is handed to
//! [`reqwest`] as a streaming request body. Only a single chunk is held in flight, so the producer
//! waits until the HTTP client has picked up the previous chunk before it can write the next one.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::Stream;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::error::{Error, Result};

/// Number of chunks that can sit in the bridge before the writer has to wait.
const BRIDGE_CAPACITY: usize = 1;

/// Creates a connected pair of body writer and reader.
pub fn body_bridge() -> (BodyWriter, BodyReader) {
    let (sender, receiver) = mpsc::channel(BRIDGE_CAPACITY);
    let writer = BodyWriter { sender };
    let reader = BodyReader {
        inner: ReceiverStream::new(receiver),
    };
    (writer, reader)
}

/// The write end of a [`body_bridge`].
///
/// Dropping or [closing](Self::close) the writer ends the body stream on the reader side.
#[derive(Debug)]
pub struct BodyWriter {
    sender: mpsc::Sender<io::Result<Bytes>>,
}

impl BodyWriter {
    /// Hands a chunk to the reader, waiting until there is room in the bridge.
    ///
    /// Fails with [`Error::BodyClosed`] if the reader has been dropped.
    pub async fn write(&self, chunk: Bytes) -> Result<()> {
        if chunk.is_empty() {
            return Ok(());
        }
        self.sender
            .send(Ok(chunk))
            .await
            .map_err(|_| Error::BodyClosed)
    }

    /// Closes the bridge, signaling the end of the body to the reader.
    pub fn close(self) {}
}

/// The read end of a [`body_bridge`], usable as a streaming request body.
#[derive(Debug)]
pub struct BodyReader {
    inner: ReceiverStream<io::Result<Bytes>>,
}

impl Stream for BodyReader {
    type Item = io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

impl From<BodyReader> for reqwest::Body {
    fn from(reader: BodyReader) -> Self {
        reqwest::Body::wrap_stream(reader)
    }
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;

    use super::*;

    #[tokio::test]
    async fn forwards_chunks_in_order() {
        let (writer, mut reader) = body_bridge();

        let producer = tokio::spawn(async move {
            for chunk in ["hello", " ", "world"] {
                writer.write(Bytes::from(chunk)).await.unwrap();
            }
            writer.close();
        });

        let mut received = Vec::new();
        while let Some(chunk) = reader.next().await {
            received.extend_from_slice(&chunk.unwrap());
        }
        producer.await.unwrap();

        assert_eq!(received, b"hello world");
    }

    #[tokio::test]
    async fn write_fails_after_reader_dropped() {
        let (writer, reader) = body_bridge();
        drop(reader);

        let result = writer.write(Bytes::from_static(b"abc")).await;
        assert!(matches!(result, Err(Error::BodyClosed)));
    }

    #[tokio::test]
    async fn holds_at_most_one_chunk() {
        let (writer, mut reader) = body_bridge();

        writer.write(Bytes::from_static(b"first")).await.unwrap();
        let second = writer.write(Bytes::from_static(b"second"));
        tokio::pin!(second);

        // The bridge is full, so the second write must wait for the reader.
        assert!(futures::poll!(second.as_mut()).is_pending());

        assert_eq!(reader.next().await.unwrap().unwrap(), "first");
        second.await.unwrap();
        assert_eq!(reader.next().await.unwrap().unwrap(), "second");
    }
}
