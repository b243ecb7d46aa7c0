//! A streaming `multipart/form-data` writer on top of a [`BodyWriter`].
//!
//! Compared to `reqwest`'s `multipart::Form`, this writer is fed chunk by chunk from a producer
//! task, so the caller controls the pace at which the file part is written.

use std::fmt::Write as _;

use bytes::{BufMut, Bytes, BytesMut};

use crate::bridge::BodyWriter;
use crate::error::Result;

/// Number of random bytes used to generate a boundary.
const BOUNDARY_BYTES: usize = 30;

/// Content type of file parts.
const FILE_CONTENT_TYPE: &str = "application/octet-stream";

/// Generates a random multipart boundary.
pub fn random_boundary() -> String {
    let bytes: [u8; BOUNDARY_BYTES] = rand::random();
    let mut boundary = String::with_capacity(BOUNDARY_BYTES * 2);
    for byte in bytes {
        let _ = write!(boundary, "{byte:02x}");
    }
    boundary
}

/// Writes a `multipart/form-data` body into a [`BodyWriter`].
///
/// Call [`create_form_file`](Self::create_form_file) to start a file part, then
/// [`write`](Self::write) its contents. [`close`](Self::close) writes the trailing boundary. The
/// underlying writer is not closed by this type; use [`into_inner`](Self::into_inner) to get it
/// back and close it after the multipart writer.
#[derive(Debug)]
pub struct MultipartWriter {
    inner: BodyWriter,
    boundary: String,
    has_parts: bool,
    written: u64,
}

impl MultipartWriter {
    /// Creates a multipart writer with a random boundary.
    pub fn new(inner: BodyWriter) -> Self {
        Self::with_boundary(inner, random_boundary())
    }

    /// Creates a multipart writer with the given boundary.
    pub fn with_boundary(inner: BodyWriter, boundary: impl Into<String>) -> Self {
        Self {
            inner,
            boundary: boundary.into(),
            has_parts: false,
            written: 0,
        }
    }

    /// The `Content-Type` header value for a request carrying this body.
    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }

    /// Total number of bytes written to the underlying writer so far.
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Starts a new file part with the given form field name and file name.
    pub async fn create_form_file(&mut self, field_name: &str, file_name: &str) -> Result<()> {
        let mut header = BytesMut::with_capacity(self.boundary.len() + 128);
        if self.has_parts {
            header.put(&b"\r\n"[..]);
        }
        header.put(&b"--"[..]);
        header.put(self.boundary.as_bytes());
        header.put(&b"\r\n"[..]);
        header.put(
            format!(
                "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                escape_quotes(field_name),
                escape_quotes(file_name),
            )
            .as_bytes(),
        );
        header.put(format!("Content-Type: {FILE_CONTENT_TYPE}\r\n\r\n").as_bytes());

        self.has_parts = true;
        self.send(header.freeze()).await
    }

    /// Writes raw bytes into the current part.
    pub async fn write(&mut self, chunk: Bytes) -> Result<()> {
        self.send(chunk).await
    }

    /// Writes the closing boundary.
    pub async fn close(&mut self) -> Result<()> {
        let mut trailer = BytesMut::with_capacity(self.boundary.len() + 8);
        if self.has_parts {
            trailer.put(&b"\r\n"[..]);
        }
        trailer.put(&b"--"[..]);
        trailer.put(self.boundary.as_bytes());
        trailer.put(&b"--\r\n"[..]);

        self.send(trailer.freeze()).await
    }

    /// Returns the underlying writer without finishing the body.
    pub fn into_inner(self) -> BodyWriter {
        self.inner
    }

    async fn send(&mut self, bytes: Bytes) -> Result<()> {
        let len = bytes.len() as u64;
        self.inner.write(bytes).await?;
        self.written += len;
        Ok(())
    }
}

fn escape_quotes(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;

    use futures::StreamExt;

    use super::*;
    use crate::bridge::body_bridge;

    async fn encode(boundary: &str, field: &str, file_name: &str, chunks: Vec<Bytes>) -> Bytes {
        let (writer, mut reader) = body_bridge();
        let mut multipart = MultipartWriter::with_boundary(writer, boundary);
        let field = field.to_owned();
        let file_name = file_name.to_owned();

        let producer = tokio::spawn(async move {
            multipart.create_form_file(&field, &file_name).await.unwrap();
            for chunk in chunks {
                multipart.write(chunk).await.unwrap();
            }
            multipart.close().await.unwrap();
            multipart.into_inner().close();
        });

        let mut body = BytesMut::new();
        while let Some(chunk) = reader.next().await {
            body.extend_from_slice(&chunk.unwrap());
        }
        producer.await.unwrap();
        body.freeze()
    }

    #[tokio::test]
    async fn writes_standard_framing() {
        let body = encode(
            "xyz",
            "file",
            "img.jpg",
            vec![Bytes::from("hello "), Bytes::from("world")],
        )
        .await;

        let expected = "--xyz\r\n\
            Content-Disposition: form-data; name=\"file\"; filename=\"img.jpg\"\r\n\
            Content-Type: application/octet-stream\r\n\
            \r\n\
            hello world\r\n\
            --xyz--\r\n";
        assert_eq!(body, expected);
    }

    #[tokio::test]
    async fn decodes_to_original_bytes() {
        let data: Vec<u8> = (0..5000).map(|i| (i * 7 % 256) as u8).collect();
        let chunks = data.chunks(1024).map(Bytes::copy_from_slice).collect();
        let boundary = random_boundary();
        let body = encode(&boundary, "file", "data.bin", chunks).await;

        let stream = futures::stream::once(async move { Ok::<_, Infallible>(body) });
        let mut multipart = multer::Multipart::new(stream, boundary);

        let field = multipart.next_field().await.unwrap().unwrap();
        assert_eq!(field.name(), Some("file"));
        assert_eq!(field.file_name(), Some("data.bin"));
        assert_eq!(
            field.content_type().map(|m| m.to_string()).as_deref(),
            Some(FILE_CONTENT_TYPE)
        );
        assert_eq!(field.bytes().await.unwrap(), data);

        assert!(multipart.next_field().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn escapes_quotes_in_names() {
        let body = encode("b", "file", "we\"ird\\name", vec![]).await;
        let body = std::str::from_utf8(&body).unwrap();

        assert!(body.contains(r#"filename="we\"ird\\name""#));
    }

    #[tokio::test]
    async fn empty_body_has_only_trailer() {
        let (writer, mut reader) = body_bridge();
        let mut multipart = MultipartWriter::with_boundary(writer, "b");

        let producer = tokio::spawn(async move {
            multipart.close().await.unwrap();
            multipart.into_inner().close();
        });
        let trailer = reader.next().await.unwrap().unwrap();
        producer.await.unwrap();

        assert_eq!(trailer, "--b--\r\n");
        assert!(reader.next().await.is_none());
    }

    #[test]
    fn boundary_is_hex() {
        let boundary = random_boundary();
        assert_eq!(boundary.len(), 60);
        assert!(boundary.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(boundary, random_boundary());
    }

    #[test]
    fn content_type_carries_boundary() {
        let (writer, _reader) = body_bridge();
        let multipart = MultipartWriter::with_boundary(writer, "abc");
        assert_eq!(multipart.content_type(), "multipart/form-data; boundary=abc");
    }
}
