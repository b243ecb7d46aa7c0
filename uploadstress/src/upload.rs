//! A single streaming multipart upload.

use std::io::{self, Write};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use futures::StreamExt;
use reqwest::StatusCode;
use reqwest::header::{CONTENT_TYPE, HeaderMap};
use tokio::fs::File;
use tracing::Instrument;

use crate::bridge::body_bridge;
use crate::chunks::ChunkReader;
use crate::error::{Error, Result};
use crate::multipart::MultipartWriter;
use crate::source::Source;

/// Settings that control how the body of an upload is produced.
#[derive(Clone, Debug)]
pub struct UploadSettings {
    /// Name of the form field carrying the file.
    pub field_name: String,
    /// Size of the chunks read from the source.
    pub chunk_size: usize,
    /// Delay after reading each chunk.
    pub throttle: Duration,
}

/// The outcome of a single upload.
#[derive(Debug)]
pub struct UploadReport {
    /// Index of the worker that performed the upload.
    pub worker: usize,
    /// Time from starting the upload until the response body was read or the upload failed.
    pub elapsed: Duration,
    /// Number of request body bytes handed to the HTTP client, including multipart framing.
    pub bytes_sent: u64,
    /// The response status, or the error that prevented a response.
    pub result: Result<StatusCode>,
}

/// Performs uploads of a [`Source`] to a fixed URL.
///
/// The uploader is shared read-only by all workers.
#[derive(Debug)]
pub struct Uploader {
    client: reqwest::Client,
    url: String,
    headers: HeaderMap,
    source: Source,
    settings: UploadSettings,
}

impl Uploader {
    /// Creates an uploader sending `source` to `url`.
    ///
    /// `headers` are applied to every request after the multipart `Content-Type`, so a
    /// `Content-Type` entry in `headers` replaces it.
    pub fn new(
        client: reqwest::Client,
        url: impl Into<String>,
        headers: HeaderMap,
        source: Source,
        settings: UploadSettings,
    ) -> Self {
        Self {
            client,
            url: url.into(),
            headers,
            source,
            settings,
        }
    }

    /// Performs a single upload and prints the response to stdout.
    ///
    /// Failures are logged and returned as part of the report, they never affect other uploads.
    pub async fn upload(self: Arc<Self>, worker: usize) -> UploadReport {
        let start = Instant::now();
        let (result, bytes_sent) = self
            .perform()
            .instrument(tracing::info_span!("upload", worker))
            .await;

        if let Err(ref error) = result {
            tracing::error!(
                worker,
                error = error as &dyn std::error::Error,
                "upload failed"
            );
        }

        UploadReport {
            worker,
            elapsed: start.elapsed(),
            bytes_sent,
            result,
        }
    }

    async fn perform(self: &Arc<Self>) -> (Result<StatusCode>, u64) {
        tracing::debug!(url = %self.url, "uploading file");

        let (writer, reader) = body_bridge();
        let multipart = MultipartWriter::new(writer);
        let content_type = multipart.content_type();

        let producer = tokio::spawn(
            Arc::clone(self)
                .produce(multipart)
                .instrument(tracing::Span::current()),
        );

        let result = self.send(&content_type, reader.into()).await;

        // Dropping the request body above ends the producer, so this never waits on a stalled write.
        match producer.await {
            Ok(bytes_sent) => (result, bytes_sent),
            Err(error) => (Err(error.into()), 0),
        }
    }

    async fn send(&self, content_type: &str, body: reqwest::Body) -> Result<StatusCode> {
        let request = self
            .client
            .post(self.url.as_str())
            .header(CONTENT_TYPE, content_type)
            .headers(self.headers.clone())
            .body(body)
            .build()?;

        tracing::debug!(content_type, "sending request");
        let response = self.client.execute(request).await?;

        let status = response.status();
        let body = response.bytes().await.unwrap_or_else(|error| {
            tracing::debug!(
                error = &error as &dyn std::error::Error,
                "error reading response body"
            );
            Bytes::new()
        });
        print_response(status, &String::from_utf8_lossy(&body));

        Ok(status)
    }

    /// Streams the source through the multipart writer into the request body.
    ///
    /// Returns the number of bytes written into the body. On every path, including a failure to
    /// open or read the source, the multipart writer is closed first to write the trailer, and the
    /// body writer second to end the request body.
    async fn produce(self: Arc<Self>, mut multipart: MultipartWriter) -> u64 {
        tracing::trace!("starting producer");

        match self.source.open().await {
            Ok(file) => match self.write_part(&mut multipart, file).await {
                // Read errors are logged by `write_part`.
                Ok(()) | Err(Error::Io(_)) => (),
                Err(error) => log_write_error(&error),
            },
            Err(error) => tracing::error!(
                error = &error as &dyn std::error::Error,
                "error opening source file"
            ),
        }

        match multipart.close().await {
            Ok(()) => tracing::debug!(bytes = multipart.written(), "finished writing file"),
            Err(error) => log_write_error(&error),
        }

        let written = multipart.written();
        multipart.into_inner().close();
        written
    }

    async fn write_part(&self, multipart: &mut MultipartWriter, file: File) -> Result<()> {
        let settings = &self.settings;
        multipart
            .create_form_file(&settings.field_name, self.source.file_name())
            .await?;
        tracing::trace!("created form file part");

        let chunks = ChunkReader::new(file, settings.chunk_size)
            .throttle(settings.throttle)
            .into_stream();
        futures::pin_mut!(chunks);

        while let Some(chunk) = chunks.next().await {
            let chunk = chunk.inspect_err(|error| {
                tracing::error!(
                    error = error as &dyn std::error::Error,
                    "error reading file"
                );
            })?;

            let len = chunk.len();
            multipart.write(chunk).await?;
            tracing::trace!(bytes = len, "wrote chunk");
        }

        Ok(())
    }
}

fn log_write_error(error: &Error) {
    tracing::debug!(
        error = error as &dyn std::error::Error,
        "error writing data to part"
    );
}

fn print_response(status: StatusCode, body: &str) {
    let mut stdout = io::stdout().lock();
    // Both lines are written under the same lock so concurrent responses do not interleave.
    writeln!(stdout, "Response Status: {status}").ok();
    writeln!(stdout, "Response Body: {body}").ok();
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use uploadstress_test::server::TestServer;

    use super::*;

    fn settings() -> UploadSettings {
        UploadSettings {
            field_name: "file".to_owned(),
            chunk_size: 1024,
            throttle: Duration::ZERO,
        }
    }

    async fn source(contents: &[u8]) -> (tempfile::NamedTempFile, Source) {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents).unwrap();
        let source = Source::new(file.path()).await.unwrap();
        (file, source)
    }

    #[tokio::test]
    async fn uploads_file_as_multipart() {
        let server = TestServer::new().await;
        let contents: Vec<u8> = (0..2500).map(|i| (i % 256) as u8).collect();
        let (_file, source) = source(&contents).await;
        let file_name = source.file_name().to_owned();

        let uploader = Arc::new(Uploader::new(
            reqwest::Client::new(),
            server.url("/upload"),
            HeaderMap::new(),
            source,
            settings(),
        ));
        let report = uploader.upload(3).await;

        assert_eq!(report.worker, 3);
        assert_eq!(report.result.unwrap(), StatusCode::OK);
        assert!(report.bytes_sent > contents.len() as u64);

        let uploads = server.uploads();
        assert_eq!(uploads.len(), 1);
        let part = &uploads[0].parts[0];
        assert_eq!(part.name.as_deref(), Some("file"));
        assert_eq!(part.file_name.as_deref(), Some(file_name.as_str()));
        assert_eq!(part.data, contents);
        assert!(
            uploads[0].headers[CONTENT_TYPE]
                .to_str()
                .unwrap()
                .starts_with("multipart/form-data; boundary=")
        );
    }

    #[tokio::test]
    async fn custom_headers_overwrite_content_type() {
        let server = TestServer::new().await;
        let (_file, source) = source(b"hello").await;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, "application/octet-stream".parse().unwrap());
        headers.insert("x-upload-test", "yes".parse().unwrap());

        let uploader = Arc::new(Uploader::new(
            reqwest::Client::new(),
            server.url("/upload"),
            headers,
            source,
            settings(),
        ));
        let report = uploader.upload(0).await;

        // The server cannot decode the body without a multipart content type.
        assert_eq!(report.result.unwrap(), StatusCode::BAD_REQUEST);

        let uploads = server.uploads();
        assert_eq!(uploads[0].headers[CONTENT_TYPE], "application/octet-stream");
        assert_eq!(uploads[0].headers["x-upload-test"], "yes");
    }

    #[tokio::test]
    async fn connection_failure_is_reported() {
        // Bind and immediately release a port, so nothing listens on it.
        let addr = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap();
        let url = format!("http://{addr}/upload");
        let (_file, source) = source(&[0; 4096]).await;

        let uploader = Arc::new(Uploader::new(
            reqwest::Client::new(),
            url,
            HeaderMap::new(),
            source,
            settings(),
        ));
        let report = uploader.upload(0).await;

        assert!(matches!(report.result, Err(Error::Reqwest(_))));
    }

    #[tokio::test]
    async fn invalid_url_is_reported() {
        let (_file, source) = source(b"hello").await;

        let uploader = Arc::new(Uploader::new(
            reqwest::Client::new(),
            "not a url",
            HeaderMap::new(),
            source,
            settings(),
        ));
        let report = uploader.upload(0).await;

        assert!(matches!(report.result, Err(Error::Reqwest(_))));
    }

    #[tokio::test]
    async fn vanished_source_sends_empty_form() {
        let server = TestServer::new().await;
        let (file, source) = source(b"hello").await;
        drop(file);

        let uploader = Arc::new(Uploader::new(
            reqwest::Client::new(),
            server.url("/upload"),
            HeaderMap::new(),
            source,
            settings(),
        ));
        let report = uploader.upload(0).await;

        // Only the closing boundary: `--` + 60 hex characters + `--\r\n`.
        assert_eq!(report.bytes_sent, 66);
        assert!(server.uploads().iter().all(|upload| upload.parts.is_empty()));
    }

    #[tokio::test]
    async fn read_error_still_finishes_the_form() {
        let server = TestServer::new().await;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("img.jpg");
        std::fs::write(&path, b"hello").unwrap();
        let source = Source::new(path.clone()).await.unwrap();

        // Opening a directory succeeds, but the first read from it fails.
        std::fs::remove_file(&path).unwrap();
        std::fs::create_dir(&path).unwrap();

        let uploader = Arc::new(Uploader::new(
            reqwest::Client::new(),
            server.url("/upload"),
            HeaderMap::new(),
            source,
            settings(),
        ));
        let report = uploader.upload(0).await;

        // The trailer is written before the body ends, so the server sees a complete form.
        assert_eq!(report.result.unwrap(), StatusCode::OK);
        let uploads = server.uploads();
        assert_eq!(uploads.len(), 1);
        let parts = &uploads[0].parts;
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].file_name.as_deref(), Some("img.jpg"));
        assert!(parts[0].data.is_empty());
    }

    /// Accepts one request and answers with a body shorter than its `Content-Length`.
    async fn truncated_response_server() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0; 4096];
            // The streamed body is chunked, ending with an empty chunk.
            while !request.ends_with(b"0\r\n\r\n") {
                let n = stream.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }
            stream
                .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 100\r\n\r\ntoo short")
                .await
                .unwrap();
        });

        format!("http://{addr}/upload")
    }

    #[tokio::test]
    async fn truncated_response_body_keeps_status() {
        let url = truncated_response_server().await;
        let (_file, source) = source(b"hello").await;

        let uploader = Arc::new(Uploader::new(
            reqwest::Client::new(),
            url,
            HeaderMap::new(),
            source,
            settings(),
        ));
        let report = uploader.upload(0).await;

        assert_eq!(report.result.unwrap(), StatusCode::OK);
    }
}
