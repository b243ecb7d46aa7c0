//! Exposes an in-process upload server for use in integration tests.
//!
//! ```
//! use uploadstress_test::server::TestServer;
//!
//! #[tokio::main]
//! async fn main() {
//!    let server = TestServer::new().await;
//!    let url = server.url("/upload");
//!    // upload to the URL, then inspect `server.uploads()`...
//! }
//! ```

use std::net::{SocketAddr, TcpListener};
use std::sync::{Arc, Mutex, PoisonError};

use axum::Router;
use axum::body::Body;
use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use bytes::Bytes;

/// A single part of a received multipart body.
#[derive(Clone, Debug)]
pub struct ReceivedPart {
    /// The form field name of the part.
    pub name: Option<String>,
    /// The file name of the part, if it was sent as a file.
    pub file_name: Option<String>,
    /// The content type of the part.
    pub content_type: Option<String>,
    /// The contents of the part.
    pub data: Bytes,
}

/// A request received on the upload endpoint.
///
/// Requests are recorded even if their body could not be decoded, in which case `parts` holds
/// whatever was decoded before the failure.
#[derive(Clone, Debug)]
pub struct ReceivedUpload {
    /// The request headers.
    pub headers: HeaderMap,
    /// The decoded multipart parts.
    pub parts: Vec<ReceivedPart>,
}

type Uploads = Arc<Mutex<Vec<ReceivedUpload>>>;

/// An in-process upload server for use in integration tests.
///
/// The server accepts `multipart/form-data` uploads via `POST /upload` and records them. It
/// responds with `200 OK` and a short text body for valid uploads, and `400 Bad Request` for bodies
/// that cannot be decoded. It listens on a random available port on localhost.
#[derive(Debug)]
pub struct TestServer {
    handle: tokio::task::JoinHandle<()>,
    socket: SocketAddr,
    uploads: Uploads,
}

impl TestServer {
    /// Starts a new server on a random port.
    pub async fn new() -> Self {
        let addr = SocketAddr::from(([127, 0, 0, 1], 0));
        let listener = TcpListener::bind(addr).unwrap();
        listener.set_nonblocking(true).unwrap();
        let socket = listener.local_addr().unwrap();

        let uploads = Uploads::default();
        let app = Router::new()
            .route("/upload", post(receive_upload))
            .with_state(Arc::clone(&uploads));

        let handle = tokio::spawn(async move {
            let listener = tokio::net::TcpListener::from_std(listener).unwrap();
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            handle,
            socket,
            uploads,
        }
    }

    /// Returns a full URL pointing to the given path.
    ///
    /// This URL uses `localhost` as hostname.
    pub fn url(&self, path: &str) -> String {
        let path = path.trim_start_matches('/');
        format!("http://localhost:{}/{}", self.socket.port(), path)
    }

    /// Returns all uploads received so far, in the order they completed.
    pub fn uploads(&self) -> Vec<ReceivedUpload> {
        self.uploads
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn receive_upload(
    State(uploads): State<Uploads>,
    headers: HeaderMap,
    body: Body,
) -> (StatusCode, String) {
    let mut upload = ReceivedUpload {
        headers,
        parts: Vec::new(),
    };
    let result = decode_parts(&upload.headers, body, &mut upload.parts).await;
    let received: usize = upload.parts.iter().map(|part| part.data.len()).sum();

    uploads
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .push(upload);

    match result {
        Ok(()) => (StatusCode::OK, format!("received {received} bytes")),
        Err(error) => (StatusCode::BAD_REQUEST, error.to_string()),
    }
}

async fn decode_parts(
    headers: &HeaderMap,
    body: Body,
    parts: &mut Vec<ReceivedPart>,
) -> multer::Result<()> {
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    let boundary = match multer::parse_boundary(content_type) {
        Ok(boundary) => boundary,
        Err(error) => {
            // Consume the body anyway, so the client is not cut off mid-request.
            axum::body::to_bytes(body, usize::MAX).await.ok();
            return Err(error);
        }
    };

    let mut multipart = multer::Multipart::new(body.into_data_stream(), boundary);
    while let Some(field) = multipart.next_field().await? {
        let name = field.name().map(str::to_owned);
        let file_name = field.file_name().map(str::to_owned);
        let content_type = field.content_type().map(|mime| mime.to_string());
        let data = field.bytes().await?;

        parts.push(ReceivedPart {
            name,
            file_name,
            content_type,
            data,
        });
    }

    Ok(())
}
