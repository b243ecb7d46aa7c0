use std::io;
use std::path::PathBuf;

/// Errors that can happen while uploading.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Any error emitted from the underlying [`reqwest`] client.
    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),
    /// IO errors related to reading the source file.
    #[error(transparent)]
    Io(#[from] io::Error),
    /// The source file could not be opened before launching uploads.
    #[error("failed to open source file `{}`: {source}", .path.display())]
    Source {
        /// The path that was attempted.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The reading end of the body bridge was dropped before the body was fully written.
    ///
    /// This usually means the HTTP client gave up on the request.
    #[error("request body was closed by the receiver")]
    BodyClosed,
    /// An upload task panicked or was cancelled.
    #[error("upload task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// A convenience alias that defaults our [`Error`] type.
pub type Result<T, E = Error> = std::result::Result<T, E>;
