//! The file that is uploaded by every worker.

use std::io;
use std::path::{Path, PathBuf};

use tokio::fs::File;

use crate::error::{Error, Result};

/// A validated source file.
///
/// The file is opened once up front to make sure it exists and is readable. Every upload then calls
/// [`open`](Self::open) to get its own file handle, so concurrent uploads never share a read
/// cursor.
#[derive(Clone, Debug)]
pub struct Source {
    path: PathBuf,
    file_name: String,
    len: u64,
}

impl Source {
    /// Validates the file at `path`.
    pub async fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let metadata = match File::open(&path).await {
            Ok(file) => file.metadata().await,
            Err(e) => Err(e),
        };

        let metadata = metadata.map_err(|source| Error::Source {
            path: path.clone(),
            source,
        })?;
        if !metadata.is_file() {
            return Err(Error::Source {
                path,
                source: io::Error::new(io::ErrorKind::InvalidInput, "not a regular file"),
            });
        }

        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string_lossy().into_owned());

        Ok(Self {
            file_name,
            len: metadata.len(),
            path,
        })
    }

    /// The path of the source file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The file name sent along with the upload.
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// The size of the file in bytes, as seen during validation.
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Returns `true` if the file was empty during validation.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Opens a new, independent handle to the file.
    pub async fn open(&self) -> io::Result<File> {
        File::open(&self.path).await
    }
}
