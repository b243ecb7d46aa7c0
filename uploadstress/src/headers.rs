//! Loading additional request headers from a JSON file.
//!
//! The file contains a flat JSON object mapping header names to values:
//!
//! ```json
//! {
//!     "Authorization": "Bearer secret",
//!     "X-Request-Source": "uploadstress"
//! }
//! ```

use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

/// Additional headers to send with every upload.
pub type Headers = BTreeMap<String, String>;

/// Loads headers from the JSON file at `path`.
///
/// A file that cannot be opened or parsed yields no headers. The failure is logged, but is
/// otherwise not fatal.
pub fn load_headers(path: &Path) -> Headers {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(error) => {
            tracing::warn!(
                error = &error as &dyn std::error::Error,
                path = %path.display(),
                "error opening headers file"
            );
            return Headers::new();
        }
    };

    match serde_json::from_reader(BufReader::new(file)) {
        Ok(headers) => headers,
        Err(error) => {
            tracing::warn!(
                error = &error as &dyn std::error::Error,
                path = %path.display(),
                "error parsing headers file"
            );
            Headers::new()
        }
    }
}

/// Converts headers into a [`HeaderMap`], skipping invalid names or values.
pub fn to_header_map(headers: &Headers) -> HeaderMap {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let Ok(header_name) = HeaderName::try_from(name.as_str()) else {
            tracing::warn!(header = %name, "skipping invalid header name");
            continue;
        };
        let Ok(header_value) = HeaderValue::try_from(value.as_str()) else {
            tracing::warn!(header = %name, "skipping invalid header value");
            continue;
        };
        map.insert(header_name, header_value);
    }
    map
}
