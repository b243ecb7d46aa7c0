//! Configuration for the upload stresstest.
//!
//! Configuration is merged from the following sources, later ones overriding earlier ones:
//!
//! 1. Defaults
//! 2. YAML configuration file (specified via `-c` or `--config` flag)
//! 3. Environment variables (prefixed with `UPLOADSTRESS__`)
//! 4. Command line flags
//!
//! # Environment Variables
//!
//! Environment variables use `UPLOADSTRESS__` as a prefix and double underscores (`__`) to denote
//! nested configuration structures. For example:
//!
//! - `UPLOADSTRESS__URL=http://localhost:3000/upload` sets the target URL
//! - `UPLOADSTRESS__NUM_REQUESTS=100` sets the number of uploads
//! - `UPLOADSTRESS__LOGGING__LEVEL=debug` sets the log level
//!
//! # YAML Configuration File
//!
//! ```yaml
//! url: http://localhost:3000/upload
//! file: img.jpg
//! num_requests: 100
//! concurrency: 20
//! chunk_size: 4KiB
//! throttle: 50ms
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use bytesize::ByteSize;
use figment::providers::{Env, Format, Serialized, Yaml};
use serde::{Deserialize, Serialize};
use tracing::level_filters::LevelFilter;

use crate::chunks::{DEFAULT_CHUNK_SIZE, DEFAULT_THROTTLE};

/// Environment variable prefix for all configuration options.
const ENV_PREFIX: &str = "UPLOADSTRESS__";

/// Largest accepted chunk size. Every upload holds a buffer of this size.
const MAX_CHUNK_SIZE: ByteSize = ByteSize::mib(64);

/// Runtime configuration of the upload stresstest.
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// The URL every upload is sent to.
    ///
    /// Defaults to `http://localhost:3000/upload`.
    pub url: String,

    /// Path of the file to upload.
    ///
    /// Defaults to `img.jpg` in the working directory.
    pub file: PathBuf,

    /// Total number of uploads to perform.
    ///
    /// Defaults to `30`.
    pub num_requests: usize,

    /// Path of a JSON file with additional request headers.
    ///
    /// An empty path disables loading headers. A missing or malformed file yields no headers.
    /// Defaults to `headers.json`.
    pub headers: PathBuf,

    /// Maximum number of uploads in flight at the same time.
    ///
    /// When unset, all uploads are started at once.
    pub concurrency: Option<usize>,

    /// Name of the form field carrying the file.
    ///
    /// Defaults to `file`.
    pub field_name: String,

    /// Size of the chunks read from the source file.
    ///
    /// Defaults to 1 KiB.
    pub chunk_size: ByteSize,

    /// Delay inserted after reading each chunk, simulating a slow client.
    ///
    /// Defaults to `100ms`.
    #[serde(with = "humantime_serde")]
    pub throttle: Duration,

    /// Logging configuration.
    pub logging: Logging,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            url: "http://localhost:3000/upload".to_owned(),
            file: PathBuf::from("img.jpg"),
            num_requests: 30,
            headers: PathBuf::from("headers.json"),
            concurrency: None,
            field_name: "file".to_owned(),
            chunk_size: ByteSize::b(DEFAULT_CHUNK_SIZE as u64),
            throttle: DEFAULT_THROTTLE,
            logging: Logging::default(),
        }
    }
}

impl Config {
    /// Loads configuration from defaults, an optional YAML file, the environment, and `overrides`.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The YAML configuration file cannot be read or parsed
    /// - Environment variables or overrides contain invalid values
    /// - The chunk size or concurrency is zero
    /// - The chunk size exceeds 64 MiB
    pub fn load(path: Option<&Path>, overrides: Overrides) -> Result<Self> {
        let mut figment = figment::Figment::from(Serialized::defaults(Config::default()));
        if let Some(path) = path {
            figment = figment.merge(Yaml::file(path));
        }
        let config: Config = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .merge(Serialized::defaults(overrides))
            .extract()?;

        config.validate()?;
        Ok(config)
    }

    /// The size of chunks read from the source file, in bytes.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size.as_u64() as usize
    }

    fn validate(&self) -> Result<()> {
        if self.chunk_size.as_u64() == 0 {
            anyhow::bail!("chunk_size must be positive");
        }
        if self.chunk_size > MAX_CHUNK_SIZE {
            anyhow::bail!("chunk_size must not exceed {MAX_CHUNK_SIZE}");
        }
        if self.concurrency == Some(0) {
            anyhow::bail!("concurrency must be positive");
        }
        Ok(())
    }
}

/// Configuration values passed on the command line.
///
/// Fields that are `None` leave the value from other sources untouched.
#[derive(Debug, Default, Serialize)]
pub struct Overrides {
    /// See [`Config::url`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// See [`Config::file`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
    /// See [`Config::num_requests`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_requests: Option<usize>,
    /// See [`Config::headers`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headers: Option<PathBuf>,
    /// See [`Config::concurrency`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<usize>,
    /// See [`Config::field_name`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field_name: Option<String>,
    /// See [`Config::chunk_size`], in a human readable format such as `4KiB`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_size: Option<String>,
    /// See [`Config::throttle`], in a human readable format such as `50ms`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub throttle: Option<String>,
}

/// Logging configuration.
///
/// Logs are always written to stderr, so they do not mix with the responses on stdout.
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Logging {
    /// Minimum log level to output.
    ///
    /// The `RUST_LOG` environment variable takes precedence if it is set.
    ///
    /// Defaults to `INFO`.
    #[serde(with = "display_fromstr")]
    pub level: LevelFilter,

    /// Log output format.
    ///
    /// Defaults to [`LogFormat::Auto`].
    pub format: LogFormat,
}

impl Default for Logging {
    fn default() -> Self {
        Self {
            level: LevelFilter::INFO,
            format: LogFormat::Auto,
        }
    }
}

/// Log output format.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Pretty output on a TTY, simplified output otherwise.
    Auto,

    /// Pretty printing with colors.
    Pretty,

    /// Simplified plain text output.
    Simplified,

    /// JSON lines.
    Json,
}

mod display_fromstr {
    pub fn serialize<T, S>(value: &T, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
        T: std::fmt::Display,
    {
        serializer.collect_str(&value)
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<T, D::Error>
    where
        D: serde::Deserializer<'de>,
        T: std::str::FromStr,
        <T as std::str::FromStr>::Err: std::fmt::Display,
    {
        use serde::Deserialize;
        let s = <std::borrow::Cow<'de, str>>::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
