//! Command line interface of the upload stresstest.

use std::path::PathBuf;

use anyhow::{Context, Result};
use argh::FromArgs;

use crate::config::{Config, Overrides};
use crate::{driver, observability};

/// Uploads a file many times concurrently to stress an upload endpoint.
///
/// Every upload streams the file as a `multipart/form-data` body, reading it in small chunks with an
/// artificial delay in between to simulate slow clients.
#[derive(Debug, FromArgs)]
struct Args {
    /// path to a YAML configuration file
    #[argh(option, short = 'c')]
    config: Option<PathBuf>,

    /// upload URL (default: http://localhost:3000/upload)
    #[argh(option)]
    url: Option<String>,

    /// file to upload (default: img.jpg)
    #[argh(option)]
    file: Option<PathBuf>,

    /// number of requests to send (default: 30)
    #[argh(option)]
    num_requests: Option<usize>,

    /// JSON file with additional request headers, empty to disable (default: headers.json)
    #[argh(option)]
    headers: Option<PathBuf>,

    /// maximum number of uploads in flight (default: all at once)
    #[argh(option)]
    concurrency: Option<usize>,

    /// name of the form field carrying the file (default: file)
    #[argh(option)]
    field_name: Option<String>,

    /// size of the chunks read from the file, such as 4KiB (default: 1KiB)
    #[argh(option)]
    chunk_size: Option<String>,

    /// delay after reading each chunk, such as 50ms (default: 100ms)
    #[argh(option)]
    throttle: Option<String>,
}

impl Args {
    fn overrides(&self) -> Overrides {
        Overrides {
            url: self.url.clone(),
            file: self.file.clone(),
            num_requests: self.num_requests,
            headers: self.headers.clone(),
            concurrency: self.concurrency,
            field_name: self.field_name.clone(),
            chunk_size: self.chunk_size.clone(),
            throttle: self.throttle.clone(),
        }
    }
}

/// Bootstrap the runtime and run the uploads.
///
/// Individual upload failures do not cause an error; only invalid configuration or an unreadable
/// source file do.
pub fn execute() -> Result<()> {
    let args: Args = argh::from_env();
    let config = Config::load(args.config.as_deref(), args.overrides())
        .context("failed to load configuration")?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .thread_name("upload-rt")
        .enable_all()
        .build()?;
    let _runtime_guard = runtime.enter();

    observability::init_tracing(&config.logging);
    tracing::debug!(?config);

    let summary = runtime.block_on(driver::run(&config))?;
    summary.print();

    Ok(())
}
