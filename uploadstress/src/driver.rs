//! Fans out uploads concurrently and waits for all of them to finish.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Semaphore;

use crate::config::Config;
use crate::error::Result;
use crate::headers::{Headers, load_headers, to_header_map};
use crate::report::Summary;
use crate::source::Source;
use crate::upload::{UploadSettings, Uploader};

/// Runs all uploads described by `config` and returns their aggregated results.
///
/// The source file is validated before any upload starts. If that fails, the error is returned and
/// no request is made. Otherwise, exactly [`Config::num_requests`] uploads are attempted, at most
/// [`Config::concurrency`] at a time, and this function returns once all of them have finished,
/// regardless of how many failed.
pub async fn run(config: &Config) -> Result<Summary> {
    let source = Source::new(&config.file).await.inspect_err(|error| {
        tracing::error!(
            error = error as &dyn std::error::Error,
            "error opening file"
        );
    })?;
    tracing::info!(
        file = %source.path().display(),
        size = source.len(),
        "loaded source file"
    );

    let headers = if config.headers.as_os_str().is_empty() {
        Headers::new()
    } else {
        load_headers(&config.headers)
    };

    let uploader = Arc::new(Uploader::new(
        reqwest::Client::new(),
        config.url.as_str(),
        to_header_map(&headers),
        source,
        UploadSettings {
            field_name: config.field_name.clone(),
            chunk_size: config.chunk_size(),
            throttle: config.throttle,
        },
    ));

    let concurrency = config.concurrency.unwrap_or(config.num_requests).max(1);
    let semaphore = Arc::new(Semaphore::new(concurrency));
    tracing::info!(
        url = %config.url,
        requests = config.num_requests,
        concurrency,
        "starting uploads"
    );

    let start = Instant::now();
    let tasks: Vec<_> = (0..config.num_requests)
        .map(|worker| {
            let uploader = Arc::clone(&uploader);
            let semaphore = Arc::clone(&semaphore);
            tokio::spawn(async move {
                // The semaphore is never closed, so acquiring can only wait.
                let _permit = semaphore.acquire_owned().await;
                uploader.upload(worker).await
            })
        })
        .collect();

    let finished_tasks = futures::future::join_all(tasks).await;

    let mut summary = Summary::default();
    for task in finished_tasks {
        match task {
            Ok(report) => summary.record(&report),
            Err(error) => {
                tracing::error!(
                    error = &error as &dyn std::error::Error,
                    "upload task failed"
                );
                summary.record_lost();
            }
        }
    }
    summary.duration = start.elapsed();

    tracing::info!(
        succeeded = summary.succeeded,
        failed = summary.failed + summary.rejected,
        "all uploads finished"
    );
    Ok(summary)
}
