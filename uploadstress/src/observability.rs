//! Logging setup.

use std::env;
use std::io::IsTerminal;

use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use crate::config::{LogFormat, Logging};

/// Installs the global tracing subscriber, writing to stderr.
pub fn init_tracing(logging: &Logging) {
    let format = match logging.format {
        LogFormat::Auto if std::io::stderr().is_terminal() => LogFormat::Pretty,
        LogFormat::Auto => LogFormat::Simplified,
        format => format,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(env_filter(logging.level))
        .with_target(true);

    let result = match format {
        LogFormat::Auto | LogFormat::Pretty => subscriber.compact().try_init(),
        LogFormat::Simplified => subscriber.with_ansi(false).try_init(),
        LogFormat::Json => subscriber.json().flatten_event(true).try_init(),
    };

    if let Err(error) = result {
        eprintln!("failed to initialize logging: {error}");
    }
}

fn env_filter(level: LevelFilter) -> EnvFilter {
    // Try to parse RUST_LOG as a simple level filter and apply it to this crate only. Otherwise,
    // use it literally if the user knows which overrides they want to run.
    let level = match env::var(EnvFilter::DEFAULT_ENV) {
        Ok(value) => match value.parse::<LevelFilter>() {
            Ok(level) => level,
            Err(_) => return EnvFilter::new(value),
        },
        Err(_) => level,
    };

    EnvFilter::new(format!("WARN,uploadstress={level}"))
}
