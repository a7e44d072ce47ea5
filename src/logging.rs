//! Diagnostic tracing.
//!
//! Filter comes from `WEFT_LOG`, then `RUST_LOG`, default `warn`. `--verbose`
//! raises weft's own targets to `debug`. Output goes to stderr, compact or JSON.
//! When the project has a `.weft/logs/` directory, a daily JSON log file is
//! written there as well.
//!
//! User-facing output (progress, reports) never goes through tracing.

use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

pub const LOG_ENV: &str = "WEFT_LOG";

/// Build the filter from the environment and the verbose flag.
pub fn env_filter(verbose: bool) -> EnvFilter {
    let base = std::env::var(LOG_ENV)
        .ok()
        .or_else(|| std::env::var("RUST_LOG").ok())
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| "warn".to_string());
    let directives = if verbose {
        format!("{},weft=debug", base)
    } else {
        base
    };
    EnvFilter::try_new(&directives).unwrap_or_else(|_| EnvFilter::new("warn"))
}

/// Install the global subscriber. Keep the returned guard alive for the life
/// of the process so buffered file output is flushed.
pub fn init(verbose: bool, json: bool, log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let (subscriber, guard) = subscriber(verbose, json, log_dir);
    // A second init (tests, embedding) keeps the first subscriber.
    subscriber.try_init().ok();
    guard
}

fn subscriber(
    verbose: bool,
    json: bool,
    log_dir: Option<&Path>,
) -> (
    impl tracing::Subscriber + Send + Sync + 'static,
    Option<WorkerGuard>,
) {
    let stderr_layer = if json {
        fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_filter(env_filter(verbose))
            .boxed()
    } else {
        fmt::layer()
            .compact()
            .with_writer(std::io::stderr)
            .with_filter(env_filter(verbose))
            .boxed()
    };

    let (file_layer, guard) = match log_dir.filter(|dir| dir.is_dir()) {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "weft.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .json()
                .with_ansi(false)
                .with_writer(writer)
                .with_filter(EnvFilter::new("weft=info"))
                .boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let subscriber = tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer);
    (subscriber, guard)
}
