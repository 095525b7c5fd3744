//! Structured logging setup using the `tracing` ecosystem.
//!
//! Library crates only emit events; binaries call one of the initializers
//! here exactly once at startup.

use std::path::Path;
use tracing::Subscriber;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::error::{PlError, PlResult};

/// Log file name prefix inside the log directory.
const LOG_FILE_NAME: &str = "pushlink.log";

/// Directive used when the configured level does not parse.
const FALLBACK_LEVEL: &str = "info";

/// Install the global subscriber: compact stderr output plus a daily-rotated
/// file under `log_dir`.
///
/// `level` is an `EnvFilter` directive such as `"info"` or
/// `"pl_socket=debug,info"`. File records carry thread names so output from
/// the `pl-dispatch-*` worker threads can be told apart. With `json_output`
/// the file is written as one JSON object per line.
pub fn init_logging(level: &str, log_dir: &Path, json_output: bool) -> PlResult<LogGuard> {
    std::fs::create_dir_all(log_dir)?;

    let (writer, guard) = tracing_appender::non_blocking(rolling::daily(log_dir, LOG_FILE_NAME));

    let json_file = json_output.then(|| {
        fmt::layer()
            .json()
            .with_writer(writer.clone())
            .with_thread_names(true)
            .with_file(true)
            .with_line_number(true)
    });
    let text_file = (!json_output).then(|| {
        fmt::layer()
            .with_writer(writer)
            .with_ansi(false)
            .with_thread_names(true)
            .with_file(true)
            .with_line_number(true)
    });

    tracing_subscriber::registry()
        .with(level_filter(level))
        .with(console_layer())
        .with(json_file)
        .with(text_file)
        .try_init()
        .map_err(|e| PlError::Internal(format!("failed to install log subscriber: {e}")))?;

    tracing::info!("logging initialized at level={level}, dir={}", log_dir.display());

    Ok(LogGuard { _guard: guard })
}

/// Keeps the non-blocking file writer alive. Dropping it flushes the log.
pub struct LogGuard {
    _guard: WorkerGuard,
}

/// Console-only logging, for when the log directory is unusable.
pub fn init_console_logging(level: &str) {
    let _ = tracing_subscriber::registry()
        .with(level_filter(level))
        .with(console_layer())
        .try_init();
}

fn level_filter(level: &str) -> EnvFilter {
    EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new(FALLBACK_LEVEL))
}

fn console_layer<S>() -> impl Layer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .compact()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_filter_falls_back_on_bad_directive() {
        assert_eq!(level_filter("not a filter ===").to_string(), FALLBACK_LEVEL);
        assert_eq!(level_filter("pl_socket=debug").to_string(), "pl_socket=debug");
    }

    #[test]
    fn test_console_logging_does_not_panic() {
        // Subsequent calls are no-ops.
        init_console_logging("debug");
        init_console_logging("warn");
    }
}
