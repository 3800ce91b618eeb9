//! Tracing setup: compact lines on stderr for the operator, a daily-rotated
//! file for later inspection.
//!
//! `RUST_LOG`, when set, overrides both the configured level and `--verbose`.

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

use crate::config::LoggingConfig;
use crate::constants::APP_NAME;
use crate::error::{RtError, RtResult};

/// Keeps the background file writer alive. Drop it to flush the log file.
#[must_use = "dropping the guard stops file logging"]
pub struct LogGuard {
    _file: WorkerGuard,
}

fn build_filter(configured: &str, verbose: bool) -> EnvFilter {
    if let Ok(from_env) = EnvFilter::try_from_default_env() {
        return from_env;
    }
    let level = if verbose { "debug" } else { configured };
    EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber described by the `[logging]` section.
///
/// Log files land in `log_dir` as `rtlink.log.<date>`; `json_output`
/// switches the file (not the console) to one JSON object per line.
pub fn init_logging(config: &LoggingConfig, log_dir: &Path, verbose: bool) -> RtResult<LogGuard> {
    std::fs::create_dir_all(log_dir)?;
    let appender = rolling::daily(log_dir, format!("{APP_NAME}.log"));
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let file_layer = if config.json_output {
        fmt::layer()
            .json()
            .with_writer(writer)
            .with_file(true)
            .with_line_number(true)
            .boxed()
    } else {
        fmt::layer()
            .with_writer(writer)
            .with_ansi(false)
            .with_file(true)
            .with_line_number(true)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(build_filter(&config.level, verbose))
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .with(file_layer)
        .try_init()
        .map_err(|e| RtError::Internal(format!("logging already initialized: {e}")))?;

    tracing::debug!("file logging to {}", log_dir.display());
    Ok(LogGuard { _file: guard })
}

/// Console-only logger for tests. Silent unless `RUST_LOG` is set; repeat calls are no-ops.
pub fn init_test_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("off"));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_test_writer().compact())
        .try_init();
}
