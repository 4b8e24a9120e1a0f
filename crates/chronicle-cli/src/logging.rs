//! Structured logging for the `chronicle` binary.
//!
//! `serve` runs as a long-lived process, so it gets a non-blocking
//! daily-rotating file sink under `<data_dir>/logs`; the short-lived
//! `prune`/`update` commands log straight to stderr instead — there's no
//! process around to flush a background writer for them.

use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Keeps the background log-flushing thread alive for as long as it's
/// held; dropping it (e.g. at the end of `main`) flushes pending writes.
pub struct LoggingGuard {
    _file_guard: Option<WorkerGuard>,
}

fn filter(log_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level))
}

/// Logs to a rotating file under `log_dir` in addition to stderr. Used by
/// `serve`, which keeps running long enough for file rotation and the
/// non-blocking writer to matter.
pub fn init_file(log_dir: &Path, log_level: &str) -> anyhow::Result<LoggingGuard> {
    std::fs::create_dir_all(log_dir)?;
    let appender = RollingFileAppender::new(Rotation::DAILY, log_dir, "chronicle.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(appender);

    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true);
    let stderr_layer = fmt::layer().with_writer(std::io::stderr).with_target(false);

    tracing_subscriber::registry()
        .with(filter(log_level))
        .with(file_layer)
        .with(stderr_layer)
        .try_init()
        .ok();

    Ok(LoggingGuard {
        _file_guard: Some(guard),
    })
}

/// Logs to stderr only. Used by one-shot commands where there's no
/// meaningful rotation window.
pub fn init_stderr(log_level: &str) -> LoggingGuard {
    tracing_subscriber::registry()
        .with(filter(log_level))
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .try_init()
        .ok();
    LoggingGuard { _file_guard: None }
}
