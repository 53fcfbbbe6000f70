use std::fs;
use std::io;
use std::path::Path;

use anyhow::Context;
use file_rotate::{compression::Compression, suffix::AppendCount, ContentLimit, FileRotate};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::{self, time::UtcTime};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

pub const LOG_ENV: &str = "READSHELF_LOG";
pub const DEFAULT_FILTER: &str = "readshelf=info,sqlx=warn";
pub const LOG_FILE_NAME: &str = "readshelf.log";
const MAX_LOG_BYTES: usize = 5_000_000;
const ROTATED_FILES: usize = 3;

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// JSON lines on stderr. Safe to call more than once; later calls are no-ops.
pub fn init_logging() {
    let _ = tracing_log::LogTracer::init();
    let _ = tracing_subscriber::registry()
        .with(env_filter())
        .with(
            fmt::layer()
                .json()
                .flatten_event(true)
                .with_target(true)
                .with_timer(UtcTime::rfc_3339())
                .with_writer(io::stderr),
        )
        .try_init();
}

/// Like [`init_logging`] plus a size-rotated JSON file in `log_dir`. Keep the
/// returned guard alive for as long as logs should reach the file.
pub fn init_file_logging(log_dir: &Path) -> anyhow::Result<WorkerGuard> {
    fs::create_dir_all(log_dir)
        .with_context(|| format!("create log directory {}", log_dir.display()))?;

    let rotate = FileRotate::new(
        log_dir.join(LOG_FILE_NAME),
        AppendCount::new(ROTATED_FILES),
        ContentLimit::Bytes(MAX_LOG_BYTES),
        Compression::None,
        #[cfg(unix)]
        None,
    );
    let (writer, guard) = tracing_appender::non_blocking(rotate);

    let _ = tracing_log::LogTracer::init();
    let _ = tracing_subscriber::registry()
        .with(env_filter())
        .with(
            fmt::layer()
                .json()
                .flatten_event(true)
                .with_target(true)
                .with_timer(UtcTime::rfc_3339())
                .with_writer(io::stderr),
        )
        .with(
            fmt::layer()
                .json()
                .flatten_event(true)
                .with_ansi(false)
                .with_target(true)
                .with_timer(UtcTime::rfc_3339())
                .with_writer(writer),
        )
        .try_init();

    Ok(guard)
}
