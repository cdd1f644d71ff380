//! Structured logging setup using the `tracing` ecosystem.
//!
//! Console output goes to stderr in compact form; a second layer writes a
//! daily-rotated file, either plain text or JSON lines.

use std::path::Path;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::error::CourierResult;

/// Log file prefix inside the log directory.
const LOG_FILE_NAME: &str = "courier.log";

/// Initialize the global tracing subscriber.
///
/// `level` accepts anything `EnvFilter` understands, so both `"debug"` and
/// `"courier_sync=trace,info"` work. An unparseable filter falls back to
/// `info`.
pub fn init_logging(level: &str, log_dir: &Path, json_output: bool) -> CourierResult<LogGuard> {
    std::fs::create_dir_all(log_dir)?;

    let (writer, guard) = tracing_appender::non_blocking(rolling::daily(log_dir, LOG_FILE_NAME));

    let console_layer = fmt::layer().with_writer(std::io::stderr).with_target(true).compact();

    // Exactly one of these is Some; `Option<Layer>` is a no-op layer when None.
    let json_layer = json_output.then(|| file_layer(writer.clone()).json());
    let text_layer = (!json_output).then(|| file_layer(writer).with_ansi(false));

    tracing_subscriber::registry()
        .with(filter_for(level))
        .with(console_layer)
        .with(json_layer)
        .with(text_layer)
        .init();

    tracing::info!("logging initialized at level={level}, dir={}", log_dir.display());

    Ok(LogGuard { _guard: guard })
}

fn file_layer<S>(writer: NonBlocking) -> fmt::Layer<S, fmt::format::DefaultFields, fmt::format::Format, NonBlocking> {
    fmt::layer()
        .with_writer(writer)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
}

fn filter_for(level: &str) -> EnvFilter {
    EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Keeps the non-blocking file writer alive; dropping it flushes the log.
pub struct LogGuard {
    _guard: WorkerGuard,
}

/// Console-only logger for tests and short-lived commands.
///
/// Safe to call more than once; later calls are ignored.
pub fn init_console_logging(level: &str) {
    let _ = tracing_subscriber::registry()
        .with(filter_for(level))
        .with(fmt::layer().with_writer(std::io::stderr).with_target(true).compact())
        .try_init();
}
