//! Structured Logger
//!
//! Wraps `tracing` with a console layer, an optional daily-rolling NDJSON file
//! layer, and `RUST_LOG`-based level control.

use std::path::Path;

use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Log files are named `docproc.log.YYYY-MM-DD`.
pub const LOG_FILE_PREFIX: &str = "docproc.log";

/// Initialize the global structured logger.
///
/// `level` is used when `RUST_LOG` is unset. Calling this twice is a no-op.
pub fn init_logger(log_dir: Option<&Path>, level: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let console_layer = fmt::layer()
        .with_writer(std::io::stdout)
        .with_target(false)
        .with_ansi(true);

    let file_layer = log_dir.map(|dir| {
        let appender = RollingFileAppender::new(Rotation::DAILY, dir, LOG_FILE_PREFIX);
        fmt::layer().json().with_writer(appender).with_ansi(false)
    });

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_twice_does_not_panic() {
        init_logger(None, "debug");
        init_logger(None, "info");
        tracing::info!("logger initialised");
    }
}
