//! Logging infrastructure for Video2X.
//!
//! This module provides:
//! - Per-job loggers writing a log file and feeding a front-end callback
//! - Compact mode with progress filtering
//! - Tail buffer of driver output for failure reports
//! - Process-wide `tracing` setup
//!
//! # Example
//!
//! ```no_run
//! use v2x_core::logging::{JobLogger, LogConfig};
//!
//! let logger = JobLogger::builder("clip.mp4", "/tmp/video2x-logs")
//!     .config(LogConfig::default())
//!     .build()
//!     .unwrap();
//!
//! logger.phase("Upscaling");
//! logger.command("waifu2x-ncnn-vulkan -i frames -o upscaled -s 2");
//! logger.progress(40);
//! logger.success("Upscaled 120 frames");
//! ```

mod job_logger;
mod types;

pub use job_logger::{JobLogger, JobLoggerBuilder};
pub use types::{LogCallback, LogConfig, LogLevel, MessagePrefix};

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize the global tracing subscriber.
///
/// `RUST_LOG` wins over `default_level`. Call once at startup; a second call
/// panics inside `tracing_subscriber`.
pub fn init_tracing(default_level: LogLevel) {
    subscriber(default_level).init();
}

/// Like [`init_tracing`], but returns `false` instead of panicking when a
/// subscriber is already installed.
pub fn try_init_tracing(default_level: LogLevel) -> bool {
    subscriber(default_level).try_init().is_ok()
}

fn subscriber(default_level: LogLevel) -> impl tracing::Subscriber + Send + Sync + 'static {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level.as_filter_str()));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(false))
        .with(filter)
}

/// Initialize tracing for tests (only logs warnings and above).
#[cfg(test)]
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("warn")
        .with_test_writer()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_init_is_reported() {
        init_test_tracing();
        assert!(!try_init_tracing(LogLevel::Debug));
    }
}
