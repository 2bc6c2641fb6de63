//! # Structured Logging
//!
//! Installs the process-wide `tracing` subscriber from a [`LogConfig`]. The
//! subsystems only emit events through the `tracing` macros; whether and
//! where those events go is decided here, once, by the host process.

use std::fs::OpenOptions;
use std::sync::Mutex;

use tracing::{info, warn, Level};
use tracing_subscriber::{
    fmt::{self, writer::BoxMakeWriter},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Registry,
};

use crate::core::error::{ObservabilityError, ObservabilityResult};
use crate::observability::config::{LogConfig, LogFormat, LogOutput};

/// Map a level name to a `tracing` level; unknown names fall back to INFO
pub fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" | "warning" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

fn make_writer(output: &LogOutput) -> ObservabilityResult<BoxMakeWriter> {
    Ok(match output {
        LogOutput::Stdout => BoxMakeWriter::new(std::io::stdout),
        LogOutput::Stderr => BoxMakeWriter::new(std::io::stderr),
        LogOutput::File(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| ObservabilityError::config(format!("Failed to open log file {}: {}", path, e)))?;
            BoxMakeWriter::new(Mutex::new(file))
        }
    })
}

/// Initialize the tracing subscriber.
///
/// Returns `false` when another subscriber was already installed; that is
/// logged as a warning rather than treated as an error.
pub fn init_logging(config: &LogConfig) -> ObservabilityResult<bool> {
    let level = parse_level(&config.level);
    let env_filter = EnvFilter::from_default_env().add_directive(level.into());
    let writer = make_writer(&config.output)?;

    let installed = match config.format {
        LogFormat::Json => Registry::default()
            .with(env_filter)
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_thread_names(true)
                    .with_writer(writer),
            )
            .try_init()
            .is_ok(),
        LogFormat::Text => Registry::default()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_thread_names(true)
                    .with_writer(writer),
            )
            .try_init()
            .is_ok(),
    };

    if installed {
        info!(level = %level, format = ?config.format, "Structured logging initialized");
    } else {
        warn!("Tracing subscriber already initialized, skipping initialization");
    }

    Ok(installed)
}
