//! Context7 Enrich
//!
//! Enriches generated prompts with up-to-date library documentation fetched
//! from the Context7 documentation service, with an on-disk cache shared
//! safely between processes.

#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod cache;
pub mod client;
pub mod config;
pub mod enrich;
pub mod error;
pub mod utils;

/// Re-export common types
pub use crate::client::{Context7Client, DocsProvider};
pub use crate::enrich::Enricher;
pub use crate::error::{Error, Result};

/// Crate version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Tool name
pub const NAME: &str = "context7-enrich";

/// Initialize logging system with configuration
///
/// # Errors
/// Returns an error if logging system initialization fails
pub fn init_logging_with_config(config: &crate::config::LoggingConfig) -> Result<()> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    // Parse log level
    let level = match config.level.to_lowercase().as_str() {
        "trace" => "trace",
        "debug" => "debug",
        "info" => "info",
        "error" => "error",
        _ => "warn",
    };

    let filter = EnvFilter::new(level);

    // Console logs go to stderr; stdout carries the enriched prompt
    let console_layer = || {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .compact()
    };

    match (config.enable_console, config.enable_file, &config.file_path) {
        // Enable both console and file logging
        (true, true, Some(file_path)) => {
            let file_appender = file_appender(file_path)?;
            tracing_subscriber::registry()
                .with(filter)
                .with(console_layer())
                .with(
                    fmt::layer()
                        .with_writer(file_appender)
                        .with_ansi(false)
                        .with_target(true)
                        .compact(),
                )
                .try_init()
                .map_err(|e| error::Error::Initialization(e.to_string()))?;
        }

        // Enable file logging only
        (false, true, Some(file_path)) => {
            let file_appender = file_appender(file_path)?;
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .with_writer(file_appender)
                        .with_ansi(false)
                        .with_target(true)
                        .compact(),
                )
                .try_init()
                .map_err(|e| error::Error::Initialization(e.to_string()))?;
        }

        // Other cases, use console logging
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(console_layer())
                .try_init()
                .map_err(|e| error::Error::Initialization(e.to_string()))?;
        }
    }

    Ok(())
}

/// Daily rolling appender for `file_path`, creating its directory
fn file_appender(file_path: &str) -> Result<tracing_appender::rolling::RollingFileAppender> {
    let path = std::path::Path::new(file_path);
    let log_dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| std::path::Path::new("."));
    let log_file_name = path
        .file_name()
        .unwrap_or(std::ffi::OsStr::new("context7-enrich.log"));

    std::fs::create_dir_all(log_dir)
        .map_err(|e| error::Error::Initialization(format!("Failed to create log directory: {e}")))?;

    Ok(tracing_appender::rolling::daily(log_dir, log_file_name))
}
