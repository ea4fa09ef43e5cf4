//! Structured logging setup.
//!
//! Grounded in `infrastructure/logging/logger.rs`'s `LoggerImpl::init`:
//! parse the configured level into an `EnvFilter`, branch on whether a log
//! directory is configured to layer a rolling file appender alongside
//! stdout, and branch again on JSON vs. pretty formatting. The returned
//! guard must be held for the process lifetime or buffered file writes are
//! lost on exit.

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::domain::error::ConfigError;
use crate::infrastructure::config::{LogFormat, RavenConfig};

pub use tracing::{debug, error, info, instrument, trace, warn};

/// Holds the non-blocking file-appender guard, if any. Dropping this ends
/// buffered log delivery — keep it alive for the life of `main`.
pub struct LoggerGuard {
    _guard: Option<WorkerGuard>,
}

fn parse_log_level(level: &str) -> Result<tracing::Level, ConfigError> {
    level.parse().map_err(|_| ConfigError::InvalidLogLevel(level.to_string()))
}

/// Initialize the global tracing subscriber from `config`. Safe to call
/// once per process; a second call will panic, matching
/// `tracing_subscriber`'s own global-subscriber contract.
pub fn init(config: &RavenConfig) -> Result<LoggerGuard, ConfigError> {
    let level = parse_log_level(&config.log_level)?;
    let filter = EnvFilter::builder().with_default_directive(level.into()).from_env_lossy();

    if let Some(log_dir) = &config.log_dir {
        let file_appender = tracing_appender::rolling::daily(log_dir, "raven.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        let stdout_layer = fmt::layer().with_writer(std::io::stdout);
        let file_layer = fmt::layer().with_writer(non_blocking).with_ansi(false);

        match config.log_format {
            LogFormat::Json => {
                tracing_subscriber::registry()
                    .with(filter)
                    .with(stdout_layer.json())
                    .with(file_layer.json())
                    .init();
            }
            LogFormat::Pretty => {
                tracing_subscriber::registry().with(filter).with(stdout_layer).with(file_layer).init();
            }
        }

        Ok(LoggerGuard { _guard: Some(guard) })
    } else {
        let stdout_layer = fmt::layer().with_writer(std::io::stdout);
        match config.log_format {
            LogFormat::Json => {
                tracing_subscriber::registry().with(filter).with(stdout_layer.json()).init();
            }
            LogFormat::Pretty => {
                tracing_subscriber::registry().with(filter).with(stdout_layer).init();
            }
        }
        Ok(LoggerGuard { _guard: None })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_log_level_accepts_known_levels() {
        for level in ["trace", "debug", "info", "warn", "error"] {
            assert!(parse_log_level(level).is_ok());
        }
    }

    #[test]
    fn parse_log_level_rejects_unknown() {
        assert!(parse_log_level("verbose").is_err());
    }
}
