//! Usage: Process-wide tracing setup (console + optional daily file, `log` bridge).

use crate::shared::error::{AppError, AppResult};
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::EnvFilter;

pub const DEFAULT_LOG_FILTER: &str = "info";
const LOG_FILE_PREFIX: &str = "dashboard-session.log";

#[derive(Debug, Clone)]
pub struct LoggingOptions {
    /// Used when `RUST_LOG` is unset or invalid.
    pub default_filter: String,
    pub log_dir: Option<PathBuf>,
    pub ansi: bool,
}

impl Default for LoggingOptions {
    fn default() -> Self {
        Self {
            default_filter: DEFAULT_LOG_FILTER.to_string(),
            log_dir: None,
            ansi: true,
        }
    }
}

fn build_filter(default_filter: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
}

/// Installs the global subscriber. Keep the returned guard alive for the file writer to flush.
pub fn init(options: &LoggingOptions) -> AppResult<Option<WorkerGuard>> {
    let (file_layer, guard) = match options.log_dir.as_ref() {
        Some(dir) => {
            std::fs::create_dir_all(dir).map_err(|e| {
                AppError::with_source(
                    "LOGGING_INIT",
                    format!("failed to create log dir {}", dir.display()),
                    e,
                )
            })?;
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let subscriber = tracing_subscriber::registry()
        .with(build_filter(&options.default_filter))
        .with(fmt::layer().with_ansi(options.ansi).with_target(true))
        .with(file_layer);

    tracing::subscriber::set_global_default(subscriber).map_err(|e| {
        AppError::with_source("LOGGING_INIT", "global subscriber already installed", e)
    })?;

    // reqwest/hyper still speak `log`.
    if let Err(err) = tracing_log::LogTracer::init() {
        tracing::debug!(error = %err, "log bridge already installed");
    }
    Ok(guard)
}
