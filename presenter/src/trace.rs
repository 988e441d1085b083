//! Logging methods.

use crate::config::Config;
use std::path::{Path, PathBuf};
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const LOG_FILE_PREFIX: &str = "presenter.log";

/// Keeps the non-blocking file writer flushing until dropped.
#[derive(Debug)]
#[must_use]
pub struct Trace {
    log_dir: PathBuf,
    _file_log_guard: WorkerGuard,
}

impl Trace {
    /// Directory the rolling log files are written to.
    #[must_use]
    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }
}

/// Initialize the tracing library.
///
/// Logs go to a daily rolling file in [`Config::log_dir`] and, in debug builds, to stderr.
/// `RUST_LOG` overrides the default `info` level.
pub fn initialize(config: &Config) -> Trace {
    let mut env_filter = EnvFilter::builder()
        .with_default_directive(Level::INFO.into())
        .from_env_lossy();
    if cfg!(debug_assertions) {
        if let Ok(directive) = "presenter=debug".parse() {
            env_filter = env_filter.add_directive(directive);
        }
    }

    let registry = tracing_subscriber::registry().with(env_filter);

    let file_appender = tracing_appender::rolling::daily(&config.log_dir, LOG_FILE_PREFIX);
    let (non_blocking_file, _file_log_guard) = tracing_appender::non_blocking(file_appender);
    let registry = registry.with(
        fmt::Layer::new()
            .compact()
            .with_ansi(false)
            .with_line_number(true)
            .with_writer(non_blocking_file),
    );

    #[cfg(debug_assertions)]
    let registry = registry.with(
        fmt::Layer::new()
            .compact()
            .without_time()
            .with_line_number(true)
            .with_writer(std::io::stderr),
    );

    if let Err(err) = registry.try_init() {
        eprintln!("setting tracing default failed: {err}");
    }
    Trace {
        log_dir: config.log_dir.clone(),
        _file_log_guard,
    }
}
