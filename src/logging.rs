//! Tracing configuration and log routing.
//!
//! Logging always goes to stdout with a compact formatter. When the
//! configuration names a log file, a second non-blocking layer appends to it;
//! the crate never picks a file location on its own. Initialization is
//! idempotent, so embedding applications that already installed a global
//! subscriber keep theirs.

use crate::config::Config;
use std::sync::OnceLock;

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Install tracing subscribers for stdout and, when configured, file logging.
///
/// Filtering follows `RUST_LOG` and defaults to `info`. Returns `false` when a
/// global subscriber was already installed, in which case nothing changes.
pub fn init_tracing(config: &Config) -> bool {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stdout_layer = fmt::layer().with_target(false).compact();

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer);

    if let Some(writer) = configure_file_writer(config) {
        let file_layer = fmt::layer()
            .with_writer(writer)
            .with_target(true)
            .with_ansi(false)
            .compact();

        registry.with(file_layer).try_init().is_ok()
    } else {
        registry.try_init().is_ok()
    }
}

/// Build a non-blocking writer for the configured log file.
///
/// Returns `None` when no file is configured or the file cannot be opened for
/// append; logging then stays stdout-only.
fn configure_file_writer(config: &Config) -> Option<NonBlocking> {
    let path = config.log_file.as_ref()?;
    match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
    {
        Ok(file) => {
            let (non_blocking, guard) = tracing_appender::non_blocking(file);
            let _ = LOG_GUARD.set(guard);
            Some(non_blocking)
        }
        Err(err) => {
            eprintln!("Failed to open log file {}: {err}", path.display());
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configured_log_file_is_created_and_reinit_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            log_file: Some(dir.path().join("pipeline.log")),
            ..Config::default()
        };

        let installed = init_tracing(&config);
        tracing::info!("queue starting");

        assert!(config.log_file.as_ref().unwrap().exists());
        if installed {
            // A second call must not panic or replace the subscriber.
            assert!(!init_tracing(&config));
        }
    }

    #[test]
    fn unopenable_log_file_falls_back_to_stdout_only() {
        let config = Config {
            log_file: Some("/nonexistent-dir/docpipe.log".into()),
            ..Config::default()
        };
        assert!(configure_file_writer(&config).is_none());
    }

    #[test]
    fn no_log_file_means_no_file_writer() {
        assert!(configure_file_writer(&Config::default()).is_none());
    }
}
