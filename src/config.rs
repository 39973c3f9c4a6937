use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Runtime configuration for the processing queue and chunker.
///
/// Every knob has a default, so a `Config::default()` instance is fully usable;
/// `Config::load` layers `DOCPIPE_*` environment overrides on top.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Maximum number of task bodies allowed to run concurrently.
    pub max_concurrent_tasks: usize,
    /// Priority assigned to tasks enqueued without an explicit priority (lower is served first).
    pub default_priority: i32,
    /// Number of automatic retries before a task is marked permanently failed.
    pub max_retries: u32,
    /// Delay before a failed task is re-queued, in milliseconds.
    pub retry_delay_ms: u64,
    /// Idle poll interval of the dispatch loop, in milliseconds.
    pub poll_interval_ms: u64,
    /// Retention window for terminal task results, in hours.
    pub result_retention_hours: u64,
    /// Chunk window size in characters.
    pub chunk_size: usize,
    /// Overlap between adjacent chunks in characters.
    pub chunk_overlap: usize,
    /// Embedding model identifier recorded on persisted chunks.
    pub embedding_model: String,
    /// Dimensionality of the produced vectors.
    pub embedding_dimension: usize,
    /// File to append logs to; stdout-only logging when unset.
    pub log_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: 3,
            default_priority: 5,
            max_retries: 3,
            retry_delay_ms: 60_000,
            poll_interval_ms: 100,
            result_retention_hours: 24,
            chunk_size: 1000,
            chunk_overlap: 200,
            embedding_model: "text-embedding-3-small".to_string(),
            embedding_dimension: 768,
            log_file: None,
        }
    }
}

impl Config {
    /// Load configuration, reading a `.env` file when present and applying
    /// `DOCPIPE_*` environment overrides over the defaults.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let config = Self::from_env()?;
        tracing::debug!(
            max_concurrent_tasks = config.max_concurrent_tasks,
            chunk_size = config.chunk_size,
            chunk_overlap = config.chunk_overlap,
            embedding_model = %config.embedding_model,
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Build a configuration from environment variables without touching `.env`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            max_concurrent_tasks: load_parsed("DOCPIPE_MAX_CONCURRENT_TASKS")?
                .unwrap_or(defaults.max_concurrent_tasks),
            default_priority: load_parsed("DOCPIPE_DEFAULT_PRIORITY")?
                .unwrap_or(defaults.default_priority),
            max_retries: load_parsed("DOCPIPE_MAX_RETRIES")?.unwrap_or(defaults.max_retries),
            retry_delay_ms: load_parsed("DOCPIPE_RETRY_DELAY_MS")?
                .unwrap_or(defaults.retry_delay_ms),
            poll_interval_ms: load_parsed("DOCPIPE_POLL_INTERVAL_MS")?
                .unwrap_or(defaults.poll_interval_ms),
            result_retention_hours: load_parsed("DOCPIPE_RESULT_RETENTION_HOURS")?
                .unwrap_or(defaults.result_retention_hours),
            chunk_size: load_parsed("DOCPIPE_CHUNK_SIZE")?.unwrap_or(defaults.chunk_size),
            chunk_overlap: load_parsed("DOCPIPE_CHUNK_OVERLAP")?.unwrap_or(defaults.chunk_overlap),
            embedding_model: load_env_optional("DOCPIPE_EMBEDDING_MODEL")
                .unwrap_or(defaults.embedding_model),
            embedding_dimension: load_parsed("DOCPIPE_EMBEDDING_DIMENSION")?
                .unwrap_or(defaults.embedding_dimension),
            log_file: load_env_optional("DOCPIPE_LOG_FILE").map(PathBuf::from),
        })
    }

    /// Delay before a failed task is re-queued.
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Idle poll interval of the dispatch loop.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Retention window for terminal task results.
    pub fn result_retention(&self) -> Duration {
        Duration::from_secs(self.result_retention_hours * 3600)
    }
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn load_parsed<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    load_env_optional(key)
        .map(|value| {
            value
                .parse()
                .map_err(|_| ConfigError::InvalidValue(key.to_string()))
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = Config::default();
        assert_eq!(config.default_priority, 5);
        assert_eq!(config.result_retention_hours, 24);
        assert!(config.chunk_overlap < config.chunk_size);
        assert_eq!(config.retry_delay(), Duration::from_secs(60));
    }

    #[test]
    fn invalid_override_is_rejected() {
        // SAFETY: tests run single-threaded with respect to this variable.
        unsafe { env::set_var("DOCPIPE_CHUNK_SIZE", "not-a-number") };
        let error = Config::from_env().unwrap_err();
        assert!(matches!(error, ConfigError::InvalidValue(key) if key == "DOCPIPE_CHUNK_SIZE"));
        unsafe { env::remove_var("DOCPIPE_CHUNK_SIZE") };
    }
}
