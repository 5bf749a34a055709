use crate::config::{LogLevel, LoggingConfig};
use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing_subscriber::{
    EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt,
};

/// Configuration for the logging system
pub struct LogConfig {
    /// Default level when RUST_LOG is not set
    pub level: LogLevel,
    /// Also write JSON logs to rotating files
    pub log_to_file: bool,
    /// Directory where log files will be stored
    pub log_dir: PathBuf,
    /// Prefix for log file names
    pub file_prefix: String,
    /// Maximum number of log files to keep (rotation)
    pub max_files: usize,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            log_to_file: false,
            log_dir: default_log_dir(),
            file_prefix: "peertube-uploader".to_string(),
            max_files: 5,
        }
    }
}

impl From<&LoggingConfig> for LogConfig {
    fn from(config: &LoggingConfig) -> Self {
        Self {
            level: config.level,
            log_to_file: config.log_to_file,
            log_dir: config.log_dir.clone().unwrap_or_else(default_log_dir),
            max_files: config.max_files,
            ..Default::default()
        }
    }
}

fn default_log_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".peertube-uploader")
        .join("logs")
}

/// Initialize stdout logging and, when enabled, rotating JSON file logging
///
/// # Log Targets
/// - `main` - Application lifecycle and run summary
/// - `config` - Configuration loading
/// - `auth` - Token discovery, login and refresh
/// - `uploader` - Upload sessions
/// - `uploader::chunk` - Individual chunk requests and retries
/// - `source` - Folder walk and table reads
/// - `tasks::worker` - Worker pool and per-item outcomes
/// - `sink` - Result persistence
/// - `media` - Probing and transcoding
///
/// # Example
/// ```bash
/// RUST_LOG=uploader::chunk=trace,auth=debug peertube-uploader --config config.json
/// ```
pub fn init_logging(config: LogConfig) -> Result<LogGuard> {
    let level = config.level.as_str();
    let env_filter = || EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let stdout_layer = fmt::layer()
        .compact()
        .with_target(true)
        .with_line_number(true)
        .with_ansi(true)
        .with_filter(env_filter());

    let (file_layer, worker_guard) = if config.log_to_file {
        std::fs::create_dir_all(&config.log_dir).context("Failed to create log directory")?;

        let file_appender = tracing_appender::rolling::RollingFileAppender::builder()
            .rotation(tracing_appender::rolling::Rotation::DAILY)
            .filename_prefix(&config.file_prefix)
            .filename_suffix("log")
            .max_log_files(config.max_files)
            .build(&config.log_dir)
            .context("Failed to create file appender")?;

        // The guard must outlive every log call or buffered lines are lost
        let (non_blocking_file, worker_guard) = tracing_appender::non_blocking(file_appender);

        let layer = fmt::layer()
            .json()
            .with_writer(non_blocking_file)
            .with_target(true)
            .with_thread_ids(true)
            .with_filter(env_filter());
        (Some(layer), Some(worker_guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(file_layer)
        .with(stdout_layer)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    tracing::info!(
        target: "main",
        log_level = level,
        log_to_file = config.log_to_file,
        log_dir = %config.log_dir.display(),
        "Logging system initialized"
    );

    Ok(LogGuard {
        _worker_guard: worker_guard,
    })
}

/// Keeps the non-blocking file writer alive until shutdown
pub struct LogGuard {
    _worker_guard: Option<tracing_appender::non_blocking::WorkerGuard>,
}

impl Drop for LogGuard {
    fn drop(&mut self) {
        tracing::debug!(target: "main", "Flushing logs before shutdown");
    }
}
