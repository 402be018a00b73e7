//! Logging setup for processes that run feed loads
//!
//! Installs a `tracing` subscriber with:
//! - an `EnvFilter` (RUST_LOG takes precedence over the configured default)
//! - an optional console layer
//! - an optional JSON file layer with daily rotation, written off-thread

use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

const DEFAULT_FILTER: &str =
    "info,feedload_core=info,feedload_driver_sqlite=info,feedload_interchange=info";

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Directory for JSON log files; `None` disables file output
    pub log_dir: Option<PathBuf>,

    /// Whether to write JSON logs to `log_dir`
    pub enable_json_logs: bool,

    pub enable_console_logs: bool,

    /// Whether to include file/line information in logs
    pub include_location: bool,

    /// Whether to log span open/close (per-load timings)
    pub enable_spans: bool,

    /// Filter used when RUST_LOG is unset
    pub default_filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self::development()
    }
}

impl LoggingConfig {
    /// Console output with statement-level detail
    pub fn development() -> Self {
        Self {
            log_dir: Some(log_directory()),
            enable_json_logs: false,
            enable_console_logs: true,
            include_location: cfg!(debug_assertions),
            enable_spans: true,
            default_filter: "debug,feedload_core=debug,feedload_driver_sqlite=debug,feedload_interchange=debug"
                .to_string(),
        }
    }

    /// JSON files only, for long-running import jobs
    pub fn production() -> Self {
        Self {
            log_dir: Some(log_directory()),
            enable_json_logs: true,
            enable_console_logs: false,
            include_location: false,
            enable_spans: false,
            default_filter: DEFAULT_FILTER.to_string(),
        }
    }

    /// Console only, no files
    pub fn testing() -> Self {
        Self {
            log_dir: None,
            enable_json_logs: false,
            enable_console_logs: true,
            include_location: true,
            enable_spans: true,
            default_filter: "debug".to_string(),
        }
    }
}

/// Keeps the background log writer alive; drop it last to flush pending lines
#[derive(Default)]
pub struct LoggingGuard {
    _file_writer: Option<WorkerGuard>,
}

/// Install the global subscriber.
///
/// Fails if a global subscriber is already installed or the log directory
/// cannot be created.
pub fn init(config: LoggingConfig) -> anyhow::Result<LoggingGuard> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.default_filter))?;

    // NEW fires once per span; ENTER would fire on every re-poll of an awaited future
    let span_events = if config.enable_spans {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let mut layers = Vec::new();
    let mut guard = LoggingGuard::default();

    if config.enable_console_logs {
        let console_layer = fmt::layer()
            .with_target(true)
            .with_file(config.include_location)
            .with_line_number(config.include_location)
            .with_span_events(span_events.clone())
            .with_filter(env_filter.clone())
            .boxed();
        layers.push(console_layer);
    }

    if config.enable_json_logs
        && let Some(log_dir) = &config.log_dir
    {
        std::fs::create_dir_all(log_dir)?;
        let file_appender = tracing_appender::rolling::daily(log_dir, "feedload.log");
        let (non_blocking, worker_guard) = tracing_appender::non_blocking(file_appender);
        guard._file_writer = Some(worker_guard);

        let json_layer = fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .with_span_events(span_events)
            .with_ansi(false)
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_writer(non_blocking)
            .with_filter(env_filter)
            .boxed();
        layers.push(json_layer);
    }

    tracing_subscriber::registry().with(layers).try_init()?;

    tracing::info!(
        log_dir = ?config.log_dir,
        json_enabled = config.enable_json_logs,
        console_enabled = config.enable_console_logs,
        "Logging system initialized"
    );

    Ok(guard)
}

/// Default location of JSON log files
pub fn log_directory() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("feedload")
        .join("logs")
}
