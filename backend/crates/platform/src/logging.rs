//! Structured Logging Sink
//!
//! Builds the [`Logger`] shared by the request logger and the error
//! reporting path. Records are JSON lines written to a primary stream
//! (stdout) and, optionally, appended to a secondary file.
//!
//! The logger is an explicit handle, not a process-global: construct it once
//! at startup and hand clones to whatever needs it.

use std::env;
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use tracing::Dispatch;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, fmt};

const DEFAULT_FILTER: &str = "info";

/// Target of the logger's own diagnostics. Always enabled at `WARN`,
/// whatever the configured filter says.
const SINK_TARGET: &str = "platform::log_sink";

/// Output encoding of log records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// One JSON object per line, event fields flattened to the top level
    #[default]
    Json,
    /// Human-readable single-line text, no ANSI colours
    Text,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "text" | "pretty" => Ok(LogFormat::Text),
            other => Err(format!("unknown log format: {other}")),
        }
    }
}

/// Logger configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Secondary output file. `None` means primary stream only.
    pub file_path: Option<PathBuf>,
    /// `EnvFilter` directives, e.g. `info` or `api=debug,tower=warn`
    pub filter: String,
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            file_path: None,
            filter: DEFAULT_FILTER.to_string(),
            format: LogFormat::Json,
        }
    }
}

impl LogConfig {
    /// Config that also appends to `path`. An empty path means no file.
    pub fn with_file(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            file_path: (!path.as_os_str().is_empty()).then_some(path),
            ..Self::default()
        }
    }

    /// Reads `LOG_FILE`, `RUST_LOG` and `LOG_FORMAT`.
    ///
    /// Unset or empty variables fall back to the defaults; an unknown
    /// `LOG_FORMAT` falls back to JSON.
    pub fn from_env() -> Self {
        let file_path = env::var_os("LOG_FILE")
            .filter(|path| !path.is_empty())
            .map(PathBuf::from);

        let filter = env::var("RUST_LOG")
            .ok()
            .filter(|filter| !filter.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_FILTER.to_string());

        let format = env::var("LOG_FORMAT")
            .ok()
            .and_then(|format| format.parse().ok())
            .unwrap_or_default();

        Self {
            file_path,
            filter,
            format,
        }
    }
}

/// Handle to the service's structured log sink
///
/// Cloning is cheap; every clone writes to the same streams. Writes of
/// individual records are serialized by the underlying writers, so a handle
/// can be used from any number of concurrent requests.
#[derive(Debug, Clone)]
pub struct Logger {
    dispatch: Dispatch,
}

impl Logger {
    /// Logger writing to stdout, plus the configured file if any.
    pub fn init(config: &LogConfig) -> Self {
        Self::with_primary(config, io::stdout)
    }

    /// Logger writing to `primary`, plus the configured file if any.
    ///
    /// If the file cannot be opened a warning is written to `primary` and
    /// the logger carries on without it. The warning is emitted even when the
    /// configured filter is stricter than `WARN`.
    pub fn with_primary<W>(config: &LogConfig, primary: W) -> Self
    where
        W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
    {
        let Some(path) = config.file_path.as_deref() else {
            return Self::build(config, primary);
        };

        match open_append(path) {
            Ok(file) => Self::build(config, primary.and(Arc::new(file))),
            Err(error) => {
                let logger = Self::build(config, primary);
                logger.in_scope(|| {
                    tracing::warn!(
                        target: SINK_TARGET,
                        path = %path.display(),
                        error = %error,
                        "failed to open log file, logging to primary stream only"
                    );
                });
                logger
            }
        }
    }

    fn build<W>(config: &LogConfig, writer: W) -> Self
    where
        W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
    {
        let mut filter = EnvFilter::try_new(&config.filter)
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
        if let Ok(directive) = format!("{SINK_TARGET}=warn").parse::<Directive>() {
            filter = filter.add_directive(directive);
        }
        let registry = tracing_subscriber::registry().with(filter);

        let dispatch = match config.format {
            LogFormat::Json => Dispatch::new(
                registry.with(
                    fmt::layer()
                        .json()
                        .flatten_event(true)
                        .with_current_span(false)
                        .with_span_list(false)
                        .with_writer(writer),
                ),
            ),
            LogFormat::Text => {
                Dispatch::new(registry.with(fmt::layer().with_ansi(false).with_writer(writer)))
            }
        };

        Self { dispatch }
    }

    /// The underlying dispatcher, for `tracing::instrument::WithSubscriber`.
    pub fn dispatch(&self) -> &Dispatch {
        &self.dispatch
    }

    /// Runs `f` with this logger as the current thread's default.
    pub fn in_scope<T>(&self, f: impl FnOnce() -> T) -> T {
        tracing::dispatcher::with_default(&self.dispatch, f)
    }
}

fn open_append(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}
