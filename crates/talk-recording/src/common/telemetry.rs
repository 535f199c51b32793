#![expect(clippy::print_stderr, reason = "Tracing not initialized yet")]

//! Tracing setup for the recording server.
//!
//! Logging is installed before the configuration file is read, at a
//! bootstrap level, so problems found while loading it reach the log. Once
//! the file is loaded its `[logs] level` replaces the bootstrap filter,
//! unless `RUST_LOG` is set.

use std::io::IsTerminal;
use std::path::PathBuf;

use tracing::warn;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Layer;
use tracing_subscriber::Registry;
use tracing_subscriber::fmt;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::reload;

const LOG_FILE_ENV: &str = "TALK_RECORDING_LOG";
const LOG_FORMAT_ENV: &str = "TALK_RECORDING_LOG_FORMAT";
const LOG_STREAM_ENV: &str = "TALK_RECORDING_LOG_STREAM";

/// Keeps the log file writer alive and the level switchable.
pub struct Telemetry {
    filter: Option<reload::Handle<EnvFilter, Registry>>,
    pinned_by_env: bool,
    _guard: Option<WorkerGuard>,
}

impl Telemetry {
    fn disabled() -> Self {
        Self {
            filter: None,
            pinned_by_env: false,
            _guard: None,
        }
    }

    /// Replaces the bootstrap level with `level` from the configuration.
    pub fn apply_level(&self, level: &str) {
        if self.pinned_by_env {
            return;
        }
        let Some(handle) = &self.filter else {
            return;
        };
        let directive = level_directive(level);
        match EnvFilter::try_new(&directive) {
            Ok(filter) => {
                if let Err(e) = handle.reload(filter) {
                    warn!(configured = level, error = %e, "Failed to switch log level");
                }
            }
            Err(e) => warn!(configured = level, error = %e, "Ignoring invalid log level"),
        }
    }
}

/// Installs the global subscriber at `bootstrap_level`, or at `RUST_LOG`
/// when that is set.
pub fn init_tracing(bootstrap_level: &str) -> Telemetry {
    let from_env = EnvFilter::try_from_default_env().ok();
    let pinned_by_env = from_env.is_some();
    let initial = from_env.unwrap_or_else(|| EnvFilter::new(level_directive(bootstrap_level)));
    let (filter, handle) = reload::Layer::new(initial);

    let settings = LogSettings::from_env();
    let (writer, guard, ansi) = settings.target.open();
    let output = match settings.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_target(true)
            .with_thread_names(true)
            .with_ansi(false)
            .with_writer(writer)
            .boxed(),
        LogFormat::Text => fmt::layer()
            .with_target(false)
            .with_thread_names(true)
            .with_ansi(ansi)
            .with_writer(writer)
            .boxed(),
    };

    let subscriber = tracing_subscriber::registry().with(filter).with(output);
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        return Telemetry::disabled();
    }

    Telemetry {
        filter: Some(handle),
        pinned_by_env,
        _guard: guard,
    }
}

/// Turns a configured level into a filter directive.
///
/// Numeric levels (10 debug, 20 info, 30 warning, 40 error, 50 critical)
/// are accepted for compatibility with existing configuration files. Any
/// other value is used as a directive as-is.
fn level_directive(level: &str) -> String {
    let level = level.trim();
    match level.parse::<u32>() {
        Ok(0..=9) => "trace".to_string(),
        Ok(10..=19) => "debug".to_string(),
        Ok(20..=29) => "info".to_string(),
        Ok(30..=39) => "warn".to_string(),
        Ok(_) => "error".to_string(),
        Err(_) => level.to_string(),
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum LogTarget {
    Stderr,
    Stdout,
    File(PathBuf),
}

impl LogTarget {
    /// Opens the writer. A log file that cannot be opened falls back to
    /// stderr.
    fn open(&self) -> (BoxMakeWriter, Option<WorkerGuard>, bool) {
        match self {
            LogTarget::Stderr => (
                BoxMakeWriter::new(std::io::stderr),
                None,
                std::io::stderr().is_terminal(),
            ),
            LogTarget::Stdout => (
                BoxMakeWriter::new(std::io::stdout),
                None,
                std::io::stdout().is_terminal(),
            ),
            LogTarget::File(path) => match std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
            {
                Ok(file) => {
                    let (non_blocking, guard) = tracing_appender::non_blocking(file);
                    (BoxMakeWriter::new(non_blocking), Some(guard), false)
                }
                Err(err) => {
                    eprintln!(
                        "Warning: failed to open log file {}: {}",
                        path.display(),
                        err
                    );
                    LogTarget::Stderr.open()
                }
            },
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
struct LogSettings {
    format: LogFormat,
    target: LogTarget,
}

impl LogSettings {
    /// A log file wins over the stream selection.
    fn from_env() -> Self {
        let format = match env_choice(LOG_FORMAT_ENV).as_deref() {
            Some("json") => LogFormat::Json,
            _ => LogFormat::Text,
        };
        let file = std::env::var(LOG_FILE_ENV)
            .ok()
            .filter(|value| !value.trim().is_empty())
            .map(PathBuf::from);
        let target = match (file, env_choice(LOG_STREAM_ENV).as_deref()) {
            (Some(path), _) => LogTarget::File(path),
            (None, Some("stdout")) => LogTarget::Stdout,
            (None, _) => LogTarget::Stderr,
        };
        Self { format, target }
    }
}

fn env_choice(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_lowercase())
}
