//! Logging for the Swarmcast binary
//!
//! The console shows Swarmcast's own crates at the level picked on the command
//! line and holds dependencies at `warn`. Per-request HTTP spans from
//! `tower_http` join in at `debug` and `trace`. Alongside the console, every
//! Swarmcast event down to `trace` lands in `swarmcast-last-run.log`, so a
//! stalled stream can be diagnosed after the fact.

use std::fmt;
use std::fs::{File, create_dir_all};
use std::path::Path;

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt as tracing_fmt};

/// Log targets owned by this workspace.
const SWARMCAST_TARGETS: [&str; 4] = ["swarmcast", "swarmcast_core", "swarmcast_web", "swarmcast_sim"];

const LOG_FILE_NAME: &str = "swarmcast-last-run.log";

/// Directive string for the console layer at `level`.
///
/// # Examples
/// ```
/// use swarmcast_core::tracing_setup::console_directives;
///
/// let directives = console_directives(tracing::Level::INFO);
/// assert!(directives.starts_with("warn,"));
/// assert!(directives.contains("swarmcast_web=info"));
/// ```
pub fn console_directives(level: Level) -> String {
    let level = level_name(level);
    let mut directives = vec!["warn".to_string()];
    directives.extend(SWARMCAST_TARGETS.iter().map(|target| format!("{target}={level}")));
    if matches!(level.as_str(), "debug" | "trace") {
        directives.push(format!("tower_http={level}"));
    }
    directives.join(",")
}

/// Directive string for the on-disk log.
pub fn file_directives() -> String {
    let mut directives = vec!["info".to_string()];
    directives.extend(SWARMCAST_TARGETS.iter().map(|target| format!("{target}=trace")));
    directives.push("tower_http=debug".to_string());
    directives.join(",")
}

fn level_name(level: Level) -> String {
    level.as_str().to_ascii_lowercase()
}

/// Installs the console and file layers.
///
/// `RUST_LOG` replaces the console directives when set. The log file is
/// recreated on every run inside `logs_dir` (default `./logs`). A subscriber
/// already installed by an earlier call stays in place.
///
/// # Errors
/// - `std::io::Error` - The logs directory or the log file could not be created
pub fn init_tracing(console_level: Level, logs_dir: Option<&Path>) -> std::io::Result<()> {
    let logs_dir = logs_dir.unwrap_or_else(|| Path::new("logs"));
    create_dir_all(logs_dir)?;
    let log_file_path = logs_dir.join(LOG_FILE_NAME);
    let log_file = File::create(&log_file_path)?;

    let console_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(console_directives(console_level)));

    let console_layer = tracing_fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_filter(console_filter);

    let file_layer = tracing_fmt::layer()
        .with_ansi(false)
        .with_target(true)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true)
        .with_writer(log_file)
        .with_filter(EnvFilter::new(file_directives()));

    let installed = tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .is_ok();

    tracing::info!(
        "Logging at {} to console and {} (new subscriber: {})",
        level_name(console_level),
        log_file_path.display(),
        installed
    );

    Ok(())
}

/// Verbosity accepted by `--log-level`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum CliLogLevel {
    Error,
    Warn,
    Info,
    Debug,
    /// Includes per-chunk read tracing
    Trace,
}

impl CliLogLevel {
    pub fn as_tracing_level(self) -> Level {
        match self {
            CliLogLevel::Error => Level::ERROR,
            CliLogLevel::Warn => Level::WARN,
            CliLogLevel::Info => Level::INFO,
            CliLogLevel::Debug => Level::DEBUG,
            CliLogLevel::Trace => Level::TRACE,
        }
    }
}

impl fmt::Display for CliLogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&level_name(self.as_tracing_level()))
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_console_keeps_dependencies_at_warn() {
        assert_eq!(
            console_directives(Level::INFO),
            "warn,swarmcast=info,swarmcast_core=info,swarmcast_web=info,swarmcast_sim=info"
        );
    }

    #[test]
    fn test_console_adds_http_spans_when_verbose() {
        assert!(console_directives(Level::DEBUG).ends_with(",tower_http=debug"));
        assert!(console_directives(Level::TRACE).ends_with(",tower_http=trace"));
        assert!(!console_directives(Level::WARN).contains("tower_http"));
    }

    #[test]
    fn test_directives_parse() {
        for level in [Level::ERROR, Level::WARN, Level::INFO, Level::DEBUG, Level::TRACE] {
            assert!(EnvFilter::try_new(console_directives(level)).is_ok(), "{level}");
        }
        assert!(EnvFilter::try_new(file_directives()).is_ok());
    }

    #[test]
    fn test_cli_level_display_matches_directive_names() {
        assert_eq!(CliLogLevel::Warn.to_string(), "warn");
        assert_eq!(CliLogLevel::Trace.to_string(), "trace");
    }

    #[test]
    fn test_init_creates_log_file() {
        let dir = TempDir::new().unwrap();
        let logs = dir.path().join("nested/logs");

        init_tracing(Level::INFO, Some(&logs)).unwrap();

        assert!(logs.join(LOG_FILE_NAME).is_file());
    }
}
