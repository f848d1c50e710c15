//! Tracing subscriber setup.
//!
//! Events go to stderr in human or JSON form. When a log directory is given,
//! a daily-rolling JSON-lines file is written alongside through a
//! non-blocking writer; keep the returned guard alive until exit so buffered
//! lines are flushed.

use std::path::Path;

use clap::ValueEnum;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// File name prefix for rolled log files.
pub const LOG_FILE_PREFIX: &str = "task-bridge";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    #[default]
    Human,
    Json,
}

/// Build the filter: `-v` forces `debug`, otherwise `RUST_LOG` or `info`.
pub fn env_filter(verbose: bool) -> EnvFilter {
    if verbose {
        return EnvFilter::new("debug");
    }
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber. Returns the file writer guard, if any.
pub fn init(
    verbose: bool,
    format: LogFormat,
    log_dir: Option<&Path>,
) -> anyhow::Result<Option<WorkerGuard>> {
    let human = (format == LogFormat::Human).then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
    });
    let json = (format == LogFormat::Json).then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_current_span(false)
    });

    let (file, guard) = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let appender = tracing_appender::rolling::Builder::new()
                .rotation(tracing_appender::rolling::Rotation::DAILY)
                .filename_prefix(LOG_FILE_PREFIX)
                .filename_suffix("jsonl")
                .build(dir)?;
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .json()
                .with_writer(writer)
                .with_ansi(false)
                .with_current_span(false)
                .with_span_list(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter(verbose))
        .with(human)
        .with(json)
        .with(file)
        .try_init()
        .ok();

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbose_forces_debug() {
        assert_eq!(env_filter(true).to_string(), "debug");
    }

    #[test]
    fn test_log_format_parses_from_cli_values() {
        assert_eq!(LogFormat::from_str("human", true).unwrap(), LogFormat::Human);
        assert_eq!(LogFormat::from_str("JSON", true).unwrap(), LogFormat::Json);
        assert!(LogFormat::from_str("xml", true).is_err());
    }

    #[test]
    fn test_init_creates_log_dir() {
        let dir = tempfile::tempdir().unwrap();
        let logs = dir.path().join("logs");
        let guard = init(false, LogFormat::Json, Some(&logs)).unwrap();
        assert!(guard.is_some());
        assert!(logs.is_dir());
    }
}
