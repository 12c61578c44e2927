//! Tracing subscriber setup. Log output goes to stderr, and optionally also to
//! a file; `RUST_LOG` overrides the default filter.

use std::{
    fs::{self, File, OpenOptions},
    path::Path,
    sync::Mutex,
};

use anyhow::Context;
use clap::ValueEnum;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

pub const DEFAULT_FILTER: &str = "wallet_ledger=info,tower_http=debug";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LogFormat {
    /// Human-readable output for local runs.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

/// Opens `path` for appending, creating it and its directory if needed.
pub fn open_log_file(path: &Path) -> anyhow::Result<File> {
    if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create `{}`", dir.display()))?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open log file `{}`", path.display()))
}

/// Installs the global subscriber. Fails if one is already installed.
///
/// With `log_file` set, every event is also appended there as plain text,
/// request spans from the HTTP layer included.
pub fn init_logging(
    default_filter: &str,
    format: LogFormat,
    log_file: Option<&Path>,
) -> anyhow::Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let file_layer = log_file
        .map(open_log_file)
        .transpose()?
        .map(|file| fmt::layer().with_ansi(false).with_writer(Mutex::new(file)));

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer);
    match format {
        LogFormat::Pretty => registry
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_line_number(true),
            )
            .try_init()?,
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_target(true),
            )
            .try_init()?,
    }

    tracing::info!(?format, ?log_file, "Logging initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn log_file_is_appended_in_a_created_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs/all.logs");

        writeln!(open_log_file(&path).unwrap(), "first").unwrap();
        writeln!(open_log_file(&path).unwrap(), "second").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "first\nsecond\n");
    }
}
