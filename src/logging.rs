//! Process-wide `tracing` subscriber.
//!
//! The terminal is owned by the UI, so events go to `logs/app.log` under the
//! config directory. Filtering follows `RHYTHM_SLICER_LOG` (an `EnvFilter`
//! directive string), defaulting to `info`.

use crate::config;
use anyhow::{Context, Result};
use std::fs::{self, OpenOptions};
use std::path::PathBuf;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "RHYTHM_SLICER_LOG";
const LOG_FILE: &str = "app.log";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber and return the log file path.
pub fn init_logging() -> Result<PathBuf> {
    let dir = config::log_dir()?;
    fs::create_dir_all(&dir).with_context(|| format!("failed to create {}", dir.display()))?;
    let path = dir.join(LOG_FILE);
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("failed to open log file {}", path.display()))?;

    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_thread_names(true)
        .with_target(true)
        .try_init()
        .map_err(|err| anyhow::anyhow!("failed to install log subscriber: {err}"))?;

    tracing::info!(path = %path.display(), "logging initialized");
    Ok(path)
}

/// Fall back to stderr when the log file cannot be opened.
pub fn init_stderr_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(std::io::stderr)
        .with_thread_names(true)
        .try_init();
}
