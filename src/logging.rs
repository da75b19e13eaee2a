//! Logging setup
//!
//! Logs go to a timestamped file under the log directory and, unless the
//! terminal is taken over by the progress monitor, to stderr as well.

use crate::Result;
use chrono::Local;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default filter when `RUST_LOG` is not set
const DEFAULT_FILTER: &str = "info";

/// Path of a new log file named after the current local time
pub fn log_file_path(log_dir: &Path) -> PathBuf {
    let stamp = Local::now().format("%Y%m%d_%H%M%S");
    log_dir.join(format!("crawler_{}.log", stamp))
}

/// Install the global subscriber and return the log file path
pub fn init(log_dir: &Path, console: bool) -> Result<PathBuf> {
    fs::create_dir_all(log_dir)?;
    let path = log_file_path(log_dir);
    let file = Arc::new(File::create(&path)?);

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let file_layer = fmt::layer().with_ansi(false).with_writer(file);
    let console_layer = console.then(|| fmt::layer().with_writer(std::io::stderr));

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(console_layer)
        .try_init()?;

    tracing::info!(path = %path.display(), "Logging initialized");
    Ok(path)
}
