use std::fs::{self, OpenOptions};
use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;

use crate::config::LogConfig;
use crate::error::{Error, Result};

pub const LOG_FILTER_ENV: &str = "TODO_LOG";

/// Install the global subscriber. Output goes to `cfg.file`: the terminal UI
/// owns stdout.
pub fn init(cfg: &LogConfig) -> Result<()> {
    let path = Path::new(&cfg.file);
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .map_err(|e| Error::msg(format!("failed to create {}: {e}", parent.display())))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| Error::msg(format!("failed to open log file {}: {e}", path.display())))?;

    let filter = EnvFilter::try_from_env(LOG_FILTER_ENV)
        .or_else(|_| EnvFilter::try_new(&cfg.level))
        .map_err(|e| Error::msg(format!("invalid log filter '{}': {e}", cfg.level)))?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false);
    let installed = if cfg.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| Error::msg(format!("failed to install log subscriber: {e}")))
}
