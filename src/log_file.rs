//! Persistent error log kept in the plugin directory

use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::error;

pub const LOG_FILE_NAME: &str = "save_restore_error.log";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Error => "ERROR",
        })
    }
}

/// Append-only text log, one `LEVEL: message` line per entry
#[derive(Debug, Clone)]
pub struct ErrorLog {
    path: PathBuf,
}

impl ErrorLog {
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            path: dir.join(LOG_FILE_NAME),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, level: LogLevel, message: &str) {
        self.write_entry(&format!("{}: {}\n", level, message));
    }

    /// Log an error line followed by its full cause chain
    pub fn record_error(&self, context: &str, err: &anyhow::Error) {
        self.write_entry(&format!("{}: {}: {:#}\n{:?}\n", LogLevel::Error, context, err, err));
    }

    fn write_entry(&self, entry: &str) {
        if let Err(e) = self.try_write(entry) {
            error!("Failed to write {}: {}", self.path.display(), e);
            eprintln!("Failed to log error: {}", e);
            eprint!("{}", entry);
        }
    }

    fn try_write(&self, entry: &str) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(entry.as_bytes())
    }
}
