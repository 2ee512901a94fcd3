//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the tracing subscriber
//! - Append access and error lines to log files when enabled
//!
//! # Design Decisions
//! - `RUST_LOG` wins over the configured filter
//! - Debug mode lowers the default filter to `debug`
//! - File logging is best effort: write failures are dropped

use std::fmt::Display;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;

const ACCESS_TAG: &str = "[dispatch-gateway]";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Initialize the global tracing subscriber.
pub fn init(config: &LoggingConfig) -> Result<(), tracing_subscriber::util::TryInitError> {
    let default_filter = if config.debug {
        "dispatch_gateway=debug,tower_http=debug".to_string()
    } else {
        config.filter.clone()
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .with(tracing_subscriber::fmt::layer())
        .try_init()
}

/// An append-only log file, opened on first write.
#[derive(Debug)]
struct LogFile {
    path: PathBuf,
    file: Mutex<Option<File>>,
}

impl LogFile {
    fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file: Mutex::new(None),
        }
    }

    fn append(&self, text: &str) {
        let mut slot = self.file.lock();
        if slot.is_none() {
            match open_append(&self.path) {
                Ok(file) => *slot = Some(file),
                Err(e) => {
                    tracing::debug!(path = %self.path.display(), error = %e, "Cannot open log file");
                    return;
                }
            }
        }
        if let Some(file) = slot.as_mut() {
            if file.write_all(text.as_bytes()).is_err() {
                // Reopen on the next write.
                *slot = None;
            }
        }
    }
}

fn open_append(path: &Path) -> std::io::Result<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}

fn timestamp() -> String {
    chrono::Local::now().format(TIMESTAMP_FORMAT).to_string()
}

/// Durable access and error logs written by the recovery boundary.
#[derive(Debug, Default)]
pub struct RequestLog {
    access: Option<LogFile>,
    error: Option<LogFile>,
}

impl RequestLog {
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn from_config(config: &LoggingConfig) -> Self {
        if !config.log_in_file {
            return Self::disabled();
        }
        Self {
            access: Some(LogFile::new(&config.access_log_path)),
            error: Some(LogFile::new(&config.error_log_path)),
        }
    }

    /// `[dispatch-gateway] <time> | <status> | <method> | <path>`
    pub fn access(&self, status: u16, method: &str, path: &str) {
        if let Some(log) = &self.access {
            log.append(&format!(
                "{} {} | {} | {} | {}\n",
                ACCESS_TAG,
                timestamp(),
                status,
                method,
                path
            ));
        }
    }

    /// Timestamped fault entry followed by the captured stack trace.
    pub fn error(&self, fault: &dyn Display, stack: Option<&str>) {
        if let Some(log) = &self.error {
            log.append(&format!(
                "\n[{}] app.ERROR: {}\nStack trace:\n{}\n",
                timestamp(),
                fault,
                stack.unwrap_or("<unavailable>")
            ));
        }
    }
}
