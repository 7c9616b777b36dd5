//! Structured logging for Friendmatch
//!
//! Every line carries a category:
//! - PROFILE: profile pipeline lifecycle
//! - MATCH: match pipeline state transitions
//! - INFERENCE: model calls and retries
//! - STORE: persistence
//! - ERROR: failures that abort an operation
//!
//! Lines go to stdout and, when a log directory is configured, to a per-day
//! file `friendmatch-YYYY-MM-DD.log`.

use chrono::{Local, Utc};
use once_cell::sync::OnceCell;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::EnvFilter;

use crate::error::ConfigError;

/// Log categories for structured logging
#[derive(Debug, Clone, Copy)]
pub enum LogCategory {
    Profile,
    Match,
    Inference,
    Store,
    Error,
}

impl LogCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogCategory::Profile => "PROFILE",
            LogCategory::Match => "MATCH",
            LogCategory::Inference => "INFERENCE",
            LogCategory::Store => "STORE",
            LogCategory::Error => "ERROR",
        }
    }
}

static INITIALIZED: OnceCell<()> = OnceCell::new();

fn log_file_path(log_dir: &Path) -> PathBuf {
    let today = Local::now().format("%Y-%m-%d").to_string();
    log_dir.join(format!("friendmatch-{}.log", today))
}

/// Install the global subscriber. Safe to call more than once; only the first
/// call has an effect.
pub fn init_logging(log_dir: Option<&Path>) -> Result<(), ConfigError> {
    INITIALIZED
        .get_or_try_init(|| {
            let filter =
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

            match log_dir {
                Some(dir) => {
                    fs::create_dir_all(dir)?;
                    let file = OpenOptions::new()
                        .create(true)
                        .append(true)
                        .open(log_file_path(dir))?;
                    let writer = std::io::stdout.and(Mutex::new(file));
                    let _ = tracing_subscriber::fmt()
                        .with_env_filter(filter)
                        .with_ansi(false)
                        .with_writer(writer)
                        .try_init();
                }
                None => {
                    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
                }
            }
            Ok::<(), ConfigError>(())
        })
        .map(|_| ())?;

    log(LogCategory::Profile, None, "Friendmatch logging initialized");
    Ok(())
}

/// Log a message with category and optional user context
pub fn log(category: LogCategory, user_id: Option<&str>, message: &str) {
    let user = user_id
        .map(|id| id.get(..8).unwrap_or(id))
        .unwrap_or("-");

    match category {
        LogCategory::Profile => tracing::info!(target: "friendmatch::profile", category = category.as_str(), user, "{}", message),
        LogCategory::Match => tracing::info!(target: "friendmatch::match", category = category.as_str(), user, "{}", message),
        LogCategory::Inference => tracing::debug!(target: "friendmatch::inference", category = category.as_str(), user, "{}", message),
        LogCategory::Store => tracing::debug!(target: "friendmatch::store", category = category.as_str(), user, "{}", message),
        LogCategory::Error => tracing::error!(target: "friendmatch::error", category = category.as_str(), user, "{}", message),
    }
}

pub fn log_profile(user_id: Option<&str>, message: &str) {
    log(LogCategory::Profile, user_id, message);
}

pub fn log_match(user_id: Option<&str>, message: &str) {
    log(LogCategory::Match, user_id, message);
}

pub fn log_inference(label: Option<&str>, message: &str) {
    log(LogCategory::Inference, label, message);
}

pub fn log_store(user_id: Option<&str>, message: &str) {
    log(LogCategory::Store, user_id, message);
}

pub fn log_error(user_id: Option<&str>, message: &str) {
    log(LogCategory::Error, user_id, message);
}

/// Clean up old log files (keep last 7 days)
pub fn cleanup_old_logs(log_dir: &Path) -> Result<usize, ConfigError> {
    let mut deleted = 0;

    if !log_dir.exists() {
        return Ok(0);
    }

    let cutoff = Utc::now() - chrono::Duration::days(7);

    for entry in fs::read_dir(log_dir)? {
        let entry = entry?;
        let path = entry.path();
        let is_log = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with("friendmatch-") && n.ends_with(".log"));
        if !is_log {
            continue;
        }

        if let Ok(modified) = entry.metadata().and_then(|m| m.modified()) {
            let modified_time: chrono::DateTime<Utc> = modified.into();
            if modified_time < cutoff && fs::remove_file(&path).is_ok() {
                deleted += 1;
            }
        }
    }

    Ok(deleted)
}
