//! Logging configuration for the meal assistant.
//!
//! Provides platform-aware logging initialization that writes to files in chat
//! mode (so log lines do not interleave with the conversation) and stderr
//! otherwise, plus the append-only prompt transcript.

use chrono::Local;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

use crate::error::{AssistantError, Result};

/// Initializes logging to `<log_dir>/meal-assistant.log`.
///
/// Falls back to no logging if the file cannot be created.
pub fn init_file_logging(log_dir: &Path) {
    let log_path = log_dir.join("meal-assistant.log");

    if let Err(e) = fs::create_dir_all(log_dir) {
        eprintln!("Warning: Could not create log directory: {e}");
        return;
    }

    // Truncate on each run to avoid unbounded growth
    let log_file = match File::create(&log_path) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Warning: Could not create log file: {e}");
            return;
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(Mutex::new(log_file))
        .with_ansi(false)
        .init();
}

/// Initializes logging to stderr.
pub fn init_stderr_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

/// Returns the default directory for log files.
///
/// Uses XDG state directory on Linux (`~/.local/state/meal-assistant`),
/// or falls back to config directory on other platforms.
pub fn default_log_dir() -> PathBuf {
    if let Some(state_dir) = dirs::state_dir() {
        return state_dir.join("meal-assistant");
    }

    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("meal-assistant");
    }

    std::env::temp_dir().join("meal-assistant")
}

/// Append-only record of every rendered prompt and the model's response.
#[derive(Debug)]
pub struct TranscriptLog {
    path: PathBuf,
    file: Mutex<File>,
}

impl TranscriptLog {
    /// Opens (or creates) `transcript.log` inside `dir`.
    pub fn open(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir).map_err(|e| {
            AssistantError::internal(format!(
                "Failed to create transcript directory {}: {e}",
                dir.display()
            ))
        })?;
        let path = dir.join("transcript.log");
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| {
                AssistantError::internal(format!(
                    "Failed to open transcript {}: {e}",
                    path.display()
                ))
            })?;

        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    /// Returns the transcript file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one prompt/response pair.
    ///
    /// Write failures are logged and swallowed; the transcript never fails a turn.
    pub fn record(&self, prompt: &str, response: &str) {
        let now = Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
        let entry = format!(
            "{now} | INFO | prompt: \n{prompt}\n\n{now} | INFO | LLM: \n{response}\n\n"
        );

        let Ok(mut file) = self.file.lock() else {
            tracing::warn!("Transcript lock poisoned; dropping entry");
            return;
        };
        if let Err(e) = file.write_all(entry.as_bytes()) {
            tracing::warn!(path = %self.path.display(), "Failed to write transcript: {e}");
        }
    }
}
