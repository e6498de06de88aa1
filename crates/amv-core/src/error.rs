//! Error types for the AMV toolkit.
//!
//! Detection and progress-parsing problems never surface here; they are
//! absorbed where they happen. What remains are orchestration failures that
//! the caller has to report: failed steps, failed jobs, and I/O on the files
//! a job owns.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Main error type for the AMV toolkit.
#[derive(Debug, Error)]
pub enum AmvError {
    // File system errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    #[error("Audio error: {message}")]
    Audio { message: String },

    // Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    // External tool errors
    #[error("{tool} not found! Run setup first.")]
    ToolNotFound { tool: String },

    #[error("{tool} failed: {message}")]
    ToolFailed { tool: String, message: String },

    #[error("{what} timed out after {after:?}")]
    Timeout { what: String, after: Duration },

    // Orchestration errors
    #[error("Step {index} failed: {message}")]
    StepFailed { index: usize, message: String },

    #[error("Job failed: {message}")]
    JobFailed { message: String },

    #[error("No free file name for {path} after {attempts} attempts")]
    NameExhausted { path: PathBuf, attempts: u32 },

    #[error("Validation error for {field}: {message}")]
    Validation { field: String, message: String },

    #[error("Operation was cancelled")]
    Cancelled,

    // Generic errors
    #[error("{0}")]
    Other(String),
}

/// Result type alias for AMV operations.
pub type Result<T> = std::result::Result<T, AmvError>;

impl From<std::io::Error> for AmvError {
    fn from(err: std::io::Error) -> Self {
        AmvError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for AmvError {
    fn from(err: serde_json::Error) -> Self {
        AmvError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<hound::Error> for AmvError {
    fn from(err: hound::Error) -> Self {
        match err {
            hound::Error::IoError(e) => AmvError::from(e),
            other => AmvError::Audio {
                message: other.to_string(),
            },
        }
    }
}

impl AmvError {
    /// Create an IO error with a description of what was being attempted.
    pub fn io(action: &str, path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        let path = path.into();
        AmvError::Io {
            message: format!("{} {}: {}", action, path.display(), err),
            path: Some(path),
            source: Some(err),
        }
    }

    /// True when the error came from a cooperative cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, AmvError::Cancelled)
    }

    /// Short, user-facing message without the variant prefix where possible.
    pub fn user_message(&self) -> String {
        match self {
            AmvError::JobFailed { message }
            | AmvError::ToolFailed { message, .. }
            | AmvError::StepFailed { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}
