//! Error types for LeadRevive.
//!
//! Library crates use [`LeadReviveError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all LeadRevive operations.
#[derive(Debug, thiserror::Error)]
pub enum LeadReviveError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// The uploaded file has no usable lines.
    #[error("the file is empty")]
    EmptyFile,

    /// One or more required header columns are absent.
    #[error("missing required columns: {}", columns.join(", "))]
    MissingColumns { columns: Vec<String> },

    /// An import was attempted without the caller asserting marketing consent.
    #[error("consent is required before leads can be imported")]
    ConsentRequired,

    /// Malformed input that is not a per-row validation problem.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Transport error talking to the hosted backend.
    #[error("network error: {0}")]
    Network(String),

    /// The hosted backend answered with a non-success status.
    #[error("backend error (HTTP {status}): {message}")]
    Backend { status: u16, message: String },

    /// The hosted backend rejected our credentials.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// A write was attempted against a read-only store.
    #[error("storage error: database is opened in read-only mode")]
    ReadOnly,

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (bad argument, invalid enum value, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, LeadReviveError>;

impl LeadReviveError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether retrying the next batch against the same sink is pointless.
    ///
    /// The import loop stops on fatal errors and isolates everything else
    /// to the batch that produced it.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Unauthorized(_) | Self::ReadOnly | Self::Config { .. }
        )
    }
}
