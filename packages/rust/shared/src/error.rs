//! Error types for ArticleForge.
//!
//! Library crates use [`ArticleForgeError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all ArticleForge operations.
#[derive(Debug, thiserror::Error)]
pub enum ArticleForgeError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Every configured provider failed (retries and fallbacks exhausted).
    #[error("provider error: {0}")]
    Provider(String),

    /// Database or storage layer error. Always fatal to a run.
    #[error("storage error: {0}")]
    Storage(String),

    /// Brief or draft parsing error.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (malformed brief, bad identifiers, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Illegal job/section state transition.
    #[error("state error: {message}")]
    State { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, ArticleForgeError>;

impl ArticleForgeError {
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

    /// Create a state-transition error from any displayable message.
    pub fn state(msg: impl Into<String>) -> Self {
        Self::State {
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

    /// Whether this error must abort a run without attempting further writes.
    pub fn is_persistence(&self) -> bool {
        matches!(self, Self::Storage(_))
    }
}
