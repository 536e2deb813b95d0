//! Error handling utilities shared across the crate.

use std::path::PathBuf;

use thiserror::Error;

/// Convenient result type used throughout the crate.
pub type Result<T, E = DocvecError> = std::result::Result<T, E>;

/// Domain-specific error describing failures during scanning, tokenization, or training.
#[derive(Debug, Error)]
pub enum DocvecError {
    /// Configuration failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// The corpus root could not be traversed. Fatal before any tokenization happens.
    #[error("failed to scan corpus root {root:?}: {reason}")]
    Scan {
        /// Root directory handed to the scanner.
        root: PathBuf,
        /// Human readable cause reported by the traversal.
        reason: String,
    },
    /// The tokenizer boundary failed for a single document.
    #[error("failed to tokenize {path:?}: {reason}")]
    Tokenization {
        /// Document path passed to the tokenizer.
        path: PathBuf,
        /// Failure reported by the tokenizer.
        reason: String,
    },
    /// The vector trainer failed during the vocabulary or an epoch step.
    #[error("training failed: {0}")]
    Training(String),
    /// Filesystem IO error with optional context path.
    #[error("io error while processing {path:?}: {source}")]
    Io {
        /// Underlying IO error returned by the standard library.
        source: std::io::Error,
        /// Target path associated with the IO failure if available.
        path: Option<PathBuf>,
    },
    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),
    /// Catch-all variant for invariants that should not occur.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for DocvecError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl DocvecError {
    /// Helper constructor that attaches an optional path when wrapping IO errors.
    pub fn io(source: std::io::Error, path: Option<PathBuf>) -> Self {
        Self::Io { source, path }
    }

    /// Builds a [`DocvecError::Tokenization`] for `path`.
    pub fn tokenization(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Tokenization {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Returns `true` for per-document failures that a pass may skip over.
    #[must_use]
    pub fn is_per_document(&self) -> bool {
        matches!(self, Self::Tokenization { .. })
    }
}
