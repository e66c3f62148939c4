//! Error types for the annotation store.

use std::path::PathBuf;
use thiserror::Error;

use crate::span::Span;

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Fatal conditions raised by the store, the combined reader/writer and the
/// anchor generator.
///
/// Orphaned children are not errors; see [`crate::hierarchy::Orphan`].
#[derive(Debug, Error)]
pub enum StoreError {
    /// A span writer received spans whose starts decrease.
    #[error("{key}: span {index} ({current}) starts before the preceding span ({previous})")]
    OrderingViolation {
        key: String,
        index: usize,
        previous: Span,
        current: Span,
    },

    /// A span writer received a span that ends before it starts.
    #[error("{key}: span {index} ({span}) ends before it starts")]
    InvertedSpan { key: String, index: usize, span: Span },

    /// Incompatible annotations were combined or zipped.
    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    /// The key has never been written.
    #[error("{key}: no such annotation ({})", .path.display())]
    MissingFile { key: String, path: PathBuf },

    /// A name segment cannot be used in a key.
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// A stored line could not be decoded.
    #[error("{}:{line}: {message}", .path.display())]
    Malformed {
        path: PathBuf,
        line: usize,
        message: String,
    },

    /// Every id of the configured length is already taken.
    #[error("No free ids left for prefix {prefix:?} with {length} hex digits")]
    IdSpaceExhausted { prefix: String, length: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    pub fn schema_mismatch(msg: impl Into<String>) -> Self {
        StoreError::SchemaMismatch(msg.into())
    }

    pub fn invalid_key(msg: impl Into<String>) -> Self {
        StoreError::InvalidKey(msg.into())
    }

    /// True for "not yet computed", which a scheduler may retry by running the
    /// producing step.
    pub fn is_missing(&self) -> bool {
        matches!(self, StoreError::MissingFile { .. })
    }
}
