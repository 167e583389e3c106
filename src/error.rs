//! Error types for the `docrag` crate.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur in document question-answering operations.
#[derive(Debug, Error)]
pub enum RagError {
    /// A document or file could not be ingested.
    #[error("Ingest error ({source_label}): {message}")]
    Ingest {
        /// The document id or file path that failed.
        source_label: String,
        /// A description of the failure.
        message: String,
    },

    /// An index save or load failed at the I/O layer.
    #[error("Storage error at {path}: {source}")]
    Storage {
        /// The file the operation was writing or reading.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Persisted index state is internally inconsistent.
    #[error("Corrupt index at {path}: {message}")]
    CorruptIndex {
        /// The file where the inconsistency was detected.
        path: PathBuf,
        /// A description of the inconsistency.
        message: String,
    },

    /// An error occurred during embedding generation.
    #[error("Embedding error ({provider}): {message}")]
    Embedding {
        /// The embedding provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// A language-model call failed.
    #[error("Generation error ({provider}): {message}")]
    Generation {
        /// The language-model provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// A tenant's on-disk configuration or index could not be loaded.
    #[error("Failed to load tenant '{tenant}': {message}")]
    TenantLoad {
        /// The tenant that failed to load.
        tenant: String,
        /// A description of the failure.
        message: String,
    },

    /// An index invariant was violated (dimension mismatch, duplicate id).
    #[error("Index error: {0}")]
    Index(String),

    /// A configuration validation error.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// A convenience result type for docrag operations.
pub type Result<T> = std::result::Result<T, RagError>;
