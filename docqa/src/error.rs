//! Error types for the `docqa` crate.

use thiserror::Error;

use crate::embedding::EmbeddingDescriptor;
use crate::indexer::IndexReport;

/// Errors that can occur while indexing or answering.
#[derive(Debug, Error)]
pub enum RagError {
    /// A document could not be read. Indexing skips the document and continues.
    #[error("Load error ({source_id}): {message}")]
    LoadError {
        /// The path or identifier of the unreadable document.
        source_id: String,
        /// A description of the failure.
        message: String,
    },

    /// The embedding model was unavailable or rejected its input.
    #[error("Embedding error ({provider}): {message}")]
    EmbeddingError {
        /// The embedding provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// The vector store is unavailable or its data is corrupt.
    #[error("Store error ({backend}): {message}")]
    StoreError {
        /// The vector store backend that produced the error.
        backend: String,
        /// A description of the failure.
        message: String,
    },

    /// A query vector was malformed.
    #[error("Retrieval error: {0}")]
    RetrievalError(String),

    /// The language model invocation failed or timed out.
    #[error("Generation error ({model}): {message}")]
    GenerationError {
        /// The model that was invoked.
        model: String,
        /// A description of the failure.
        message: String,
    },

    /// The configured embedding model differs from the one the index was built with.
    #[error("Embedding model mismatch: index was built with {stored}, provider is {configured}")]
    EmbeddingMismatch {
        /// Descriptor persisted alongside the index.
        stored: EmbeddingDescriptor,
        /// Descriptor of the provider in use.
        configured: EmbeddingDescriptor,
    },

    /// A configuration validation error.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// A failure annotated with the pipeline operation that produced it.
    #[error("{operation} failed: {source}")]
    PipelineError {
        /// The operation that failed, e.g. `"query embedding"`.
        operation: String,
        /// The underlying failure.
        #[source]
        source: Box<RagError>,
    },

    /// An indexing run stopped early. `report` holds the progress made before the failure.
    #[error(
        "Indexing aborted after {} written / {} skipped chunks: {source}",
        .report.written(),
        .report.skipped
    )]
    IndexingAborted {
        /// Counts accumulated before the failure.
        report: IndexReport,
        /// The failure that stopped the run.
        #[source]
        source: Box<RagError>,
    },
}

impl RagError {
    /// Wrap `self` with the name of the operation that produced it.
    pub fn during(self, operation: impl Into<String>) -> Self {
        RagError::PipelineError { operation: operation.into(), source: Box::new(self) }
    }

    /// Return the innermost error, skipping `PipelineError` and `IndexingAborted` layers.
    pub fn root_cause(&self) -> &RagError {
        match self {
            RagError::PipelineError { source, .. } | RagError::IndexingAborted { source, .. } => {
                source.root_cause()
            }
            other => other,
        }
    }
}

/// A convenience result type for RAG operations.
pub type Result<T> = std::result::Result<T, RagError>;
