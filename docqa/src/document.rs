//! Data types for documents, chunks, stored records, and search results.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A unit of source text produced by a [`DocumentLoader`](crate::loader::DocumentLoader).
///
/// A PDF yields one `Document` per page; a plain text file yields a single
/// `Document` with no page number.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    /// Source identifier, normally the file path relative to the corpus root.
    pub source: String,
    /// The raw text content.
    pub text: String,
    /// Zero-based page number, when the source format is paginated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    /// Loader-specific key-value metadata (e.g. `content_type`).
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl Document {
    /// Create a document without a page number or metadata.
    pub fn new(source: impl Into<String>, text: impl Into<String>) -> Self {
        Self { source: source.into(), text: text.into(), page: None, metadata: HashMap::new() }
    }

    /// Set the page number.
    pub fn with_page(mut self, page: u32) -> Self {
        self.page = Some(page);
        self
    }
}

/// A segment of a [`Document`], the unit of embedding and retrieval.
///
/// `id` depends only on `(source, page, chunk_index)`, so re-chunking an
/// unchanged document reproduces the same ids. `content_hash` detects text
/// changes under a stable id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Chunk {
    /// Stable identifier, `"{source}:{page}:{chunk_index}"`.
    pub id: String,
    /// Source identifier of the parent document.
    pub source: String,
    /// Page number of the parent document.
    pub page: Option<u32>,
    /// Position of this chunk within its page.
    pub chunk_index: usize,
    /// The chunk text.
    pub text: String,
    /// Hex SHA-256 of `text`.
    pub content_hash: String,
}

/// Metadata persisted with each [`VectorRecord`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RecordMetadata {
    /// Source identifier of the originating document.
    pub source: String,
    /// Page number of the originating document.
    pub page: Option<u32>,
    /// Hex SHA-256 of the record text, used to skip unchanged chunks on re-index.
    pub content_hash: String,
}

/// The durable unit of the vector store, keyed by `id`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VectorRecord {
    /// The chunk id.
    pub id: String,
    /// The embedding of `text`.
    pub vector: Vec<f32>,
    /// The chunk text.
    pub text: String,
    /// Source, page, and content hash.
    pub metadata: RecordMetadata,
}

impl VectorRecord {
    /// Build a record from a chunk and its embedding.
    pub fn from_chunk(chunk: &Chunk, vector: Vec<f32>) -> Self {
        Self {
            id: chunk.id.clone(),
            vector,
            text: chunk.text.clone(),
            metadata: RecordMetadata {
                source: chunk.source.clone(),
                page: chunk.page,
                content_hash: chunk.content_hash.clone(),
            },
        }
    }
}

/// A retrieved [`VectorRecord`] paired with its distance to the query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    /// The retrieved record.
    pub record: VectorRecord,
    /// Cosine distance to the query vector (lower is more relevant).
    pub distance: f32,
}
