//! Incremental indexing: load → chunk → diff → embed → upsert.
//!
//! A run only embeds chunks whose id is new or whose content hash changed.
//! Unchanged chunks are counted as skipped and never reach the embedding
//! provider, so re-running on an unchanged corpus is cheap and writes nothing.

use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::chunking::Chunker;
use crate::config::RagConfig;
use crate::document::{Chunk, VectorRecord};
use crate::embedding::{EmbeddingProvider, check_embeddings};
use crate::error::{RagError, Result};
use crate::loader::DirectoryLoader;
use crate::vectorstore::VectorStore;

/// Counts from one indexing run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IndexReport {
    /// Documents loaded (a PDF contributes one per page).
    pub documents: usize,
    /// Files that could not be loaded and were skipped.
    pub failed_documents: Vec<String>,
    /// Chunks produced from the loaded documents.
    pub total: usize,
    /// Chunks written under an id the store did not have.
    pub added: usize,
    /// Chunks re-embedded because their content hash changed.
    pub updated: usize,
    /// Chunks left untouched because their content hash matched.
    pub skipped: usize,
}

impl IndexReport {
    /// Chunks written to the store in this run.
    pub fn written(&self) -> usize {
        self.added + self.updated
    }
}

/// Builds and maintains the vector index for a corpus directory.
///
/// `reindex` and `reset` hold the store's [`WriteLease`](crate::WriteLease)
/// while they write, so any number of indexers may share one store. Searches
/// against the store may run concurrently with either.
pub struct Indexer {
    loader: DirectoryLoader,
    chunker: Arc<dyn Chunker>,
    embedding_provider: Arc<dyn EmbeddingProvider>,
    vector_store: Arc<dyn VectorStore>,
    embed_batch_size: usize,
}

impl Indexer {
    /// Create an indexer that loads files with [`DirectoryLoader::with_defaults`].
    pub fn new(
        config: &RagConfig,
        chunker: Arc<dyn Chunker>,
        embedding_provider: Arc<dyn EmbeddingProvider>,
        vector_store: Arc<dyn VectorStore>,
    ) -> Self {
        Self {
            loader: DirectoryLoader::with_defaults(config.max_file_size),
            chunker,
            embedding_provider,
            vector_store,
            embed_batch_size: config.embed_batch_size.max(1),
        }
    }

    /// Replace the directory loader.
    pub fn with_loader(mut self, loader: DirectoryLoader) -> Self {
        self.loader = loader;
        self
    }

    /// Bring the store up to date with the files under `source_dir`.
    ///
    /// The run holds the store's write lease from start to finish, so runs
    /// against the same store never interleave; searches are not blocked.
    /// Unreadable files are skipped and listed in
    /// [`IndexReport::failed_documents`]. Chunks are embedded in batches of
    /// `embed_batch_size`; each batch is written only after its embeddings
    /// are complete. The first batch written to an empty store records the
    /// provider's [`EmbeddingDescriptor`](crate::EmbeddingDescriptor).
    ///
    /// Nothing is ever deleted. Records of files that were removed, and
    /// trailing chunks of a document that now splits into fewer chunks, stay
    /// in the store and remain retrievable with their old text until
    /// [`reset`](Self::reset) is called.
    ///
    /// # Errors
    ///
    /// - [`RagError::EmbeddingMismatch`] if the store was built with a different
    ///   embedding model. Nothing is written.
    /// - [`RagError::PipelineError`] if the write lease cannot be taken or
    ///   `source_dir` cannot be walked.
    /// - [`RagError::IndexingAborted`] if embedding or storage fails. Batches
    ///   written before the failure stay written and are counted in the
    ///   carried report.
    pub async fn reindex(&self, source_dir: &Path) -> Result<IndexReport> {
        let lease = self.vector_store.acquire_writes().await.map_err(|e| {
            error!(error = %e, "failed to take the index write lease");
            e.during("write lease")
        })?;
        let outcome = self.run(source_dir).await;
        if let Err(e) = self.vector_store.release_writes(lease).await {
            warn!(error = %e, "failed to release the index write lease");
        }
        outcome
    }

    async fn run(&self, source_dir: &Path) -> Result<IndexReport> {
        let configured = self.embedding_provider.descriptor();

        let stored = self.vector_store.descriptor().await.map_err(|e| {
            error!(error = %e, "failed to read stored embedding descriptor");
            e.during("descriptor lookup")
        })?;
        if let Some(stored) = stored {
            if stored != configured {
                error!(%stored, %configured, "refusing to index with a different embedding model");
                return Err(RagError::EmbeddingMismatch { stored, configured });
            }
        }

        let load = self.loader.load_dir(source_dir).await.map_err(|e| {
            error!(dir = %source_dir.display(), error = %e, "failed to read source directory");
            e.during("document loading")
        })?;

        let mut report = IndexReport {
            documents: load.documents.len(),
            failed_documents: load
                .failures
                .iter()
                .map(|(path, _)| path.display().to_string())
                .collect(),
            ..IndexReport::default()
        };

        let chunks: Vec<Chunk> =
            load.documents.iter().flat_map(|doc| self.chunker.chunk(doc)).collect();
        report.total = chunks.len();

        let existing = match self.vector_store.content_hashes().await {
            Ok(existing) => existing,
            Err(e) => return Err(abort(report, e.during("content hash lookup"))),
        };

        let mut pending: Vec<(&Chunk, bool)> = Vec::new();
        for chunk in &chunks {
            match existing.get(&chunk.id) {
                Some(hash) if *hash == chunk.content_hash => report.skipped += 1,
                Some(_) => pending.push((chunk, false)),
                None => pending.push((chunk, true)),
            }
        }

        for batch in pending.chunks(self.embed_batch_size) {
            let texts: Vec<&str> = batch.iter().map(|(chunk, _)| chunk.text.as_str()).collect();
            let vectors = match self.embedding_provider.embed_batch(&texts).await {
                Ok(vectors) => vectors,
                Err(e) => return Err(abort(report, e.during("chunk embedding"))),
            };
            if let Err(e) = check_embeddings(&configured, texts.len(), &vectors) {
                return Err(abort(report, e.during("chunk embedding")));
            }

            let records: Vec<VectorRecord> = batch
                .iter()
                .zip(vectors)
                .map(|((chunk, _), vector)| VectorRecord::from_chunk(chunk, vector))
                .collect();
            if let Err(e) = self.vector_store.upsert(&configured, &records).await {
                return Err(abort(report, e.during("upsert")));
            }

            let added = batch.iter().filter(|(_, is_new)| *is_new).count();
            report.added += added;
            report.updated += batch.len() - added;
            debug!(batch_size = batch.len(), "batch written");
        }

        info!(
            documents = report.documents,
            failed = report.failed_documents.len(),
            total = report.total,
            added = report.added,
            updated = report.updated,
            skipped = report.skipped,
            "reindex completed"
        );
        Ok(report)
    }

    /// Remove every record and the stored embedding descriptor.
    ///
    /// Waits for any indexing run on the same store to finish first.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::PipelineError`] if the write lease cannot be taken
    /// or the store cannot be cleared.
    pub async fn reset(&self) -> Result<()> {
        let lease = self.vector_store.acquire_writes().await.map_err(|e| {
            error!(error = %e, "failed to take the index write lease");
            e.during("write lease")
        })?;
        let cleared = self.vector_store.clear().await.map_err(|e| {
            error!(error = %e, "failed to clear vector store");
            e.during("reset")
        });
        if let Err(e) = self.vector_store.release_writes(lease).await {
            warn!(error = %e, "failed to release the index write lease");
        }
        cleared?;
        info!("index cleared");
        Ok(())
    }
}

fn abort(report: IndexReport, source: RagError) -> RagError {
    error!(
        written = report.written(),
        skipped = report.skipped,
        error = %source,
        "reindex aborted"
    );
    RagError::IndexingAborted { report, source: Box::new(source) }
}
