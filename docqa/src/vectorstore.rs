//! Vector store trait for storing and searching vector embeddings.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use tokio::sync::OwnedMutexGuard;

use crate::document::{SearchResult, VectorRecord};
use crate::embedding::EmbeddingDescriptor;
use crate::error::{RagError, Result};

/// Exclusive write access to a store, held for one indexing run or reset.
///
/// While a lease is held, other writers on the same store wait (in-process)
/// or are refused (another process). Searches are never blocked. Hand the
/// lease back with [`VectorStore::release_writes`]; a lease that is only
/// dropped frees the in-process lock, and any lease persisted for other
/// processes lapses when it expires.
#[derive(Debug)]
pub struct WriteLease {
    _guard: OwnedMutexGuard<()>,
    holder: Option<String>,
}

impl WriteLease {
    /// Wrap the store's in-process writer guard.
    pub fn new(guard: OwnedMutexGuard<()>) -> Self {
        Self { _guard: guard, holder: None }
    }

    /// Attach the token under which the store persisted the lease.
    pub fn with_holder(mut self, holder: impl Into<String>) -> Self {
        self.holder = Some(holder.into());
        self
    }

    /// The persisted lease token, if the store keeps one.
    pub fn holder(&self) -> Option<&str> {
        self.holder.as_deref()
    }
}

/// A keyed store of [`VectorRecord`]s with nearest-neighbour search.
///
/// Every record belongs to the embedding space named by the store's
/// [`EmbeddingDescriptor`]. The first upsert into an empty store adopts the
/// writer's descriptor together with its records, and later upserts under a
/// different descriptor are refused.
///
/// Upserts are idempotent: writing a record whose id already exists replaces
/// its vector, text, and metadata together, and keeps the record's original
/// insertion position. Search ranks by ascending [`cosine_distance`] and
/// breaks ties by insertion order.
///
/// # Example
///
/// ```rust,ignore
/// use docqa::{InMemoryVectorStore, VectorStore};
///
/// let store = InMemoryVectorStore::new();
/// let lease = store.acquire_writes().await?;
/// store.upsert(&embedder.descriptor(), &records).await?;
/// store.release_writes(lease).await?;
/// let results = store.similarity_search(&query_embedding, 5).await?;
/// ```
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Take the store's exclusive write lease, waiting for an in-process holder.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::StoreError`] if the lease is held by another process.
    async fn acquire_writes(&self) -> Result<WriteLease>;

    /// Give back a lease taken with [`acquire_writes`](Self::acquire_writes).
    async fn release_writes(&self, lease: WriteLease) -> Result<()> {
        drop(lease);
        Ok(())
    }

    /// Insert or replace records, embedded with `descriptor`, by id.
    ///
    /// If the store has no descriptor yet, `descriptor` is adopted in the same
    /// step as the records.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::EmbeddingMismatch`] if the store already holds a
    /// different descriptor. Nothing is written.
    async fn upsert(
        &self,
        descriptor: &EmbeddingDescriptor,
        records: &[VectorRecord],
    ) -> Result<()>;

    /// Return the stored content hash of every record, keyed by id.
    async fn content_hashes(&self) -> Result<HashMap<String, String>>;

    /// Return the ids of every stored record.
    async fn existing_ids(&self) -> Result<HashSet<String>> {
        Ok(self.content_hashes().await?.into_keys().collect())
    }

    /// Return up to `k` records nearest to `query`, ordered by ascending distance.
    ///
    /// Returns an empty `Vec` when the store is empty.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::RetrievalError`] if `query` is empty, contains
    /// non-finite values, or does not match the stored dimensionality.
    async fn similarity_search(&self, query: &[f32], k: usize) -> Result<Vec<SearchResult>>;

    /// Return the embedding descriptor persisted with the store, if any.
    async fn descriptor(&self) -> Result<Option<EmbeddingDescriptor>>;

    /// Return the number of stored records.
    async fn count(&self) -> Result<usize>;

    /// Remove every record and the stored descriptor.
    async fn clear(&self) -> Result<()>;
}

/// Cosine distance `1 - cos(a, b)`, in `[0, 2]`.
///
/// Returns `1.0` if either vector has zero magnitude.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }
    1.0 - dot / (norm_a * norm_b)
}

/// Refuse a write whose descriptor differs from the stored one.
pub(crate) fn ensure_descriptor(
    stored: &EmbeddingDescriptor,
    configured: &EmbeddingDescriptor,
) -> Result<()> {
    if stored != configured {
        return Err(RagError::EmbeddingMismatch {
            stored: stored.clone(),
            configured: configured.clone(),
        });
    }
    Ok(())
}

/// Reject query vectors that cannot be ranked.
pub(crate) fn validate_query(query: &[f32]) -> Result<()> {
    if query.is_empty() {
        return Err(RagError::RetrievalError("query vector is empty".to_string()));
    }
    if query.iter().any(|v| !v.is_finite()) {
        return Err(RagError::RetrievalError(
            "query vector contains non-finite values".to_string(),
        ));
    }
    Ok(())
}

/// Rank `(insertion_seq, record)` pairs by distance to `query` and keep the best `k`.
///
/// Ties keep ascending insertion order.
pub(crate) fn rank_records(
    records: impl IntoIterator<Item = (u64, VectorRecord)>,
    query: &[f32],
    k: usize,
) -> Result<Vec<SearchResult>> {
    let mut scored = Vec::new();
    for (seq, record) in records {
        if record.vector.len() != query.len() {
            return Err(RagError::RetrievalError(format!(
                "query has {} dimensions but record '{}' has {}",
                query.len(),
                record.id,
                record.vector.len()
            )));
        }
        let distance = cosine_distance(&record.vector, query);
        scored.push((seq, SearchResult { record, distance }));
    }

    scored.sort_by(|(seq_a, a), (seq_b, b)| {
        a.distance.total_cmp(&b.distance).then_with(|| seq_a.cmp(seq_b))
    });
    scored.truncate(k);
    Ok(scored.into_iter().map(|(_, result)| result).collect())
}
