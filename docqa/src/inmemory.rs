//! In-memory vector store using cosine distance.
//!
//! This module provides [`InMemoryVectorStore`], a non-durable store backed by
//! a `HashMap` protected by a `tokio::sync::RwLock`. It is suitable for tests,
//! demos, and corpora that are re-indexed on every start.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};

use crate::document::{SearchResult, VectorRecord};
use crate::embedding::EmbeddingDescriptor;
use crate::error::Result;
use crate::vectorstore::{
    VectorStore, WriteLease, ensure_descriptor, rank_records, validate_query,
};

#[derive(Debug, Default)]
struct State {
    /// Record id → (insertion sequence, record).
    records: HashMap<String, (u64, VectorRecord)>,
    next_seq: u64,
    descriptor: Option<EmbeddingDescriptor>,
}

/// An in-memory vector store.
///
/// Each upsert replaces whole records under the state lock, so readers never
/// observe a half-written record. Indexing runs serialize on a separate
/// writer lock that searches never touch.
///
/// # Example
///
/// ```rust,ignore
/// use docqa::{InMemoryVectorStore, VectorStore};
///
/// let store = InMemoryVectorStore::new();
/// store.upsert(&descriptor, &records).await?;
/// ```
#[derive(Debug, Default)]
pub struct InMemoryVectorStore {
    state: RwLock<State>,
    writers: Arc<Mutex<()>>,
}

impl InMemoryVectorStore {
    /// Create a new empty in-memory vector store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn acquire_writes(&self) -> Result<WriteLease> {
        Ok(WriteLease::new(self.writers.clone().lock_owned().await))
    }

    async fn upsert(
        &self,
        descriptor: &EmbeddingDescriptor,
        records: &[VectorRecord],
    ) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let mut state = self.state.write().await;
        match &state.descriptor {
            Some(stored) => ensure_descriptor(stored, descriptor)?,
            None => state.descriptor = Some(descriptor.clone()),
        }
        for record in records {
            let seq = match state.records.get(&record.id) {
                Some((seq, _)) => *seq,
                None => {
                    let seq = state.next_seq;
                    state.next_seq += 1;
                    seq
                }
            };
            state.records.insert(record.id.clone(), (seq, record.clone()));
        }
        Ok(())
    }

    async fn content_hashes(&self) -> Result<HashMap<String, String>> {
        let state = self.state.read().await;
        Ok(state
            .records
            .iter()
            .map(|(id, (_, record))| (id.clone(), record.metadata.content_hash.clone()))
            .collect())
    }

    async fn similarity_search(&self, query: &[f32], k: usize) -> Result<Vec<SearchResult>> {
        validate_query(query)?;
        let state = self.state.read().await;
        rank_records(state.records.values().map(|(seq, record)| (*seq, record.clone())), query, k)
    }

    async fn descriptor(&self) -> Result<Option<EmbeddingDescriptor>> {
        Ok(self.state.read().await.descriptor.clone())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.state.read().await.records.len())
    }

    async fn clear(&self) -> Result<()> {
        let mut state = self.state.write().await;
        state.records.clear();
        state.descriptor = None;
        Ok(())
    }
}
