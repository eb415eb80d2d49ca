//! Durable on-disk vector store backed by SQLite.
//!
//! Provides [`SqliteVectorStore`], which implements [`VectorStore`] using
//! [sqlx](https://docs.rs/sqlx). The database lives in a single file inside
//! the configured index directory, so the index survives restarts and can be
//! inspected with any SQLite client.
//!
//! # Schema
//!
//! ```sql
//! records(seq INTEGER PRIMARY KEY AUTOINCREMENT, id TEXT UNIQUE, vector BLOB,
//!         text TEXT, source TEXT, page INTEGER, content_hash TEXT)
//! store_meta(key TEXT PRIMARY KEY, value TEXT)
//! write_lease(slot INTEGER PRIMARY KEY CHECK (slot = 0), holder TEXT, expires_at INTEGER)
//! ```
//!
//! `vector` holds little-endian `f32` values. `store_meta` holds the
//! embedding descriptor as JSON under the key `embedding_descriptor`.
//! `write_lease` has at most one row: the process currently indexing, and
//! the unix time at which its lease lapses if it never releases it.
//!
//! # Example
//!
//! ```rust,ignore
//! use docqa::SqliteVectorStore;
//!
//! let store = SqliteVectorStore::open("index").await?;
//! let lease = store.acquire_writes().await?;
//! store.upsert(&descriptor, &records).await?;
//! store.release_writes(lease).await?;
//! let results = store.similarity_search(&query_embedding, 5).await?;
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use tokio::sync::Mutex;
use tracing::debug;

use crate::document::{RecordMetadata, SearchResult, VectorRecord};
use crate::embedding::EmbeddingDescriptor;
use crate::error::{RagError, Result};
use crate::vectorstore::{
    VectorStore, WriteLease, ensure_descriptor, rank_records, validate_query,
};

/// File name of the database inside the index directory.
pub const DATABASE_FILE: &str = "docqa.sqlite3";

const DESCRIPTOR_KEY: &str = "embedding_descriptor";

/// How long a write lease outlives its last renewal. Every upsert renews it.
pub const LEASE_TTL: Duration = Duration::from_secs(600);

const CREATE_RECORDS: &str = "CREATE TABLE IF NOT EXISTS records (\
        seq INTEGER PRIMARY KEY AUTOINCREMENT, \
        id TEXT NOT NULL UNIQUE, \
        vector BLOB NOT NULL, \
        text TEXT NOT NULL, \
        source TEXT NOT NULL, \
        page INTEGER, \
        content_hash TEXT NOT NULL\
    )";

const CREATE_META: &str =
    "CREATE TABLE IF NOT EXISTS store_meta (key TEXT PRIMARY KEY, value TEXT NOT NULL)";

const CREATE_LEASE: &str = "CREATE TABLE IF NOT EXISTS write_lease (\
        slot INTEGER PRIMARY KEY CHECK (slot = 0), \
        holder TEXT NOT NULL, \
        expires_at INTEGER NOT NULL\
    )";

// Takes the slot when it is free or its holder's lease has lapsed.
const TAKE_LEASE: &str = "INSERT INTO write_lease (slot, holder, expires_at) VALUES (0, ?, ?) \
     ON CONFLICT (slot) DO UPDATE SET \
        holder = excluded.holder, \
        expires_at = excluded.expires_at \
     WHERE write_lease.expires_at <= ?";

const ADOPT_DESCRIPTOR: &str =
    "INSERT INTO store_meta (key, value) VALUES (?, ?) ON CONFLICT (key) DO NOTHING";

const UPSERT_RECORD: &str = "INSERT INTO records (id, vector, text, source, page, content_hash) \
     VALUES (?, ?, ?, ?, ?, ?) \
     ON CONFLICT (id) DO UPDATE SET \
        vector = excluded.vector, \
        text = excluded.text, \
        source = excluded.source, \
        page = excluded.page, \
        content_hash = excluded.content_hash";

/// A [`VectorStore`] persisted in a SQLite database file.
///
/// Each [`upsert`](VectorStore::upsert) call runs in one transaction and each
/// record is written by a single statement, so a failed write leaves every
/// record either fully old or fully new. Search loads the vectors and ranks
/// them exactly; there is no approximate index.
///
/// Writers in this process share one lock across clones of the store. Other
/// processes opening the same directory are kept out by the `write_lease`
/// row: [`acquire_writes`](VectorStore::acquire_writes) fails while another
/// process holds an unexpired lease.
#[derive(Debug, Clone)]
pub struct SqliteVectorStore {
    pool: SqlitePool,
    path: PathBuf,
    writers: Arc<Mutex<()>>,
}

impl SqliteVectorStore {
    /// Open (or create) the store inside `dir`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::StoreError`] if the directory or database cannot be
    /// created or the schema cannot be applied.
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        tokio::fs::create_dir_all(dir).await.map_err(|e| RagError::StoreError {
            backend: "sqlite".to_string(),
            message: format!("failed to create index directory {}: {e}", dir.display()),
        })?;

        let path = dir.join(DATABASE_FILE);
        let options = SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(map_err)?;

        sqlx::query(CREATE_RECORDS).execute(&pool).await.map_err(map_err)?;
        sqlx::query(CREATE_META).execute(&pool).await.map_err(map_err)?;
        sqlx::query(CREATE_LEASE).execute(&pool).await.map_err(map_err)?;

        debug!(path = %path.display(), "opened sqlite vector store");
        Ok(Self { pool, path, writers: Arc::new(Mutex::new(())) })
    }

    /// Path of the database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Close every pooled connection.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn map_err(e: sqlx::Error) -> RagError {
    RagError::StoreError { backend: "sqlite".to_string(), message: e.to_string() }
}

fn corrupt(message: String) -> RagError {
    RagError::StoreError { backend: "sqlite".to_string(), message }
}

fn unix_now() -> Duration {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default()
}

fn lease_expiry() -> i64 {
    (unix_now() + LEASE_TTL).as_secs() as i64
}

fn encode_vector(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn decode_vector(id: &str, bytes: &[u8]) -> Result<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return Err(corrupt(format!(
            "record '{id}' has a vector blob of {} bytes, not a multiple of 4",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}

fn parse_descriptor(json: &str) -> Result<EmbeddingDescriptor> {
    serde_json::from_str(json)
        .map_err(|e| corrupt(format!("stored embedding descriptor is invalid: {e}")))
}

fn record_from_row(row: &SqliteRow) -> Result<(u64, VectorRecord)> {
    let seq: i64 = row.try_get("seq").map_err(map_err)?;
    let id: String = row.try_get("id").map_err(map_err)?;
    let blob: Vec<u8> = row.try_get("vector").map_err(map_err)?;
    let page: Option<i64> = row.try_get("page").map_err(map_err)?;
    let page = page
        .map(u32::try_from)
        .transpose()
        .map_err(|_| corrupt(format!("record '{id}' has an out-of-range page number")))?;

    let vector = decode_vector(&id, &blob)?;
    let record = VectorRecord {
        vector,
        text: row.try_get("text").map_err(map_err)?,
        metadata: RecordMetadata {
            source: row.try_get("source").map_err(map_err)?,
            page,
            content_hash: row.try_get("content_hash").map_err(map_err)?,
        },
        id,
    };
    Ok((seq.max(0) as u64, record))
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn acquire_writes(&self) -> Result<WriteLease> {
        let guard = self.writers.clone().lock_owned().await;
        let now = unix_now();
        let holder = format!("{}-{}", std::process::id(), now.as_nanos());

        let taken = sqlx::query(TAKE_LEASE)
            .bind(&holder)
            .bind(lease_expiry())
            .bind(now.as_secs() as i64)
            .execute(&self.pool)
            .await
            .map_err(map_err)?;
        if taken.rows_affected() == 0 {
            return Err(RagError::StoreError {
                backend: "sqlite".to_string(),
                message: format!(
                    "index at {} is being written by another process",
                    self.path.display()
                ),
            });
        }

        debug!(%holder, "write lease taken");
        Ok(WriteLease::new(guard).with_holder(holder))
    }

    async fn release_writes(&self, lease: WriteLease) -> Result<()> {
        if let Some(holder) = lease.holder() {
            sqlx::query("DELETE FROM write_lease WHERE holder = ?")
                .bind(holder)
                .execute(&self.pool)
                .await
                .map_err(map_err)?;
            debug!(%holder, "write lease released");
        }
        Ok(())
    }

    async fn upsert(
        &self,
        descriptor: &EmbeddingDescriptor,
        records: &[VectorRecord],
    ) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let json = serde_json::to_string(descriptor)
            .map_err(|e| corrupt(format!("failed to encode embedding descriptor: {e}")))?;

        let mut tx = self.pool.begin().await.map_err(map_err)?;
        // The insert takes the write lock before the descriptor is compared.
        sqlx::query(ADOPT_DESCRIPTOR)
            .bind(DESCRIPTOR_KEY)
            .bind(&json)
            .execute(&mut *tx)
            .await
            .map_err(map_err)?;
        let (stored,): (String,) = sqlx::query_as("SELECT value FROM store_meta WHERE key = ?")
            .bind(DESCRIPTOR_KEY)
            .fetch_one(&mut *tx)
            .await
            .map_err(map_err)?;
        ensure_descriptor(&parse_descriptor(&stored)?, descriptor)?;

        for record in records {
            sqlx::query(UPSERT_RECORD)
                .bind(&record.id)
                .bind(encode_vector(&record.vector))
                .bind(&record.text)
                .bind(&record.metadata.source)
                .bind(record.metadata.page.map(i64::from))
                .bind(&record.metadata.content_hash)
                .execute(&mut *tx)
                .await
                .map_err(map_err)?;
        }
        let renewed = sqlx::query("UPDATE write_lease SET expires_at = ? WHERE slot = 0")
            .bind(lease_expiry())
            .execute(&mut *tx)
            .await
            .map_err(map_err)?;
        if renewed.rows_affected() == 0 {
            debug!(path = %self.path.display(), "upsert without a write lease");
        }
        tx.commit().await.map_err(map_err)?;

        debug!(count = records.len(), "upserted records to sqlite");
        Ok(())
    }

    async fn content_hashes(&self) -> Result<HashMap<String, String>> {
        let rows: Vec<(String, String)> = sqlx::query_as("SELECT id, content_hash FROM records")
            .fetch_all(&self.pool)
            .await
            .map_err(map_err)?;
        Ok(rows.into_iter().collect())
    }

    async fn similarity_search(&self, query: &[f32], k: usize) -> Result<Vec<SearchResult>> {
        validate_query(query)?;
        let rows = sqlx::query(
            "SELECT seq, id, vector, text, source, page, content_hash FROM records ORDER BY seq",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(map_err)?;

        let records = rows.iter().map(record_from_row).collect::<Result<Vec<_>>>()?;
        rank_records(records, query, k)
    }

    async fn descriptor(&self) -> Result<Option<EmbeddingDescriptor>> {
        let row: Option<(String,)> = sqlx::query_as("SELECT value FROM store_meta WHERE key = ?")
            .bind(DESCRIPTOR_KEY)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_err)?;

        row.map(|(json,)| parse_descriptor(&json)).transpose()
    }

    async fn count(&self) -> Result<usize> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM records")
            .fetch_one(&self.pool)
            .await
            .map_err(map_err)?;
        Ok(count.max(0) as usize)
    }

    async fn clear(&self) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(map_err)?;
        sqlx::query("DELETE FROM records").execute(&mut *tx).await.map_err(map_err)?;
        sqlx::query("DELETE FROM store_meta").execute(&mut *tx).await.map_err(map_err)?;
        tx.commit().await.map_err(map_err)?;
        debug!(path = %self.path.display(), "cleared sqlite vector store");
        Ok(())
    }
}
