//! Deterministic test doubles shared by the integration tests.

#![allow(dead_code)]

use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use docqa::{EmbeddingProvider, LanguageModel, RagError, Result};
use tempfile::TempDir;
use tokio::sync::Notify;

pub const DIM: usize = 64;

/// Bag-of-words embedder: each lowercase word is hashed into one of `DIM`
/// buckets and the result is L2-normalized. Identical texts get identical
/// vectors; texts sharing words get nearby vectors.
pub struct HashEmbedder {
    model: String,
    dimensions: usize,
    /// Texts embedded so far, across all calls.
    pub embedded: AtomicUsize,
    /// Number of `embed_batch` calls that succeed before every later call fails.
    fail_after_batches: Option<usize>,
    batches: AtomicUsize,
    delay: Option<Duration>,
}

impl HashEmbedder {
    pub fn new() -> Self {
        Self::named("hash-embed", DIM)
    }

    pub fn named(model: &str, dimensions: usize) -> Self {
        Self {
            model: model.to_string(),
            dimensions,
            embedded: AtomicUsize::new(0),
            fail_after_batches: None,
            batches: AtomicUsize::new(0),
            delay: None,
        }
    }

    pub fn failing_after(batches: usize) -> Self {
        Self { fail_after_batches: Some(batches), ..Self::new() }
    }

    /// Sleep for `delay` before every batch.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn embedded(&self) -> usize {
        self.embedded.load(Ordering::SeqCst)
    }

    fn vector(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dimensions];
        for word in text.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty()) {
            // FNV-1a
            let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
            for byte in word.to_lowercase().bytes() {
                hash ^= u64::from(byte);
                hash = hash.wrapping_mul(0x0100_0000_01b3);
            }
            v[(hash % self.dimensions as u64) as usize] += 1.0;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            v.iter_mut().for_each(|x| *x /= norm);
        } else {
            v[0] = 1.0;
        }
        v
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embedded.fetch_add(1, Ordering::SeqCst);
        Ok(self.vector(text))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let done = self.batches.fetch_add(1, Ordering::SeqCst);
        if self.fail_after_batches.is_some_and(|limit| done >= limit) {
            return Err(RagError::EmbeddingError {
                provider: self.model.clone(),
                message: "service unavailable".to_string(),
            });
        }
        self.embedded.fetch_add(texts.len(), Ordering::SeqCst);
        Ok(texts.iter().map(|t| self.vector(t)).collect())
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

/// A [`HashEmbedder`] whose batches wait until the test opens the gate.
pub struct GatedEmbedder {
    inner: HashEmbedder,
    /// Notified when a batch starts waiting.
    pub entered: Notify,
    /// Each notification lets one waiting batch proceed.
    pub gate: Notify,
}

impl GatedEmbedder {
    pub fn new() -> Self {
        Self { inner: HashEmbedder::new(), entered: Notify::new(), gate: Notify::new() }
    }
}

#[async_trait]
impl EmbeddingProvider for GatedEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.inner.embed(text).await
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        self.entered.notify_one();
        self.gate.notified().await;
        self.inner.embed_batch(texts).await
    }

    fn model(&self) -> &str {
        self.inner.model()
    }

    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }
}

/// How a [`RecordingLanguageModel`] responds.
pub enum Reply {
    /// `"Response: {prompt}\n\nSources: [...]"`, so answers contain the retrieved context.
    Echo,
    Fixed(String),
    Fail,
    /// Never returns within any sensible timeout.
    Hang,
}

/// Records every prompt it receives.
pub struct RecordingLanguageModel {
    reply: Reply,
    prompts: Mutex<Vec<String>>,
}

impl RecordingLanguageModel {
    pub fn new(reply: Reply) -> Self {
        Self { reply, prompts: Mutex::new(Vec::new()) }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn last_prompt(&self) -> String {
        self.prompts().pop().expect("language model was never called")
    }
}

#[async_trait]
impl LanguageModel for RecordingLanguageModel {
    fn name(&self) -> &str {
        "recording"
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        match &self.reply {
            Reply::Echo => Ok(format!("Response: {prompt}\n\nSources: ['ignored']")),
            Reply::Fixed(text) => Ok(text.clone()),
            Reply::Fail => Err(RagError::GenerationError {
                model: "recording".to_string(),
                message: "model crashed".to_string(),
            }),
            Reply::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(String::new())
            }
        }
    }
}

/// A temporary corpus directory holding `files` (relative path, contents).
pub fn corpus(files: &[(&str, &str)]) -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    for (path, contents) in files {
        write(dir.path(), path, contents);
    }
    dir
}

pub fn write(root: &Path, path: &str, contents: &str) {
    let full = root.join(path);
    if let Some(parent) = full.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(full, contents).unwrap();
}
