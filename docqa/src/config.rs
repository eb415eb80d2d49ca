//! Configuration for indexing and querying.
//!
//! [`RagConfig`] is plain serde data. Build one in code with
//! [`RagConfig::builder()`] or read it from a TOML file with
//! [`RagConfig::load`], which also applies `DOCQA_*` environment overrides.
//!
//! ```toml
//! chunk_size = 800
//! chunk_overlap = 80
//! top_k = 5
//! history_turns = 3
//! index_dir = "index"
//!
//! [models]
//! base_url = "http://localhost:11434"
//! embedding_model = "nomic-embed-text"
//! generation_model = "llama3.2:3b"
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{RagError, Result};

/// Default maximum size of a single source file: 50 MiB.
pub const DEFAULT_MAX_FILE_SIZE: u64 = 50 * 1024 * 1024;

/// Names of the external models the pipeline talks to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ModelConfig {
    /// Base URL of the model server.
    pub base_url: String,
    /// Model used for every stored vector and every query vector.
    pub embedding_model: String,
    /// Model that generates answers.
    pub generation_model: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            embedding_model: "nomic-embed-text".to_string(),
            generation_model: "llama3.2:3b".to_string(),
        }
    }
}

/// Configuration parameters for the indexing and query pipelines.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RagConfig {
    /// Target chunk size in characters.
    pub chunk_size: usize,
    /// Number of trailing characters carried from one chunk into the next.
    pub chunk_overlap: usize,
    /// Number of records retrieved per question.
    pub top_k: usize,
    /// Number of most recent conversation turns included in the prompt.
    pub history_turns: usize,
    /// Maximum number of chunk texts sent to the embedding provider per call.
    pub embed_batch_size: usize,
    /// Files larger than this many bytes are skipped during indexing.
    pub max_file_size: u64,
    /// Upper bound on a single language model call, in seconds. `0` disables the bound.
    pub generation_timeout_secs: u64,
    /// Directory holding the persisted vector store.
    pub index_dir: PathBuf,
    /// External model names.
    pub models: ModelConfig,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            chunk_size: 800,
            chunk_overlap: 80,
            top_k: 5,
            history_turns: 3,
            embed_batch_size: 64,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            generation_timeout_secs: 120,
            index_dir: PathBuf::from("index"),
            models: ModelConfig::default(),
        }
    }
}

impl RagConfig {
    /// Create a new builder for constructing a [`RagConfig`].
    pub fn builder() -> RagConfigBuilder {
        RagConfigBuilder::default()
    }

    /// Load configuration from a TOML file, then apply `DOCQA_*` environment overrides.
    ///
    /// Falls back to defaults when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if the file exists but cannot be read
    /// or parsed, or if the resulting values are inconsistent.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path).map_err(|e| {
                RagError::ConfigError(format!("failed to read {}: {e}", path.display()))
            })?;
            Self::from_toml_str(&content)?
        } else {
            Self::default()
        };

        config.apply_overrides_with(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from TOML text. Missing keys take their default values.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] on malformed TOML.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| RagError::ConfigError(format!("failed to parse config: {e}")))
    }

    /// Apply overrides read through `lookup`, keyed by `DOCQA_*` variable names.
    ///
    /// Unparseable numeric values are ignored with a warning.
    pub fn apply_overrides_with(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        fn parse_into<T: std::str::FromStr>(key: &str, value: String, slot: &mut T) {
            match value.parse::<T>() {
                Ok(parsed) => *slot = parsed,
                Err(_) => warn!(key, value = %value, "ignoring invalid override"),
            }
        }

        if let Some(v) = lookup("DOCQA_CHUNK_SIZE") {
            parse_into("DOCQA_CHUNK_SIZE", v, &mut self.chunk_size);
        }
        if let Some(v) = lookup("DOCQA_CHUNK_OVERLAP") {
            parse_into("DOCQA_CHUNK_OVERLAP", v, &mut self.chunk_overlap);
        }
        if let Some(v) = lookup("DOCQA_TOP_K") {
            parse_into("DOCQA_TOP_K", v, &mut self.top_k);
        }
        if let Some(v) = lookup("DOCQA_HISTORY_TURNS") {
            parse_into("DOCQA_HISTORY_TURNS", v, &mut self.history_turns);
        }
        if let Some(v) = lookup("DOCQA_EMBED_BATCH_SIZE") {
            parse_into("DOCQA_EMBED_BATCH_SIZE", v, &mut self.embed_batch_size);
        }
        if let Some(v) = lookup("DOCQA_MAX_FILE_SIZE") {
            parse_into("DOCQA_MAX_FILE_SIZE", v, &mut self.max_file_size);
        }
        if let Some(v) = lookup("DOCQA_GENERATION_TIMEOUT_SECS") {
            parse_into("DOCQA_GENERATION_TIMEOUT_SECS", v, &mut self.generation_timeout_secs);
        }
        if let Some(v) = lookup("DOCQA_INDEX_DIR") {
            self.index_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("DOCQA_BASE_URL") {
            self.models.base_url = v;
        }
        if let Some(v) = lookup("DOCQA_EMBEDDING_MODEL") {
            self.models.embedding_model = v;
        }
        if let Some(v) = lookup("DOCQA_GENERATION_MODEL") {
            self.models.generation_model = v;
        }
    }

    /// Check that parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if:
    /// - `chunk_size == 0` or `chunk_overlap >= chunk_size`
    /// - `top_k == 0`
    /// - `embed_batch_size == 0`
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(RagError::ConfigError("chunk_size must be greater than zero".to_string()));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(RagError::ConfigError(format!(
                "chunk_overlap ({}) must be less than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.top_k == 0 {
            return Err(RagError::ConfigError("top_k must be greater than zero".to_string()));
        }
        if self.embed_batch_size == 0 {
            return Err(RagError::ConfigError(
                "embed_batch_size must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for constructing a validated [`RagConfig`].
#[derive(Debug, Clone, Default)]
pub struct RagConfigBuilder {
    config: RagConfig,
}

impl RagConfigBuilder {
    /// Set the target chunk size in characters.
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.config.chunk_size = size;
        self
    }

    /// Set the overlap between consecutive chunks in characters.
    pub fn chunk_overlap(mut self, overlap: usize) -> Self {
        self.config.chunk_overlap = overlap;
        self
    }

    /// Set the number of records retrieved per question.
    pub fn top_k(mut self, k: usize) -> Self {
        self.config.top_k = k;
        self
    }

    /// Set how many recent conversation turns are included in the prompt.
    pub fn history_turns(mut self, turns: usize) -> Self {
        self.config.history_turns = turns;
        self
    }

    /// Set the maximum number of texts per embedding call.
    pub fn embed_batch_size(mut self, size: usize) -> Self {
        self.config.embed_batch_size = size;
        self
    }

    /// Set the maximum source file size in bytes.
    pub fn max_file_size(mut self, bytes: u64) -> Self {
        self.config.max_file_size = bytes;
        self
    }

    /// Set the language model timeout in seconds (`0` disables it).
    pub fn generation_timeout_secs(mut self, secs: u64) -> Self {
        self.config.generation_timeout_secs = secs;
        self
    }

    /// Set the directory of the persisted vector store.
    pub fn index_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.index_dir = dir.into();
        self
    }

    /// Set the external model names.
    pub fn models(mut self, models: ModelConfig) -> Self {
        self.config.models = models;
        self
    }

    /// Build the [`RagConfig`], validating that parameters are consistent.
    ///
    /// # Errors
    ///
    /// See [`RagConfig::validate`].
    pub fn build(self) -> Result<RagConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = RagConfig::default();
        assert_eq!(config.chunk_size, 800);
        assert_eq!(config.chunk_overlap, 80);
        assert_eq!(config.top_k, 5);
        assert_eq!(config.history_turns, 3);
        assert_eq!(config.models.generation_model, "llama3.2:3b");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn builder_rejects_inconsistent_values() {
        assert!(RagConfig::builder().chunk_size(100).chunk_overlap(100).build().is_err());
        assert!(RagConfig::builder().top_k(0).build().is_err());
        assert!(RagConfig::builder().embed_batch_size(0).build().is_err());
        assert!(RagConfig::builder().chunk_size(0).chunk_overlap(0).build().is_err());
    }

    #[test]
    fn builder_with_custom_values() {
        let config = RagConfig::builder()
            .chunk_size(256)
            .chunk_overlap(32)
            .top_k(3)
            .history_turns(1)
            .index_dir("/tmp/idx")
            .build()
            .unwrap();
        assert_eq!(config.chunk_size, 256);
        assert_eq!(config.chunk_overlap, 32);
        assert_eq!(config.top_k, 3);
        assert_eq!(config.history_turns, 1);
        assert_eq!(config.index_dir, PathBuf::from("/tmp/idx"));
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = RagConfig::from_toml_str(
            "top_k = 8\n\n[models]\nembedding_model = \"mxbai-embed-large\"\n",
        )
        .unwrap();
        assert_eq!(config.top_k, 8);
        assert_eq!(config.chunk_size, 800);
        assert_eq!(config.models.embedding_model, "mxbai-embed-large");
        assert_eq!(config.models.base_url, "http://localhost:11434");
    }

    #[test]
    fn malformed_toml_is_config_error() {
        let err = RagConfig::from_toml_str("top_k = \"many\"").unwrap_err();
        assert!(matches!(err, RagError::ConfigError(_)));
    }

    #[test]
    fn load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = RagConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.chunk_size, RagConfig::default().chunk_size);
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("docqa.toml");
        std::fs::write(&path, "chunk_size = 400\nchunk_overlap = 40\n").unwrap();
        let config = RagConfig::load(&path).unwrap();
        assert_eq!(config.chunk_size, 400);
        assert_eq!(config.chunk_overlap, 40);
    }

    #[test]
    fn overrides_apply_and_ignore_garbage() {
        let vars = HashMap::from([
            ("DOCQA_TOP_K", "9"),
            ("DOCQA_CHUNK_SIZE", "not-a-number"),
            ("DOCQA_GENERATION_MODEL", "mistral"),
            ("DOCQA_INDEX_DIR", "/var/lib/docqa"),
        ]);
        let mut config = RagConfig::default();
        config.apply_overrides_with(|key| vars.get(key).map(|v| v.to_string()));
        assert_eq!(config.top_k, 9);
        assert_eq!(config.chunk_size, 800);
        assert_eq!(config.models.generation_model, "mistral");
        assert_eq!(config.index_dir, PathBuf::from("/var/lib/docqa"));
    }

    #[test]
    fn batch_and_file_size_overrides() {
        let vars =
            HashMap::from([("DOCQA_EMBED_BATCH_SIZE", "16"), ("DOCQA_MAX_FILE_SIZE", "2048")]);
        let mut config = RagConfig::default();
        config.apply_overrides_with(|key| vars.get(key).map(|v| v.to_string()));
        assert_eq!(config.embed_batch_size, 16);
        assert_eq!(config.max_file_size, 2048);

        let vars = HashMap::from([("DOCQA_EMBED_BATCH_SIZE", "0")]);
        config.apply_overrides_with(|key| vars.get(key).map(|v| v.to_string()));
        assert!(config.validate().is_err());
    }
}
