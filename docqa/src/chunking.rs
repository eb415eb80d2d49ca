//! Document chunking strategies.
//!
//! This module provides the [`Chunker`] trait and two implementations:
//!
//! - [`RecursiveChunker`]: splits by paragraphs, lines, sentences, then words,
//!   merging pieces up to the target size with overlap (the default)
//! - [`FixedSizeChunker`]: a plain sliding window over characters
//!
//! Both assign ids with [`chunk_id`], which depends only on the document's
//! source, page, and the chunk's position. Sizes are counted in characters.

use std::collections::VecDeque;

use sha2::{Digest, Sha256};

use crate::document::{Chunk, Document};

/// Separators tried in order by [`RecursiveChunker`].
const SEPARATORS: [&str; 6] = ["\n\n", "\n", ". ", "! ", "? ", " "];

/// A strategy for splitting documents into chunks.
///
/// Implementations must be pure: the same document and configuration always
/// yield the same chunks with the same ids.
pub trait Chunker: Send + Sync {
    /// Split a document into chunks.
    ///
    /// Returns an empty `Vec` if the document text is empty or whitespace.
    /// A non-empty document shorter than the target size yields one chunk.
    fn chunk(&self, document: &Document) -> Vec<Chunk>;
}

/// Build the stable chunk id `"{source}:{page}:{chunk_index}"`.
///
/// Documents without a page number use page `0`.
pub fn chunk_id(source: &str, page: Option<u32>, chunk_index: usize) -> String {
    format!("{source}:{}:{chunk_index}", page.unwrap_or(0))
}

/// Hex SHA-256 of `text`.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Turn raw segment texts into [`Chunk`]s, dropping segments that are blank after trimming.
fn into_chunks(document: &Document, segments: Vec<String>) -> Vec<Chunk> {
    segments
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .enumerate()
        .map(|(chunk_index, text)| Chunk {
            id: chunk_id(&document.source, document.page, chunk_index),
            source: document.source.clone(),
            page: document.page,
            chunk_index,
            text: text.to_string(),
            content_hash: content_hash(text),
        })
        .collect()
}

/// Splits text into fixed-size character windows with configurable overlap.
///
/// # Example
///
/// ```rust,ignore
/// use docqa::FixedSizeChunker;
///
/// let chunker = FixedSizeChunker::new(256, 50);
/// let chunks = chunker.chunk(&document);
/// ```
#[derive(Debug, Clone)]
pub struct FixedSizeChunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl FixedSizeChunker {
    /// Create a new `FixedSizeChunker`.
    ///
    /// # Arguments
    ///
    /// * `chunk_size`: maximum number of characters per chunk
    /// * `chunk_overlap`: number of overlapping characters between consecutive chunks
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self { chunk_size: chunk_size.max(1), chunk_overlap }
    }
}

impl Chunker for FixedSizeChunker {
    fn chunk(&self, document: &Document) -> Vec<Chunk> {
        if document.text.trim().is_empty() {
            return Vec::new();
        }
        into_chunks(document, split_by_chars(&document.text, self.chunk_size, self.chunk_overlap))
    }
}

/// Splits text hierarchically, then merges the pieces back into chunks.
///
/// Text is split at the first separator it contains: paragraph breaks
/// (`\n\n`), line breaks, sentence ends (`. `, `! `, `? `), then spaces.
/// Pieces still longer than `chunk_size` are split with the next separator,
/// and as a last resort by characters. Adjacent pieces are merged while the
/// result fits in `chunk_size`; each new chunk starts with up to
/// `chunk_overlap` characters of trailing pieces from the previous one.
///
/// # Example
///
/// ```rust,ignore
/// use docqa::RecursiveChunker;
///
/// let chunker = RecursiveChunker::new(800, 80);
/// let chunks = chunker.chunk(&document);
/// ```
#[derive(Debug, Clone)]
pub struct RecursiveChunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl RecursiveChunker {
    /// Create a new `RecursiveChunker`.
    ///
    /// # Arguments
    ///
    /// * `chunk_size`: maximum number of characters per chunk
    /// * `chunk_overlap`: number of overlapping characters between consecutive chunks
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self { chunk_size: chunk_size.max(1), chunk_overlap }
    }
}

impl Chunker for RecursiveChunker {
    fn chunk(&self, document: &Document) -> Vec<Chunk> {
        if document.text.trim().is_empty() {
            return Vec::new();
        }
        let segments =
            split_recursive(&document.text, self.chunk_size, self.chunk_overlap, &SEPARATORS);
        into_chunks(document, segments)
    }
}

fn split_recursive(
    text: &str,
    chunk_size: usize,
    chunk_overlap: usize,
    separators: &[&str],
) -> Vec<String> {
    if char_len(text) <= chunk_size {
        return vec![text.to_string()];
    }

    let Some(position) = separators.iter().position(|sep| text.contains(sep)) else {
        return split_by_chars(text, chunk_size, chunk_overlap);
    };
    let separator = separators[position];
    let remaining_separators = &separators[position + 1..];

    let mut segments = Vec::new();
    let mut pending: Vec<&str> = Vec::new();

    for piece in split_keeping_separator(text, separator) {
        if char_len(piece) <= chunk_size {
            pending.push(piece);
        } else {
            segments.extend(merge_pieces(&pending, chunk_size, chunk_overlap));
            pending.clear();
            segments.extend(split_recursive(
                piece,
                chunk_size,
                chunk_overlap,
                remaining_separators,
            ));
        }
    }
    segments.extend(merge_pieces(&pending, chunk_size, chunk_overlap));

    segments
}

/// Merge pieces (each at most `chunk_size` characters) into chunks, carrying
/// up to `chunk_overlap` characters of trailing pieces into the next chunk.
fn merge_pieces(pieces: &[&str], chunk_size: usize, chunk_overlap: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut window: VecDeque<(&str, usize)> = VecDeque::new();
    let mut window_len = 0;

    for &piece in pieces {
        let len = char_len(piece);
        if !window.is_empty() && window_len + len > chunk_size {
            chunks.push(window.iter().map(|(p, _)| *p).collect::<String>());
            while window_len > chunk_overlap || (window_len > 0 && window_len + len > chunk_size) {
                match window.pop_front() {
                    Some((_, dropped)) => window_len -= dropped,
                    None => break,
                }
            }
        }
        window.push_back((piece, len));
        window_len += len;
    }

    if !window.is_empty() {
        chunks.push(window.iter().map(|(p, _)| *p).collect::<String>());
    }

    chunks
}

/// Split text at a separator while keeping the separator attached to the preceding segment.
fn split_keeping_separator<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
    let mut result = Vec::new();
    let mut start = 0;

    while let Some(pos) = text[start..].find(separator) {
        let end = start + pos + separator.len();
        result.push(&text[start..end]);
        start = end;
    }

    if start < text.len() {
        result.push(&text[start..]);
    }

    result
}

/// Character-window splitting with overlap. The last window ends at the end of the text.
fn split_by_chars(text: &str, chunk_size: usize, chunk_overlap: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() {
        return Vec::new();
    }

    let step = chunk_size.saturating_sub(chunk_overlap).max(1);
    let mut chunks = Vec::new();
    let mut start = 0;

    loop {
        let end = (start + chunk_size).min(chars.len());
        chunks.push(chars[start..end].iter().collect());
        if end == chars.len() {
            break;
        }
        start += step;
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(text: &str) -> Document {
        Document::new("docs/guide.txt", text)
    }

    #[test]
    fn short_document_yields_one_chunk() {
        let chunks = RecursiveChunker::new(800, 80).chunk(&doc("The capital of France is Paris."));
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].id, "docs/guide.txt:0:0");
        assert_eq!(chunks[0].text, "The capital of France is Paris.");
        assert_eq!(chunks[0].content_hash, content_hash("The capital of France is Paris."));
    }

    #[test]
    fn blank_document_yields_nothing() {
        assert!(RecursiveChunker::new(100, 10).chunk(&doc("")).is_empty());
        assert!(RecursiveChunker::new(100, 10).chunk(&doc("  \n\n ")).is_empty());
        assert!(FixedSizeChunker::new(100, 10).chunk(&doc("\t")).is_empty());
    }

    #[test]
    fn ids_include_page_number() {
        let page = Document::new("manual.pdf", "Page text.").with_page(6);
        let chunks = RecursiveChunker::new(100, 10).chunk(&page);
        assert_eq!(chunks[0].id, "manual.pdf:6:0");
        assert_eq!(chunks[0].page, Some(6));
    }

    #[test]
    fn paragraphs_are_kept_whole_when_they_fit() {
        let text = "First paragraph here.\n\nSecond paragraph here.\n\nThird paragraph here.";
        let chunks = RecursiveChunker::new(30, 0).chunk(&doc(text));
        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(
            texts,
            vec!["First paragraph here.", "Second paragraph here.", "Third paragraph here."]
        );
    }

    #[test]
    fn consecutive_chunks_overlap() {
        let text = (0..60).map(|i| format!("w{i:02}")).collect::<Vec<_>>().join(" ");
        let chunks = RecursiveChunker::new(40, 12).chunk(&doc(&text));
        assert!(chunks.len() > 2);
        for pair in chunks.windows(2) {
            let first_word = pair[1].text.split(' ').next().unwrap();
            assert!(
                pair[0].text.contains(first_word),
                "chunk {:?} does not overlap {:?}",
                pair[1].text,
                pair[0].text
            );
        }
    }

    #[test]
    fn unbreakable_text_falls_back_to_characters() {
        let text = "x".repeat(25);
        let chunks = RecursiveChunker::new(10, 2).chunk(&doc(&text));
        assert!(chunks.iter().all(|c| c.text.chars().count() <= 10));
        assert_eq!(chunks[0].text, "x".repeat(10));
    }

    #[test]
    fn multibyte_text_is_not_split_inside_a_character() {
        let text = "é".repeat(30);
        let chunks = FixedSizeChunker::new(7, 2).chunk(&doc(&text));
        assert!(chunks.iter().all(|c| c.text.chars().all(|ch| ch == 'é')));
        assert!(chunks.iter().all(|c| c.text.chars().count() <= 7));
    }

    #[test]
    fn fixed_size_windows_overlap_and_end_at_text_end() {
        let chunks = FixedSizeChunker::new(10, 3).chunk(&doc("abcdefghijklmnopqrstuvwxyz"));
        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["abcdefghij", "hijklmnopq", "opqrstuvwx", "vwxyz"]);
    }

    #[test]
    fn different_sources_never_share_ids() {
        let a = RecursiveChunker::new(50, 5).chunk(&Document::new("a.txt", "Same text. Again."));
        let b = RecursiveChunker::new(50, 5).chunk(&Document::new("b.txt", "Same text. Again."));
        assert!(a.iter().all(|ca| b.iter().all(|cb| ca.id != cb.id)));
        assert_eq!(a[0].content_hash, b[0].content_hash);
    }

    #[test]
    fn split_keeping_separator_attaches_to_previous() {
        assert_eq!(split_keeping_separator("a. b. c", ". "), vec!["a. ", "b. ", "c"]);
        assert_eq!(split_keeping_separator("no separator", ". "), vec!["no separator"]);
    }

    mod proptest_chunker {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(200))]

            #[test]
            fn chunking_is_deterministic(
                text in "[a-zA-Z .!?\n]{0,600}",
                size in 5usize..120,
                overlap_ratio in 0usize..4,
            ) {
                let overlap = size * overlap_ratio / 5;
                let chunker = RecursiveChunker::new(size, overlap);
                let document = doc(&text);
                prop_assert_eq!(chunker.chunk(&document), chunker.chunk(&document));
            }

            #[test]
            fn chunks_respect_size_and_are_indexed(
                text in "\\PC{0,800}",
                size in 1usize..200,
                overlap in 0usize..50,
            ) {
                let overlap = overlap.min(size.saturating_sub(1));
                for chunks in [
                    RecursiveChunker::new(size, overlap).chunk(&doc(&text)),
                    FixedSizeChunker::new(size, overlap).chunk(&doc(&text)),
                ] {
                    for (i, chunk) in chunks.iter().enumerate() {
                        prop_assert!(chunk.text.chars().count() <= size);
                        prop_assert!(!chunk.text.trim().is_empty());
                        prop_assert_eq!(chunk.chunk_index, i);
                        prop_assert_eq!(&chunk.id, &chunk_id("docs/guide.txt", None, i));
                    }
                }
            }
        }
    }
}
