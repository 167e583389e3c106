//! Document chunking.
//!
//! Provides the [`Chunker`] trait and [`FixedSizeChunker`], which splits
//! text into overlapping windows so semantic units are not lost at hard
//! chunk boundaries.

use crate::document::{Chunk, Document};

/// A strategy for splitting documents into chunks.
///
/// Implementations produce [`Chunk`]s with text and metadata but no
/// embeddings. Embeddings are attached later by the ingestor.
pub trait Chunker: Send + Sync {
    /// Split a document into chunks.
    ///
    /// Returns an empty `Vec` if the document has empty text.
    /// Each returned chunk has an empty embedding vector.
    fn chunk(&self, document: &Document) -> Vec<Chunk>;
}

/// Splits text into fixed-size windows by character count with configurable
/// overlap between consecutive windows.
///
/// Chunk IDs are generated as `{document_id}_{chunk_index}`. Each chunk
/// inherits the parent document's metadata plus `chunk_index` and
/// `total_chunks` fields. Window boundaries fall on `char` boundaries, so
/// multi-byte text is never split mid-character.
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
    /// * `chunk_size` — maximum number of characters per chunk
    /// * `chunk_overlap` — number of overlapping characters between
    ///   consecutive chunks; must be less than `chunk_size`
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        debug_assert!(chunk_overlap < chunk_size);
        Self { chunk_size, chunk_overlap }
    }

    /// Split raw text into window strings without building [`Chunk`]s.
    fn windows(&self, text: &str) -> Vec<String> {
        if text.is_empty() {
            return Vec::new();
        }

        // Byte offsets of every char boundary, including the end of the text.
        let boundaries: Vec<usize> =
            text.char_indices().map(|(i, _)| i).chain(std::iter::once(text.len())).collect();
        let char_count = boundaries.len() - 1;

        let step = self.chunk_size.saturating_sub(self.chunk_overlap).max(1);
        let mut windows = Vec::new();
        let mut start = 0;

        while start < char_count {
            let end = (start + self.chunk_size).min(char_count);
            windows.push(text[boundaries[start]..boundaries[end]].to_string());
            if end == char_count {
                break;
            }
            start += step;
        }

        windows
    }
}

impl Chunker for FixedSizeChunker {
    fn chunk(&self, document: &Document) -> Vec<Chunk> {
        let windows = self.windows(&document.text);
        let total = windows.len();

        windows
            .into_iter()
            .enumerate()
            .map(|(i, text)| {
                let mut metadata = document.metadata.clone();
                metadata.insert("chunk_index".to_string(), i.to_string());
                metadata.insert("total_chunks".to_string(), total.to_string());
                Chunk {
                    id: format!("{}_{i}", document.id),
                    text,
                    embedding: Vec::new(),
                    metadata,
                    document_id: document.id.clone(),
                }
            })
            .collect()
    }
}
