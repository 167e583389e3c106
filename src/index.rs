//! Similarity-searchable vector index with disk persistence.
//!
//! [`VectorIndex`] maps chunk ids to `(embedding, chunk)` records and
//! supports exact cosine nearest-neighbor search. An index persists as a
//! pair of files: a binary vector matrix (`<stem>.index`) and a JSON
//! side-table of chunk text/metadata (`<stem>.chunks`), keyed by position
//! so a reload reconstructs the exact pre-save state.

use std::collections::{HashMap, HashSet};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::document::Chunk;
use crate::error::{RagError, Result};

/// A vector index shared between the ingestor, the retriever, and the
/// tenant lifecycle. Searches take the read lock; mutations take the
/// write lock and are additionally serialized per tenant.
pub type SharedIndex = std::sync::Arc<tokio::sync::RwLock<VectorIndex>>;

/// File magic for the binary vector matrix.
const INDEX_MAGIC: [u8; 4] = *b"DRIX";
/// Current on-disk format version.
const INDEX_VERSION: u32 = 1;

/// An exact nearest-neighbor vector index over [`Chunk`]s.
///
/// All embeddings share one dimensionality fixed at creation. Chunks are
/// kept in insertion order; search ties are broken in favor of the
/// earlier-inserted chunk. Concurrent `search` calls are safe (`&self`);
/// mutation takes `&mut self` and must be serialized by the caller.
#[derive(Debug)]
pub struct VectorIndex {
    dimensions: usize,
    chunks: Vec<Chunk>,
    ids: HashSet<String>,
}

/// A chunk record as stored in the JSON side-table. Embeddings live in the
/// binary matrix file and are rejoined by position on load.
#[derive(Serialize)]
struct StoredChunkRef<'a> {
    id: &'a str,
    text: &'a str,
    metadata: &'a HashMap<String, String>,
    document_id: &'a str,
}

#[derive(Deserialize)]
struct StoredChunk {
    id: String,
    text: String,
    metadata: HashMap<String, String>,
    document_id: String,
}

impl VectorIndex {
    /// Create an empty index for embeddings of the given dimensionality.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Index`] if `dimensions` is zero.
    pub fn new(dimensions: usize) -> Result<Self> {
        if dimensions == 0 {
            return Err(RagError::Index("dimensions must be greater than zero".to_string()));
        }
        Ok(Self { dimensions, chunks: Vec::new(), ids: HashSet::new() })
    }

    /// The fixed embedding dimensionality of this index.
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Number of chunks held by the index.
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Whether the index holds no chunks.
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Remove all chunks, keeping the dimensionality.
    pub fn clear(&mut self) {
        self.chunks.clear();
        self.ids.clear();
    }

    /// Append chunks to the index.
    ///
    /// The whole batch is validated before any chunk is inserted, so a
    /// failed `add` leaves the index unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Index`] if any chunk's embedding length differs
    /// from the index dimensionality, or if a chunk id duplicates one
    /// already present (or another id in the batch).
    pub fn add(&mut self, chunks: Vec<Chunk>) -> Result<()> {
        let mut batch_ids = HashSet::new();
        for chunk in &chunks {
            if chunk.embedding.len() != self.dimensions {
                return Err(RagError::Index(format!(
                    "chunk '{}' has embedding of length {}, index dimensionality is {}",
                    chunk.id,
                    chunk.embedding.len(),
                    self.dimensions
                )));
            }
            if self.ids.contains(&chunk.id) || !batch_ids.insert(chunk.id.clone()) {
                return Err(RagError::Index(format!("duplicate chunk id '{}'", chunk.id)));
            }
        }

        for chunk in chunks {
            self.ids.insert(chunk.id.clone());
            self.chunks.push(chunk);
        }
        Ok(())
    }

    /// Search for the `k` chunks most similar to `query`.
    ///
    /// Returns `(chunk, score)` pairs ordered by non-increasing score,
    /// at most `k` of them. Scores are cosine similarity clamped to
    /// `[0, 1]`. Ties rank the earlier-inserted chunk first. An empty
    /// index yields an empty result, not an error.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Index`] if `query` has the wrong dimensionality.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(Chunk, f32)>> {
        if query.len() != self.dimensions {
            return Err(RagError::Index(format!(
                "query vector has length {}, index dimensionality is {}",
                query.len(),
                self.dimensions
            )));
        }

        let mut scored: Vec<(Chunk, f32)> = self
            .chunks
            .iter()
            .map(|chunk| {
                let score = cosine_similarity(&chunk.embedding, query).clamp(0.0, 1.0);
                (chunk.clone(), score)
            })
            .collect();

        // Stable sort: equal scores keep insertion order.
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
    }

    /// Whether both persistence files for `stem` exist on disk.
    pub fn exists(stem: &Path) -> bool {
        matrix_path(stem).exists() && chunks_path(stem).exists()
    }

    /// Persist the index as `<stem>.index` + `<stem>.chunks`.
    ///
    /// Both files are written to temporaries and renamed into place, so a
    /// failed save never leaves a truncated file behind.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Storage`] on any I/O failure.
    pub fn save(&self, stem: &Path) -> Result<()> {
        if let Some(parent) = stem.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| storage(parent, e))?;
            }
        }

        let matrix = matrix_path(stem);
        let matrix_tmp = tmp_path(&matrix);
        self.write_matrix(&matrix_tmp)?;

        let chunks = chunks_path(stem);
        let chunks_tmp = tmp_path(&chunks);
        self.write_chunks(&chunks_tmp)?;

        fs::rename(&matrix_tmp, &matrix).map_err(|e| storage(&matrix, e))?;
        fs::rename(&chunks_tmp, &chunks).map_err(|e| storage(&chunks, e))?;

        info!(stem = %stem.display(), chunk_count = self.chunks.len(), "saved vector index");
        Ok(())
    }

    fn write_matrix(&self, path: &Path) -> Result<()> {
        let file = File::create(path).map_err(|e| storage(path, e))?;
        let mut w = BufWriter::new(file);

        let io = |e| storage(path, e);
        w.write_all(&INDEX_MAGIC).map_err(io)?;
        w.write_all(&INDEX_VERSION.to_le_bytes()).map_err(io)?;
        w.write_all(&(self.dimensions as u32).to_le_bytes()).map_err(io)?;
        w.write_all(&(self.chunks.len() as u32).to_le_bytes()).map_err(io)?;
        for chunk in &self.chunks {
            for value in &chunk.embedding {
                w.write_all(&value.to_le_bytes()).map_err(io)?;
            }
        }
        w.flush().map_err(io)
    }

    fn write_chunks(&self, path: &Path) -> Result<()> {
        let records: Vec<StoredChunkRef<'_>> = self
            .chunks
            .iter()
            .map(|c| StoredChunkRef {
                id: &c.id,
                text: &c.text,
                metadata: &c.metadata,
                document_id: &c.document_id,
            })
            .collect();

        let file = File::create(path).map_err(|e| storage(path, e))?;
        let mut w = BufWriter::new(file);
        serde_json::to_writer(&mut w, &records).map_err(|e| RagError::CorruptIndex {
            path: path.to_path_buf(),
            message: format!("failed to serialize chunk side-table: {e}"),
        })?;
        w.flush().map_err(|e| storage(path, e))
    }

    /// Load an index previously written by [`save`](VectorIndex::save).
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Storage`] if either file cannot be read, and
    /// [`RagError::CorruptIndex`] if the matrix header is invalid, the
    /// matrix is truncated, or the matrix and side-table disagree.
    pub fn load(stem: &Path) -> Result<Self> {
        let matrix = matrix_path(stem);
        let (dimensions, embeddings) = read_matrix(&matrix)?;

        let chunks_file = chunks_path(stem);
        let file = File::open(&chunks_file).map_err(|e| storage(&chunks_file, e))?;
        let records: Vec<StoredChunk> =
            serde_json::from_reader(BufReader::new(file)).map_err(|e| RagError::CorruptIndex {
                path: chunks_file.clone(),
                message: format!("invalid chunk side-table: {e}"),
            })?;

        if records.len() != embeddings.len() {
            return Err(RagError::CorruptIndex {
                path: chunks_file,
                message: format!(
                    "side-table holds {} chunks but matrix holds {} vectors",
                    records.len(),
                    embeddings.len()
                ),
            });
        }

        let mut index = Self::new(dimensions)?;
        let chunks: Vec<Chunk> = records
            .into_iter()
            .zip(embeddings)
            .map(|(r, embedding)| Chunk {
                id: r.id,
                text: r.text,
                embedding,
                metadata: r.metadata,
                document_id: r.document_id,
            })
            .collect();
        index.add(chunks).map_err(|e| RagError::CorruptIndex {
            path: chunks_path(stem),
            message: e.to_string(),
        })?;

        debug!(stem = %stem.display(), chunk_count = index.len(), "loaded vector index");
        Ok(index)
    }
}

/// Read the binary matrix file, returning `(dimensions, embeddings)`.
fn read_matrix(path: &Path) -> Result<(usize, Vec<Vec<f32>>)> {
    let file = File::open(path).map_err(|e| storage(path, e))?;
    let mut r = BufReader::new(file);
    let corrupt = |message: String| RagError::CorruptIndex { path: path.to_path_buf(), message };

    let mut magic = [0u8; 4];
    r.read_exact(&mut magic).map_err(|_| corrupt("file too short for header".to_string()))?;
    if magic != INDEX_MAGIC {
        return Err(corrupt("bad file magic".to_string()));
    }

    let mut word = [0u8; 4];
    r.read_exact(&mut word).map_err(|e| storage(path, e))?;
    let version = u32::from_le_bytes(word);
    if version != INDEX_VERSION {
        return Err(corrupt(format!("unsupported format version {version}")));
    }

    r.read_exact(&mut word).map_err(|e| storage(path, e))?;
    let dimensions = u32::from_le_bytes(word) as usize;
    if dimensions == 0 {
        return Err(corrupt("zero dimensionality".to_string()));
    }

    r.read_exact(&mut word).map_err(|e| storage(path, e))?;
    let count = u32::from_le_bytes(word) as usize;

    let mut embeddings = Vec::with_capacity(count);
    let mut buf = vec![0u8; dimensions * 4];
    for i in 0..count {
        r.read_exact(&mut buf)
            .map_err(|_| corrupt(format!("matrix truncated at vector {i} of {count}")))?;
        let embedding: Vec<f32> =
            buf.chunks_exact(4).map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]])).collect();
        embeddings.push(embedding);
    }

    let mut trailing = [0u8; 1];
    if r.read(&mut trailing).map_err(|e| storage(path, e))? != 0 {
        return Err(corrupt("trailing bytes after matrix".to_string()));
    }

    Ok((dimensions, embeddings))
}

fn storage(path: &Path, source: std::io::Error) -> RagError {
    RagError::Storage { path: path.to_path_buf(), source }
}

fn matrix_path(stem: &Path) -> PathBuf {
    append_ext(stem, "index")
}

fn chunks_path(stem: &Path) -> PathBuf {
    append_ext(stem, "chunks")
}

fn tmp_path(path: &Path) -> PathBuf {
    append_ext(path, "tmp")
}

/// Append an extension without replacing any existing one.
fn append_ext(path: &Path, ext: &str) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".");
    name.push(ext);
    path.with_file_name(name)
}

/// Compute cosine similarity between two vectors.
///
/// Returns 0.0 if either vector has zero magnitude.
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}
