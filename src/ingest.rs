//! Document ingestion: chunk, embed, and insert into a vector index.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};

use crate::chunking::Chunker;
use crate::document::{Chunk, Document};
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::index::SharedIndex;

/// A single file that failed during directory ingestion.
#[derive(Debug)]
pub struct IngestFailure {
    /// The file that could not be ingested.
    pub path: PathBuf,
    /// Why it failed.
    pub reason: String,
}

/// Outcome of a directory ingestion: partial success plus collected
/// per-file failures. Per-file errors never abort the batch.
#[derive(Debug, Default)]
pub struct IngestReport {
    /// Total chunks added across all successfully ingested files.
    pub chunks_added: usize,
    /// Files that failed, with reasons.
    pub failures: Vec<IngestFailure>,
}

/// Turns raw documents into embedded chunks inside a [`VectorIndex`](crate::index::VectorIndex).
///
/// The ingestor mutates the index in place and never persists to disk;
/// the caller decides when to save.
pub struct DocumentIngestor {
    index: SharedIndex,
    embedder: Arc<dyn EmbeddingProvider>,
    chunker: Arc<dyn Chunker>,
}

impl DocumentIngestor {
    /// Create an ingestor targeting the given index.
    pub fn new(
        index: SharedIndex,
        embedder: Arc<dyn EmbeddingProvider>,
        chunker: Arc<dyn Chunker>,
    ) -> Self {
        Self { index, embedder, chunker }
    }

    /// Ingest a single document: chunk, embed, insert.
    ///
    /// Returns the chunks that were inserted. An empty document produces
    /// zero chunks and no error. All embeddings are computed before the
    /// index write lock is taken, so an abandoned call never leaves a
    /// partial batch in the index.
    ///
    /// # Errors
    ///
    /// Returns an error if embedding fails or an index invariant is
    /// violated.
    pub async fn ingest(&self, document: &Document) -> Result<Vec<Chunk>> {
        let mut chunks = self.chunker.chunk(document);
        if chunks.is_empty() {
            info!(document_id = %document.id, chunk_count = 0, "ingested document (empty)");
            return Ok(chunks);
        }

        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        let embeddings = self.embedder.embed_batch(&texts).await?;

        for (chunk, embedding) in chunks.iter_mut().zip(embeddings) {
            chunk.embedding = embedding;
        }

        self.index.write().await.add(chunks.clone())?;

        info!(document_id = %document.id, chunk_count = chunks.len(), "ingested document");
        Ok(chunks)
    }

    /// Ingest the contents of a single file.
    ///
    /// The resulting chunks carry `source` (file name) and `path` metadata.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Ingest`] if the file cannot be read.
    pub async fn ingest_file(&self, path: &Path) -> Result<Vec<Chunk>> {
        let text = tokio::fs::read_to_string(path).await.map_err(|e| RagError::Ingest {
            source_label: path.display().to_string(),
            message: format!("unreadable file: {e}"),
        })?;

        let mut metadata = std::collections::HashMap::new();
        if let Some(name) = path.file_name() {
            metadata.insert("source".to_string(), name.to_string_lossy().into_owned());
        }
        metadata.insert("path".to_string(), path.display().to_string());

        self.ingest(&Document::new(text, metadata)).await
    }

    /// Ingest every file under `dir` (recursively) whose extension is in
    /// `extensions` (leading dots optional, case-insensitive).
    ///
    /// A file that fails to read is logged, recorded in the report, and
    /// skipped; the rest of the directory is still processed. Files are
    /// visited in path order for deterministic reports.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Ingest`] only if `dir` itself is not a readable
    /// directory.
    pub async fn ingest_directory(&self, dir: &Path, extensions: &[&str]) -> Result<IngestReport> {
        if !dir.is_dir() {
            return Err(RagError::Ingest {
                source_label: dir.display().to_string(),
                message: "not a directory".to_string(),
            });
        }

        let allowed: Vec<String> =
            extensions.iter().map(|e| e.trim_start_matches('.').to_ascii_lowercase()).collect();

        let mut files = Vec::new();
        let mut report = IngestReport::default();
        for entry in walkdir::WalkDir::new(dir).sort_by_file_name() {
            match entry {
                Ok(entry) if entry.file_type().is_file() => files.push(entry.into_path()),
                Ok(_) => {}
                Err(e) => {
                    let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| dir.to_path_buf());
                    warn!(path = %path.display(), error = %e, "skipping unreadable entry");
                    report.failures.push(IngestFailure { path, reason: e.to_string() });
                }
            }
        }
        files.sort();

        for path in files {
            let ext = path
                .extension()
                .map(|e| e.to_string_lossy().to_ascii_lowercase())
                .unwrap_or_default();
            if !allowed.iter().any(|a| *a == ext) {
                continue;
            }

            match self.ingest_file(&path).await {
                Ok(chunks) => report.chunks_added += chunks.len(),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "failed to ingest file");
                    report.failures.push(IngestFailure { path, reason: e.to_string() });
                }
            }
        }

        info!(
            dir = %dir.display(),
            chunks_added = report.chunks_added,
            failure_count = report.failures.len(),
            "ingested directory"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use tokio::sync::RwLock;

    use super::*;
    use crate::chunking::FixedSizeChunker;
    use crate::index::VectorIndex;
    use crate::mock::MockEmbedding;

    fn ingestor(dim: usize) -> (DocumentIngestor, SharedIndex) {
        let index = Arc::new(RwLock::new(VectorIndex::new(dim).unwrap()));
        let ingestor = DocumentIngestor::new(
            index.clone(),
            Arc::new(MockEmbedding::new(dim)),
            Arc::new(FixedSizeChunker::new(40, 10)),
        );
        (ingestor, index)
    }

    #[tokio::test]
    async fn ingest_text_adds_embedded_chunks_to_the_index() {
        let (ingestor, index) = ingestor(16);
        let doc = Document::new("some reasonably long text that spans more than one window of forty characters", HashMap::new());
        let chunks = ingestor.ingest(&doc).await.unwrap();

        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.embedding.len() == 16));
        assert_eq!(index.read().await.len(), chunks.len());
    }

    #[tokio::test]
    async fn empty_document_is_a_no_op() {
        let (ingestor, index) = ingestor(8);
        let chunks = ingestor.ingest(&Document::new("", HashMap::new())).await.unwrap();
        assert!(chunks.is_empty());
        assert!(index.read().await.is_empty());
    }

    #[tokio::test]
    async fn ingest_file_records_source_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "hello from a file").unwrap();

        let (ingestor, _) = ingestor(8);
        let chunks = ingestor.ingest_file(&path).await.unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].metadata["source"], "notes.txt");
    }

    #[tokio::test]
    async fn missing_file_is_an_ingest_error() {
        let (ingestor, _) = ingestor(8);
        let err = ingestor.ingest_file(Path::new("/no/such/file.txt")).await.unwrap_err();
        assert!(matches!(err, RagError::Ingest { .. }));
    }

    #[tokio::test]
    async fn directory_ingestion_skips_bad_files_and_reports_them() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("good.txt"), "valid content").unwrap();
        // Invalid UTF-8 makes the read fail without touching permissions.
        std::fs::write(dir.path().join("broken.txt"), [0xff, 0xfe, 0xfd]).unwrap();
        std::fs::write(dir.path().join("ignored.bin"), "wrong extension").unwrap();

        let (ingestor, index) = ingestor(8);
        let report = ingestor.ingest_directory(dir.path(), &[".txt"]).await.unwrap();

        assert_eq!(report.chunks_added, 1);
        assert_eq!(report.failures.len(), 1);
        assert!(report.failures[0].path.ends_with("broken.txt"));
        assert_eq!(index.read().await.len(), 1);
    }

    #[tokio::test]
    async fn extension_filter_accepts_dotted_and_bare_forms() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.md"), "markdown").unwrap();
        std::fs::write(dir.path().join("b.TXT"), "uppercase extension").unwrap();

        let (ingestor, _) = ingestor(8);
        let report = ingestor.ingest_directory(dir.path(), &["md", ".txt"]).await.unwrap();
        assert_eq!(report.chunks_added, 2);
        assert!(report.failures.is_empty());
    }

    #[tokio::test]
    async fn missing_directory_is_an_error() {
        let (ingestor, _) = ingestor(8);
        let err = ingestor.ingest_directory(Path::new("/no/such/dir"), &["txt"]).await.unwrap_err();
        assert!(matches!(err, RagError::Ingest { .. }));
    }
}
